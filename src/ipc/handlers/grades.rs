use crate::grade::{self, CourseRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{grading_settings, GradingSettings};
use crate::ipc::helpers::{i64_range, opt_f64, req_f64, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::transcript;
use serde_json::json;

fn settings_or_default(state: &AppState) -> GradingSettings {
    // Stateless methods still answer when the settings row is unreadable.
    grading_settings(state.db.as_ref()).unwrap_or_default()
}

fn handle_grades_scale(_state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "scale": grade::GRADE_SCALE }))
}

fn handle_grades_lookup(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let percentage = match req_f64(&req.params, "percentage") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    ok(
        &req.id,
        json!({
            "percentage": percentage,
            "letterGrade": grade::letter_grade(percentage),
            "gpaPoint": grade::gpa_point(percentage)
        }),
    )
}

fn handle_grades_details(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = settings_or_default(state);
    let parsed = req_f64(&req.params, "marks")
        .and_then(|m| Ok((m, opt_f64(&req.params, "totalMarks")?)));
    let (marks, total_marks) = match parsed {
        Ok((m, t)) => (m, t.unwrap_or(settings.default_total_marks)),
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let details = grade::calculate_grade_details(marks, total_marks);
    ok(
        &req.id,
        json!({
            "percentage": details.percentage,
            "letterGrade": details.letter_grade,
            "gpaPoint": details.gpa_point,
            "passing": grade::is_passing(details.gpa_point)
        }),
    )
}

fn parse_courses(
    params: &serde_json::Value,
    default_credit_hours: u32,
) -> Result<Vec<CourseRecord>, String> {
    let arr = params
        .get("courses")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "courses must be an array".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for (i, c) in arr.iter().enumerate() {
        let gpa_point = c
            .get("gpaPoint")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| format!("courses[{}].gpaPoint must be a number", i))?;
        let credit_hours = match c.get("creditHours") {
            None | Some(serde_json::Value::Null) => default_credit_hours,
            Some(v) => {
                let n = i64_range(v, &format!("courses[{}].creditHours", i), 1, 12)?;
                u32::try_from(n).map_err(|e| e.to_string())?
            }
        };
        out.push(CourseRecord::new(gpa_point, credit_hours));
    }
    Ok(out)
}

fn handle_grades_aggregate(
    state: &mut AppState,
    req: &Request,
    aggregate: fn(&[CourseRecord]) -> grade::CgpaResult,
) -> serde_json::Value {
    let settings = settings_or_default(state);
    let courses = match parse_courses(&req.params, settings.default_credit_hours) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let result = aggregate(&courses);
    ok(
        &req.id,
        json!({
            "cgpa": result.cgpa,
            "totalCredits": result.total_credits,
            "totalQualityPoints": result.total_quality_points,
            "classification": grade::grade_classification(result.cgpa)
        }),
    )
}

fn handle_grades_classify(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let cgpa = match req_f64(&req.params, "cgpa") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    ok(
        &req.id,
        json!({
            "classification": grade::grade_classification(cgpa),
            "passing": grade::is_passing(cgpa)
        }),
    )
}

fn handle_grades_transcript(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match req_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match transcript::build_transcript(conn, &student_id) {
        Ok(t) => match serde_json::to_value(&t) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.scale" => Some(handle_grades_scale(state, req)),
        "grades.lookup" => Some(handle_grades_lookup(state, req)),
        "grades.details" => Some(handle_grades_details(state, req)),
        "grades.cgpa" => Some(handle_grades_aggregate(state, req, grade::calculate_cgpa)),
        "grades.semesterGpa" => Some(handle_grades_aggregate(
            state,
            req,
            grade::calculate_semester_gpa,
        )),
        "grades.classify" => Some(handle_grades_classify(state, req)),
        "grades.transcript" => Some(handle_grades_transcript(state, req)),
        _ => None,
    }
}
