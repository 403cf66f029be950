use crate::db;
use crate::grade::{self, GradeResult};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grading_settings;
use crate::ipc::helpers::{opt_str, req_str, require_db, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Stores marks together with the grade derived from them; `None` clears both.
fn store_grade(
    conn: &Connection,
    enrollment_id: &str,
    marks: Option<f64>,
    total_marks: f64,
) -> rusqlite::Result<Option<GradeResult>> {
    let result = marks.map(|m| grade::calculate_grade_details(m, total_marks));
    conn.execute(
        "UPDATE enrollments
         SET marks = ?, percentage = ?, letter_grade = ?, gpa_point = ?,
             graded_at = CASE WHEN ? IS NULL THEN NULL ELSE ? END
         WHERE id = ?",
        rusqlite::params![
            marks,
            result.as_ref().map(|r| r.percentage),
            result.as_ref().map(|r| r.letter_grade.clone()),
            result.as_ref().map(|r| r.gpa_point),
            marks,
            db::now_rfc3339(),
            enrollment_id
        ],
    )?;
    Ok(result)
}

/// Recomputes every graded enrollment of a subject against a new total.
pub fn regrade_subject(
    conn: &Connection,
    subject_id: &str,
    total_marks: f64,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, marks FROM enrollments WHERE subject_id = ? AND marks IS NOT NULL",
    )?;
    let graded = stmt
        .query_map([subject_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (enrollment_id, marks) in &graded {
        store_grade(conn, enrollment_id, Some(*marks), total_marks)?;
    }
    tracing::debug!(subject_id, count = graded.len(), "regraded subject");
    Ok(graded.len())
}

fn enrollment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "studentId": row.get::<_, String>(1)?,
        "subjectId": row.get::<_, String>(2)?,
        "semester": row.get::<_, String>(3)?,
        "marks": row.get::<_, Option<f64>>(4)?,
        "percentage": row.get::<_, Option<f64>>(5)?,
        "letterGrade": row.get::<_, Option<String>>(6)?,
        "gpaPoint": row.get::<_, Option<f64>>(7)?,
        "subjectCode": row.get::<_, String>(8)?,
        "subjectTitle": row.get::<_, String>(9)?,
        "creditHours": row.get::<_, i64>(10)?,
        "totalMarks": row.get::<_, f64>(11)?,
        "rollNo": row.get::<_, String>(12)?,
    }))
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "enrollments": [] }));
    };
    let filters = (|| -> Result<_, String> {
        let student_id = opt_str(&req.params, "studentId")?;
        let subject_id = opt_str(&req.params, "subjectId")?;
        let semester = opt_str(&req.params, "semester")?;
        if student_id.is_none() && subject_id.is_none() {
            return Err("studentId or subjectId is required".into());
        }
        Ok((student_id, subject_id, semester))
    })();
    let (student_id, subject_id, semester) = match filters {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.student_id, e.subject_id, e.semester, e.marks, e.percentage,
                e.letter_grade, e.gpa_point, s.code, s.title, s.credit_hours, s.total_marks,
                st.roll_no
         FROM enrollments e
         JOIN subjects s ON s.id = e.subject_id
         JOIN students st ON st.id = e.student_id
         WHERE (?1 IS NULL OR e.student_id = ?1)
           AND (?2 IS NULL OR e.subject_id = ?2)
           AND (?3 IS NULL OR e.semester = ?3)
         ORDER BY e.semester, s.code, st.roll_no",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id, &subject_id, &semester], enrollment_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(enrollments) => ok(&req.id, json!({ "enrollments": enrollments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<_, String> {
        Ok((
            req_str(&req.params, "studentId")?,
            req_str(&req.params, "subjectId")?,
            req_str(&req.params, "semester")?,
        ))
    })();
    let (student_id, subject_id, semester) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    for (table, id, what) in [
        ("students", &student_id, "student"),
        ("subjects", &subject_id, "subject"),
    ] {
        match row_exists(conn, table, id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", format!("{} not found", what), None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND subject_id = ? AND semester = ?",
            (&student_id, &subject_id, &semester),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(existing_id) = existing {
        return err(
            &req.id,
            "conflict",
            "student is already enrolled in this subject for the semester",
            Some(json!({ "enrollmentId": existing_id })),
        );
    }

    let enrollment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(id, student_id, subject_id, semester, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&enrollment_id, &student_id, &subject_id, &semester, db::now_rfc3339()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }
    ok(&req.id, json!({ "enrollmentId": enrollment_id }))
}

fn handle_enrollments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let enrollment_id = match req_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match conn.execute("DELETE FROM enrollments WHERE id = ?", [&enrollment_id]) {
        Ok(0) => err(&req.id, "not_found", "enrollment not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        ),
    }
}

fn handle_enrollments_set_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let enrollment_id = match req_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let marks = match req.params.get("marks") {
        None => return err(&req.id, "bad_params", "missing marks", None),
        Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_f64().filter(|n| n.is_finite()) {
            Some(n) => Some(n),
            None => return err(&req.id, "bad_params", "marks must be a number or null", None),
        },
    };

    let total_marks: Option<f64> = match conn
        .query_row(
            "SELECT s.total_marks
             FROM enrollments e
             JOIN subjects s ON s.id = e.subject_id
             WHERE e.id = ?",
            [&enrollment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(total_marks) = total_marks else {
        return err(&req.id, "not_found", "enrollment not found", None);
    };

    let grading = match grading_settings(Some(conn)) {
        Ok(g) => g,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(m) = marks {
        if grading.strict_marks && !(0.0..=total_marks).contains(&m) {
            return err(
                &req.id,
                "bad_params",
                format!("marks must be in 0..={}", total_marks),
                Some(json!({ "marks": m, "totalMarks": total_marks })),
            );
        }
    }

    match store_grade(conn, &enrollment_id, marks, total_marks) {
        Ok(result) => ok(
            &req.id,
            json!({
                "enrollmentId": enrollment_id,
                "marks": marks,
                "totalMarks": total_marks,
                "grade": result
            }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        "enrollments.delete" => Some(handle_enrollments_delete(state, req)),
        "enrollments.setMarks" => Some(handle_enrollments_set_marks(state, req)),
        _ => None,
    }
}
