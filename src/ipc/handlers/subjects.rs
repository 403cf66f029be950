use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::enrollments::regrade_subject;
use crate::ipc::handlers::setup::grading_settings;
use crate::ipc::helpers::{
    check_ref, i64_range, is_unique_violation, opt_str, patch_object, reject_unknown, req_f64,
    req_str, require_db, PatchBuilder,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn subject_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "code": row.get::<_, String>(1)?,
        "title": row.get::<_, String>(2)?,
        "creditHours": row.get::<_, i64>(3)?,
        "totalMarks": row.get::<_, f64>(4)?,
        "departmentId": row.get::<_, Option<String>>(5)?,
        "teacherId": row.get::<_, Option<String>>(6)?,
        "enrollmentCount": row.get::<_, i64>(7)?,
    }))
}

fn positive_total(params: &serde_json::Value, key: &str) -> Result<f64, String> {
    let n = req_f64(params, key)?;
    if n <= 0.0 {
        return Err(format!("{} must be > 0", key));
    }
    Ok(n)
}

/// Enrollments whose stored marks would not fit under `total`.
fn marks_above(
    conn: &rusqlite::Connection,
    subject_id: &str,
    total: f64,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM enrollments
         WHERE subject_id = ? AND marks IS NOT NULL AND marks > ?
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(rusqlite::params![subject_id, total], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    let filters = opt_str(&req.params, "departmentId")
        .and_then(|d| Ok((d, opt_str(&req.params, "teacherId")?)));
    let (department_id, teacher_id) = match filters {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id, s.code, s.title, s.credit_hours, s.total_marks, s.department_id, s.teacher_id,
           (SELECT COUNT(*) FROM enrollments e WHERE e.subject_id = s.id) AS enrollment_count
         FROM subjects s
         WHERE (?1 IS NULL OR s.department_id = ?1)
           AND (?2 IS NULL OR s.teacher_id = ?2)
         ORDER BY s.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&department_id, &teacher_id], subject_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let grading = match grading_settings(Some(conn)) {
        Ok(g) => g,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let p = &req.params;
    let parsed = (|| -> Result<_, String> {
        let code = req_str(p, "code")?.to_ascii_uppercase();
        let title = req_str(p, "title")?;
        let credit_hours = match p.get("creditHours") {
            None | Some(serde_json::Value::Null) => i64::from(grading.default_credit_hours),
            Some(v) => i64_range(v, "creditHours", 1, 12)?,
        };
        let total_marks = match p.get("totalMarks") {
            None | Some(serde_json::Value::Null) => grading.default_total_marks,
            Some(_) => positive_total(p, "totalMarks")?,
        };
        let department_id = opt_str(p, "departmentId")?;
        let teacher_id = opt_str(p, "teacherId")?;
        check_ref(conn, "departments", "departmentId", &department_id)?;
        check_ref(conn, "staff", "teacherId", &teacher_id)?;
        Ok((code, title, credit_hours, total_marks, department_id, teacher_id))
    })();
    let (code, title, credit_hours, total_marks, department_id, teacher_id) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, code, title, credit_hours, total_marks, department_id,
                              teacher_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            subject_id,
            code,
            title,
            credit_hours,
            total_marks,
            department_id,
            teacher_id,
            db::now_rfc3339()
        ],
    ) {
        if is_unique_violation(&e) {
            return err(&req.id, "conflict", "subject code already exists", None);
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(
        &req.id,
        json!({
            "subjectId": subject_id,
            "code": code,
            "creditHours": credit_hours,
            "totalMarks": total_marks
        }),
    )
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<(String, PatchBuilder, Option<f64>), String> {
        let subject_id = req_str(&req.params, "subjectId")?;
        let patch = patch_object(&req.params)?;
        reject_unknown(
            patch,
            &[
                "code",
                "title",
                "creditHours",
                "totalMarks",
                "departmentId",
                "teacherId",
            ],
        )?;
        let mut b = PatchBuilder::default();
        let mut new_total = None;
        if patch.get("code").is_some() {
            b.text("code", req_str(patch, "code")?.to_ascii_uppercase());
        }
        if patch.get("title").is_some() {
            b.text("title", req_str(patch, "title")?);
        }
        if let Some(v) = patch.get("creditHours") {
            b.integer("credit_hours", i64_range(v, "creditHours", 1, 12)?);
        }
        if patch.get("totalMarks").is_some() {
            let t = positive_total(patch, "totalMarks")?;
            b.real("total_marks", t);
            new_total = Some(t);
        }
        if patch.get("departmentId").is_some() {
            let d = opt_str(patch, "departmentId")?;
            check_ref(conn, "departments", "departmentId", &d)?;
            b.nullable_text("department_id", d);
        }
        if patch.get("teacherId").is_some() {
            let t = opt_str(patch, "teacherId")?;
            check_ref(conn, "staff", "teacherId", &t)?;
            b.nullable_text("teacher_id", t);
        }
        if b.is_empty() {
            return Err("patch must include at least one field".into());
        }
        Ok((subject_id, b, new_total))
    })();
    let (subject_id, patch, new_total) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    if let Some(total) = new_total {
        let grading = match grading_settings(Some(conn)) {
            Ok(g) => g,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if grading.strict_marks {
            let over = match marks_above(conn, &subject_id, total) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if !over.is_empty() {
                return err(
                    &req.id,
                    "conflict",
                    format!("stored marks exceed totalMarks {}", total),
                    Some(json!({ "totalMarks": total, "enrollmentIds": over })),
                );
            }
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    match patch.execute(&tx, "subjects", &subject_id) {
        Ok(0) => {
            let _ = tx.rollback();
            return err(&req.id, "not_found", "subject not found", None);
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.rollback();
            if is_unique_violation(&e) {
                return err(&req.id, "conflict", "subject code already exists", None);
            }
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "subjects" })),
            );
        }
    }

    // A new denominator changes every stored percentage for this subject.
    let mut regraded = 0;
    if let Some(total) = new_total {
        match regrade_subject(&tx, &subject_id, total) {
            Ok(n) => regraded = n,
            Err(e) => {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_update_failed",
                    e.to_string(),
                    Some(json!({ "table": "enrollments" })),
                );
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "regradedEnrollments": regraded }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let subject_id = match req_str(&req.params, "subjectId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let enrolled: rusqlite::Result<i64> = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE subject_id = ?",
        [&subject_id],
        |r| r.get(0),
    );
    match enrolled {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "conflict",
                "subject has enrollments",
                Some(json!({ "enrollments": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match conn.execute("DELETE FROM subjects WHERE id = ?", [&subject_id]) {
        Ok(0) => err(&req.id, "not_found", "subject not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
