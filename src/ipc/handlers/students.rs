use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    check_ref, is_unique_violation, opt_str, patch_object, reject_unknown, req_str, require_db,
    row_exists, PatchBuilder,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const STUDENT_COLUMNS: &str =
    "id, roll_no, first_name, last_name, email, phone, department_id, batch, active";

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let last_name: String = row.get(3)?;
    let first_name: String = row.get(2)?;
    let active: i64 = row.get(8)?;
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "rollNo": row.get::<_, String>(1)?,
        "displayName": format!("{}, {}", last_name, first_name),
        "firstName": first_name,
        "lastName": last_name,
        "email": row.get::<_, Option<String>>(4)?,
        "phone": row.get::<_, Option<String>>(5)?,
        "departmentId": row.get::<_, Option<String>>(6)?,
        "batch": row.get::<_, Option<String>>(7)?,
        "active": active != 0,
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let department_id = match opt_str(&req.params, "departmentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let sql = format!(
        "SELECT {} FROM students
         WHERE (?1 IS NULL OR department_id = ?1)
         ORDER BY roll_no",
        STUDENT_COLUMNS
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&department_id], student_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match req_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    match conn.query_row(&sql, [&student_id], student_row).optional() {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let p = &req.params;
    let parsed = (|| -> Result<_, String> {
        let roll_no = req_str(p, "rollNo")?;
        let first_name = req_str(p, "firstName")?;
        let last_name = req_str(p, "lastName")?;
        let email = opt_str(p, "email")?.map(|e| e.to_ascii_lowercase());
        let phone = opt_str(p, "phone")?;
        let department_id = opt_str(p, "departmentId")?;
        let batch = opt_str(p, "batch")?;
        let active = match p.get("active") {
            None | Some(serde_json::Value::Null) => true,
            Some(v) => v.as_bool().ok_or("active must be a boolean")?,
        };
        check_ref(conn, "departments", "departmentId", &department_id)?;
        Ok((roll_no, first_name, last_name, email, phone, department_id, batch, active))
    })();
    let (roll_no, first_name, last_name, email, phone, department_id, batch, active) = match parsed
    {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, roll_no, first_name, last_name, email, phone, department_id,
                              batch, active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            roll_no,
            first_name,
            last_name,
            email,
            phone,
            department_id,
            batch,
            if active { 1 } else { 0 },
            db::now_rfc3339()
        ],
    ) {
        if is_unique_violation(&e) {
            return err(&req.id, "conflict", "rollNo already exists", None);
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": student_id, "rollNo": roll_no }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<(String, PatchBuilder), String> {
        let student_id = req_str(&req.params, "studentId")?;
        let patch = patch_object(&req.params)?;
        reject_unknown(
            patch,
            &[
                "rollNo",
                "firstName",
                "lastName",
                "email",
                "phone",
                "departmentId",
                "batch",
                "active",
            ],
        )?;
        let mut b = PatchBuilder::default();
        if patch.get("rollNo").is_some() {
            b.text("roll_no", req_str(patch, "rollNo")?);
        }
        if patch.get("firstName").is_some() {
            b.text("first_name", req_str(patch, "firstName")?);
        }
        if patch.get("lastName").is_some() {
            b.text("last_name", req_str(patch, "lastName")?);
        }
        if patch.get("email").is_some() {
            b.nullable_text(
                "email",
                opt_str(patch, "email")?.map(|e| e.to_ascii_lowercase()),
            );
        }
        if patch.get("phone").is_some() {
            b.nullable_text("phone", opt_str(patch, "phone")?);
        }
        if patch.get("departmentId").is_some() {
            let d = opt_str(patch, "departmentId")?;
            check_ref(conn, "departments", "departmentId", &d)?;
            b.nullable_text("department_id", d);
        }
        if patch.get("batch").is_some() {
            b.nullable_text("batch", opt_str(patch, "batch")?);
        }
        if let Some(v) = patch.get("active") {
            let active = v.as_bool().ok_or("patch.active must be a boolean")?;
            b.integer("active", if active { 1 } else { 0 });
        }
        if b.is_empty() {
            return Err("patch must include at least one field".into());
        }
        b.raw("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')");
        Ok((student_id, b))
    })();
    let (student_id, patch) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match patch.execute(conn, "students", &student_id) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) if is_unique_violation(&e) => err(&req.id, "conflict", "rollNo already exists", None),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match req_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match row_exists(conn, "students", &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // No ON DELETE CASCADE; dependents go first.
    for (table, sql) in [
        ("enrollments", "DELETE FROM enrollments WHERE student_id = ?"),
        ("fees", "DELETE FROM fees WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
