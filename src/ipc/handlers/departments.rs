use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    is_unique_violation, patch_object, reject_unknown, req_str, require_db, PatchBuilder,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.code,
           d.name,
           (SELECT COUNT(*) FROM students s WHERE s.department_id = d.id) AS student_count,
           (SELECT COUNT(*) FROM staff t WHERE t.department_id = d.id) AS staff_count,
           (SELECT COUNT(*) FROM subjects sb WHERE sb.department_id = d.id) AS subject_count
         FROM departments d
         ORDER BY d.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "code": row.get::<_, String>(1)?,
                "name": row.get::<_, String>(2)?,
                "studentCount": row.get::<_, i64>(3)?,
                "staffCount": row.get::<_, i64>(4)?,
                "subjectCount": row.get::<_, i64>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = req_str(&req.params, "code")
        .and_then(|code| Ok((code.to_ascii_uppercase(), req_str(&req.params, "name")?)));
    let (code, name) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let department_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, code, name, created_at) VALUES(?, ?, ?, ?)",
        (&department_id, &code, &name, db::now_rfc3339()),
    ) {
        if is_unique_violation(&e) {
            return err(&req.id, "conflict", "department code already exists", None);
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(
        &req.id,
        json!({ "departmentId": department_id, "code": code, "name": name }),
    )
}

fn handle_departments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<(String, PatchBuilder), String> {
        let department_id = req_str(&req.params, "departmentId")?;
        let patch = patch_object(&req.params)?;
        reject_unknown(patch, &["code", "name"])?;
        let mut b = PatchBuilder::default();
        if patch.get("code").is_some() {
            b.text("code", req_str(patch, "code")?.to_ascii_uppercase());
        }
        if patch.get("name").is_some() {
            b.text("name", req_str(patch, "name")?);
        }
        if b.is_empty() {
            return Err("patch must include at least one field".into());
        }
        Ok((department_id, b))
    })();
    let (department_id, patch) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match patch.execute(conn, "departments", &department_id) {
        Ok(0) => err(&req.id, "not_found", "department not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) if is_unique_violation(&e) => {
            err(&req.id, "conflict", "department code already exists", None)
        }
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        ),
    }
}

fn handle_departments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let department_id = match req_str(&req.params, "departmentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let refs: rusqlite::Result<i64> = conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students WHERE department_id = ?1)
         + (SELECT COUNT(*) FROM staff WHERE department_id = ?1)
         + (SELECT COUNT(*) FROM subjects WHERE department_id = ?1)",
        [&department_id],
        |r| r.get(0),
    );
    match refs {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "conflict",
                "department is still referenced",
                Some(json!({ "references": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match conn.execute("DELETE FROM departments WHERE id = ?", [&department_id]) {
        Ok(0) => err(&req.id, "not_found", "department not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.list" => Some(handle_departments_list(state, req)),
        "departments.create" => Some(handle_departments_create(state, req)),
        "departments.update" => Some(handle_departments_update(state, req)),
        "departments.delete" => Some(handle_departments_delete(state, req)),
        _ => None,
    }
}
