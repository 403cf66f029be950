use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    check_ref, is_unique_violation, one_of, opt_str, patch_object, reject_unknown, req_str,
    require_db, row_exists, PatchBuilder,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

const ROLES: &[&str] = &["admin", "teacher"];

fn staff_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "role": row.get::<_, String>(1)?,
        "firstName": row.get::<_, String>(2)?,
        "lastName": row.get::<_, String>(3)?,
        "email": row.get::<_, String>(4)?,
        "phone": row.get::<_, Option<String>>(5)?,
        "designation": row.get::<_, Option<String>>(6)?,
        "departmentId": row.get::<_, Option<String>>(7)?,
    }))
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "staff": [] }));
    };
    let role = match opt_str(&req.params, "role") {
        Ok(Some(r)) => match one_of("role", &r, ROLES) {
            Ok(r) => Some(r),
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        Ok(None) => None,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, role, first_name, last_name, email, phone, designation, department_id
         FROM staff
         WHERE (?1 IS NULL OR role = ?1)
         ORDER BY last_name, first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&role], staff_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(staff) => ok(&req.id, json!({ "staff": staff })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct NewStaff {
    role: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    designation: Option<String>,
    department_id: Option<String>,
}

fn parse_new_staff(params: &serde_json::Value) -> Result<NewStaff, String> {
    Ok(NewStaff {
        role: one_of("role", &req_str(params, "role")?, ROLES)?,
        first_name: req_str(params, "firstName")?,
        last_name: req_str(params, "lastName")?,
        email: req_str(params, "email")?.to_ascii_lowercase(),
        phone: opt_str(params, "phone")?,
        designation: opt_str(params, "designation")?,
        department_id: opt_str(params, "departmentId")?,
    })
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let s = match parse_new_staff(&req.params).and_then(|s| {
        check_ref(conn, "departments", "departmentId", &s.department_id)?;
        Ok(s)
    }) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let staff_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO staff(id, role, first_name, last_name, email, phone, designation,
                           department_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            staff_id,
            s.role,
            s.first_name,
            s.last_name,
            s.email,
            s.phone,
            s.designation,
            s.department_id,
            db::now_rfc3339()
        ],
    ) {
        if is_unique_violation(&e) {
            return err(&req.id, "conflict", "email already in use", None);
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "staff" })),
        );
    }
    ok(&req.id, json!({ "staffId": staff_id, "role": s.role }))
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<(String, PatchBuilder), String> {
        let staff_id = req_str(&req.params, "staffId")?;
        let patch = patch_object(&req.params)?;
        reject_unknown(
            patch,
            &[
                "role",
                "firstName",
                "lastName",
                "email",
                "phone",
                "designation",
                "departmentId",
            ],
        )?;
        let mut b = PatchBuilder::default();
        if patch.get("role").is_some() {
            b.text("role", one_of("role", &req_str(patch, "role")?, ROLES)?);
        }
        if patch.get("firstName").is_some() {
            b.text("first_name", req_str(patch, "firstName")?);
        }
        if patch.get("lastName").is_some() {
            b.text("last_name", req_str(patch, "lastName")?);
        }
        if patch.get("email").is_some() {
            b.text("email", req_str(patch, "email")?.to_ascii_lowercase());
        }
        if patch.get("phone").is_some() {
            b.nullable_text("phone", opt_str(patch, "phone")?);
        }
        if patch.get("designation").is_some() {
            b.nullable_text("designation", opt_str(patch, "designation")?);
        }
        if patch.get("departmentId").is_some() {
            let d = opt_str(patch, "departmentId")?;
            check_ref(conn, "departments", "departmentId", &d)?;
            b.nullable_text("department_id", d);
        }
        if b.is_empty() {
            return Err("patch must include at least one field".into());
        }
        b.raw("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')");
        Ok((staff_id, b))
    })();
    let (staff_id, patch) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match patch.execute(conn, "staff", &staff_id) {
        Ok(0) => err(&req.id, "not_found", "staff member not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) if is_unique_violation(&e) => err(&req.id, "conflict", "email already in use", None),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "staff" })),
        ),
    }
}

fn handle_staff_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let staff_id = match req_str(&req.params, "staffId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match row_exists(conn, "staff", &staff_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "staff member not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // Subjects and announcements outlive the staff member; only the link is cleared.
    for (table, sql) in [
        ("subjects", "UPDATE subjects SET teacher_id = NULL WHERE teacher_id = ?"),
        (
            "announcements",
            "UPDATE announcements SET author_id = NULL WHERE author_id = ?",
        ),
        ("staff", "DELETE FROM staff WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&staff_id]) {
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
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(handle_staff_create(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        "staff.delete" => Some(handle_staff_delete(state, req)),
        _ => None,
    }
}
