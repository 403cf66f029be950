use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value as Json;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

/// Early-return guard for handlers that need an open workspace.
pub fn require_db<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn req_str(params: &Json, key: &str) -> Result<String, String> {
    let Some(v) = params.get(key) else {
        return Err(format!("missing {}", key));
    };
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be a string", key))?
        .trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(s.to_string())
}

/// Absent, null and blank all read as `None`.
pub fn opt_str(params: &Json, key: &str) -> Result<Option<String>, String> {
    match params.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| format!("{} must be a string", key))?
                .trim();
            Ok(if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            })
        }
    }
}

pub fn req_f64(params: &Json, key: &str) -> Result<f64, String> {
    let v = params
        .get(key)
        .ok_or_else(|| format!("missing {}", key))?;
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !n.is_finite() {
        return Err(format!("{} must be finite", key));
    }
    Ok(n)
}

pub fn opt_f64(params: &Json, key: &str) -> Result<Option<f64>, String> {
    match params.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(_) => req_f64(params, key).map(Some),
    }
}

pub fn non_negative(key: &str, n: f64) -> Result<f64, String> {
    if n < 0.0 {
        return Err(format!("{} must be >= 0", key));
    }
    Ok(n)
}

pub fn i64_range(v: &Json, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

pub fn one_of(key: &str, raw: &str, allowed: &[&str]) -> Result<String, String> {
    let s = raw.trim().to_ascii_lowercase();
    if allowed.contains(&s.as_str()) {
        Ok(s)
    } else {
        Err(format!("{} must be one of: {}", key, allowed.join(", ")))
    }
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

/// Collects `col = ?` assignments for a partial UPDATE.
#[derive(Default)]
pub struct PatchBuilder {
    set_parts: Vec<String>,
    bind_values: Vec<Value>,
}

impl PatchBuilder {
    pub fn text(&mut self, column: &str, value: String) {
        self.set_parts.push(format!("{} = ?", column));
        self.bind_values.push(Value::Text(value));
    }

    pub fn nullable_text(&mut self, column: &str, value: Option<String>) {
        self.set_parts.push(format!("{} = ?", column));
        self.bind_values
            .push(value.map(Value::Text).unwrap_or(Value::Null));
    }

    pub fn integer(&mut self, column: &str, value: i64) {
        self.set_parts.push(format!("{} = ?", column));
        self.bind_values.push(Value::Integer(value));
    }

    pub fn real(&mut self, column: &str, value: f64) {
        self.set_parts.push(format!("{} = ?", column));
        self.bind_values.push(Value::Real(value));
    }

    pub fn raw(&mut self, assignment: &str) {
        self.set_parts.push(assignment.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.set_parts.is_empty()
    }

    /// Runs `UPDATE <table> SET ... WHERE id = ?` and returns the changed row count.
    pub fn execute(mut self, conn: &Connection, table: &str, id: &str) -> rusqlite::Result<usize> {
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            table,
            self.set_parts.join(", ")
        );
        self.bind_values.push(Value::Text(id.to_string()));
        conn.execute(&sql, params_from_iter(self.bind_values))
    }
}

pub fn patch_object(params: &Json) -> Result<&Json, String> {
    match params.get("patch") {
        Some(p) if p.is_object() => Ok(p),
        _ => Err("missing/invalid patch".to_string()),
    }
}

pub fn reject_unknown(patch: &Json, allowed: &[&str]) -> Result<(), String> {
    let Some(obj) = patch.as_object() else {
        return Ok(());
    };
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(k) => Err(format!("unknown field: {}", k)),
        None => Ok(()),
    }
}

/// Validates an optional foreign key supplied by the client.
pub fn check_ref(
    conn: &Connection,
    table: &str,
    key: &str,
    id: &Option<String>,
) -> Result<(), String> {
    let Some(id) = id else {
        return Ok(());
    };
    match row_exists(conn, table, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(format!("{} does not exist", key)),
        Err(e) => Err(e.to_string()),
    }
}
