use crate::db;
use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{i64_range, require_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    Grading,
    Portal,
    Fees,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Grading, Self::Portal, Self::Fees];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "portal" => Some(Self::Portal),
            "fees" => Some(Self::Fees),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Portal => "portal",
            Self::Fees => "fees",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Portal => "setup.portal",
            Self::Fees => "setup.fees",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "defaultCreditHours": grade::DEFAULT_CREDIT_HOURS,
            "defaultTotalMarks": 100,
            "strictMarks": true
        }),
        SetupSection::Portal => json!({
            "institutionName": "",
            "currentSemester": "",
            "currency": "PKR"
        }),
        SetupSection::Fees => json!({
            "lateFinePerDay": 0,
            "dueDays": 30
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "defaultCreditHours" => {
                    obj.insert(k.clone(), Value::from(i64_range(v, k, 1, 12)?));
                }
                "defaultTotalMarks" => {
                    obj.insert(k.clone(), Value::from(i64_range(v, k, 1, 1000)?));
                }
                "strictMarks" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Portal => match k.as_str() {
                "institutionName" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "currentSemester" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 32)?));
                }
                "currency" => {
                    let s = parse_string_max(v, k, 8)?;
                    if s.is_empty() {
                        return Err("currency must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s.to_ascii_uppercase()));
                }
                _ => return Err(format!("unknown portal field: {}", k)),
            },
            SetupSection::Fees => match k.as_str() {
                "lateFinePerDay" => {
                    obj.insert(k.clone(), Value::from(i64_range(v, k, 0, 100_000)?));
                }
                "dueDays" => {
                    obj.insert(k.clone(), Value::from(i64_range(v, k, 1, 120)?));
                }
                _ => return Err(format!("unknown fees field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Copy)]
pub struct GradingSettings {
    pub default_credit_hours: u32,
    pub default_total_marks: f64,
    pub strict_marks: bool,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            default_credit_hours: grade::DEFAULT_CREDIT_HOURS,
            default_total_marks: 100.0,
            strict_marks: true,
        }
    }
}

/// Falls back to defaults when no workspace is open.
pub fn grading_settings(conn: Option<&Connection>) -> anyhow::Result<GradingSettings> {
    let mut out = GradingSettings::default();
    let Some(conn) = conn else {
        return Ok(out);
    };
    let v = load_section(conn, SetupSection::Grading)?;
    if let Some(n) = v.get("defaultCreditHours").and_then(|x| x.as_u64()) {
        out.default_credit_hours = u32::try_from(n).unwrap_or(grade::DEFAULT_CREDIT_HOURS);
    }
    if let Some(n) = v.get("defaultTotalMarks").and_then(|x| x.as_f64()) {
        out.default_total_marks = n;
    }
    if let Some(b) = v.get("strictMarks").and_then(|x| x.as_bool()) {
        out.strict_marks = b;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
pub struct FeeSettings {
    pub late_fine_per_day: f64,
    pub due_days: i64,
}

pub fn fee_settings(conn: &Connection) -> anyhow::Result<FeeSettings> {
    let v = load_section(conn, SetupSection::Fees)?;
    Ok(FeeSettings {
        late_fine_per_day: v.get("lateFinePerDay").and_then(|x| x.as_f64()).unwrap_or(0.0),
        due_days: v.get("dueDays").and_then(|x| x.as_i64()).unwrap_or(30),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let mut out = Map::new();
    out.insert(section.name().to_string(), current);
    ok(&req.id, Value::Object(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
