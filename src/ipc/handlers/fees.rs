use crate::db;
use crate::fees::{self, FeeCharges, Voucher};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{fee_settings, FeeSettings};
use crate::ipc::helpers::{non_negative, opt_f64, opt_str, req_f64, req_str, require_db, row_exists};
use crate::ipc::types::{AppState, Request};
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

struct FeeRow {
    id: String,
    student_id: String,
    roll_no: String,
    semester: String,
    charges: FeeCharges,
    due_date: String,
    paid_on: Option<String>,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn voucher_for(row: &FeeRow, settings: &FeeSettings, today: NaiveDate) -> Voucher {
    // Dates are validated on write; an unreadable stored date counts as due today.
    let due = fees::parse_date(&row.due_date).unwrap_or(today);
    let paid = row.paid_on.as_deref().and_then(fees::parse_date);
    fees::compute_voucher(row.charges, due, paid, today, settings.late_fine_per_day)
}

fn load_fees(
    conn: &Connection,
    student_id: &Option<String>,
    fee_id: Option<&str>,
) -> rusqlite::Result<Vec<FeeRow>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.student_id, s.roll_no, f.semester, f.tuition, f.other_charges,
                f.discount, f.due_date, f.paid_on
         FROM fees f
         JOIN students s ON s.id = f.student_id
         WHERE (?1 IS NULL OR f.student_id = ?1)
           AND (?2 IS NULL OR f.id = ?2)
         ORDER BY f.due_date, s.roll_no",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![student_id, fee_id], |r| {
            Ok(FeeRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                roll_no: r.get(2)?,
                semester: r.get(3)?,
                charges: FeeCharges {
                    tuition: r.get(4)?,
                    other_charges: r.get(5)?,
                    discount: r.get(6)?,
                },
                due_date: r.get(7)?,
                paid_on: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn fee_json(row: &FeeRow, v: &Voucher) -> serde_json::Value {
    json!({
        "id": row.id,
        "studentId": row.student_id,
        "rollNo": row.roll_no,
        "semester": row.semester,
        "tuition": row.charges.tuition,
        "otherCharges": row.charges.other_charges,
        "discount": row.charges.discount,
        "dueDate": row.due_date,
        "paidOn": row.paid_on,
        "voucher": v
    })
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "fees": [] }));
    };
    let student_id = match opt_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let settings = match fee_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match load_fees(conn, &student_id, None) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let today = today();
    let out: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| fee_json(r, &voucher_for(r, &settings, today)))
        .collect();
    ok(&req.id, json!({ "fees": out }))
}

fn handle_fees_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let settings = match fee_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let p = &req.params;
    let parsed = (|| -> Result<_, String> {
        let student_id = req_str(p, "studentId")?;
        let semester = req_str(p, "semester")?;
        let charges = FeeCharges {
            tuition: non_negative("tuition", req_f64(p, "tuition")?)?,
            other_charges: non_negative("otherCharges", opt_f64(p, "otherCharges")?.unwrap_or(0.0))?,
            discount: non_negative("discount", opt_f64(p, "discount")?.unwrap_or(0.0))?,
        };
        let due = match opt_str(p, "dueDate")? {
            Some(raw) => fees::parse_date(&raw).ok_or("dueDate must be YYYY-MM-DD")?,
            None => today() + Duration::days(settings.due_days),
        };
        Ok((student_id, semester, charges, due))
    })();
    let (student_id, semester, charges, due) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match row_exists(conn, "students", &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let fee_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO fees(id, student_id, semester, tuition, other_charges, discount, due_date,
                          created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            fee_id,
            student_id,
            semester,
            charges.tuition,
            charges.other_charges,
            charges.discount,
            fees::format_date(due),
            db::now_rfc3339()
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "fees" })),
        );
    }
    ok(
        &req.id,
        json!({
            "feeId": fee_id,
            "dueDate": fees::format_date(due),
            "payable": charges.payable()
        }),
    )
}

fn handle_fees_mark_paid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let parsed = (|| -> Result<_, String> {
        let fee_id = req_str(&req.params, "feeId")?;
        let paid_on = match opt_str(&req.params, "paidOn")? {
            Some(raw) => fees::parse_date(&raw).ok_or("paidOn must be YYYY-MM-DD")?,
            None => today(),
        };
        Ok((fee_id, paid_on))
    })();
    let (fee_id, paid_on) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let rows = match load_fees(conn, &None, Some(&fee_id)) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(mut row) = rows.into_iter().next() else {
        return err(&req.id, "not_found", "fee not found", None);
    };
    if row.paid_on.is_some() {
        return err(
            &req.id,
            "conflict",
            "fee is already paid",
            Some(json!({ "paidOn": row.paid_on })),
        );
    }

    let paid_str = fees::format_date(paid_on);
    if let Err(e) = conn.execute(
        "UPDATE fees SET paid_on = ? WHERE id = ?",
        (&paid_str, &fee_id),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "fees" })),
        );
    }
    let settings = match fee_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    row.paid_on = Some(paid_str);
    let v = voucher_for(&row, &settings, today());
    ok(&req.id, fee_json(&row, &v))
}

fn handle_fees_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let fee_id = match req_str(&req.params, "feeId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match conn.execute("DELETE FROM fees WHERE id = ?", [&fee_id]) {
        Ok(0) => err(&req.id, "not_found", "fee not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "fees" })),
        ),
    }
}

fn handle_fees_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match opt_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let settings = match fee_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match load_fees(conn, &student_id, None) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let today = today();
    let vouchers: Vec<Voucher> = rows
        .iter()
        .map(|r| voucher_for(r, &settings, today))
        .collect();
    let summary = fees::summarize(&vouchers);
    ok(
        &req.id,
        json!({ "studentId": student_id, "summary": summary }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.create" => Some(handle_fees_create(state, req)),
        "fees.markPaid" => Some(handle_fees_mark_paid(state, req)),
        "fees.delete" => Some(handle_fees_delete(state, req)),
        "fees.summary" => Some(handle_fees_summary(state, req)),
        _ => None,
    }
}
