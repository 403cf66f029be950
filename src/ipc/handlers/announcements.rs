use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{check_ref, one_of, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

const AUDIENCES: &[&str] = &["all", "students", "staff"];

fn handle_announcements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "announcements": [] }));
    };
    // A student or staff view also sees announcements addressed to everyone.
    let audience = match opt_str(&req.params, "audience")
        .and_then(|a| a.map(|a| one_of("audience", &a, AUDIENCES)).transpose())
    {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT a.id, a.title, a.body, a.audience, a.author_id, a.created_at,
                t.first_name, t.last_name
         FROM announcements a
         LEFT JOIN staff t ON t.id = a.author_id
         WHERE (?1 IS NULL OR ?1 = 'all' OR a.audience = ?1 OR a.audience = 'all')
         ORDER BY a.created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&audience], |row| {
            let first: Option<String> = row.get(6)?;
            let last: Option<String> = row.get(7)?;
            let author_name = match (first, last) {
                (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
                _ => None,
            };
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "title": row.get::<_, String>(1)?,
                "body": row.get::<_, String>(2)?,
                "audience": row.get::<_, String>(3)?,
                "authorId": row.get::<_, Option<String>>(4)?,
                "authorName": author_name,
                "createdAt": row.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(list) => ok(&req.id, json!({ "announcements": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let p = &req.params;
    let parsed = (|| -> Result<_, String> {
        let title = req_str(p, "title")?;
        if title.len() > 200 {
            return Err("title length must be <= 200".into());
        }
        let body = req_str(p, "body")?;
        let audience = match opt_str(p, "audience")? {
            Some(a) => one_of("audience", &a, AUDIENCES)?,
            None => "all".to_string(),
        };
        let author_id = opt_str(p, "authorId")?;
        check_ref(conn, "staff", "authorId", &author_id)?;
        Ok((title, body, audience, author_id))
    })();
    let (title, body, audience, author_id) = match parsed {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let announcement_id = Uuid::new_v4().to_string();
    let created_at = db::now_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO announcements(id, title, body, audience, author_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![announcement_id, title, body, audience, author_id, created_at],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        );
    }
    ok(
        &req.id,
        json!({
            "announcementId": announcement_id,
            "audience": audience,
            "createdAt": created_at
        }),
    )
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let announcement_id = match req_str(&req.params, "announcementId") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match conn.execute(
        "DELETE FROM announcements WHERE id = ?",
        [&announcement_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "announcement not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.delete" => Some(handle_announcements_delete(state, req)),
        _ => None,
    }
}
