use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, param_str};
use crate::ipc::types::{AppState, Request};
use crate::mail;
use serde_json::json;

fn handle_import_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(students) = req.params.get("students").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing students", None);
    };

    let mut pairs = Vec::with_capacity(students.len());
    for entry in students {
        let email = entry
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if email.is_empty() || student_id.is_empty() {
            return err(
                &req.id,
                "bad_params",
                "each student needs email and studentId",
                None,
            );
        }
        pairs.push((email, student_id));
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (email, student_id) in &pairs {
        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO roster(email, student_id) VALUES(?, ?)",
            (email, student_id),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "roster" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "imported": pairs.len() }))
}

fn handle_seed_rewards(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(codes) = req.params.get("codes").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing codes", None);
    };
    let mut cleaned = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.as_str().unwrap_or("").trim().to_string();
        if code.is_empty() {
            return err(&req.id, "bad_params", "reward codes must be non-empty", None);
        }
        cleaned.push(code);
    }

    let seeded_at = now_stamp();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for code in &cleaned {
        match tx.execute(
            "INSERT INTO responses(reward_code, seeded_at) VALUES(?, ?)",
            (code, &seeded_at),
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(f, _))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "duplicate_reward_code",
                    format!("reward code already seeded: {}", code),
                    Some(json!({ "code": code })),
                );
            }
            Err(e) => {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "responses" })),
                );
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "seeded": cleaned.len() }))
}

fn handle_import_feedback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = param_str(&req.params, "studentId").unwrap_or("").trim();
    if student_id.is_empty() {
        return err(&req.id, "bad_params", "missing studentId", None);
    }
    let Some(sections) = req.params.get("sections").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing sections", None);
    };
    if sections.is_empty() {
        return err(&req.id, "bad_params", "sections must not be empty", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (i, entry) in sections.iter().enumerate() {
        let section = entry.get("section").and_then(|v| v.as_str()).unwrap_or("");
        let original = entry.get("original").and_then(|v| v.as_str()).unwrap_or("");
        let alternative = entry
            .get("alternative")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if section.is_empty() {
            let _ = tx.rollback();
            return err(&req.id, "bad_params", "each section needs a label", None);
        }
        if let Err(e) = tx.execute(
            "INSERT OR REPLACE INTO feedback_sections(
                student_id, section, sort_order, original_text, alternative_text
             ) VALUES(?, ?, ?, ?, ?)",
            (student_id, section, i as i64, original, alternative),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "feedback_sections" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "imported": sections.len() }))
}

fn handle_outbox(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let recipient = param_str(&req.params, "recipient");
    match mail::queued(conn, recipient) {
        Ok(messages) => ok(
            &req.id,
            json!({ "count": messages.len(), "messages": messages }),
        ),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let roster: Result<i64, _> = conn.query_row("SELECT COUNT(*) FROM roster", [], |r| r.get(0));
    let logins: Result<i64, _> =
        conn.query_row("SELECT COUNT(*) FROM login_log", [], |r| r.get(0));
    let (roster, logins) = match (roster, logins) {
        (Ok(r), Ok(l)) => (r, l),
        (Err(e), _) | (_, Err(e)) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let claimed = match db::claimed_count(conn) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let unclaimed = match db::unclaimed_count(conn) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "rosterCount": roster,
            "loginCount": logins,
            "claimedCount": claimed,
            "unclaimedCount": unclaimed,
        }),
    )
}

fn handle_responses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT reward_code, email, student_id,
                rating_1, rating_2, rating_3, rating_4, rating_5,
                rating_6, rating_7, rating_8, rating_9, rating_10,
                preferred_version, comment, instructions_first,
                completed_at, student_id_check
         FROM responses
         WHERE email <> ''
         ORDER BY rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let mut ratings = Vec::new();
            for i in 3..13 {
                if let Some(v) = row.get::<_, Option<i64>>(i)? {
                    ratings.push(v);
                }
            }
            Ok(json!({
                "rewardCode": row.get::<_, String>(0)?,
                "email": row.get::<_, String>(1)?,
                "studentId": row.get::<_, String>(2)?,
                "ratings": ratings,
                "preferredVersion": row.get::<_, String>(13)?,
                "comment": row.get::<_, String>(14)?,
                "instructionsFirst": row.get::<_, Option<i64>>(15)?.map(|v| v != 0),
                "completedAt": row.get::<_, String>(16)?,
                "studentIdCheck": row.get::<_, String>(17)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(responses) => ok(&req.id, json!({ "responses": responses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "study.importRoster" => Some(handle_import_roster(state, req)),
        "study.seedRewards" => Some(handle_seed_rewards(state, req)),
        "study.importFeedback" => Some(handle_import_feedback(state, req)),
        "study.outbox" => Some(handle_outbox(state, req)),
        "study.summary" => Some(handle_summary(state, req)),
        "study.responses" => Some(handle_responses(state, req)),
        _ => None,
    }
}
