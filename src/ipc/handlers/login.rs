use crate::db;
use crate::flow::{self, Action, Page};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, page_descriptor, param_str};
use crate::ipc::types::{AppState, Request};
use crate::mail;
use serde_json::json;

/// Eligibility checks plus the one-time passcode email. Mirrors the order
/// the study ran them in: roster first, then prior participation, then the
/// roster pairing, then feedback content.
fn handle_login_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.page != Page::Login {
        return err(
            &req.id,
            "wrong_page",
            format!("login.submit is not available on {}", session.page.name()),
            None,
        );
    }
    if session.passcode_sent {
        return err(
            &req.id,
            "passcode_already_sent",
            "a pass code was already emailed for this session",
            None,
        );
    }

    let email = param_str(&req.params, "email").unwrap_or("").trim().to_string();
    let student_id = param_str(&req.params, "studentId")
        .unwrap_or("")
        .trim()
        .to_string();
    if email.is_empty() || student_id.is_empty() {
        return err(&req.id, "bad_params", "missing email or studentId", None);
    }

    let roster_id = match db::roster_lookup(conn, &email) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(roster_id) = roster_id else {
        return err(
            &req.id,
            "invitation_not_found",
            "We could not find an invitation for this email address.",
            None,
        );
    };

    match db::has_participated(conn, &email, &student_id) {
        Ok(true) => {
            return err(
                &req.id,
                "already_participated",
                "You have already attended the survey. Thank you for participating.",
                None,
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if roster_id != student_id {
        return err(
            &req.id,
            "id_mismatch",
            "The student ID does not match our records for this email address.",
            None,
        );
    }

    match db::has_feedback_content(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "feedback_not_found",
                "No feedback is available for this student ID.",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let body = mail::passcode_body(&email, &student_id, &session.passcode);
    if let Err(e) = mail::queue(
        conn,
        &email,
        mail::PASSCODE_SUBJECT,
        &body,
        mail::MessageKind::Passcode,
        &now_stamp(),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let mut next = session;
    next.email = email;
    next.student_id = student_id;
    next.passcode_sent = true;
    let page = page_descriptor(state.db.as_ref(), &next);
    state.sessions.insert(session_id.to_string(), next);

    ok(&req.id, json!({ "passcodeSent": true, "page": page }))
}

fn handle_login_verify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.page != Page::Login {
        return err(
            &req.id,
            "wrong_page",
            format!("login.verify is not available on {}", session.page.name()),
            None,
        );
    }
    if !session.passcode_sent {
        return err(
            &req.id,
            "passcode_not_sent",
            "submit email and student ID first",
            None,
        );
    }

    let supplied = param_str(&req.params, "passcode").unwrap_or("").trim();
    if supplied.is_empty() {
        return err(&req.id, "bad_params", "missing passcode", None);
    }
    if supplied != session.passcode {
        // Unlimited retries; the session stays on the login page.
        return err(
            &req.id,
            "invalid_passcode",
            "Incorrect pass code! Please try again.",
            None,
        );
    }

    let ordinal = match db::record_login(conn, &session.email, &session.student_id, &now_stamp()) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    // Counterbalancing alternates with the login order: the first
    // participant reads the instructions before the survey, the second
    // after, and so on.
    let instructions_first = ordinal % 2 == 1;

    let next = match flow::apply(&session, &Action::PasscodeVerified { instructions_first }) {
        Ok(s) => s,
        Err(flow::FlowError::WrongPage(page)) => {
            return err(
                &req.id,
                "wrong_page",
                format!("cannot verify a passcode on {}", page.name()),
                None,
            )
        }
    };
    let page = page_descriptor(state.db.as_ref(), &next);
    state.sessions.insert(session_id.to_string(), next);

    ok(
        &req.id,
        json!({ "instructionsFirst": instructions_first, "page": page }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "login.submit" => Some(handle_login_submit(state, req)),
        "login.verify" => Some(handle_login_verify(state, req)),
        _ => None,
    }
}
