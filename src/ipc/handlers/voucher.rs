use crate::flow::Page;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, page_descriptor, param_str};
use crate::ipc::types::{AppState, Request};
use crate::mail;
use serde_json::json;

/// Renders the terminal reward page. The thank-you email goes out on the
/// first render only; later renders of the same session re-show the code
/// without queuing another message.
fn handle_voucher_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.page != Page::Voucher {
        return err(
            &req.id,
            "wrong_page",
            format!("voucher.view is not available on {}", session.page.name()),
            None,
        );
    }
    let Some(reward_code) = session.reward_code.clone() else {
        // The reducer only routes here with a claimed reward.
        return err(&req.id, "wrong_page", "no reward on this session", None);
    };

    let mut next = session;
    if !next.reward_email_sent {
        let body = mail::reward_body(&reward_code);
        if let Err(e) = mail::queue(
            conn,
            &next.email,
            mail::REWARD_SUBJECT,
            &body,
            mail::MessageKind::Reward,
            &now_stamp(),
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        next.reward_email_sent = true;
    }

    let page = page_descriptor(state.db.as_ref(), &next);
    let email_sent = next.reward_email_sent;
    state.sessions.insert(session_id.to_string(), next);

    ok(
        &req.id,
        json!({ "rewardCode": reward_code, "emailSent": email_sent, "page": page }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "voucher.view" => Some(handle_voucher_view(state, req)),
        _ => None,
    }
}
