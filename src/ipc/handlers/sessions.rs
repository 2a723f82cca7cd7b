use crate::flow::{self, Action, Page, Session};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{page_descriptor, param_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_session_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }

    let session_id = Uuid::new_v4().to_string();
    // 8 hex chars, same shape the participants used to receive by email.
    let passcode = Uuid::new_v4().simple().to_string()[..8].to_string();
    let session = Session::new(passcode);

    let page = page_descriptor(state.db.as_ref(), &session);
    state.sessions.insert(session_id.clone(), session);

    ok(&req.id, json!({ "sessionId": session_id, "page": page }))
}

fn handle_session_page(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id) else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };

    ok(
        &req.id,
        json!({ "page": page_descriptor(state.db.as_ref(), session) }),
    )
}

/// "Proceed" on the information page and "Okay, I understand" on the
/// conditional instructions page both advance without any payload.
fn handle_flow_advance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };

    let action = match session.page {
        Page::Instructions => Action::Proceed,
        Page::ConditionalInstructions => Action::Acknowledge,
        other => {
            return err(
                &req.id,
                "wrong_page",
                format!("nothing to advance on {}", other.name()),
                None,
            )
        }
    };

    let next = match flow::apply(&session, &action) {
        Ok(s) => s,
        Err(flow::FlowError::WrongPage(page)) => {
            return err(
                &req.id,
                "wrong_page",
                format!("cannot advance from {}", page.name()),
                None,
            )
        }
    };
    let page = page_descriptor(state.db.as_ref(), &next);
    state.sessions.insert(session_id.to_string(), next);

    ok(&req.id, json!({ "page": page }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.start" => Some(handle_session_start(state, req)),
        "session.page" => Some(handle_session_page(state, req)),
        "flow.advance" => Some(handle_flow_advance(state, req)),
        _ => None,
    }
}
