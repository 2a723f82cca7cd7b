use crate::flow::{self, Action, Page};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{page_descriptor, param_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const STATEMENT_COUNT: usize = 6;

/// Server-side twin of the consent page gate: granting needs every
/// statement ticked, declining is only offered while at least one is not.
/// Decliners reach a terminal page and nothing is recorded for them.
fn handle_consent_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.page != Page::Consent {
        return err(
            &req.id,
            "wrong_page",
            format!("consent.submit is not available on {}", session.page.name()),
            None,
        );
    }

    let agreements: Vec<bool> = match req.params.get("agreements").and_then(|v| v.as_array()) {
        Some(items) => {
            let mut flags = Vec::with_capacity(items.len());
            for item in items {
                match item.as_bool() {
                    Some(b) => flags.push(b),
                    None => return err(&req.id, "bad_params", "agreements must be booleans", None),
                }
            }
            flags
        }
        None => return err(&req.id, "bad_params", "missing agreements", None),
    };
    if agreements.len() != STATEMENT_COUNT {
        return err(
            &req.id,
            "bad_params",
            format!("expected {} agreement flags", STATEMENT_COUNT),
            None,
        );
    }
    let Some(consent) = req.params.get("consent").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing consent", None);
    };

    let all_ticked = agreements.iter().all(|b| *b);
    let action = if consent {
        if !all_ticked {
            return err(
                &req.id,
                "consent_incomplete",
                "all six statements must be ticked to proceed",
                None,
            );
        }
        Action::ConsentGranted
    } else {
        if all_ticked {
            return err(
                &req.id,
                "decline_unavailable",
                "declining is only available while a statement is unticked",
                None,
            );
        }
        Action::ConsentDeclined
    };

    let next = match flow::apply(&session, &action) {
        Ok(s) => s,
        Err(flow::FlowError::WrongPage(page)) => {
            return err(
                &req.id,
                "wrong_page",
                format!("cannot submit consent on {}", page.name()),
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
        "consent.submit" => Some(handle_consent_submit(state, req)),
        _ => None,
    }
}
