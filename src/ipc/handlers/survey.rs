use crate::db;
use crate::flow::{self, Action, Page};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, page_descriptor, param_str, PREFERRED_CHOICES};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_survey_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id) else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.page != Page::Survey {
        return err(
            &req.id,
            "wrong_page",
            format!("survey.view is not available on {}", session.page.name()),
            None,
        );
    }

    match db::feedback_texts(conn, &session.student_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return err(
                &req.id,
                "feedback_not_found",
                "No feedback is available for this student ID.",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    ok(
        &req.id,
        json!({ "page": page_descriptor(state.db.as_ref(), session) }),
    )
}

fn handle_survey_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = param_str(&req.params, "sessionId") else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(session) = state.sessions.get(session_id).cloned() else {
        return err(&req.id, "session_not_found", "unknown sessionId", None);
    };
    if session.reward_code.is_some() {
        return err(
            &req.id,
            "already_submitted",
            "this session has already claimed a reward",
            None,
        );
    }
    if session.page != Page::Survey {
        return err(
            &req.id,
            "wrong_page",
            format!("survey.submit is not available on {}", session.page.name()),
            None,
        );
    }

    let ratings: Vec<i64> = match req.params.get("ratings").and_then(|v| v.as_array()) {
        Some(items) => {
            let mut vals = Vec::with_capacity(items.len());
            for item in items {
                match item.as_i64() {
                    Some(v) if (0..=100).contains(&v) => vals.push(v),
                    _ => {
                        return err(
                            &req.id,
                            "bad_params",
                            "ratings must be integers between 0 and 100",
                            None,
                        )
                    }
                }
            }
            vals
        }
        None => return err(&req.id, "bad_params", "missing ratings", None),
    };
    if ratings.is_empty() || ratings.len() > db::MAX_RATINGS {
        return err(
            &req.id,
            "bad_params",
            format!("expected 1..={} ratings", db::MAX_RATINGS),
            None,
        );
    }

    let preferred = param_str(&req.params, "preferredVersion").unwrap_or("");
    if !PREFERRED_CHOICES.contains(&preferred) {
        return err(
            &req.id,
            "bad_params",
            format!("preferredVersion must be one of {:?}", PREFERRED_CHOICES),
            None,
        );
    }
    let comment = param_str(&req.params, "comment").unwrap_or("");

    let completed_at = now_stamp();
    let completed = db::CompletedSurvey {
        email: &session.email,
        student_id: &session.student_id,
        ratings: &ratings,
        preferred_version: preferred,
        comment,
        instructions_first: session.instructions_first,
        completed_at: &completed_at,
    };
    let reward_code = match db::claim_next_reward(conn, &completed) {
        Ok(Some(code)) => code,
        Ok(None) => {
            return err(
                &req.id,
                "no_rewards_left",
                "no unclaimed reward rows remain",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let next = match flow::apply(
        &session,
        &Action::SurveySubmitted {
            reward_code: reward_code.clone(),
        },
    ) {
        Ok(s) => s,
        Err(flow::FlowError::WrongPage(page)) => {
            return err(
                &req.id,
                "wrong_page",
                format!("cannot submit the survey on {}", page.name()),
                None,
            )
        }
    };
    let page = page_descriptor(state.db.as_ref(), &next);
    state.sessions.insert(session_id.to_string(), next);

    ok(&req.id, json!({ "rewardCode": reward_code, "page": page }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "survey.view" => Some(handle_survey_view(state, req)),
        "survey.submit" => Some(handle_survey_submit(state, req)),
        _ => None,
    }
}
