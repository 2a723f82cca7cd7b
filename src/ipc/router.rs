use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::study::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sessions::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::login::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::consent::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::survey::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::voucher::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
