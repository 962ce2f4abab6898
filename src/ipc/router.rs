use chrono::Utc;

use super::handlers;
use super::types::{AppState, Request};
use crate::auth::{self, RequestContext};
use crate::ipc::error::{err, with_notices};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let mut ctx = match auth::authorize(
        &mut state.sessions,
        &req.method,
        req.session.as_deref(),
        state.db.is_some(),
        Utc::now(),
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code(), "request refused");
            return err(&req.id, e.code(), e.message(), None);
        }
    };
    let resp = dispatch(state, &mut ctx, &req);
    with_notices(resp, ctx.notices)
}

fn dispatch(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::search::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(state, ctx, req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, ctx, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
