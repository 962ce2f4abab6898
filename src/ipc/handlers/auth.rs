use chrono::Utc;
use serde_json::json;

use crate::auth::{authenticate, create_user, RequestContext, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn login(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(&req.params, "username")?;
    let password = get_required_str(&req.params, "password")?;
    let user = authenticate(db_conn(state)?, &username, &password).map_err(HandlerErr::query)?;
    let Some(user) = user else {
        tracing::warn!(%username, "login failed");
        return Err(HandlerErr::new("unauthorized", "Invalid username or password"));
    };
    tracing::info!(%username, role = user.role.as_str(), "login");
    let (token, session) = state.sessions.open(user, Utc::now());
    ctx.notice("success", "Login successful!");
    Ok(json!({
        "session": token,
        "username": session.user.username,
        "role": session.user.role,
        "expiresAt": session.expires_at.to_rfc3339(),
    }))
}

fn handle_login(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    match login(state, ctx, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    let closed = ctx
        .session
        .as_deref()
        .map(|t| state.sessions.close(t))
        .unwrap_or(false);
    ctx.notice("info", "You have been logged out.");
    ok(&req.id, json!({ "success": closed }))
}

fn handle_whoami(ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    let Some(user) = ctx.user.as_ref() else {
        return err(&req.id, "unauthorized", "login required", None);
    };
    ok(
        &req.id,
        json!({ "username": user.username, "role": user.role }),
    )
}

fn register(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(&req.params, "username")?;
    let password = get_required_str(&req.params, "password")?;
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        None => Role::Officer,
        Some(s) => Role::parse(s)
            .ok_or_else(|| HandlerErr::new("bad_params", "role must be admin or officer"))?,
    };
    let conn = db_conn(state)?;
    let created = create_user(conn, &username, &password, role).map_err(HandlerErr::query)?;
    let (success, message) = match created {
        Some(_) => (true, "User registered successfully!"),
        None => (false, "Username already exists"),
    };
    ctx.notice(if success { "success" } else { "error" }, message);
    Ok(json!({ "success": success, "message": message }))
}

fn handle_register(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    match register(state, ctx, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, ctx, req)),
        "auth.logout" => Some(handle_logout(state, ctx, req)),
        "auth.whoami" => Some(handle_whoami(ctx, req)),
        "auth.register" => Some(handle_register(state, ctx, req)),
        _ => None,
    }
}
