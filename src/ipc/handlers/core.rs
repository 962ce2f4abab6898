use crate::auth::{ensure_default_admin, RequestContext};
use crate::config::AppConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let config = match AppConfig::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => return err(&req.id, "bad_config", format!("{e:#}"), None),
    };
    let seeded = match ensure_default_admin(&conn, &config) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:#}"), None),
    };
    if seeded {
        ctx.notice(
            "info",
            format!(
                "Default admin user created: username='{}'",
                config.default_admin_username
            ),
        );
    }

    tracing::info!(workspace = %path.display(), "workspace opened");
    state.sessions.clear();
    state.sessions.set_ttl(config.session_ttl_secs);
    state.config = config;
    state.db = Some(conn);
    state.workspace = Some(path.clone());
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, ctx, req)),
        _ => None,
    }
}
