use base64::Engine;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::auth::RequestContext;
use crate::ingest::{preview_bytes, PreviewOptions};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schema::EntityKind;
use crate::staging::{stage_upload, StageError};
use crate::upsert::{confirm, records_from_json};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        HandlerErr::new("db_query_failed", format!("{:#}", e))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StageError> for HandlerErr {
    fn from(e: StageError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Raw upload taken from `inPath` or `contentBase64`.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

fn read_upload(params: &serde_json::Value, max_bytes: usize) -> Result<Upload, HandlerErr> {
    let in_path = get_optional_str(params, "inPath").map(PathBuf::from);
    let file_name = get_optional_str(params, "fileName").or_else(|| {
        in_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().to_string())
    });
    let Some(file_name) = file_name else {
        return Err(StageError::NoFile.into());
    };

    if let Some(path) = in_path {
        let meta = std::fs::metadata(&path).map_err(|e| {
            HandlerErr::new("stage_failed", format!("{}: {}", path.display(), e))
        })?;
        if meta.len() > max_bytes as u64 {
            return Err(StageError::TooLarge {
                size: meta.len() as usize,
                limit: max_bytes,
            }
            .into());
        }
        let bytes = std::fs::read(&path).map_err(|e| {
            HandlerErr::new("stage_failed", format!("{}: {}", path.display(), e))
        })?;
        return Ok(Upload { file_name, bytes });
    }

    let Some(encoded) = get_optional_str(params, "contentBase64") else {
        return Err(StageError::NoFile.into());
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| HandlerErr::new("bad_params", format!("contentBase64: {}", e)))?;
    Ok(Upload { file_name, bytes })
}

fn preview_upload_inner(
    state: &AppState,
    ctx: &mut RequestContext,
    kind: EntityKind,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let Some(dir) = state.upload_dir() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let cfg = &state.config;
    let upload = read_upload(params, cfg.max_upload_bytes)?;
    let staged = stage_upload(
        &dir,
        &upload.file_name,
        &upload.bytes,
        &cfg.allowed_extensions,
        cfg.max_upload_bytes,
    )?;

    let mut opts = PreviewOptions::new(Utc::now().date_naive());
    if kind == EntityKind::Attendance {
        opts.period = get_optional_str(params, "period");
    }
    let preview = preview_bytes(&upload.bytes, kind, &opts);
    tracing::info!(
        kind = kind.as_str(),
        file = %upload.file_name,
        success = preview.success,
        records = preview.data.len(),
        errors = preview.errors.len(),
        "upload previewed"
    );

    if preview.success {
        ctx.notice("success", preview.message.clone());
        if !preview.errors.is_empty() {
            ctx.notice(
                "warning",
                format!("{} rows need attention", preview.errors.len()),
            );
        }
    } else {
        ctx.notice("error", preview.message.clone());
    }

    let mut result = json!(preview);
    result["totalRecords"] = json!(preview.data.len());
    result["fileName"] = json!(upload.file_name);
    result["stagedPath"] = json!(staged.to_string_lossy());
    Ok(result)
}

pub fn preview_upload(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
    kind: EntityKind,
) -> serde_json::Value {
    match preview_upload_inner(state, ctx, kind, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn confirm_upload(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
    kind: EntityKind,
) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let raw = req.params.get("records").cloned().unwrap_or(json!([]));
    let records = match records_from_json(kind.schema(), &raw) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let outcome = confirm(conn, kind, &records);
    ctx.notice(
        if outcome.success { "success" } else { "error" },
        outcome.message.clone(),
    );
    ok(&req.id, json!(outcome))
}
