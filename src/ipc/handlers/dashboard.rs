use serde_json::json;

use crate::auth::RequestContext;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::records;
use crate::staging::clear_staging;

const RECENT_LIMIT: usize = 5;

fn dashboard_summary(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let counts = records::counts(conn).map_err(HandlerErr::query)?;
    let recent_attendance =
        records::recent_attendance(conn, RECENT_LIMIT).map_err(HandlerErr::query)?;
    let recent_students = records::first_students(conn, RECENT_LIMIT).map_err(HandlerErr::query)?;
    Ok(json!({
        "total_students": counts.students,
        "total_attendance_records": counts.attendance,
        "recent_attendance": recent_attendance,
        "recent_students": recent_students,
    }))
}

fn clear_all(state: &AppState, ctx: &mut RequestContext) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let removed = records::clear_all(conn).map_err(|e| {
        let message = format!("Error clearing data: {:#}", e);
        ctx.notice("error", message.clone());
        HandlerErr::new("db_query_failed", message)
    })?;

    let report = match state.upload_dir() {
        Some(dir) => clear_staging(&dir),
        None => Default::default(),
    };
    for e in &report.errors {
        ctx.notice("error", e.clone());
    }
    tracing::info!(
        students = removed.students,
        attendance = removed.attendance,
        files = report.deleted,
        "all data cleared"
    );

    let mut message =
        "All student and attendance data has been cleared from the system!".to_string();
    if report.deleted > 0 {
        message.push_str(&format!(" ({} uploaded files deleted)", report.deleted));
    }
    ctx.notice("success", message.clone());
    Ok(json!({
        "success": true,
        "message": message,
        "deletedFiles": report.deleted,
        "deletedStudents": removed.students,
        "deletedAttendance": removed.attendance,
    }))
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    match dashboard_summary(state) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_clear_all(state: &mut AppState, ctx: &mut RequestContext, req: &Request) -> serde_json::Value {
    match clear_all(state, ctx) {
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
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        "data.clearAll" => Some(handle_clear_all(state, ctx, req)),
        _ => None,
    }
}
