use serde_json::json;

use crate::auth::RequestContext;
use crate::ipc::error::ok;
use crate::ipc::helpers::{confirm_upload, db_conn, get_required_str, preview_upload, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::records;
use crate::schema::EntityKind;

fn attendance_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let attendance = records::list_attendance(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "attendance": attendance }))
}

fn attendance_for_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let ticket_no = get_required_str(params, "ticketNo")?;
    let conn = db_conn(state)?;
    let Some(student) = records::get_student(conn, &ticket_no).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::new("not_found", "Student not found"));
    };
    let rows = records::attendance_for_student(conn, &ticket_no).map_err(HandlerErr::query)?;
    Ok(json!({ "student": student, "attendance_records": rows }))
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_list(state) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_attendance_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_for_student(state, &req.params) {
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
        "attendance.upload.preview" => {
            Some(preview_upload(state, ctx, req, EntityKind::Attendance))
        }
        "attendance.upload.confirm" => {
            Some(confirm_upload(state, ctx, req, EntityKind::Attendance))
        }
        "attendance.list" => Some(handle_attendance_list(state, req)),
        "attendance.forStudent" => Some(handle_attendance_for_student(state, req)),
        _ => None,
    }
}
