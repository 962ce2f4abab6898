use serde_json::json;

use crate::auth::RequestContext;
use crate::ipc::error::ok;
use crate::ipc::helpers::{confirm_upload, db_conn, get_required_str, preview_upload, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::records;
use crate::schema::EntityKind;

fn students_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let students = records::list_students(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ticket_no = get_required_str(params, "ticketNo")?;
    let conn = db_conn(state)?;
    let Some(student) = records::get_student(conn, &ticket_no).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::new(
            "not_found",
            format!("No student found with Ticket Number: {}", ticket_no),
        ));
    };
    Ok(json!({ "success": true, "student": student }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match students_list(state) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match students_get(state, &req.params) {
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
        "students.upload.preview" => Some(preview_upload(state, ctx, req, EntityKind::Student)),
        "students.upload.confirm" => Some(confirm_upload(state, ctx, req, EntityKind::Student)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        _ => None,
    }
}
