use crate::auth::RequestContext;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::records;
use serde_json::json;

fn handle_search_ticket(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_no = req
        .params
        .get("ticketNo")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("");
    if ticket_no.is_empty() {
        ctx.notice("error", "Please enter a Ticket Number");
        return err(&req.id, "bad_params", "missing ticketNo", None);
    }

    let student = match records::get_student(conn, ticket_no) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let Some(student) = student else {
        ctx.notice(
            "error",
            format!("No student found with Ticket Number: {}", ticket_no),
        );
        return err(
            &req.id,
            "not_found",
            "Student not found",
            Some(json!({ "ticketNo": ticket_no })),
        );
    };
    let rows = match records::attendance_for_student(conn, ticket_no) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    ok(
        &req.id,
        json!({ "success": true, "student": student.search_profile(&rows) }),
    )
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "search.ticket" => Some(handle_search_ticket(state, ctx, req)),
        _ => None,
    }
}
