use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

use crate::auth::RequestContext;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, AttendanceRow};
use crate::stats::{self, Band};

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn query<T>(req: &Request, res: anyhow::Result<T>) -> Result<T, serde_json::Value> {
    res.map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))
}

fn analytics_overview(
    state: &AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let rows = query(req, records::list_attendance(conn))?;
    let current_month = Utc::now().format("%B").to_string();
    let current_month_exists = rows.iter().any(|r| r.month == current_month);
    if rows.is_empty() {
        ctx.notice("info", "No attendance data available for analysis");
        return Ok(json!({
            "success": false,
            "message": "No attendance data available for analysis",
            "currentMonth": current_month,
            "currentMonthExists": false,
        }));
    }

    let overall = stats::summarize(&rows);
    let monthly = stats::monthly(&rows);
    let chart = stats::chart(&overall, &monthly);
    Ok(json!({
        "success": true,
        "overall": overall,
        "monthly": monthly,
        "months": stats::months(&rows),
        "defaulters": stats::defaulters(&rows),
        "chart": chart,
        "recentActivity": stats::recent_activity(&rows),
        "currentMonth": current_month,
        "currentMonthExists": current_month_exists,
    }))
}

fn month_defaulter(row: &AttendanceRow) -> serde_json::Value {
    json!({
        "ticket_no": row.ticket_no,
        "name": row.student_name,
        "attendance": row,
    })
}

fn analytics_month(
    state: &AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let month = required_str(req, "month")?;
    let conn = db_conn(state, req)?;
    let rows = query(req, records::attendance_for_month(conn, &month))?;
    if rows.is_empty() {
        let message = format!("No attendance data available for {}", month);
        ctx.notice("info", message.clone());
        return Ok(json!({ "success": false, "message": message }));
    }
    let mut summary = json!(stats::summarize(&rows));
    summary["month"] = json!(month);
    let defaulters = rows
        .iter()
        .filter(|r| Band::for_percentage(r.attendance_percentage) == Band::Defaulter)
        .map(month_defaulter)
        .collect::<Vec<_>>();
    Ok(json!({
        "success": true,
        "monthlyStats": summary,
        "defaulters": defaulters,
    }))
}

fn analytics_stats(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let rows = query(req, records::list_attendance(conn))?;
    if rows.is_empty() {
        return Ok(json!({ "success": false, "message": "No attendance data available" }));
    }
    Ok(json!({
        "success": true,
        "stats": {
            "overall": stats::summarize(&rows),
            "monthly": stats::monthly(&rows),
            "defaulter_by_month": stats::defaulter_by_month(&rows),
            "months": stats::months(&rows),
        }
    }))
}

fn analytics_student(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let ticket_no = required_str(req, "ticketNo")?;
    let conn = db_conn(state, req)?;
    let Some(student) = query(req, records::get_student(conn, &ticket_no))? else {
        return Err(err(&req.id, "not_found", "Student not found", None));
    };
    let rows = query(req, records::attendance_for_student(conn, &ticket_no))?;
    Ok(json!({
        "student": { "ticket_no": student.ticket_no, "name": student.name },
        "summary": stats::student_summary(&rows, &ticket_no),
        "attendance_records": rows,
    }))
}

fn respond(req: &Request, res: Result<serde_json::Value, serde_json::Value>) -> serde_json::Value {
    match res {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &mut RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "analytics.overview" => analytics_overview(state, ctx, req),
        "analytics.month" => analytics_month(state, ctx, req),
        "analytics.stats" => analytics_stats(state, req),
        "analytics.student" => analytics_student(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
