use serde_json::json;

use crate::auth::Notice;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Attaches notices raised while handling a request to its envelope.
pub fn with_notices(mut resp: serde_json::Value, notices: Vec<Notice>) -> serde_json::Value {
    if notices.is_empty() {
        return resp;
    }
    resp["notices"] = json!(notices);
    resp
}
