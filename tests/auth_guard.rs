use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
    session: Option<&str>,
) -> Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(s) = session {
        payload["session"] = json!(s);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
    session: Option<&str>,
) -> Value {
    let value = request(stdin, reader, id, method, params, session);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

fn open_and_login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    let login = request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
        None,
    );
    login["session"].as_str().expect("session token").to_string()
}

fn error_code(resp: &Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn methods_follow_the_access_table() {
    let workspace = temp_dir("rosterd-auth");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}), None);
    assert!(health["version"].as_str().is_some());

    let early = request(&mut stdin, &mut reader, "2", "students.list", json!({}), None);
    assert_eq!(error_code(&early), Some("unauthorized"));

    let admin = open_and_login(&mut stdin, &mut reader, &workspace);
    let a = Some(admin.as_str());

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "admin", "password": "nope" }),
        None,
    );
    assert_eq!(error_code(&bad), Some("unauthorized"));
    assert_eq!(bad["error"]["message"], json!("Invalid username or password"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.register",
        json!({ "username": "clerk", "password": "pw1", "role": "officer" }),
        a,
    );
    assert_eq!(created["success"], json!(true));
    let dup = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.register",
        json!({ "username": "clerk", "password": "pw2" }),
        a,
    );
    assert_eq!(dup["success"], json!(false));
    assert_eq!(dup["message"], json!("Username already exists"));

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        json!({ "username": "clerk", "password": "pw1" }),
        None,
    );
    assert_eq!(login["role"], json!("officer"));
    let officer = login["session"].as_str().expect("session").to_string();
    let o = Some(officer.as_str());

    let me = request_ok(&mut stdin, &mut reader, "7", "auth.whoami", json!({}), o);
    assert_eq!(me["username"], json!("clerk"));

    let list = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}), o);
    assert_eq!(list["students"], json!([]));

    let denied = request(&mut stdin, &mut reader, "9", "data.clearAll", json!({}), o);
    assert_eq!(error_code(&denied), Some("forbidden"));
    let denied = request(
        &mut stdin,
        &mut reader,
        "10",
        "auth.register",
        json!({ "username": "x", "password": "y" }),
        o,
    );
    assert_eq!(error_code(&denied), Some("forbidden"));

    let bogus = request(&mut stdin, &mut reader, "11", "students.list", json!({}), Some("bogus"));
    assert_eq!(error_code(&bogus), Some("unauthorized"));

    let unknown = request(&mut stdin, &mut reader, "12", "grades.open", json!({}), o);
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let elsewhere = temp_dir("rosterd-auth-other");
    let switch = json!({ "path": elsewhere.to_string_lossy() });
    let anon = request(&mut stdin, &mut reader, "12a", "workspace.select", switch.clone(), None);
    assert_eq!(error_code(&anon), Some("unauthorized"));
    let clerk = request(&mut stdin, &mut reader, "12b", "workspace.select", switch.clone(), o);
    assert_eq!(error_code(&clerk), Some("forbidden"));
    let still = request_ok(&mut stdin, &mut reader, "12c", "auth.whoami", json!({}), o);
    assert_eq!(still["username"], json!("clerk"));

    let out = request_ok(&mut stdin, &mut reader, "13", "auth.logout", json!({}), o);
    assert_eq!(out["success"], json!(true));
    let after = request(&mut stdin, &mut reader, "14", "students.list", json!({}), o);
    assert_eq!(error_code(&after), Some("unauthorized"));

    // An admin may switch; every session, including the admin's, is dropped.
    request_ok(&mut stdin, &mut reader, "15", "workspace.select", switch, a);
    let stale = request(&mut stdin, &mut reader, "16", "auth.whoami", json!({}), a);
    assert_eq!(error_code(&stale), Some("unauthorized"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
    let _ = std::fs::remove_dir_all(&elsewhere);
}

#[test]
fn workspace_config_file_is_applied() {
    let workspace = temp_dir("rosterd-config");
    std::fs::write(
        workspace.join("rosterd.toml"),
        "upload_dir = \"incoming\"\ndefault_admin_password = \"letmein\"\n",
    )
    .expect("write config");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    let old = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
        None,
    );
    assert_eq!(error_code(&old), Some("unauthorized"));
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "admin", "password": "letmein" }),
        None,
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn malformed_request_lines_get_bad_json() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&value), Some("bad_json"));

    let resp = request(&mut stdin, &mut reader, "1", "students.list", json!({}), None);
    assert_eq!(error_code(&resp), Some("unauthorized"));

    drop(stdin);
    let _ = child.wait();
}
