use base64::Engine;
use rust_xlsxwriter::Workbook;
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

fn xlsx(rows: &[Vec<Value>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            match cell {
                Value::String(s) => {
                    sheet.write_string(r as u32, c as u16, s).expect("write string");
                }
                Value::Number(n) => {
                    sheet
                        .write_number(r as u32, c as u16, n.as_f64().expect("number"))
                        .expect("write number");
                }
                _ => {}
            }
        }
    }
    workbook.save_to_buffer().expect("save workbook")
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[test]
fn clear_all_empties_tables_and_staging() {
    let workspace = temp_dir("rosterd-clear");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let session = open_and_login(&mut stdin, &mut reader, &workspace);
    let s = Some(session.as_str());

    let mut students = vec![vec![json!("Ticket No"), json!("PNO"), json!("Name")]];
    for i in 1..=5 {
        students.push(vec![
            json!(format!("T{}", i)),
            json!(format!("P{}", i)),
            json!(format!("Student {}", i)),
        ]);
    }
    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.upload.preview",
        json!({ "fileName": "students.xlsx", "contentBase64": b64(&xlsx(&students)) }),
        s,
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.upload.confirm",
        json!({ "records": preview["data"] }),
        s,
    );

    let mut attendance = vec![vec![
        json!("Ticket No"),
        json!("Month"),
        json!("Total Days"),
        json!("Present Days"),
        json!("Attendance %"),
    ]];
    for t in 1..=4 {
        for month in ["January", "February", "March"] {
            attendance.push(vec![
                json!(format!("T{}", t)),
                json!(month),
                json!(20),
                json!(15 + t),
                Value::Null,
            ]);
        }
    }
    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.upload.preview",
        json!({ "fileName": "attendance.xlsx", "contentBase64": b64(&xlsx(&attendance)) }),
        s,
    );
    assert_eq!(preview["totalRecords"], json!(12));
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.upload.confirm",
        json!({ "records": preview["data"] }),
        s,
    );

    let before = request_ok(&mut stdin, &mut reader, "5", "dashboard.summary", json!({}), s);
    assert_eq!(before["total_students"], json!(5));
    assert_eq!(before["total_attendance_records"], json!(12));
    assert_eq!(before["recent_attendance"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(before["recent_students"].as_array().map(|a| a.len()), Some(5));

    let uploads = workspace.join("uploads");
    assert_eq!(std::fs::read_dir(&uploads).expect("uploads").count(), 2);

    let resp = request(&mut stdin, &mut reader, "6", "data.clearAll", json!({}), s);
    assert_eq!(resp["ok"], json!(true), "{}", resp);
    assert_eq!(
        resp["result"]["message"],
        json!("All student and attendance data has been cleared from the system! (2 uploaded files deleted)")
    );
    assert_eq!(resp["result"]["deletedFiles"], json!(2));
    let notices = resp["notices"].as_array().expect("notices");
    assert!(notices.iter().any(|n| n["level"] == json!("success")));

    let after = request_ok(&mut stdin, &mut reader, "7", "dashboard.summary", json!({}), s);
    assert_eq!(after["total_students"], json!(0));
    assert_eq!(after["total_attendance_records"], json!(0));
    assert_eq!(std::fs::read_dir(&uploads).expect("uploads").count(), 0);

    let again = request_ok(&mut stdin, &mut reader, "8", "data.clearAll", json!({}), s);
    assert_eq!(
        again["message"],
        json!("All student and attendance data has been cleared from the system!")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
