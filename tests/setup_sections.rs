use serde_json::json;
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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .env_remove("CAMPUSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn sections_start_from_defaults_and_validate_patches() {
    let workspace = temp_dir("campus-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (i, r) = (&mut stdin, &mut reader);

    request_ok(i, r, "ws", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let all = request_ok(i, r, "g", "setup.get", json!({}));
    assert_eq!(all["grading"]["defaultCreditHours"].as_i64(), Some(3));
    assert_eq!(all["grading"]["defaultTotalMarks"].as_i64(), Some(100));
    assert_eq!(all["grading"]["strictMarks"], json!(true));
    assert_eq!(all["portal"]["currency"], json!("PKR"));
    assert_eq!(all["fees"]["lateFinePerDay"].as_i64(), Some(0));

    let upd = request_ok(
        i,
        r,
        "u1",
        "setup.update",
        json!({
            "section": "portal",
            "patch": { "institutionName": "  Riverside College ", "currency": "usd" }
        }),
    );
    assert_eq!(upd["portal"]["institutionName"], json!("Riverside College"));
    assert_eq!(upd["portal"]["currency"], json!("USD"));

    let upd = request_ok(
        i,
        r,
        "u2",
        "setup.update",
        json!({ "section": "grading", "patch": { "defaultCreditHours": 4, "defaultTotalMarks": 50 } }),
    );
    assert_eq!(upd["grading"]["defaultCreditHours"].as_i64(), Some(4));

    for (n, (section, patch)) in [
        ("grading", json!({ "defaultCreditHours": 0 })),
        ("grading", json!({ "strictMarks": "yes" })),
        ("grading", json!({ "passMark": 40 })),
        ("fees", json!({ "dueDays": 500 })),
        ("portal", json!({ "currency": "" })),
        ("library", json!({})),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(
            i,
            r,
            &format!("bad{}", n),
            "setup.update",
            json!({ "section": section, "patch": patch }),
        );
        assert_eq!(resp["error"]["code"], json!("bad_params"), "{} {}", section, n);
    }

    // New subjects and stateless grading pick up the saved defaults.
    let subject = request_ok(
        i,
        r,
        "sb",
        "subjects.create",
        json!({ "code": "HIS1", "title": "History" }),
    );
    assert_eq!(subject["creditHours"].as_i64(), Some(4));
    assert_eq!(subject["totalMarks"].as_f64(), Some(50.0));
    let details = request_ok(i, r, "d", "grades.details", json!({ "marks": 45 }));
    assert_eq!(details["percentage"].as_f64(), Some(90.0));
    assert_eq!(details["letterGrade"], json!("A+"));
    let cgpa = request_ok(
        i,
        r,
        "c",
        "grades.cgpa",
        json!({ "courses": [ { "gpaPoint": 3.0 } ] }),
    );
    assert_eq!(cgpa["totalCredits"].as_u64(), Some(4));

    let all = request_ok(i, r, "g2", "setup.get", json!({}));
    assert_eq!(all["grading"]["defaultCreditHours"].as_i64(), Some(4));
    assert_eq!(all["grading"]["strictMarks"], json!(true));
    assert_eq!(all["portal"]["currency"], json!("USD"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn setup_requires_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(resp["error"]["code"], json!("no_workspace"));
    drop(stdin);
    let _ = child.wait();
}
