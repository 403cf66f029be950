use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn grade_details_without_workspace_use_default_total() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let r = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.details",
        json!({ "marks": 90 }),
    );
    assert_eq!(r["percentage"].as_f64(), Some(90.0));
    assert_eq!(r["letterGrade"], json!("A+"));
    assert_eq!(r["gpaPoint"].as_f64(), Some(4.0));
    assert_eq!(r["passing"], json!(true));

    let r = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.details",
        json!({ "marks": 42, "totalMarks": 50 }),
    );
    assert_eq!(r["percentage"].as_f64(), Some(84.0));
    assert_eq!(r["letterGrade"], json!("A-"));
    assert_eq!(r["gpaPoint"].as_f64(), Some(3.7));

    // Zero denominator and negative marks degrade to F instead of failing.
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.details",
        json!({ "marks": 12, "totalMarks": 0 }),
    );
    assert_eq!(r["percentage"].as_f64(), Some(0.0));
    assert_eq!(r["letterGrade"], json!("F"));
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.details",
        json!({ "marks": -5, "totalMarks": 100 }),
    );
    assert_eq!(r["letterGrade"], json!("F"));
    assert_eq!(r["passing"], json!(false));

    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.details",
        json!({ "marks": "ninety" }),
    );
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn lookup_boundaries_and_scale() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, (pct, letter)) in [(90.0, "A+"), (89.99, "A"), (40.0, "D"), (39.99, "F"), (100.5, "F")]
        .into_iter()
        .enumerate()
    {
        let r = request_ok(
            &mut stdin,
            &mut reader,
            &format!("l{}", i),
            "grades.lookup",
            json!({ "percentage": pct }),
        );
        assert_eq!(r["letterGrade"], json!(letter), "letter at {}", pct);
    }

    let scale = request_ok(&mut stdin, &mut reader, "s", "grades.scale", json!({}));
    let bands = scale["scale"].as_array().cloned().unwrap_or_default();
    assert_eq!(bands.len(), 12);
    assert_eq!(bands[0]["letter"], json!("A+"));
    assert_eq!(bands[0]["minPercentage"].as_f64(), Some(90.0));
    assert_eq!(bands[11]["letter"], json!("F"));
    assert_eq!(bands[11]["gpaPoint"].as_f64(), Some(0.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn cgpa_semester_gpa_and_classification() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.cgpa",
        json!({ "courses": [] }),
    );
    assert_eq!(empty["cgpa"].as_f64(), Some(0.0));
    assert_eq!(empty["totalCredits"].as_u64(), Some(0));
    assert_eq!(empty["totalQualityPoints"].as_f64(), Some(0.0));
    assert_eq!(empty["classification"], json!("Fail"));

    let r = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.cgpa",
        json!({ "courses": [
            { "gpaPoint": 4.0, "creditHours": 3 },
            { "gpaPoint": 3.0, "creditHours": 3 }
        ] }),
    );
    assert_eq!(r["cgpa"].as_f64(), Some(3.5));
    assert_eq!(r["totalCredits"].as_u64(), Some(6));
    assert_eq!(r["classification"], json!("First Class"));

    // creditHours omitted -> 3
    let r = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.semesterGpa",
        json!({ "courses": [ { "gpaPoint": 2.0 }, { "gpaPoint": 4.0, "creditHours": 1 } ] }),
    );
    assert_eq!(r["totalCredits"].as_u64(), Some(4));
    assert_eq!(r["cgpa"].as_f64(), Some(2.5));
    assert_eq!(r["classification"], json!("Second Class Lower"));

    let c = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.classify",
        json!({ "cgpa": 0.5 }),
    );
    assert_eq!(c["classification"], json!("Fail"));
    assert_eq!(c["passing"], json!(false));

    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.cgpa",
        json!({ "courses": [ { "creditHours": 3 } ] }),
    );
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    for (n, hours) in [json!(4294967295u64), json!(0), json!(13), json!(-1), json!(2.5)]
        .into_iter()
        .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("ch{}", n),
            "grades.cgpa",
            json!({ "courses": [
                { "gpaPoint": 4.0, "creditHours": hours },
                { "gpaPoint": 4.0, "creditHours": 1 }
            ] }),
        );
        assert_eq!(resp["error"]["code"], json!("bad_params"), "creditHours {}", hours);
    }
    // Still serving after the rejected batch.
    request_ok(&mut stdin, &mut reader, "alive", "health", json!({}));

    let t = request(
        &mut stdin,
        &mut reader,
        "6",
        "grades.transcript",
        json!({ "studentId": "x" }),
    );
    assert_eq!(t["error"]["code"], json!("no_workspace"));

    drop(stdin);
    let _ = child.wait();
}
