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
    let exe = env!("CARGO_BIN_EXE_surveyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn surveyd");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .expect("error code")
        .to_string()
}

#[test]
fn health_reports_version_and_selected_workspace() {
    let workspace = temp_dir("surveyd-health");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let before = request_ok(&mut stdin, &mut reader, "h1", "health", json!({}));
    assert!(before.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let after = request_ok(&mut stdin, &mut reader, "h2", "health", json!({}));
    assert_eq!(
        after.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );
}

#[test]
fn study_methods_require_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "no-ws",
        "study.seedRewards",
        json!({ "codes": ["AMZ-1"] }),
    );
    assert_eq!(code, "no_workspace");

    let code = request_err(&mut stdin, &mut reader, "no-ws-2", "session.start", json!({}));
    assert_eq!(code, "no_workspace");
}

#[test]
fn duplicate_reward_codes_are_rejected_wholesale() {
    let workspace = temp_dir("surveyd-dup-rewards");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "seed-1",
        "study.seedRewards",
        json!({ "codes": ["AMZ-1", "AMZ-2"] }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "seed-2",
        "study.seedRewards",
        json!({ "codes": ["AMZ-3", "AMZ-2"] }),
    );
    assert_eq!(code, "duplicate_reward_code");

    // The failed batch left nothing behind.
    let summary = request_ok(&mut stdin, &mut reader, "summary", "study.summary", json!({}));
    assert_eq!(
        summary.get("unclaimedCount").and_then(|v| v.as_i64()),
        Some(2)
    );
}

#[test]
fn roster_import_validates_pairs_and_counts() {
    let workspace = temp_dir("surveyd-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "roster-bad",
        "study.importRoster",
        json!({ "students": [{ "email": "a@qub.ac.uk" }] }),
    );
    assert_eq!(code, "bad_params");

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "roster-ok",
        "study.importRoster",
        json!({ "students": [
            { "email": "a@qub.ac.uk", "studentId": "40012345" },
            { "email": "b@qub.ac.uk", "studentId": "40067890" }
        ] }),
    );
    assert_eq!(imported.get("imported").and_then(|v| v.as_i64()), Some(2));

    let summary = request_ok(&mut stdin, &mut reader, "summary", "study.summary", json!({}));
    assert_eq!(summary.get("rosterCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(summary.get("loginCount").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn unknown_methods_get_not_implemented() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let code = request_err(&mut stdin, &mut reader, "nope", "survey.destroy", json!({}));
    assert_eq!(code, "not_implemented");
}
