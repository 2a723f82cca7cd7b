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

fn page_name(result: &serde_json::Value) -> String {
    result
        .get("page")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .expect("page name")
        .to_string()
}

/// Brings a fresh participant to the consent page.
fn session_at_consent(
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
    );
    request_ok(
        stdin,
        reader,
        "roster",
        "study.importRoster",
        json!({ "students": [{ "email": "a@qub.ac.uk", "studentId": "40012345" }] }),
    );
    request_ok(
        stdin,
        reader,
        "rewards",
        "study.seedRewards",
        json!({ "codes": ["AMZ-001"] }),
    );
    request_ok(
        stdin,
        reader,
        "feedback",
        "study.importFeedback",
        json!({
            "studentId": "40012345",
            "sections": [
                { "section": "overall", "original": "Solid work.", "alternative": "Really solid work." }
            ]
        }),
    );

    let started = request_ok(stdin, reader, "start", "session.start", json!({}));
    let sid = started
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    request_ok(
        stdin,
        reader,
        "submit",
        "login.submit",
        json!({ "sessionId": sid, "email": "a@qub.ac.uk", "studentId": "40012345" }),
    );
    let outbox = request_ok(
        stdin,
        reader,
        "outbox",
        "study.outbox",
        json!({ "recipient": "a@qub.ac.uk" }),
    );
    let passcode = outbox
        .get("messages")
        .and_then(|v| v.as_array())
        .and_then(|ms| ms.last())
        .and_then(|m| m.get("body"))
        .and_then(|b| b.as_str())
        .and_then(|b| b.rsplit(' ').next())
        .expect("passcode")
        .to_string();
    request_ok(
        stdin,
        reader,
        "verify",
        "login.verify",
        json!({ "sessionId": sid, "passcode": passcode }),
    );
    let proceeded = request_ok(
        stdin,
        reader,
        "proceed",
        "flow.advance",
        json!({ "sessionId": sid }),
    );
    assert_eq!(page_name(&proceeded), "consent");
    sid
}

#[test]
fn proceeding_requires_every_statement_ticked() {
    let workspace = temp_dir("surveyd-consent-incomplete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let sid = session_at_consent(&mut stdin, &mut reader, &workspace);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "consent-partial",
        "consent.submit",
        json!({
            "sessionId": sid,
            "agreements": [true, true, true, true, true, false],
            "consent": true
        }),
    );
    assert_eq!(code, "consent_incomplete");

    // The session is still on the consent page and can complete later.
    let page = request_ok(
        &mut stdin,
        &mut reader,
        "page",
        "session.page",
        json!({ "sessionId": sid }),
    );
    assert_eq!(page_name(&page), "consent");
}

#[test]
fn declining_is_unavailable_once_everything_is_ticked() {
    let workspace = temp_dir("surveyd-consent-decline-gate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let sid = session_at_consent(&mut stdin, &mut reader, &workspace);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "decline-all-ticked",
        "consent.submit",
        json!({
            "sessionId": sid,
            "agreements": [true, true, true, true, true, true],
            "consent": false
        }),
    );
    assert_eq!(code, "decline_unavailable");
}

#[test]
fn declining_routes_to_the_terminal_page_and_records_nothing() {
    let workspace = temp_dir("surveyd-consent-decline");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let sid = session_at_consent(&mut stdin, &mut reader, &workspace);

    let declined = request_ok(
        &mut stdin,
        &mut reader,
        "decline",
        "consent.submit",
        json!({
            "sessionId": sid,
            "agreements": [true, false, true, true, true, true],
            "consent": false
        }),
    );
    assert_eq!(page_name(&declined), "do_not_consent");

    // Terminal: no further actions apply.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "advance-after-decline",
        "flow.advance",
        json!({ "sessionId": sid }),
    );
    assert_eq!(code, "wrong_page");

    // No response row was written for the decliner.
    let summary = request_ok(&mut stdin, &mut reader, "summary", "study.summary", json!({}));
    assert_eq!(summary.get("claimedCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        summary.get("unclaimedCount").and_then(|v| v.as_i64()),
        Some(1)
    );
}
