//! End-to-end tests that drive the `tabtime` binary.
//!
//! Covers the persisted flow (send → status → timeline → clear) and the
//! in-memory replay of a scripted browsing session.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;

fn tabtime_binary() -> String {
    env!("CARGO_BIN_EXE_tabtime").to_string()
}

/// Runs the binary with `HOME` pointed at `home` and no ambient overrides.
fn tabtime(home: &Path, args: &[&str]) -> Output {
    Command::new(tabtime_binary())
        .env("HOME", home)
        .env_remove("XDG_DATA_HOME")
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("RUST_LOG")
        .env_remove("TABTIME_DATABASE_PATH")
        .args(args)
        .output()
        .expect("failed to run tabtime")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "tabtime should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// Messages persist between invocations through the default database.
#[test]
fn test_send_persists_between_runs() {
    let temp = TempDir::new().unwrap();

    let reply = stdout_of(&tabtime(temp.path(), &["send", r#"{"action":"recordingStarted"}"#]));
    assert_eq!(reply.trim(), r#"{"status":"success"}"#);

    let db_path = temp.path().join(".local/share/tabtime/tabtime.db");
    assert!(db_path.exists(), "database should be created under the data dir");

    let reply = stdout_of(&tabtime(temp.path(), &["send", r#"{"action":"getRecordingState"}"#]));
    assert_eq!(
        reply.trim(),
        r#"{"isRecording":true,"events":[],"hasRecording":false}"#
    );

    let status = stdout_of(&tabtime(temp.path(), &["status"]));
    assert!(status.contains("Recording: in progress"), "{status}");
    assert!(status.contains("Entries: 0 (0 domains, 0s total)"), "{status}");
}

/// Protocol errors are replies, and the process still exits cleanly.
#[test]
fn test_send_unknown_action_replies_with_error() {
    let temp = TempDir::new().unwrap();
    let reply = stdout_of(&tabtime(temp.path(), &["send", r#"{"action":"launchRockets"}"#]));
    assert_eq!(reply.trim(), r#"{"error":"unrecognized action: launchRockets"}"#);
}

/// Malformed JSON is a usage error.
#[test]
fn test_send_invalid_json_fails() {
    let temp = TempDir::new().unwrap();
    let output = tabtime(temp.path(), &["send", "{not json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("message is not valid JSON"));
}

/// Clearing starts a new empty session that the timeline command reports.
#[test]
fn test_clear_then_timeline_json() {
    let temp = TempDir::new().unwrap();

    let cleared = stdout_of(&tabtime(temp.path(), &["clear"]));
    assert!(cleared.starts_with("Cleared 0 entries; new session "), "{cleared}");

    let timeline = stdout_of(&tabtime(temp.path(), &["timeline", "--json"]));
    let value: serde_json::Value = serde_json::from_str(&timeline).unwrap();
    assert!(value["sessionId"].is_string());
    assert_eq!(value["timeline"], json!([]));

    let consolidated = stdout_of(&tabtime(temp.path(), &["consolidate"]));
    assert_eq!(consolidated.trim(), "Nothing to consolidate (0 entries).");
}

/// The database location can be overridden from the environment.
#[test]
fn test_database_path_from_env() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("custom/state.db");

    let output = Command::new(tabtime_binary())
        .env("HOME", temp.path())
        .env_remove("XDG_DATA_HOME")
        .env_remove("XDG_CONFIG_HOME")
        .env("TABTIME_DATABASE_PATH", &db_path)
        .arg("status")
        .output()
        .unwrap();
    let status = stdout_of(&output);

    assert!(db_path.exists());
    assert!(status.contains(&format!("Database: {}", db_path.display())), "{status}");
    assert!(status.contains("No session recorded."), "{status}");
}

/// A scripted session replays in memory and leaves the database alone.
#[test]
fn test_replay_script() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("session.jsonl");
    let steps = [
        json!({
            "at": 1_736_931_600_000_i64,
            "op": "open",
            "surface": 1,
            "window": 1,
            "url": "https://github.com/pulls",
            "title": "Pull requests",
        }),
        json!({
            "at": 1_736_931_660_000_i64,
            "op": "open",
            "surface": 2,
            "window": 1,
            "url": "chrome://settings",
            "title": "Settings",
        }),
        json!({"at": 1_736_931_670_000_i64, "op": "activate", "surface": 1}),
        json!({"at": 1_736_931_730_000_i64, "op": "blur"}),
    ];
    let lines: Vec<String> = steps.iter().map(ToString::to_string).collect();
    std::fs::write(&script, lines.join("\n")).unwrap();

    let output = stdout_of(&tabtime(temp.path(), &["replay", script.to_str().unwrap()]));
    insta::assert_snapshot!(output, @r"
    Session 2025-01-15T09:00:00.000Z
    2025-01-15 09:00:00 - 09:02:10   2m 10s   2m 10s  github.com           Pull requests
    1 entries, 1 domains, 2m 10s total
    ");

    assert!(!temp.path().join(".local/share/tabtime/tabtime.db").exists());
}

#[test]
fn test_replay_rejects_backwards_time() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("bad.jsonl");
    std::fs::write(
        &script,
        "{\"at\": 20, \"op\": \"blur\"}\n{\"at\": 10, \"op\": \"blur\"}\n",
    )
    .unwrap();

    let output = tabtime(temp.path(), &["replay", script.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2: time runs backwards"));
}
