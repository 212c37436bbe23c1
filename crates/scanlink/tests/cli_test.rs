//! Integration tests for the `scanlink` CLI binary.
//!
//! Argument parsing, config management and error exit codes run without a
//! server; the channel round-trips use a throwaway local WebSocket server.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use futures_util::{SinkExt, StreamExt};
use predicates::prelude::*;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `scanlink` binary with env isolation.
///
/// Clears all `SCANLINK_*` variables and points config directories at
/// `home` so tests never touch the user's real configuration.
fn scanlink_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("scanlink");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("SCANLINK_PROFILE")
        .env_remove("SCANLINK_ORIGIN")
        .env_remove("SCANLINK_PATH")
        .env_remove("SCANLINK_OUTPUT")
        .env_remove("SCANLINK_TIMEOUT");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Accept connections forever. Pings get a pong, each `subscribe_scan`
/// gets one `scan_progress` event for that scan, and every text frame is
/// forwarded to the test.
async fn serve() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    match value["type"].as_str() {
                        Some("ping") => {
                            let _ = ws.send(Message::text(r#"{"type":"pong"}"#)).await;
                        }
                        Some("subscribe_scan") => {
                            let event = serde_json::json!({
                                "type": "scan_progress",
                                "scan_id": value["scan_id"],
                                "progress": 40,
                            });
                            let _ = ws.send(Message::text(event.to_string())).await;
                        }
                        _ => {}
                    }
                    let _ = seen_tx.send(text.as_str().to_owned());
                }
            });
        }
    });

    (origin, seen_rx)
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = scanlink_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("event channel")
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("send"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scanlink"));
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_watch_help_lists_filters() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--scan")
                .and(predicate::str::contains("--type"))
                .and(predicate::str::contains("--count")),
        );
}

// ── Config management ───────────────────────────────────────────────

#[test]
fn test_config_path_is_under_config_home() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_show_and_use() {
    let home = tempfile::tempdir().unwrap();

    scanlink_cmd(home.path())
        .args([
            "config",
            "init",
            "--name",
            "staging",
            "--origin",
            "https://staging.example.com",
        ])
        .assert()
        .success();

    scanlink_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.staging]")
                .and(predicate::str::contains("https://staging.example.com")),
        );

    scanlink_cmd(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* staging"));

    // A second init without --force must not clobber the file.
    scanlink_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .code(6);

    scanlink_cmd(home.path())
        .args(["config", "use", "prod"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_config_show_json() {
    let home = tempfile::tempdir().unwrap();
    let output = scanlink_cmd(home.path())
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["default_profile"], "default");
    assert_eq!(value["defaults"]["output"], "plain");
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_origin_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["send", "--origin", "not a url", "--json", r#"{"type":"note"}"#])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("origin"));
}

#[test]
fn test_send_requires_type() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["send", "--json", r#"{"text":"hi"}"#])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_profile_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args(["watch", "--profile", "nope"])
        .assert()
        .code(4);
}

#[test]
fn test_send_to_unreachable_origin_times_out() {
    let home = tempfile::tempdir().unwrap();
    scanlink_cmd(home.path())
        .args([
            "send",
            "--origin",
            "http://127.0.0.1:1",
            "--timeout",
            "1",
            "--json",
            r#"{"type":"note"}"#,
        ])
        .timeout(Duration::from_secs(20))
        .assert()
        .code(8);
}

// ── Live channel ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_send_delivers_event_after_ping() {
    let (origin, mut seen) = serve().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = scanlink_cmd(home.path());
    cmd.args([
        "send",
        "--origin",
        &origin,
        "--json",
        r#"{"type":"note","text":"hi"}"#,
    ])
    .timeout(Duration::from_secs(20));
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    assert_eq!(next_seen(&mut seen).await, r#"{"type":"ping"}"#);
    let sent: serde_json::Value = serde_json::from_str(&next_seen(&mut seen).await).unwrap();
    assert_eq!(sent, serde_json::json!({"type": "note", "text": "hi"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_subscribes_and_prints_events() {
    let (origin, mut seen) = serve().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = scanlink_cmd(home.path());
    cmd.args([
        "watch",
        "--origin",
        &origin,
        "--scan",
        "scan-7",
        "--type",
        "scan_progress",
        "--count",
        "1",
        "--quiet",
        "-o",
        "json-compact",
    ])
    .timeout(Duration::from_secs(20));
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let event: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(event["type"], "scan_progress");
    assert_eq!(event["scan_id"], "scan-7");

    let mut frames = vec![next_seen(&mut seen).await, next_seen(&mut seen).await];
    frames.sort();
    assert_eq!(
        frames,
        [
            r#"{"type":"ping"}"#.to_owned(),
            r#"{"type":"subscribe_scan","scan_id":"scan-7"}"#.to_owned(),
        ]
    );
}
