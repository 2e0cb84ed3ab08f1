//! Integration tests for the `scadalink` CLI binary.
//!
//! Every test gets its own config directory; demo mode stands in for a
//! live server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

fn scadalink_cmd(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("scadalink");
    cmd.env("SCADALINK_CONFIG_DIR", dir.path())
        .env_remove("SCADALINK_OUTPUT")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn configured_demo_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir)
        .args(["settings", "set", "--host", "bridge.example.com", "--port", "443"])
        .assert()
        .success();
    scadalink_cmd(&dir).args(["demo", "on"]).assert().success();
    dir
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = scadalink_cmd(&dir).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir).arg("--help").assert().success().stdout(
        predicate::str::contains("settings")
            .and(predicate::str::contains("agents"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn completions_generate_for_bash() {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scadalink"));
}

// ── Settings ────────────────────────────────────────────────────────

#[test]
fn settings_round_trip_through_state_file() {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir)
        .args(["settings", "set", "--host", "plant.example.com", "--port", "8443"])
        .assert()
        .success();

    scadalink_cmd(&dir)
        .args(["settings", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""host": "plant.example.com""#)
                .and(predicate::str::contains(r#""port": 8443"#))
                .and(predicate::str::contains(r#""route": "direct""#)),
        );

    assert!(dir.path().join("state.toml").exists());
}

#[test]
fn plaintext_host_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir)
        .args(["settings", "set", "--host", "http://plant.local", "--port", "80"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("plaintext"));
}

#[test]
fn requests_without_settings_fail_with_usage_code() {
    let dir = tempfile::tempdir().unwrap();
    scadalink_cmd(&dir)
        .args(["get", "system-info"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("settings set"));
}

#[test]
fn invalid_post_body_is_rejected() {
    let dir = configured_demo_dir();
    scadalink_cmd(&dir)
        .args(["post", "widgets", "--body", "{oops"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--body"));
}

// ── Demo mode ───────────────────────────────────────────────────────

#[test]
fn demo_get_expands_compact_payloads() {
    let dir = configured_demo_dir();
    scadalink_cmd(&dir)
        .args(["get", "trend-logs/comparison"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""currentValue": 12"#)
                .and(predicate::str::contains("2023-11-14T22:13:20.000Z")),
        );
}

#[test]
fn demo_agents_are_listed() {
    let dir = configured_demo_dir();
    scadalink_cmd(&dir)
        .args(["agents", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo-agent-1").and(predicate::str::contains("online")));
}

#[test]
fn demo_connect_reports_connected() {
    let dir = configured_demo_dir();
    scadalink_cmd(&dir)
        .arg("connect")
        .assert()
        .success()
        .stdout(predicate::str::contains("connected to bridge.example.com"));
}

#[test]
fn demo_flag_persists_and_toggles() {
    let dir = configured_demo_dir();
    scadalink_cmd(&dir)
        .args(["demo", "status", "-o", "json-compact"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"demoMode":true}"#));

    scadalink_cmd(&dir).args(["demo", "off"]).assert().success();
    scadalink_cmd(&dir)
        .args(["demo", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo mode off"));
}
