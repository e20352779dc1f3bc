//! CLI integration tests
//!
//! Tests the harbor CLI using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn harbor() -> Command {
    let mut cmd = Command::cargo_bin("harbor")
        .expect("Failed to locate harbor binary - ensure it's built before running tests");
    cmd.env_remove("HARBOR_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("harbor.json");
    std::fs::write(&path, body).unwrap();
    path
}

const POLICY_CONFIG: &str = r#"{
    "policy": {
        "rules": [
            {"pattern": "*.openai.com", "action": "redirect-to-local", "redirectTarget": "127.0.0.1:11434"},
            {"pattern": "8.212.*", "action": "block"}
        ]
    }
}"#;

#[test]
fn test_cli_help() {
    harbor()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harbor"))
        .stdout(predicate::str::contains("Single-host service orchestrator"));
}

#[test]
fn test_cli_version() {
    harbor()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harbor"));
}

#[test]
fn test_cli_subcommand_help() {
    for (command, expected) in [
        ("start", "dependency order"),
        ("status", "JSON"),
        ("stop", "PID file"),
        ("test", "report"),
        ("classify", "policy"),
    ] {
        harbor()
            .args([command, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected));
    }
}

#[test]
fn test_cli_stub_service_is_hidden() {
    harbor()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stub-service").not());
}

#[test]
fn test_cli_unknown_command() {
    harbor()
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_restart_requires_name() {
    harbor().arg("restart").assert().failure();
}

#[test]
fn test_cli_config_init_check_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harbor.json");

    harbor()
        .args(["--config", path.to_str().unwrap(), "config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    harbor()
        .args(["--config", path.to_str().unwrap(), "config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Start order: inference"));

    harbor()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ipcPort\""));
}

#[test]
fn test_cli_config_path_honours_flag() {
    harbor()
        .args(["--config", "/tmp/somewhere/harbor.json", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/somewhere/harbor.json"));
}

#[test]
fn test_cli_config_check_rejects_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{"services":[
            {"name":"a","command":"sleep","port":41201,"dependsOn":["b"]},
            {"name":"b","command":"sleep","port":41202,"dependsOn":["a"]}]}"#,
    );

    harbor()
        .args(["--config", path.to_str().unwrap(), "config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn test_cli_config_check_rejects_bad_rule() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{"policy":{"rules":[{"pattern":"api.*.com","action":"block"}]}}"#,
    );

    harbor()
        .args(["--config", path.to_str().unwrap(), "config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("wildcard"));
}

#[test]
fn test_cli_start_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{"services":[{"name":"a","command":"sleep","port":41203,"dependsOn":["missing"]}]}"#,
    );
    let pid_file = dir.path().join("harbor.pid");

    harbor()
        .args([
            "--config",
            path.to_str().unwrap(),
            "start",
            "--pid-file",
            pid_file.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown service 'missing'"));
    assert!(!pid_file.exists());
}

#[test]
fn test_cli_classify() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), POLICY_CONFIG);
    let config = path.to_str().unwrap();

    harbor()
        .args(["--config", config, "classify", "api.openai.com:443"])
        .assert()
        .success()
        .stdout(predicate::str::contains("redirect -> 127.0.0.1:11434"));

    harbor()
        .args(["--config", config, "classify", "8.212.4.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("block"));

    harbor()
        .args(["--config", config, "classify", "localhost:11434"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allow"));
}

#[test]
fn test_cli_status_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &format!(r#"{{"ipcPort": {}}}"#, free_port()));

    harbor()
        .args(["--config", path.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("not running"));

    harbor()
        .args(["--config", path.to_str().unwrap(), "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn test_cli_stop_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &format!(r#"{{"ipcPort": {}}}"#, free_port()));
    let pid_file = dir.path().join("harbor.pid");

    harbor()
        .args([
            "--config",
            path.to_str().unwrap(),
            "stop",
            "--pid-file",
            pid_file.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("not running"));
}
