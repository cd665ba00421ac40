//! CLI end-to-end tests
//!
//! Tests for the reelcast command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the reelcast binary
#[allow(deprecated)]
fn reelcast_cmd() -> Command {
    Command::cargo_bin("reelcast").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = reelcast_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = reelcast_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reelcast"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = reelcast_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "reelcast {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_play_help() {
    let mut cmd = reelcast_cmd();
    cmd.args(["play", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queue files and play them"))
        .stdout(predicate::str::contains("--device-model"));
}

#[test]
fn test_cli_plan_help() {
    let mut cmd = reelcast_cmd();
    cmd.args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Show how a file would be transcoded"));
}

#[test]
fn test_cli_play_requires_files() {
    let mut cmd = reelcast_cmd();
    cmd.arg("play").assert().failure();
}

#[test]
fn test_cli_play_nonexistent_file() {
    let mut cmd = reelcast_cmd();
    cmd.args(["play", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot open"));
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let mut cmd = reelcast_cmd();
    cmd.args(["probe", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_play_invalid_port() {
    let mut cmd = reelcast_cmd();
    cmd.args(["play", "--port", "99999", "movie.mkv"])
        .assert()
        .failure();
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");

    fs::write(
        &config_file,
        r#"
[server]
host = "127.0.0.1"
port = 8090

[device]
model = "Chromecast Ultra"

[queue]
max_lookahead = 5
"#,
    )
    .unwrap();

    let mut cmd = reelcast_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("127.0.0.1:8090"))
        .stdout(predicate::str::contains("Chromecast Ultra"))
        .stdout(predicate::str::contains("max_lookahead is 5"));
}

#[test]
fn test_cli_validate_global_config_flag() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(&config_file, "[queue]\nautoplay = false\n").unwrap();

    let mut cmd = reelcast_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("autoplay=false"));
}

#[test]
fn test_cli_validate_malformed_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(&config_file, "[server\nport = 'eighty'").unwrap();

    let mut cmd = reelcast_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

#[test]
fn test_cli_validate_without_file_prints_defaults() {
    let temp = tempdir().unwrap();
    let mut cmd = reelcast_cmd();
    cmd.current_dir(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("[queue]"))
        .stdout(predicate::str::contains("start_lead_secs = 10"));
}
