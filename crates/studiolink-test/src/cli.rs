//! CLI regression tests for the `studiolink` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats.
//!
//! Run with: `cargo test -p studiolink-test`
//! Requires the `studiolink` binary to be built first (`cargo build -p studiolink`).

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `studiolink` binary.
fn studiolink() -> Command {
    // cargo_bin is deprecated for custom build-dir setups; fine for standard workspace use.
    #[allow(deprecated)]
    Command::cargo_bin("studiolink")
        .expect("studiolink binary not found, run `cargo build -p studiolink` first")
}

/// Absolute path to the shared test fixtures directory.
fn fixtures() -> PathBuf {
    // CARGO_MANIFEST_DIR = .../crates/studiolink-test
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crates/")
        .parent()
        .expect("workspace root")
        .join("tests/fixtures")
}

// ---------------------------------------------------------------------------
// studiolink check
// ---------------------------------------------------------------------------

#[test]
fn check_valid_catalog_exits_zero() {
    studiolink()
        .args(["check", "--catalog"])
        .arg(fixtures().join("catalog.json"))
        .assert()
        .success()
        .stdout(contains("SetProgramMuted"))
        .stdout(contains("audiomixer.output.muted"));
}

#[test]
fn check_skips_commands_group_by_default() {
    studiolink()
        .args(["check", "--catalog"])
        .arg(fixtures().join("catalog.json"))
        .assert()
        .success()
        .stdout(contains("commands.parameter.options.get").not());
}

#[test]
fn check_json_format_outputs_valid_json() {
    let output = studiolink()
        .args(["check", "--catalog"])
        .arg(fixtures().join("catalog.json"))
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let s = String::from_utf8(output).expect("stdout should be valid UTF-8");
    let v: serde_json::Value =
        serde_json::from_str(&s).expect("--format json output should be valid JSON");
    let bindings = v["bindings"].as_array().expect("bindings should be an array");
    assert!(!bindings.is_empty());
    assert!(bindings
        .iter()
        .any(|b| b["id"] == "GetProgramMuted" && b["role"] == "feedback"));
    assert!(v["rejected"].is_array());
}

#[test]
fn check_yaml_catalog_exits_zero() {
    let tmp = TempDir::new().expect("temp dir");
    let catalog = tmp.path().join("catalog.yaml");
    std::fs::write(
        &catalog,
        "program:\n  - requestType: SetProgramMuted\n    requestParams:\n      - id: muted\n        type: boolean\n        property: required\n",
    )
    .expect("write catalog");

    studiolink()
        .args(["check", "--catalog"])
        .arg(&catalog)
        .assert()
        .success()
        .stdout(contains("SetProgramMuted"));
}

#[test]
fn check_invalid_catalog_exits_one() {
    studiolink()
        .args(["check", "--catalog"])
        .arg(fixtures().join("invalid-catalog.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("failed to load catalog"));
}

#[test]
fn check_missing_file_exits_one() {
    studiolink()
        .args(["check", "--catalog", "this-file-does-not-exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("catalog not found"));
}

#[test]
fn check_missing_catalog_flag_exits_two() {
    // clap returns exit code 2 for missing required args
    studiolink().args(["check"]).assert().failure().code(2);
}

// ---------------------------------------------------------------------------
// studiolink run
// ---------------------------------------------------------------------------

#[test]
fn run_without_host_exits_one() {
    studiolink()
        .env_remove("STUDIOLINK_HOST")
        .env_remove("STUDIOLINK_PORT")
        .args(["run", "--catalog"])
        .arg(fixtures().join("catalog.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid configuration"));
}

#[test]
fn run_with_zero_port_exits_one() {
    studiolink()
        .env_remove("STUDIOLINK_PORT")
        .args(["run", "--host", "127.0.0.1", "--catalog"])
        .arg(fixtures().join("catalog.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid configuration"));
}

#[test]
fn run_invalid_log_format_exits_one() {
    studiolink()
        .args(["run", "--host", "127.0.0.1", "--port", "4455", "--log-format", "xml"])
        .arg("--catalog")
        .arg(fixtures().join("catalog.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid log format"));
}
