//! Integration tests for the `xvault` CLI binary.
//!
//! These exercise the CLI as a subprocess, checking exit codes and
//! stdout/stderr for paths that don't require a running server or
//! database. Commands that need Postgres or a live server are covered
//! by `xvault-core`'s and `xvault-server`'s own test suites instead.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

fn xvault_bin() -> String {
    let path = env!("CARGO_BIN_EXE_xvault");
    assert!(Path::new(path).exists(), "xvault binary not found at {path}");
    path.to_owned()
}

fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(xvault_bin())
        .args(args)
        .env_remove("XVAULT_TOKEN")
        .env_remove("DATABASE_URL")
        .output()
        .expect("failed to execute xvault");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "xvault --version should exit 0");
    assert!(stdout.contains("xvault"), "version output should contain 'xvault': {stdout}");
}

#[test]
fn test_help_flag() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "xvault --help should exit 0");
    assert!(stdout.contains("migrate"), "help should list 'migrate' command: {stdout}");
    assert!(stdout.contains("worker"), "help should list 'worker' command: {stdout}");
    assert!(stdout.contains("retention"), "help should list 'retention' command: {stdout}");
}

#[test]
fn test_migrate_requires_database_url() {
    let (code, _, stderr) = run(&["migrate"]);
    assert_ne!(code, 0, "migrate without DATABASE_URL should fail");
    assert!(
        stderr.contains("database-url") || stderr.contains("DATABASE_URL") || stderr.contains("required"),
        "should report missing --database-url: {stderr}"
    );
}

#[test]
fn test_worker_list_requires_token() {
    let (code, _, stderr) = run(&["worker", "list"]);
    assert_ne!(code, 0, "worker list without a token should fail");
    assert!(stderr.contains("token"), "should mention missing token: {stderr}");
}

#[test]
fn test_retention_run_requires_source() {
    let (code, _, stderr) = run(&["retention", "run"]);
    assert_ne!(code, 0, "retention run without --source should fail");
    assert!(
        stderr.contains("source") || stderr.contains("required"),
        "should report missing --source: {stderr}"
    );
}
