//! Integration tests for the `authz` CLI binary: exit codes and stdout,
//! run against a throwaway `:memory:` store or a temp SQLite file so no
//! shared state leaks between tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

fn authz_bin() -> String {
    let path = env!("CARGO_BIN_EXE_authz");
    assert!(Path::new(path).exists(), "authz binary not found at {path}");
    path.to_owned()
}

fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(authz_bin()).args(args).output().expect("failed to execute authz");
    let code = output.status.code().unwrap_or(-1);
    (code, String::from_utf8_lossy(&output.stdout).to_string(), String::from_utf8_lossy(&output.stderr).to_string())
}

#[test]
fn version_flag_exits_zero() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("authz"));
}

#[test]
fn help_lists_subcommands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for sub in ["seed", "actions", "role", "role-binding", "evaluate", "batch-evaluate", "subject-profile"] {
        assert!(stdout.contains(sub), "help should list '{sub}': {stdout}");
    }
}

#[test]
fn seed_against_in_memory_store_reports_counts() {
    let (code, stdout, stderr) = run(&["--data-file", ":memory:", "seed"]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("actions"));
}

#[test]
fn actions_lists_catalog_on_in_memory_store() {
    let (code, stdout, stderr) = run(&["--data-file", ":memory:", "actions"]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("component:view"));
}

#[test]
fn evaluate_against_empty_store_denies() {
    let (code, stdout, stderr) = run(&[
        "--data-file",
        ":memory:",
        "evaluate",
        "--claim",
        "groups",
        "--value",
        "nobody",
        "--namespace",
        "acme",
        "--action",
        "component:view",
    ]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("deny"), "expected a deny decision: {stdout}");
}

#[test]
fn role_add_and_evaluate_allows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("authz.db");
    let db_path = db.to_str().unwrap();

    let (code, _, stderr) = run(&["--data-file", db_path, "role", "add", "editor", "--actions", "component:view", "--namespace", "acme"]);
    assert_eq!(code, 0, "stderr: {stderr}");

    let (code, _, stderr) = run(&[
        "--data-file",
        db_path,
        "role-binding",
        "add",
        "--claim",
        "groups",
        "--value",
        "devs",
        "--role",
        "editor",
        "--namespace",
        "acme",
    ]);
    assert_eq!(code, 0, "stderr: {stderr}");

    let (code, stdout, stderr) = run(&[
        "--data-file",
        db_path,
        "evaluate",
        "--claim",
        "groups",
        "--value",
        "devs",
        "--namespace",
        "acme",
        "--action",
        "component:view",
    ]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("allow"), "expected an allow decision: {stdout}");
}
