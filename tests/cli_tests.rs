//! Integration tests for the apibind CLI
//!
//! These tests run the actual binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn apibind_cmd() -> Command {
    Command::cargo_bin("apibind").unwrap()
}

fn write_schema(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("schema.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

const SCHEMA: &str = r#"
fields:
  - name: Page
    rules: "query:'page'; required"
  - name: Token
    rules: "header:'X-Token'"
  - name: Filter
  - name: Filter.Kind
    rules: "query:'kind'"
  - name: Filter.Limit
    rules: "vd: $ < 100"
"#;

#[test]
fn test_help_flag() {
    apibind_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("eval"));
}

// ============================================================================
// plan
// ============================================================================

#[test]
fn test_plan_prints_descriptors() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, SCHEMA);

    apibind_cmd()
        .arg("plan")
        .arg(&schema)
        .assert()
        .success()
        .stdout(predicate::str::contains("first_and_tagged"))
        .stdout(predicate::str::contains("name=page"))
        .stdout(predicate::str::contains("required"))
        .stdout(predicate::str::contains("name=X-Token"))
        .stdout(predicate::str::contains("Filter.Kind"))
        .stdout(predicate::str::contains("Filter.Limit").not())
        .stdout(predicate::str::contains("Validation: no"));
}

#[test]
fn test_plan_level_flag() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, SCHEMA);

    apibind_cmd()
        .args(["plan", "--level", "any"])
        .arg(&schema)
        .assert()
        .success()
        .stdout(predicate::str::contains("Filter.Limit"))
        .stdout(predicate::str::contains("Validation: yes"));

    apibind_cmd()
        .args(["plan", "--level", "only-first"])
        .arg(&schema)
        .assert()
        .success()
        .stdout(predicate::str::contains("Filter.Kind").not());
}

#[test]
fn test_plan_rejects_bad_rules() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(
        &dir,
        "fields:\n  - name: Id\n    rules: \"query; path\"\n",
    );

    apibind_cmd()
        .arg("plan")
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("BIND-011"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_plan_missing_file() {
    apibind_cmd()
        .args(["plan", "/nonexistent/schema.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BIND-030"));
}

// ============================================================================
// eval
// ============================================================================

#[test]
fn test_eval_against_value() {
    apibind_cmd()
        .args(["eval", "$ > 0 && $ < 10", "--value", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));

    apibind_cmd()
        .args(["eval", "len($)", "--value", "\"héllo\""])
        .assert()
        .success()
        .stdout(predicate::str::contains("5"));
}

#[test]
fn test_eval_defaults_to_null() {
    apibind_cmd()
        .args(["eval", "$ == null"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn test_eval_reports_syntax_errors() {
    apibind_cmd()
        .args(["eval", "$ >"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLI-001"));

    apibind_cmd()
        .args(["eval", "$", "--value", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLI-002"));
}
