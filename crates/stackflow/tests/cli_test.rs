#![allow(deprecated)] // TODO: move Command::cargo_bin to cargo_bin_cmd!

mod common;

use assert_cmd::Command;
use common::{TestProject, WEB_TOPOLOGY};
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stack").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dependency order"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stack").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stackflow"));
}

#[test]
fn test_apply_help() {
    let mut cmd = Command::cargo_bin("stack").unwrap();
    cmd.args(["apply", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<DEPLOYMENT>"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_validate() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project
        .stack()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resource types: 4"))
        .stdout(predicate::str::contains("web: 3 resources, 3 steps to create"))
        .stdout(predicate::str::contains("Topology is valid"));
}

#[test]
fn test_validate_reports_cycle() {
    let project = TestProject::with_topology(
        r#"
resource-type "a" {
    depends-on "b"
}
resource-type "b" {
    depends-on "a"
}
deployment "loop" {
    resource "a" "x"
    resource "b" "y"
}
"#,
    );
    project
        .stack()
        .arg("validate")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cycle"))
        .stderr(predicate::str::contains("a/x"))
        .stderr(predicate::str::contains("b/y"));
}

#[test]
fn test_missing_topology_file() {
    let project = TestProject::new();
    project
        .stack()
        .args(["--file", "absent.kdl", "validate"])
        .assert()
        .code(3);
}

#[test]
fn test_plan_create() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project
        .stack()
        .args(["plan", "web", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+ create"))
        .stdout(predicate::str::contains("network/main"))
        .stdout(predicate::str::contains("after 1"))
        .stdout(predicate::str::contains(
            "3 to create, 0 to delete, 0 to detach",
        ));

    // planning never writes provider state
    assert!(!project.memory_state_path().exists());
}

#[test]
fn test_plan_unknown_deployment() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project
        .stack()
        .args(["plan", "prod", "create"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("prod"));
}

#[test]
fn test_apply_create_then_delete_twice() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);

    project
        .stack()
        .args(["apply", "web", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("network-0001"))
        .stdout(predicate::str::contains("all-succeeded"));

    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project.memory_state_path()).unwrap())
            .unwrap();
    assert_eq!(state["resources"].as_object().unwrap().len(), 3);

    project
        .stack()
        .args(["apply", "web", "delete"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- delete"))
        .stdout(predicate::str::contains("deleted"))
        .stdout(predicate::str::contains("all-succeeded"));

    project
        .stack()
        .args(["apply", "web", "delete"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already-absent"))
        .stdout(predicate::str::contains("all-succeeded"));

    // the lock is released after every run
    assert!(!project.path().join(".stackflow").join("lock.json").exists());
}

#[test]
fn test_apply_create_is_idempotent() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);

    project.stack().args(["apply", "web", "create"]).assert().success();
    project
        .stack()
        .args(["apply", "web", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already-exists"));

    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project.memory_state_path()).unwrap())
            .unwrap();
    assert_eq!(state["resources"].as_object().unwrap().len(), 3);
}

#[test]
fn test_apply_dry_run_changes_nothing() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project
        .stack()
        .args(["apply", "web", "create", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run"))
        .stdout(predicate::str::contains("dry-run: would create"));

    assert!(!project.memory_state_path().exists());
}

#[test]
fn test_apply_with_cycle_fails_before_any_change() {
    let project = TestProject::with_topology(
        r#"
resource-type "a" {
    depends-on "b"
}
resource-type "b" {
    depends-on "a"
}
deployment "loop" {
    resource "a" "x"
    resource "b" "y"
}
"#,
    );
    project
        .stack()
        .args(["apply", "loop", "create"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cycle"));

    assert!(!project.memory_state_path().exists());
}

#[test]
fn test_report_after_apply() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);

    project
        .stack()
        .args(["report", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No archived runs"));

    project.stack().args(["apply", "web", "create"]).assert().success();

    let output = project.stack().args(["report", "--list"]).output().unwrap();
    assert!(output.status.success());
    let ids = String::from_utf8(output.stdout).unwrap();
    assert_eq!(ids.lines().count(), 1);

    let output = project.stack().args(["report", "--json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "all-succeeded");
    assert_eq!(report["direction"], "create");
    assert_eq!(report["deployment"], "web");
    assert_eq!(report["outcomes"].as_array().unwrap().len(), 3);
    assert_eq!(report["run_id"], ids.trim());

    project
        .stack()
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("STATE"))
        .stdout(predicate::str::contains("ready"));
}

#[test]
fn test_apply_protected_resource_is_partial() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project.write_memory_state(serde_json::json!({
        "vpc-default": {
            "id": "vpc-default",
            "resource_type": "network",
            "deployment": "web",
            "name": "main",
            "protected": true
        }
    }));

    project
        .stack()
        .args(["apply", "web", "delete"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("protected"))
        .stdout(predicate::str::contains("partial"));

    let state = std::fs::read_to_string(project.memory_state_path()).unwrap();
    assert!(state.contains("vpc-default"));
}

#[test]
fn test_apply_failed_delete_exits_2() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    // a subnet of another deployment still references the network
    project.write_memory_state(serde_json::json!({
        "vpc-1": {
            "id": "vpc-1",
            "resource_type": "network",
            "deployment": "web",
            "name": "main"
        },
        "subnet-9": {
            "id": "subnet-9",
            "resource_type": "subnet",
            "deployment": "api",
            "name": "b",
            "parent_ids": { "network": "vpc-1" }
        }
    }));

    project
        .stack()
        .args(["apply", "web", "delete", "--max-attempts", "1"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("[conflict]"));
}

#[test]
fn test_apply_without_archive() {
    let project = TestProject::with_topology(WEB_TOPOLOGY);
    project
        .stack()
        .args(["apply", "web", "create", "--no-archive"])
        .assert()
        .success();

    assert!(!project.path().join(".stackflow").join("runs").exists());
}
