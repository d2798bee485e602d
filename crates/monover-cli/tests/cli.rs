//! End-to-end tests for the monover binary that don't require a git
//! repository: help output, init, graph inspection, and failure modes.

use assert_cmd::Command;
use predicates::prelude::*;

fn monover() -> Command {
    Command::cargo_bin("monover").expect("binary builds")
}

fn write(path: &std::path::Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn help_lists_subcommands() {
    monover()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("changelog"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn init_creates_config() {
    let dir = tempfile::tempdir().unwrap();
    monover()
        .args(["--repo", dir.path().to_str().unwrap(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("monover.yaml"));
    assert!(dir.path().join("monover.yaml").is_file());
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("monover.yaml"), "tagPrefix: v\n").unwrap();
    monover()
        .args(["--repo", dir.path().to_str().unwrap(), "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn graph_lists_projects_and_edges() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("libs/core/project.yaml"),
        "name: core\n",
    );
    write(
        &dir.path().join("libs/api/project.yaml"),
        "name: api\ndependencies:\n  - ../core\n",
    );

    monover()
        .args(["--repo", dir.path().to_str().unwrap(), "graph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("api -> core"))
        .stdout(predicate::str::contains("core"));
}

#[test]
fn graph_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("libs/core/project.yaml"), "name: core\n");

    let output = monover()
        .args(["--repo", dir.path().to_str().unwrap(), "graph", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["name"], "core");
}

#[test]
fn version_fails_outside_git_repository() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("libs/core/project.yaml"), "name: core\n");

    monover()
        .args(["--repo", dir.path().to_str().unwrap(), "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAILED"));
}

#[test]
fn repo_must_exist() {
    monover()
        .args(["--repo", "/definitely/not/a/path", "version"])
        .assert()
        .failure();
}

#[test]
fn completion_generates_script() {
    monover()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("monover"));
}
