#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

mod common;

use common::TestEnv;
use predicates::prelude::*;

const UNKNOWN_ID: &str = "6f1f4a52-8d0e-4a5e-9f57-0d7c1a3b9e21";

/// Run a workflow that fails at its first step and return the run id
fn failed_run(env: &TestEnv) -> String {
    env.run_cmd("data01")
        .env("DISKFLOW_SIMULATE_FAIL", "create")
        .assert()
        .code(1);
    let ids = env.run_ids();
    assert_eq!(ids.len(), 1);
    ids[0].clone()
}

#[test]
fn test_cli_help() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("abort"));
}

#[test]
fn test_run_completes() {
    let env = TestEnv::new();
    env.run_cmd("data01")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("completed"));

    let ids = env.run_ids();
    assert_eq!(ids.len(), 1);
    let run = env.read_run(&ids[0]);
    assert_eq!(run["status"], "completed");
    assert_eq!(run["steps"].as_array().unwrap().len(), 5);
}

#[test]
fn test_run_failure_reports_step_and_resume_command() {
    let env = TestEnv::new();
    env.run_cmd("data01")
        .env("DISKFLOW_SIMULATE_FAIL", "resize")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("resize"))
        .stdout(predicate::str::contains("invalid_parameter"))
        .stdout(predicate::str::contains("diskflow resume --id"));

    let id = &env.run_ids()[0];
    let run = env.read_run(id);
    let statuses: Vec<&str> = run["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec!["succeeded", "succeeded", "failed", "not_started", "not_started"]
    );
}

#[test]
fn test_run_rejects_invalid_sizes() {
    let env = TestEnv::new();
    env.cmd()
        .args([
            "run", "--resource-group", "rg", "--vm", "vm01", "--disk", "d", "--size", "64",
            "--target-size", "32",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--target-size"));

    env.cmd()
        .args([
            "run", "--resource-group", "rg", "--vm", "vm01", "--disk", "d", "--size", "0",
            "--target-size", "32",
        ])
        .assert()
        .code(2);

    assert!(env.run_ids().is_empty());
}

#[test]
fn test_run_missing_arguments() {
    let env = TestEnv::new();
    env.cmd().args(["run", "--disk", "d"]).assert().code(2);
}

#[test]
fn test_resume_failed_run() {
    let env = TestEnv::new();
    let id = failed_run(&env);

    env.cmd()
        .args(["resume", "--id", &id])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("completed"));
    assert_eq!(env.read_run(&id)["status"], "completed");
}

#[test]
fn test_resume_after_resize_failure() {
    let env = TestEnv::new();
    env.run_cmd("data01")
        .env("DISKFLOW_SIMULATE_FAIL", "resize")
        .assert()
        .code(1);
    let id = env.run_ids()[0].clone();

    env.cmd()
        .args(["resume", "--id", &id, "--from", "resize"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("completed"));

    let run = env.read_run(&id);
    assert_eq!(run["status"], "completed");
    for step in run["steps"].as_array().unwrap() {
        assert_eq!(step["status"], "succeeded");
    }
    assert_eq!(run["steps"][0]["attempt_count"], 1);

    let simulated: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(env.state_dir().join("simulated.json")).unwrap(),
    )
    .unwrap();
    assert!(simulated["disks"].as_array().unwrap().is_empty());
}

#[test]
fn test_resume_completed_run_is_usage_error() {
    let env = TestEnv::new();
    env.run_cmd("data01").assert().code(0);
    let id = &env.run_ids()[0];

    env.cmd()
        .args(["resume", "--id", id])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already completed"));
}

#[test]
fn test_resume_from_out_of_order_step() {
    let env = TestEnv::new();
    let id = failed_run(&env);
    let before = env.read_run(&id);

    env.cmd()
        .args(["resume", "--id", &id, "--from", "resize"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("next step is create"));
    assert_eq!(env.read_run(&id), before);
}

#[test]
fn test_resume_unknown_run() {
    let env = TestEnv::new();
    env.cmd()
        .args(["resume", "--id", UNKNOWN_ID])
        .assert()
        .code(3);
}

#[test]
fn test_status_shows_run() {
    let env = TestEnv::new();
    let id = failed_run(&env);

    env.cmd()
        .args(["status", "--id", &id])
        .assert()
        .code(0)
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("failed"));

    let output = env
        .cmd()
        .args(["status", "--id", &id, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["id"], id.as_str());
    assert_eq!(json["status"], "failed");
}

#[test]
fn test_status_unknown_run_does_not_touch_state() {
    let env = TestEnv::new();
    env.cmd()
        .args(["status", "--id", UNKNOWN_ID])
        .assert()
        .code(3)
        .stderr(predicate::str::contains(UNKNOWN_ID));
    assert!(!env.state_dir().exists());
}

#[test]
fn test_malformed_run_id_is_unknown() {
    let env = TestEnv::new();
    for command in ["status", "resume", "abort"] {
        env.cmd()
            .args([command, "--id", "not-a-uuid"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Unknown workflow run: not-a-uuid"));
    }
    assert!(!env.state_dir().exists());
}

#[test]
fn test_list_runs() {
    let env = TestEnv::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No workflow runs"));

    env.run_cmd("data01").assert().code(0);
    env.run_cmd("data02")
        .env("DISKFLOW_SIMULATE_FAIL", "attach")
        .assert()
        .code(1);

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("data01"))
        .stdout(predicate::str::contains("data02"))
        .stdout(predicate::str::contains("2 run(s)"));
}

#[test]
fn test_abort_and_resume() {
    let env = TestEnv::new();
    let id = failed_run(&env);

    env.cmd()
        .args(["abort", "--id", &id])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("aborted"));
    assert_eq!(env.read_run(&id)["status"], "aborted");

    env.cmd().args(["resume", "--id", &id]).assert().code(0);
}

#[test]
fn test_abort_unknown_run() {
    let env = TestEnv::new();
    env.cmd()
        .args(["abort", "--id", UNKNOWN_ID])
        .assert()
        .code(3);
}
