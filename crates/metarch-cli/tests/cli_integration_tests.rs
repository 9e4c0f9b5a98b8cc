//! CLI integration tests for metarch
//!
//! Tests the metarch CLI commands end-to-end using assert_cmd. Every test gets
//! its own config and data directories.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    config: TempDir,
    data: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            config: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("metarch").unwrap();
        cmd.env("METARCH_CONFIG_DIR", self.config.path());
        cmd.env("METARCH_DATA_DIR", self.data.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).arg("--format").arg("json").output().unwrap();
        assert!(output.status.success(), "command {:?} failed: {:?}", args, output);
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn test_help_lists_commands() {
    Env::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("solve"))
        .stdout(predicate::str::contains("create-agent"))
        .stdout(predicate::str::contains("list-agents"));
}

#[test]
fn test_list_agents_empty() {
    Env::new()
        .cmd()
        .arg("list-agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("No workers registered."));
}

#[test]
fn test_create_agent_then_list() {
    let env = Env::new();

    env.cmd()
        .args([
            "create-agent",
            "--tags",
            "finance,data",
            "--complexity",
            "5",
            "--operations",
            "forecast",
            "--description",
            "Quarterly budget forecasts",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("QuarterlyFinanceAgent"));

    let workers = env.json(&["list-agents"]);
    let workers = workers.as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["descriptor"]["origin"], "synthesized");
    assert_eq!(workers[0]["status"], "active");
}

#[test]
fn test_create_agent_twice_conflicts() {
    let env = Env::new();
    let args = ["create-agent", "--tags", "web", "--complexity", "4"];

    env.cmd().args(args).assert().success();
    env.cmd()
        .args(args)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("E300"));
}

#[test]
fn test_create_agent_rejects_out_of_scale_complexity() {
    Env::new()
        .cmd()
        .args(["create-agent", "--tags", "web", "--complexity", "11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E800"));
}

#[test]
fn test_create_agent_rejects_too_many_tags() {
    let env = Env::new();
    env.cmd()
        .args(["create-agent", "--tags", "data,finance,web,ml", "--complexity", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E800"));

    let workers = env.json(&["list-agents"]);
    assert!(workers.as_array().unwrap().is_empty());
}

#[test]
fn test_created_agent_carries_prompt_template() {
    let env = Env::new();
    let created = env.json(&[
        "create-agent",
        "--tags",
        "finance",
        "--complexity",
        "4",
        "--description",
        "Quarterly budget forecasts",
    ]);
    let prompt = created["descriptor"]["prompt_template"].as_str().unwrap();
    assert!(prompt.contains("financial analysis and investment insights"));
    assert!(prompt.contains("Quarterly budget forecasts"));
}

#[test]
fn test_solve_synthesizes_then_reuses() {
    let env = Env::new();

    let first = env.json(&["solve", "Review the quarterly budget and investment plan"]);
    assert_eq!(first["synthesized"], true);
    let worker_id = first["worker"]["id"].as_str().unwrap().to_string();

    let second = env.json(&["solve", "Check the budget for next month"]);
    assert_eq!(second["synthesized"], false);
    assert_eq!(second["worker"]["id"], worker_id.as_str());
    assert_eq!(second["stats"]["invocation_count"], 2);

    let workers = env.json(&["list-agents"]);
    assert_eq!(workers.as_array().unwrap().len(), 1);
}

#[test]
fn test_solve_text_output() {
    Env::new()
        .cmd()
        .args(["solve", "Build a landing page for the website"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Domains: web"))
        .stdout(predicate::str::contains("Dispatched to"))
        .stdout(predicate::str::contains("Outcome: success"));
}

#[test]
fn test_solve_unclassifiable_task_fails() {
    Env::new()
        .cmd()
        .args(["solve", "do it now"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("E100"));
}

#[test]
fn test_deprecate_unknown_worker_fails() {
    Env::new()
        .cmd()
        .args(["deprecate", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E201"));
}

#[test]
fn test_deprecate_hides_worker() {
    let env = Env::new();
    let created = env.json(&["create-agent", "--tags", "ml", "--complexity", "6"]);
    let id = created["descriptor"]["id"].as_str().unwrap().to_string();

    env.cmd().args(["deprecate", &id]).assert().success();

    let active = env.json(&["list-agents"]);
    assert!(active.as_array().unwrap().is_empty());
    let all = env.json(&["list-agents", "--all"]);
    assert_eq!(all[0]["status"], "deprecated");
}

#[test]
fn test_status_reports_counts() {
    let env = Env::new();
    env.cmd()
        .args(["create-agent", "--tags", "research", "--complexity", "3"])
        .assert()
        .success();
    env.cmd()
        .args(["solve", "Investigate academic research on sleep"])
        .assert()
        .success();

    let status = env.json(&["status"]);
    assert_eq!(status["halted"], false);
    assert_eq!(status["total_workers"], 1);
    assert_eq!(status["total_invocations"], 1);
}

#[test]
fn test_config_set_get_reset() {
    let env = Env::new();

    env.cmd()
        .args(["config", "set", "routing.acceptance_threshold", "0.7"])
        .assert()
        .success();
    env.cmd()
        .args(["config", "get", "routing.acceptance_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.7"));

    env.cmd()
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("synthesis.top_n_tags = 3"));

    env.cmd().args(["config", "reset"]).assert().success();
    env.cmd()
        .args(["config", "get", "routing.acceptance_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.6"));
}

#[test]
fn test_config_rejects_invalid_values() {
    let env = Env::new();

    env.cmd()
        .args(["config", "set", "routing.domain_weight", "0.9"])
        .assert()
        .failure();
    env.cmd()
        .args(["config", "set", "unknown.key", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_json_backend_persists_to_file() {
    let env = Env::new();
    env.cmd()
        .args(["config", "set", "storage.backend", "json"])
        .assert()
        .success();

    env.cmd()
        .args(["create-agent", "--tags", "automation", "--complexity", "5"])
        .assert()
        .success();

    let path = env.data.path().join("agent_registry.json");
    assert!(path.exists());
    let workers = env.json(&["list-agents"]);
    assert_eq!(workers.as_array().unwrap().len(), 1);
}
