//! Integration tests for `ironpipe rules`, `simulate` and `config`.
//!
//! Each test builds a throwaway source tree and configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use ironpipe_cli::cli::SimulateArgs;
use ironpipe_cli::commands::{config, rules, simulate};
use ironpipe_cli::error::CliError;
use ironpipe_core::config::IronpipeConfig;
use ironpipe_processor::ListenerEvent;

const SSH_RULE: &str = r#"
rule: tag ssh failures
when:
  - field: message
    modifier: contains
    value: "Failed password"
then:
  - action: set_field
    field: category
    value: auth
  - action: route_to_stream
    stream: security
"#;

const ALERT_RULE: &str = r#"
rule: mark alert
then:
  - action: set_field
    field: alert
    value: true
"#;

const AUTH_PIPELINE: &str = r#"
pipeline: auth
stages:
  - stage: 0
    match: either
    rules: ["tag ssh failures"]
"#;

const SECURITY_PIPELINE: &str = r#"
pipeline: security
stages:
  - stage: 0
    rules: ["mark alert"]
"#;

const CONNECTIONS: &str = r#"
connections:
  - stream_id: "000000000000000000000001"
    pipeline_ids: [auth]
  - stream_id: security
    pipeline_ids: [security]
"#;

struct Fixture {
    root: TempDir,
    config_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().expect("should create temp dir");
        let rules = root.path().join("rules");
        let pipelines = root.path().join("pipelines");
        fs::create_dir_all(&rules).expect("rules dir");
        fs::create_dir_all(&pipelines).expect("pipelines dir");

        fs::write(rules.join("ssh.yml"), SSH_RULE).expect("write rule");
        fs::write(rules.join("alert.yml"), ALERT_RULE).expect("write rule");
        fs::write(pipelines.join("auth.yml"), AUTH_PIPELINE).expect("write pipeline");
        fs::write(pipelines.join("security.yml"), SECURITY_PIPELINE).expect("write pipeline");
        fs::write(root.path().join("connections.yml"), CONNECTIONS).expect("write connections");

        let config_path = root.path().join("ironpipe.toml");
        let config = format!(
            r#"
[general]
log_level = "warn"
log_format = "pretty"

[processor]
max_passes = 8

[sources]
rules_dir = "{}"
pipelines_dir = "{}"
connections_file = "{}"
"#,
            rules.display(),
            pipelines.display(),
            root.path().join("connections.yml").display()
        );
        fs::write(&config_path, config).expect("write config");

        Self { root, config_path }
    }

    fn rules_dir(&self) -> PathBuf {
        self.root.path().join("rules")
    }

    fn pipelines_dir(&self) -> PathBuf {
        self.root.path().join("pipelines")
    }

    fn write_rule(&self, name: &str, content: &str) {
        fs::write(self.rules_dir().join(name), content).expect("write rule");
    }

    fn write_pipeline(&self, name: &str, content: &str) {
        fs::write(self.pipelines_dir().join(name), content).expect("write pipeline");
    }

    async fn config(&self) -> IronpipeConfig {
        IronpipeConfig::load(&self.config_path)
            .await
            .expect("fixture config should load")
    }
}

fn simulate_args(message: &str) -> SimulateArgs {
    SimulateArgs {
        message: message.to_owned(),
        streams: Vec::new(),
        pipelines: Vec::new(),
        trace: false,
    }
}

#[tokio::test]
async fn test_rules_validate_clean_sources() {
    let fixture = Fixture::new();

    let report = rules::validate_sources(&fixture.rules_dir(), Some(&fixture.pipelines_dir()))
        .await
        .expect("validation should run");

    assert_eq!(report.rules.total, 2);
    assert_eq!(report.rules.valid, 2);
    assert_eq!(report.pipelines.valid, 2);
    assert!(report.errors.is_empty());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_rules_validate_reports_parse_errors_and_unknown_references() {
    let fixture = Fixture::new();
    fixture.write_rule("broken.yml", "rule: [unclosed");
    fixture.write_pipeline(
        "ghost.yml",
        "pipeline: ghost\nstages:\n  - stage: 1\n    rules: [\"no such rule\"]\n",
    );

    let report = rules::validate_sources(&fixture.rules_dir(), Some(&fixture.pipelines_dir()))
        .await
        .expect("validation should run");

    assert_eq!(report.rules.invalid, 1);
    assert!(report.errors.iter().all(|e| e.kind == "rule" && e.id == "broken"));
    assert!(!report.errors.is_empty());
    assert_eq!(report.pipelines.valid, 3);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("'ghost' stage 1"));
    assert!(report.warnings[0].contains("no such rule"));
}

#[tokio::test]
async fn test_rules_validate_without_pipelines_dir() {
    let fixture = Fixture::new();

    let report = rules::validate_sources(&fixture.rules_dir(), None)
        .await
        .expect("validation should run");

    assert!(report.pipelines_dir.is_none());
    assert_eq!(report.pipelines.total, 0);
}

#[tokio::test]
async fn test_rules_validate_missing_directory_is_an_error() {
    let fixture = Fixture::new();
    let missing = fixture.root.path().join("missing");

    let result = rules::validate_sources(&missing, None).await;
    assert!(matches!(result, Err(CliError::Processor(_))));
}

#[tokio::test]
async fn test_rules_list_shows_names_and_status() {
    let fixture = Fixture::new();
    fixture.write_rule("broken.yml", "rule: [unclosed");

    let report = rules::list_rules(&fixture.rules_dir())
        .await
        .expect("listing should run");

    let ids: Vec<&str> = report.rules.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["alert", "broken", "ssh"]);
    assert_eq!(report.rules[0].name.as_deref(), Some("mark alert"));
    assert_eq!(report.rules[1].status, "invalid");
    assert!(report.rules[1].name.is_none());
}

#[tokio::test]
async fn test_simulate_follows_stream_connections() {
    let fixture = Fixture::new();
    let config = fixture.config().await;

    let report = simulate::simulate(
        &config,
        &simulate_args(r#"{"message":"Failed password for root","source":"bastion"}"#),
    )
    .await
    .expect("simulation should run");

    assert_eq!(report.messages.len(), 1);
    let message = &report.messages[0];
    assert_eq!(message.get_field("category"), Some(&json!("auth")));
    assert_eq!(message.get_field("alert"), Some(&json!(true)));
    assert!(message.streams().contains("security"));
    assert_eq!(
        report.counters.get("ironpipe.pipeline.auth.executed"),
        Some(&1)
    );
    assert_eq!(
        report.counters.get("ironpipe.pipeline.security.executed"),
        Some(&1)
    );
    assert!(report.trace.is_empty(), "trace is opt-in");
}

#[tokio::test]
async fn test_simulate_unmatched_message_is_untouched() {
    let fixture = Fixture::new();
    let config = fixture.config().await;

    let report = simulate::simulate(&config, &simulate_args(r#"{"message":"Accepted key"}"#))
        .await
        .expect("simulation should run");

    assert_eq!(report.messages.len(), 1);
    assert!(!report.messages[0].has_field("category"));
    assert!(!report.messages[0].streams().contains("security"));
}

#[tokio::test]
async fn test_simulate_explicit_pipelines_ignore_connections() {
    let fixture = Fixture::new();
    let config = fixture.config().await;

    let mut args = simulate_args(r#"{"message":"Failed password for root"}"#);
    args.pipelines = vec!["security".to_owned(), "unknown".to_owned()];
    args.trace = true;

    let report = simulate::simulate(&config, &args)
        .await
        .expect("simulation should run");

    assert_eq!(report.messages.len(), 1);
    let message = &report.messages[0];
    assert_eq!(message.get_field("alert"), Some(&json!(true)));
    assert!(!message.has_field("category"), "auth pipeline must not run");
    assert!(report.trace.contains(&ListenerEvent::EnterStage {
        pipeline: "security".to_owned(),
        stage: 0,
    }));
    assert!(!report.trace.iter().any(|event| matches!(
        event,
        ListenerEvent::EnterStage { pipeline, .. } if pipeline == "auth"
    )));
}

#[tokio::test]
async fn test_simulate_rejects_non_object_message() {
    let fixture = Fixture::new();
    let config = fixture.config().await;

    let result = simulate::simulate(&config, &simulate_args("\"just a string\"")).await;
    assert!(matches!(result, Err(CliError::InvalidMessage(_))));
}

#[tokio::test]
async fn test_config_validate_reports_validity() {
    let fixture = Fixture::new();

    let report = config::validate_config(&fixture.config_path).await;
    assert!(report.valid);
    assert!(report.errors.is_empty());

    let bad = fixture.root.path().join("bad.toml");
    fs::write(&bad, "[general]\nlog_format = \"xml\"\n").expect("write bad config");
    let report = config::validate_config(&bad).await;
    assert!(!report.valid);
    assert!(report.errors[0].contains("general.log_format"));
}

#[tokio::test]
async fn test_config_validate_missing_file() {
    let report = config::validate_config(Path::new("/nonexistent/ironpipe.toml")).await;
    assert!(!report.valid);
    assert!(report.errors[0].contains("not found"));
}

#[tokio::test]
async fn test_config_show_section_and_unknown_section() {
    let fixture = Fixture::new();

    let report = config::show_config(&fixture.config_path, Some("processor"))
        .await
        .expect("show processor section");
    assert_eq!(report.section.as_deref(), Some("processor"));
    assert!(report.config_toml.contains("max_passes = 8"));

    let full = config::show_config(&fixture.config_path, None)
        .await
        .expect("show full config");
    assert!(full.config_toml.contains("[sources]"));

    let err = config::show_config(&fixture.config_path, Some("ebpf"))
        .await
        .expect_err("unknown section");
    assert!(err.to_string().contains("unknown section: ebpf"));
}
