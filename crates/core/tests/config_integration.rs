//! ironpipe.toml 통합 설정 테스트
//!
//! - ironpipe.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use ironpipe_core::config::IronpipeConfig;
use ironpipe_core::error::{ConfigError, IronpipeError};

const EXAMPLE: &str = include_str!("../../../ironpipe.toml.example");

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }
    let result = f();
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

// =============================================================================
// ironpipe.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = IronpipeConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let example = IronpipeConfig::parse(EXAMPLE).expect("should parse");
    let defaults = IronpipeConfig::default();

    assert_eq!(example.general.log_level, defaults.general.log_level);
    assert_eq!(example.general.log_format, defaults.general.log_format);
    assert_eq!(
        example.processor.cached_stage_iterators,
        defaults.processor.cached_stage_iterators
    );
    assert_eq!(example.processor.max_passes, defaults.processor.max_passes);
    assert_eq!(
        example.processor.rule_metrics_enabled,
        defaults.processor.rule_metrics_enabled
    );
    assert_eq!(
        example.processor.pipeline_metric_prefix,
        defaults.processor.pipeline_metric_prefix
    );
    assert_eq!(
        example.processor.rule_metric_prefix,
        defaults.processor.rule_metric_prefix
    );
    assert_eq!(example.sources.rules_dir, defaults.sources.rules_dir);
    assert_eq!(example.sources.pipelines_dir, defaults.sources.pipelines_dir);
    assert_eq!(
        example.sources.connections_file,
        defaults.sources.connections_file
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_sources_only() {
    let toml = r#"
[sources]
rules_dir = "./rules"
"#;
    let config = IronpipeConfig::parse(toml).expect("should parse");
    assert_eq!(config.sources.rules_dir, "./rules");
    assert_eq!(config.sources.pipelines_dir, "/etc/ironpipe/pipelines");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "debug"

[future_section]
key = "value"
"#;
    let config = IronpipeConfig::parse(toml).expect("unknown sections should be ignored");
    assert_eq!(config.general.log_level, "debug");
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[processor]
max_passes = "many"
"#;
    let err = IronpipeConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        IronpipeError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 오버라이드 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[processor]
max_passes = 4
"#;
    let result = with_env("IRONPIPE_PROCESSOR_MAX_PASSES", "64", || {
        let mut config = IronpipeConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.processor.max_passes
    });
    assert_eq!(result, 64);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let result = with_env("IRONPIPE_PROCESSOR_CACHED_STAGE_ITERATORS", "false", || {
        let mut config = IronpipeConfig::default();
        config.apply_env_overrides();
        config.processor.cached_stage_iterators
    });
    assert!(!result);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_toml_value() {
    let toml = r#"
[processor]
max_passes = 9
"#;
    let result = with_env("IRONPIPE_PROCESSOR_MAX_PASSES", "lots", || {
        let mut config = IronpipeConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.processor.max_passes
    });
    assert_eq!(result, 9);
}

#[test]
#[serial_test::serial]
fn env_override_sources_path() {
    let result = with_env("IRONPIPE_SOURCES_CONNECTIONS_FILE", "/tmp/conn.yml", || {
        let mut config = IronpipeConfig::default();
        config.apply_env_overrides();
        config.sources.connections_file
    });
    assert_eq!(result, "/tmp/conn.yml");
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let err = IronpipeConfig::from_file("/definitely/missing/ironpipe.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IronpipeError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_from_disk_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ironpipe.toml");
    tokio::fs::write(&path, "[general]\nlog_format = \"xml\"\n")
        .await
        .expect("write config");

    let err = IronpipeConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("log_format"));
}

#[tokio::test]
#[serial_test::serial]
async fn load_example_config_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ironpipe.toml");
    tokio::fs::write(&path, EXAMPLE).await.expect("write config");

    let config = IronpipeConfig::load(&path).await.expect("should load");
    assert!(config.processor.cached_stage_iterators);
}
