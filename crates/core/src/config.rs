//! 설정 관리 -- ironpipe.toml 파싱 및 런타임 설정
//!
//! [`IronpipeConfig`]는 엔진과 CLI가 읽는 최상위 설정 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONPIPE_PROCESSOR_MAX_PASSES=16` 형식)
//! 3. 설정 파일 (`ironpipe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironpipe_core::error::IronpipeError> {
//! use ironpipe_core::config::IronpipeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronpipeConfig::load("ironpipe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronpipeConfig::parse("[processor]\nmax_passes = 8")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronpipeError};

/// 파이프라인 메트릭 기본 접두어
pub const DEFAULT_PIPELINE_METRIC_PREFIX: &str = "ironpipe.pipeline";

/// 규칙 메트릭 기본 접두어
pub const DEFAULT_RULE_METRIC_PREFIX: &str = "ironpipe.rule";

/// Ironpipe 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronpipeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 처리 엔진 설정
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// 규칙/파이프라인/연결 레코드 위치
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl IronpipeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronpipeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronpipeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronpipeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronpipeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronpipeError> {
        toml::from_str(toml_str).map_err(|e| {
            IronpipeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONPIPE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONPIPE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONPIPE_GENERAL_LOG_FORMAT");

        // Processor
        override_bool(
            &mut self.processor.cached_stage_iterators,
            "IRONPIPE_PROCESSOR_CACHED_STAGE_ITERATORS",
        );
        override_usize(
            &mut self.processor.max_passes,
            "IRONPIPE_PROCESSOR_MAX_PASSES",
        );
        override_bool(
            &mut self.processor.rule_metrics_enabled,
            "IRONPIPE_PROCESSOR_RULE_METRICS_ENABLED",
        );
        override_string(
            &mut self.processor.pipeline_metric_prefix,
            "IRONPIPE_PROCESSOR_PIPELINE_METRIC_PREFIX",
        );
        override_string(
            &mut self.processor.rule_metric_prefix,
            "IRONPIPE_PROCESSOR_RULE_METRIC_PREFIX",
        );

        // Sources
        override_string(&mut self.sources.rules_dir, "IRONPIPE_SOURCES_RULES_DIR");
        override_string(
            &mut self.sources.pipelines_dir,
            "IRONPIPE_SOURCES_PIPELINES_DIR",
        );
        override_string(
            &mut self.sources.connections_file,
            "IRONPIPE_SOURCES_CONNECTIONS_FILE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronpipeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        validate_prefix(
            "processor.pipeline_metric_prefix",
            &self.processor.pipeline_metric_prefix,
        )?;
        validate_prefix(
            "processor.rule_metric_prefix",
            &self.processor.rule_metric_prefix,
        )?;

        // 두 접두어가 같으면 파이프라인 id와 규칙 id가 같은 이름 공간을 공유하게 됨
        if self.processor.pipeline_metric_prefix == self.processor.rule_metric_prefix {
            return Err(ConfigError::InvalidValue {
                field: "processor.rule_metric_prefix".to_owned(),
                reason: "must differ from processor.pipeline_metric_prefix".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

fn validate_prefix(field: &str, prefix: &str) -> Result<(), IronpipeError> {
    if prefix.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into());
    }
    if prefix.starts_with('.') || prefix.ends_with('.') {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: "must not start or end with '.'".to_owned(),
        }
        .into());
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 처리 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// 스테이지 반복자 구성을 파이프라인 집합별로 캐시할지 여부
    pub cached_stage_iterators: bool,
    /// 메시지 하나가 거칠 수 있는 최대 라우팅 패스 수 (0 = 무제한)
    pub max_passes: usize,
    /// 규칙 메트릭 리스너 사용 여부의 초기값
    pub rule_metrics_enabled: bool,
    /// 파이프라인/스테이지 카운터 이름 접두어
    pub pipeline_metric_prefix: String,
    /// 규칙 카운터 이름 접두어
    pub rule_metric_prefix: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cached_stage_iterators: true,
            max_passes: 0,
            rule_metrics_enabled: false,
            pipeline_metric_prefix: DEFAULT_PIPELINE_METRIC_PREFIX.to_owned(),
            rule_metric_prefix: DEFAULT_RULE_METRIC_PREFIX.to_owned(),
        }
    }
}

/// 레코드 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// 규칙 YAML 디렉토리
    pub rules_dir: String,
    /// 파이프라인 YAML 디렉토리
    pub pipelines_dir: String,
    /// 스트림-파이프라인 연결 YAML 파일
    pub connections_file: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            rules_dir: "/etc/ironpipe/rules".to_owned(),
            pipelines_dir: "/etc/ironpipe/pipelines".to_owned(),
            connections_file: "/etc/ironpipe/connections.yml".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}
