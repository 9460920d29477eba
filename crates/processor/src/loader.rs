//! 레코드 파일 로더 -- 규칙/파이프라인/연결 YAML 파일을 디스크에서 로드합니다.
//!
//! 규칙과 파이프라인 디렉토리 내의 `.yml`/`.yaml` 파일을 스캔합니다.
//! 파일 이름(확장자 제외)이 레코드 id가 되고, 내용은 파싱하지 않은 소스 그대로
//! 보관됩니다. 파싱은 리졸버가 수행하므로 문법 오류가 있는 파일도 로드됩니다.
//! 개별 파일 읽기 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ironpipe_core::config::SourcesConfig;
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;
use crate::resolver::PipelineResolverConfig;
use crate::source::{InMemorySource, PipelineConnections, PipelineRecord, RuleRecord};

const MAX_RECORD_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RECORDS_COUNT: usize = 10_000;

/// 연결 파일 스키마
///
/// ```yaml
/// connections:
///   - stream_id: "000000000000000000000001"
///     pipeline_ids: [auth, enrich]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsFile {
    #[serde(default)]
    pub connections: Vec<PipelineConnections>,
}

/// 디스크에서 읽은 전체 레코드
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub rules: Vec<RuleRecord>,
    pub pipelines: Vec<PipelineRecord>,
    pub connections: Vec<PipelineConnections>,
}

impl LoadedRecords {
    /// 메모리 소스로 감싸 리졸버 설정을 만듭니다.
    pub fn into_resolver_config(self) -> PipelineResolverConfig {
        PipelineResolverConfig::new(
            Arc::new(InMemorySource::new(self.rules)),
            Arc::new(InMemorySource::new(self.pipelines)),
            Arc::new(InMemorySource::new(self.connections)),
        )
    }
}

/// 원시 소스 파일 하나
struct SourceFile {
    id: String,
    title: String,
    source: String,
    modified_at: Option<DateTime<Utc>>,
}

/// 레코드 파일 로더
pub struct RecordLoader;

impl RecordLoader {
    /// 설정된 세 위치에서 모든 레코드를 로드합니다.
    pub async fn load(config: &SourcesConfig) -> Result<LoadedRecords, ProcessorError> {
        let rules = Self::load_rules(&config.rules_dir).await?;
        let pipelines = Self::load_pipelines(&config.pipelines_dir).await?;
        let connections = Self::load_connections(&config.connections_file).await?;
        Ok(LoadedRecords {
            rules,
            pipelines,
            connections,
        })
    }

    /// 규칙 디렉토리의 모든 YAML 파일을 로드합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 파일 수가 `MAX_RECORDS_COUNT`를 초과하는 경우
    pub async fn load_rules(dir: impl AsRef<Path>) -> Result<Vec<RuleRecord>, ProcessorError> {
        let files = Self::load_directory(dir.as_ref()).await?;
        tracing::info!(
            dir = %dir.as_ref().display(),
            count = files.len(),
            "loaded rule sources"
        );
        Ok(files
            .into_iter()
            .map(|f| RuleRecord {
                id: f.id,
                title: f.title,
                source: f.source,
                created_at: None,
                modified_at: f.modified_at,
            })
            .collect())
    }

    /// 파이프라인 디렉토리의 모든 YAML 파일을 로드합니다.
    pub async fn load_pipelines(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PipelineRecord>, ProcessorError> {
        let files = Self::load_directory(dir.as_ref()).await?;
        tracing::info!(
            dir = %dir.as_ref().display(),
            count = files.len(),
            "loaded pipeline sources"
        );
        Ok(files
            .into_iter()
            .map(|f| PipelineRecord {
                id: f.id,
                title: f.title,
                source: f.source,
                created_at: None,
                modified_at: f.modified_at,
            })
            .collect())
    }

    /// 연결 파일을 로드합니다. 파일이 없으면 연결 없음으로 간주합니다.
    pub async fn load_connections(
        path: impl AsRef<Path>,
    ) -> Result<Vec<PipelineConnections>, ProcessorError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "connections file not found, no stream is connected"
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ProcessorError::RecordLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                });
            }
        };

        Self::parse_connections(&content, &path.display().to_string())
    }

    /// 연결 YAML 문자열을 파싱합니다.
    pub fn parse_connections(
        yaml_str: &str,
        source: &str,
    ) -> Result<Vec<PipelineConnections>, ProcessorError> {
        if yaml_str.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: ConnectionsFile =
            serde_yaml::from_str(yaml_str).map_err(|e| ProcessorError::RecordLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if let Some(empty) = file.connections.iter().find(|c| c.stream_id.is_empty()) {
            return Err(ProcessorError::RecordLoad {
                path: source.to_owned(),
                reason: format!(
                    "connection with pipelines {:?} has an empty stream_id",
                    empty.pipeline_ids
                ),
            });
        }

        Ok(file.connections)
    }

    async fn load_directory(dir: &Path) -> Result<Vec<SourceFile>, ProcessorError> {
        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|e| ProcessorError::RecordLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                })?;

        let mut files = Vec::new();
        let mut seen_ids = HashSet::new();

        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| ProcessorError::RecordLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();

            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }

            match Self::load_file(&path).await {
                Ok(file) => {
                    if !seen_ids.insert(file.id.clone()) {
                        tracing::warn!(
                            record_id = %file.id,
                            path = %path.display(),
                            "duplicate record id, skipping"
                        );
                        continue;
                    }
                    files.push(file);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load record file, skipping"
                    );
                }
            }

            if files.len() > MAX_RECORDS_COUNT {
                return Err(ProcessorError::RecordLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many records: max {MAX_RECORDS_COUNT}"),
                });
            }
        }

        // read_dir 순서는 플랫폼마다 다름
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    async fn load_file(path: &Path) -> Result<SourceFile, ProcessorError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ProcessorError::RecordLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RECORD_FILE_SIZE {
            return Err(ProcessorError::RecordLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RECORD_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let source =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ProcessorError::RecordLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(SourceFile {
            id,
            title,
            source,
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}
