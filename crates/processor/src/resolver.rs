//! 파이프라인 리졸버 -- 저장된 소스를 상호 참조가 연결된 AST로 변환합니다.
//!
//! 해석 순서:
//! 1. 모든 규칙 레코드를 파싱해 이름으로 색인합니다. 파싱 실패 규칙은
//!    `Failed to parse rule: <id>` 이름의 항상 거짓 규칙으로 대체됩니다.
//! 2. 모든 파이프라인 레코드를 파싱합니다. 파싱 실패 시 빈 파이프라인으로 대체됩니다.
//! 3. 각 스테이지의 규칙 이름 참조를 색인에서 찾습니다. 없는 이름은
//!    `Unresolved rule <ref>` 항상 거짓 규칙이 됩니다.
//! 4. 찾은 규칙은 (파이프라인, 스테이지) 위치마다 복사되어 자기 카운터를 가집니다.
//!
//! 스트림 연결은 해석된 파이프라인 맵으로 매핑하며, 사라진 파이프라인 id는 조용히 버립니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::{Pipeline, Rule};
use crate::error::ProcessorError;
use crate::metrics::PipelineMetricRegistry;
use crate::parser::RuleParser;
use crate::source::{PipelineConnections, PipelineRecord, RecordSource, RuleRecord};

/// 해석된 파이프라인 맵 (id -> 파이프라인)
pub type PipelineMap = HashMap<String, Arc<Pipeline>>;

/// 스트림 id -> 연결된 파이프라인 (파이프라인 id 순, 중복 없음)
pub type StreamConnections = HashMap<String, Vec<Arc<Pipeline>>>;

/// 리졸버가 읽는 세 레코드 소스
#[derive(Clone)]
pub struct PipelineResolverConfig {
    rules: Arc<dyn RecordSource<RuleRecord>>,
    pipelines: Arc<dyn RecordSource<PipelineRecord>>,
    connections: Arc<dyn RecordSource<PipelineConnections>>,
}

impl PipelineResolverConfig {
    /// 세 레코드 소스로 설정을 만듭니다.
    pub fn new(
        rules: Arc<dyn RecordSource<RuleRecord>>,
        pipelines: Arc<dyn RecordSource<PipelineRecord>>,
        connections: Arc<dyn RecordSource<PipelineConnections>>,
    ) -> Self {
        Self {
            rules,
            pipelines,
            connections,
        }
    }

    /// 규칙 레코드 소스
    pub fn rules(&self) -> &Arc<dyn RecordSource<RuleRecord>> {
        &self.rules
    }

    /// 파이프라인 레코드 소스
    pub fn pipelines(&self) -> &Arc<dyn RecordSource<PipelineRecord>> {
        &self.pipelines
    }

    /// 스트림 연결 소스
    pub fn connections(&self) -> &Arc<dyn RecordSource<PipelineConnections>> {
        &self.connections
    }
}

impl std::fmt::Debug for PipelineResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResolverConfig").finish_non_exhaustive()
    }
}

/// 파이프라인 리졸버
#[derive(Clone)]
pub struct PipelineResolver {
    parser: Arc<dyn RuleParser>,
    config: PipelineResolverConfig,
}

impl PipelineResolver {
    /// 파서와 소스 설정으로 리졸버를 만듭니다.
    pub fn new(parser: Arc<dyn RuleParser>, config: PipelineResolverConfig) -> Self {
        Self { parser, config }
    }

    /// 레코드 소스 설정
    pub fn config(&self) -> &PipelineResolverConfig {
        &self.config
    }

    /// 규칙/파이프라인 파서
    pub fn parser(&self) -> &Arc<dyn RuleParser> {
        &self.parser
    }

    /// 저장된 규칙과 파이프라인을 모두 읽어 해석합니다.
    ///
    /// # Errors
    /// 레코드 반복자가 실패하면 그대로 전파합니다. 파싱 실패는 에러가 아닙니다.
    pub fn resolve_pipelines(
        &self,
        metrics: &PipelineMetricRegistry,
    ) -> Result<PipelineMap, ProcessorError> {
        let rules = self.resolve_rules()?;

        let mut parsed = Vec::new();
        for record in self.config.pipelines.load_all() {
            let record = record?;
            let pipeline = match self.parser.parse_pipeline(&record.id, &record.source) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    warn!(
                        pipeline_id = %record.id,
                        title = %record.title,
                        errors = ?e.errors,
                        "ignoring non parseable pipeline"
                    );
                    Pipeline::empty(
                        record.id.clone(),
                        format!("Failed to parse pipeline {}", record.id),
                    )
                }
            };
            // 맵 키는 레코드 id
            parsed.push(pipeline.with_id(record.id));
        }

        Ok(Self::link(parsed, &rules, metrics))
    }

    /// 프로그램으로 만든 파이프라인의 규칙 참조를 저장된 규칙으로 해석합니다.
    pub fn resolve_functions(
        &self,
        pipelines: impl IntoIterator<Item = Pipeline>,
        metrics: &PipelineMetricRegistry,
    ) -> Result<PipelineMap, ProcessorError> {
        let rules = self.resolve_rules()?;
        Ok(Self::link(pipelines, &rules, metrics))
    }

    /// 스트림 연결을 해석된 파이프라인으로 매핑합니다.
    pub fn resolve_stream_connections(
        &self,
        pipelines: &PipelineMap,
    ) -> Result<StreamConnections, ProcessorError> {
        let mut merged: HashMap<String, BTreeMap<String, Arc<Pipeline>>> = HashMap::new();
        for connection in self.config.connections.load_all() {
            let connection = connection?;
            let entry = merged.entry(connection.stream_id.clone()).or_default();
            for pipeline_id in &connection.pipeline_ids {
                match pipelines.get(pipeline_id) {
                    Some(pipeline) => {
                        entry.insert(pipeline_id.clone(), Arc::clone(pipeline));
                    }
                    None => debug!(
                        stream_id = %connection.stream_id,
                        pipeline_id = %pipeline_id,
                        "dropping connection to unknown pipeline"
                    ),
                }
            }
        }

        Ok(merged
            .into_iter()
            .filter(|(_, pipelines)| !pipelines.is_empty())
            .map(|(stream_id, pipelines)| (stream_id, pipelines.into_values().collect()))
            .collect())
    }

    /// 규칙 레코드를 파싱해 이름 -> 규칙 색인을 만듭니다.
    fn resolve_rules(&self) -> Result<HashMap<String, Rule>, ProcessorError> {
        let mut by_name = HashMap::new();
        for record in self.config.rules.load_all() {
            let record = record?;
            let rule = match self.parser.parse_rule(&record.id, &record.source) {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(
                        rule_id = %record.id,
                        title = %record.title,
                        errors = ?e.errors,
                        "ignoring non parseable rule"
                    );
                    Rule::always_false(format!("Failed to parse rule: {}", record.id))
                }
            };
            if let Some(previous) = by_name.insert(rule.name().to_owned(), rule) {
                warn!(
                    rule_name = %previous.name(),
                    "duplicate rule name, the last loaded rule wins"
                );
            }
        }
        Ok(by_name)
    }

    /// 스테이지에 규칙을 연결하고 카운터를 등록합니다.
    fn link(
        pipelines: impl IntoIterator<Item = Pipeline>,
        rules: &HashMap<String, Rule>,
        metrics: &PipelineMetricRegistry,
    ) -> PipelineMap {
        let mut resolved = PipelineMap::new();
        for mut pipeline in pipelines {
            debug!(pipeline_id = %pipeline.id(), name = %pipeline.name(), "resolving pipeline");
            let pipeline_id = pipeline.id().to_owned();
            for stage in pipeline.stages_mut() {
                let stage_number = stage.stage();
                let stage_rules = stage
                    .rule_references()
                    .iter()
                    .map(|reference| {
                        let template = match rules.get(reference) {
                            Some(rule) => rule.clone(),
                            None => {
                                warn!(
                                    pipeline_id = %pipeline_id,
                                    stage = stage_number,
                                    rule = %reference,
                                    "unresolved rule reference"
                                );
                                Rule::always_false(format!("Unresolved rule {reference}"))
                            }
                        };
                        template.for_location(metrics, &pipeline_id, stage_number)
                    })
                    .collect();
                stage.set_rules(stage_rules);
                stage.register_metrics(metrics);
            }
            pipeline.register_metrics(metrics);
            resolved.insert(pipeline_id, Arc::new(pipeline));
        }
        resolved
    }
}

impl std::fmt::Debug for PipelineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;
    use crate::parser::YamlRuleParser;
    use crate::source::InMemorySource;

    fn metrics() -> PipelineMetricRegistry {
        PipelineMetricRegistry::new(Arc::new(MetricRegistry::new()), "p", "r")
    }

    fn resolver(
        rules: Vec<RuleRecord>,
        pipelines: Vec<PipelineRecord>,
        connections: Vec<PipelineConnections>,
    ) -> PipelineResolver {
        PipelineResolver::new(
            Arc::new(YamlRuleParser),
            PipelineResolverConfig::new(
                Arc::new(InMemorySource::new(rules)),
                Arc::new(InMemorySource::new(pipelines)),
                Arc::new(InMemorySource::new(connections)),
            ),
        )
    }

    struct FailingSource;

    impl RecordSource<RuleRecord> for FailingSource {
        fn load_all(&self) -> crate::source::RecordIter<'_, RuleRecord> {
            Box::new(std::iter::once(Err(ProcessorError::Source(
                "cursor closed".to_owned(),
            ))))
        }
    }

    #[test]
    fn pipeline_parse_failure_yields_empty_pipeline_under_record_id() {
        let r = resolver(
            vec![],
            vec![PipelineRecord::new("p1", "broken", "pipeline: [")],
            vec![],
        );
        let pipelines = r.resolve_pipelines(&metrics()).unwrap();
        let p1 = &pipelines["p1"];
        assert_eq!(p1.name(), "Failed to parse pipeline p1");
        assert!(p1.stages().is_empty());
    }

    #[test]
    fn source_failure_propagates() {
        let r = PipelineResolver::new(
            Arc::new(YamlRuleParser),
            PipelineResolverConfig::new(
                Arc::new(FailingSource),
                Arc::new(InMemorySource::<PipelineRecord>::default()),
                Arc::new(InMemorySource::<PipelineConnections>::default()),
            ),
        );
        let err = r.resolve_pipelines(&metrics()).unwrap_err();
        assert!(matches!(err, ProcessorError::Source(_)));
    }

    #[test]
    fn connections_merge_and_drop_unknown_ids() {
        let r = resolver(
            vec![],
            vec![
                PipelineRecord::new("p1", "a", "pipeline: a"),
                PipelineRecord::new("p2", "b", "pipeline: b"),
            ],
            vec![
                PipelineConnections::new("s1", ["p2", "ghost"]),
                PipelineConnections::new("s1", ["p1"]),
                PipelineConnections::new("s2", ["ghost"]),
            ],
        );
        let pipelines = r.resolve_pipelines(&metrics()).unwrap();
        let connections = r.resolve_stream_connections(&pipelines).unwrap();

        let s1: Vec<&str> = connections["s1"].iter().map(|p| p.id()).collect();
        assert_eq!(s1, vec!["p1", "p2"]);
        assert!(!connections.contains_key("s2"));
    }

    #[test]
    fn resolve_functions_links_programmatic_pipelines() {
        use crate::ast::{MatchMode, Stage};

        let r = resolver(
            vec![RuleRecord::new("r1", "tag", "rule: tag\nwhen: true\n")],
            vec![],
            vec![],
        );
        let pipeline = Pipeline::new(
            "sim",
            "simulated",
            vec![Stage::new(0, MatchMode::All, vec!["tag".to_owned()])],
        );
        let resolved = r.resolve_functions([pipeline], &metrics()).unwrap();
        let stage = &resolved["sim"].stages()[0];
        assert_eq!(stage.rules()[0].id(), Some("r1"));
        assert_eq!(stage.pipeline_id(), "sim");
    }
}
