//! 파이프라인/스테이지/규칙 카운터 레지스트리
//!
//! [`MetricRegistry`]는 이름으로 식별되는 카운터 핸들을 보관합니다.
//! 같은 이름을 두 번 요청하면 같은 카운터를 돌려주므로, 전역 규칙 카운터는
//! 모든 사용 위치가 공유하고 위치별(local) 카운터는 이름이 달라 독립적입니다.
//!
//! [`PipelineMetricRegistry`]는 설정된 접두어로 다음 이름을 만듭니다.
//!
//! ```text
//! {pipeline_prefix}.{pipeline_id}.executed
//! {pipeline_prefix}.{pipeline_id}.stage.{n}.executed
//! {rule_prefix}.{rule_id}.{matched|not-matched|failed|executed}
//! {rule_prefix}.{rule_id}.{pipeline_id}.{n}.{matched|not-matched|failed|executed}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ironpipe_core::config::ProcessorConfig;

/// 단조 증가 카운터
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// 1 증가
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// `n` 증가
    pub fn increment_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// 현재 값
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// 이름 기반 카운터 레지스트리
#[derive(Debug, Default)]
pub struct MetricRegistry {
    counters: DashMap<String, Arc<Counter>>,
}

impl MetricRegistry {
    /// 빈 레지스트리를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름에 해당하는 카운터를 반환하고, 없으면 새로 만듭니다.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(existing) = self.counters.get(name) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.counters
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Counter::default()))
                .value(),
        )
    }

    /// 등록된 카운터를 조회합니다.
    pub fn get(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters.get(name).map(|c| Arc::clone(c.value()))
    }

    /// 조회 편의 함수. 등록되지 않은 이름은 `None`.
    pub fn count(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|c| c.get())
    }

    /// 접두어로 시작하는 모든 카운터를 제거하고 제거한 수를 반환합니다.
    pub fn remove_matching(&self, prefix: &str) -> usize {
        let before = self.counters.len();
        self.counters.retain(|name, _| !name.starts_with(prefix));
        before.saturating_sub(self.counters.len())
    }

    /// 정렬된 카운터 이름 목록
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 등록된 카운터 수
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// 등록된 카운터가 없으면 `true`
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// 규칙 하나에 대한 네 가지 카운터 묶음
#[derive(Debug, Clone)]
pub struct RuleCounters {
    pub matched: Arc<Counter>,
    pub not_matched: Arc<Counter>,
    pub failed: Arc<Counter>,
    pub executed: Arc<Counter>,
}

/// 접두어를 적용해 파이프라인/규칙 카운터 이름을 만드는 래퍼
#[derive(Debug, Clone)]
pub struct PipelineMetricRegistry {
    registry: Arc<MetricRegistry>,
    pipeline_prefix: String,
    rule_prefix: String,
}

impl PipelineMetricRegistry {
    /// 파이프라인/규칙 이름 접두어로 레지스트리를 만듭니다.
    pub fn new(
        registry: Arc<MetricRegistry>,
        pipeline_prefix: impl Into<String>,
        rule_prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            pipeline_prefix: pipeline_prefix.into(),
            rule_prefix: rule_prefix.into(),
        }
    }

    /// 처리 엔진 설정의 접두어를 사용합니다.
    pub fn from_config(registry: Arc<MetricRegistry>, config: &ProcessorConfig) -> Self {
        Self::new(
            registry,
            config.pipeline_metric_prefix.clone(),
            config.rule_metric_prefix.clone(),
        )
    }

    /// 하위 카운터 레지스트리
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// 파이프라인 실행 카운터 이름
    pub fn pipeline_executed_name(&self, pipeline_id: &str) -> String {
        format!("{}.{pipeline_id}.executed", self.pipeline_prefix)
    }

    /// 스테이지 실행 카운터 이름
    pub fn stage_executed_name(&self, pipeline_id: &str, stage: i32) -> String {
        format!("{}.{pipeline_id}.stage.{stage}.executed", self.pipeline_prefix)
    }

    /// 전역 규칙 카운터 이름 (`suffix`: matched, not-matched, failed, executed)
    pub fn rule_name(&self, rule_id: &str, suffix: &str) -> String {
        format!("{}.{rule_id}.{suffix}", self.rule_prefix)
    }

    /// 위치별 규칙 카운터 이름
    pub fn rule_local_name(
        &self,
        rule_id: &str,
        pipeline_id: &str,
        stage: i32,
        suffix: &str,
    ) -> String {
        format!("{}.{rule_id}.{pipeline_id}.{stage}.{suffix}", self.rule_prefix)
    }

    /// 파이프라인 실행 카운터
    pub fn pipeline_executed(&self, pipeline_id: &str) -> Arc<Counter> {
        self.registry
            .counter(&self.pipeline_executed_name(pipeline_id))
    }

    /// 스테이지 실행 카운터
    pub fn stage_executed(&self, pipeline_id: &str, stage: i32) -> Arc<Counter> {
        self.registry
            .counter(&self.stage_executed_name(pipeline_id, stage))
    }

    /// 규칙 id에 대한 전역 카운터 (모든 사용 위치가 공유)
    pub fn rule_counters(&self, rule_id: &str) -> RuleCounters {
        RuleCounters {
            matched: self.registry.counter(&self.rule_name(rule_id, "matched")),
            not_matched: self
                .registry
                .counter(&self.rule_name(rule_id, "not-matched")),
            failed: self.registry.counter(&self.rule_name(rule_id, "failed")),
            executed: self.registry.counter(&self.rule_name(rule_id, "executed")),
        }
    }

    /// (파이프라인, 스테이지) 위치별 규칙 카운터
    pub fn rule_local_counters(&self, rule_id: &str, pipeline_id: &str, stage: i32) -> RuleCounters {
        let name = |suffix: &str| self.rule_local_name(rule_id, pipeline_id, stage, suffix);
        RuleCounters {
            matched: self.registry.counter(&name("matched")),
            not_matched: self.registry.counter(&name("not-matched")),
            failed: self.registry.counter(&name("failed")),
            executed: self.registry.counter(&name("executed")),
        }
    }

    /// 파이프라인 id 아래의 모든 카운터를 제거합니다.
    pub fn remove_pipeline_metrics(&self, pipeline_id: &str) -> usize {
        self.registry
            .remove_matching(&format!("{}.{pipeline_id}.", self.pipeline_prefix))
    }

    /// 규칙 id 아래의 모든 카운터(전역 + 위치별)를 제거합니다.
    pub fn remove_rule_metrics(&self, rule_id: &str) -> usize {
        self.registry
            .remove_matching(&format!("{}.{rule_id}.", self.rule_prefix))
    }
}
