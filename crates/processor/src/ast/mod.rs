//! 실행 가능한 AST 모델
//!
//! - [`Rule`]: 이름이 있는 when/then 단위. 조건과 액션은 `Arc`로 공유되고,
//!   사용 위치마다 자기 카운터 핸들을 가진 복사본이 만들어집니다.
//! - [`Stage`]: 번호가 붙은 체크포인트. 매치 정책과 해석된 규칙 목록을 가집니다.
//! - [`Pipeline`]: 스테이지 번호순으로 정렬된 스테이지 집합.
//!
//! 조건과 액션은 [`Condition`] / [`Statement`] trait 뒤에 있어서
//! 평가 전략을 교체할 수 있습니다. 기본 구현은 [`condition`], [`action`] 모듈의
//! 트리 순회 인터프리터입니다.

pub mod action;
pub mod condition;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{EvalError, EvaluationContext};
use crate::metrics::{Counter, PipelineMetricRegistry, RuleCounters};

pub use action::Action;
pub use condition::{BoolLiteral, FieldMatch, FieldMatchAll, MatchOperator};

/// 규칙 조건 평가 전략
pub trait Condition: Send + Sync + fmt::Debug {
    /// 메시지에 대해 조건을 평가합니다.
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvalError>;
}

/// 규칙 액션 실행 전략
pub trait Statement: Send + Sync + fmt::Debug {
    /// 메시지(와 컨텍스트)에 액션을 적용합니다.
    fn execute(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError>;
}

/// 스테이지 매치 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// 모든 규칙 조건이 참이어야 다음 스테이지로 진행
    All,
    /// 하나 이상의 규칙 조건이 참이면 진행 (규칙이 없으면 진행)
    #[default]
    Either,
    /// 결과와 무관하게 항상 진행
    Pass,
}

impl MatchMode {
    /// 스테이지 평가 결과로 파이프라인 진행 여부를 결정합니다.
    pub fn proceeds(self, any_matched: bool, all_matched: bool) -> bool {
        match self {
            Self::All => all_matched,
            Self::Either => any_matched,
            Self::Pass => true,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::Either => "either",
            Self::Pass => "pass",
        };
        f.write_str(s)
    }
}

/// 규칙 사용 위치 하나의 카운터 (전역 + 위치별)
#[derive(Debug, Clone)]
pub struct RuleMetrics {
    global: RuleCounters,
    local: RuleCounters,
}

impl RuleMetrics {
    /// 전역/위치별 카운터 묶음을 만듭니다.
    pub fn new(global: RuleCounters, local: RuleCounters) -> Self {
        Self { global, local }
    }

    /// 규칙 전역 카운터
    pub fn global(&self) -> &RuleCounters {
        &self.global
    }

    /// 파이프라인/스테이지 위치별 카운터
    pub fn local(&self) -> &RuleCounters {
        &self.local
    }
}

/// when/then 규칙
#[derive(Debug, Clone)]
pub struct Rule {
    id: Option<String>,
    name: String,
    when: Arc<dyn Condition>,
    then: Arc<[Arc<dyn Statement>]>,
    metrics: Option<RuleMetrics>,
}

impl Rule {
    /// 규칙을 만듭니다. 메트릭은 아직 등록되지 않습니다.
    pub fn new(
        id: Option<String>,
        name: impl Into<String>,
        when: Arc<dyn Condition>,
        then: Vec<Arc<dyn Statement>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            when,
            then: then.into(),
            metrics: None,
        }
    }

    /// 어떤 메시지에도 매칭되지 않는 대체 규칙. id가 없어 카운터를 등록하지 않습니다.
    pub fn always_false(name: impl Into<String>) -> Self {
        Self::new(None, name, Arc::new(BoolLiteral(false)), Vec::new())
    }

    /// 규칙 레코드 id. 해석되지 않은 참조면 `None`.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 규칙 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `when` 조건
    pub fn when(&self) -> &Arc<dyn Condition> {
        &self.when
    }

    /// `then` 문장 목록
    pub fn then(&self) -> &[Arc<dyn Statement>] {
        &self.then
    }

    /// 등록된 메트릭. 규칙 메트릭이 꺼져 있으면 `None`.
    pub fn metrics(&self) -> Option<&RuleMetrics> {
        self.metrics.as_ref()
    }

    /// (파이프라인, 스테이지) 사용 위치용 복사본을 만들고 카운터를 등록합니다.
    ///
    /// 조건/액션은 공유하고 카운터 핸들만 새로 가집니다.
    pub fn for_location(
        &self,
        registry: &PipelineMetricRegistry,
        pipeline_id: &str,
        stage: i32,
    ) -> Self {
        let mut copy = self.clone();
        copy.metrics = self.id.as_deref().map(|id| {
            RuleMetrics::new(
                registry.rule_counters(id),
                registry.rule_local_counters(id, pipeline_id, stage),
            )
        });
        copy
    }

    /// 조건 일치를 기록합니다.
    pub fn mark_match(&self) {
        self.mark(|c| &c.matched);
    }

    /// 조건 불일치를 기록합니다.
    pub fn mark_non_match(&self) {
        self.mark(|c| &c.not_matched);
    }

    /// 평가 실패를 기록합니다.
    pub fn mark_failure(&self) {
        self.mark(|c| &c.failed);
    }

    /// 액션 실행을 기록합니다.
    pub fn mark_execution(&self) {
        self.mark(|c| &c.executed);
    }

    fn mark(&self, select: impl Fn(&RuleCounters) -> &Arc<Counter>) {
        if let Some(metrics) = &self.metrics {
            select(&metrics.global).increment();
            select(&metrics.local).increment();
        }
    }
}

/// 파이프라인 안의 번호 붙은 스테이지
#[derive(Debug, Clone)]
pub struct Stage {
    stage: i32,
    match_mode: MatchMode,
    rule_references: Vec<String>,
    rules: Vec<Rule>,
    pipeline_id: String,
    executed: Option<Arc<Counter>>,
}

impl Stage {
    /// 규칙 이름 참조만 가진 미해석 스테이지를 만듭니다.
    pub fn new(stage: i32, match_mode: MatchMode, rule_references: Vec<String>) -> Self {
        Self {
            stage,
            match_mode,
            rule_references,
            rules: Vec::new(),
            pipeline_id: String::new(),
            executed: None,
        }
    }

    /// 스테이지 번호
    pub fn stage(&self) -> i32 {
        self.stage
    }

    /// 스테이지 일치 모드
    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// 선언된 규칙 이름 목록
    pub fn rule_references(&self) -> &[String] {
        &self.rule_references
    }

    /// 해석된 규칙 목록
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 소속 파이프라인 id
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// 해석된 규칙 목록을 설정합니다.
    pub fn set_rules(&mut self, rules: Vec<Rule>) {
        self.rules = rules;
    }

    /// 스테이지 실행 카운터를 등록합니다.
    pub fn register_metrics(&mut self, registry: &PipelineMetricRegistry) {
        self.executed = Some(registry.stage_executed(&self.pipeline_id, self.stage));
    }

    /// 스테이지 실행을 기록합니다.
    pub fn mark_execution(&self) {
        if let Some(counter) = &self.executed {
            counter.increment();
        }
    }
}

/// 스테이지 번호순 스테이지 집합
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    name: String,
    stages: Vec<Stage>,
    executed: Option<Arc<Counter>>,
}

impl Pipeline {
    /// 스테이지를 번호순으로 정렬하고 각 스테이지에 소속 파이프라인 id를 기록합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>, stages: Vec<Stage>) -> Self {
        let id = id.into();
        let mut stages = stages;
        stages.sort_by_key(Stage::stage);
        for stage in &mut stages {
            stage.pipeline_id = id.clone();
        }
        Self {
            id,
            name: name.into(),
            stages,
            executed: None,
        }
    }

    /// 스테이지가 없는 파이프라인
    pub fn empty(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, Vec::new())
    }

    /// 파이프라인 레코드 id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 파이프라인 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 번호 오름차순 스테이지 목록
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// 스테이지 목록 (규칙 연결용)
    pub fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }

    /// 같은 스테이지 구성을 다른 id로 복사합니다.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        for stage in &mut self.stages {
            stage.pipeline_id = self.id.clone();
        }
        self
    }

    /// 파이프라인과 스테이지 실행 카운터를 등록합니다.
    pub fn register_metrics(&mut self, registry: &PipelineMetricRegistry) {
        self.executed = Some(registry.pipeline_executed(&self.id));
    }

    /// 파이프라인 실행을 기록합니다.
    pub fn mark_execution(&self) {
        if let Some(counter) = &self.executed {
            counter.increment();
        }
    }
}
