//! 인터프리터 관찰 훅
//!
//! [`InterpreterListener`]는 추적/텔레메트리 전용이며 제어 흐름에 영향을 주지 않습니다.
//! 모든 메서드는 빈 기본 구현을 가집니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use ironpipe_core::metrics as m;
use ironpipe_core::types::Message;
use serde::Serialize;

use crate::ast::{Pipeline, Rule, Stage};

/// 인터프리터 실행 관찰자
#[allow(unused_variables)]
pub trait InterpreterListener: Send + Sync {
    fn start_processing(&self) {}

    fn finish_processing(&self) {}

    /// 메시지 하나에 대해 선택된 파이프라인
    fn process_streams(&self, message: &Message, pipelines: &[&Pipeline], streams: &BTreeSet<String>) {}

    fn enter_stage(&self, stage: &Stage) {}

    fn exit_stage(&self, stage: &Stage) {}

    fn evaluate_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn satisfy_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn dissatisfy_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn fail_evaluate_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn finish_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn fail_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {}

    fn continue_pipeline_execution(&self, pipeline: &Pipeline, stage: &Stage) {}

    fn stop_pipeline_execution(&self, pipeline: &Pipeline, stage: &Stage) {}
}

/// 아무것도 하지 않는 관찰자
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterpreterListener;

impl InterpreterListener for NoopInterpreterListener {}

/// 규칙 실행 시간을 `metrics` 히스토그램으로 기록하는 관찰자
#[derive(Debug, Default)]
pub struct RuleMetricsListener {
    started: Mutex<HashMap<String, Instant>>,
}

impl RuleMetricsListener {
    /// 규칙 메트릭 리스너를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn timer_key(rule: &Rule, pipeline: &Pipeline) -> Option<String> {
        rule.id().map(|id| format!("{id}/{}", pipeline.id()))
    }

    fn start(&self, rule: &Rule, pipeline: &Pipeline) {
        if let Some(key) = Self::timer_key(rule, pipeline) {
            self.started
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Instant::now());
        }
    }

    fn stop(&self, rule: &Rule, pipeline: &Pipeline) {
        let (Some(key), Some(rule_id)) = (Self::timer_key(rule, pipeline), rule.id()) else {
            return;
        };
        let started = self
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if let Some(started) = started {
            metrics::histogram!(
                m::PROCESSOR_RULE_EXECUTION_DURATION_SECONDS,
                m::LABEL_RULE_ID => rule_id.to_owned()
            )
            .record(started.elapsed().as_secs_f64());
        }
    }

    /// 아직 끝나지 않은 측정 수
    pub fn pending(&self) -> usize {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl InterpreterListener for RuleMetricsListener {
    fn execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.start(rule, pipeline);
    }

    fn finish_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.stop(rule, pipeline);
    }

    fn fail_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.stop(rule, pipeline);
    }
}

/// 기록된 관찰 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListenerEvent {
    StartProcessing,
    FinishProcessing,
    ProcessStreams {
        message_id: String,
        pipelines: Vec<String>,
        streams: Vec<String>,
    },
    EnterStage { pipeline: String, stage: i32 },
    ExitStage { pipeline: String, stage: i32 },
    EvaluateRule { pipeline: String, rule: String },
    SatisfyRule { pipeline: String, rule: String },
    DissatisfyRule { pipeline: String, rule: String },
    FailEvaluateRule { pipeline: String, rule: String },
    ExecuteRule { pipeline: String, rule: String },
    FinishExecuteRule { pipeline: String, rule: String },
    FailExecuteRule { pipeline: String, rule: String },
    ContinuePipeline { pipeline: String, stage: i32 },
    StopPipeline { pipeline: String, stage: i32 },
}

impl std::fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartProcessing => write!(f, "start processing"),
            Self::FinishProcessing => write!(f, "finish processing"),
            Self::ProcessStreams {
                message_id,
                pipelines,
                streams,
            } => write!(
                f,
                "message {message_id} on streams [{}] runs pipelines [{}]",
                streams.join(", "),
                pipelines.join(", ")
            ),
            Self::EnterStage { pipeline, stage } => write!(f, "enter stage {stage} of {pipeline}"),
            Self::ExitStage { pipeline, stage } => write!(f, "exit stage {stage} of {pipeline}"),
            Self::EvaluateRule { pipeline, rule } => write!(f, "evaluate '{rule}' in {pipeline}"),
            Self::SatisfyRule { pipeline, rule } => write!(f, "'{rule}' matched in {pipeline}"),
            Self::DissatisfyRule { pipeline, rule } => {
                write!(f, "'{rule}' did not match in {pipeline}")
            }
            Self::FailEvaluateRule { pipeline, rule } => {
                write!(f, "'{rule}' failed to evaluate in {pipeline}")
            }
            Self::ExecuteRule { pipeline, rule } => write!(f, "execute '{rule}' in {pipeline}"),
            Self::FinishExecuteRule { pipeline, rule } => {
                write!(f, "finished '{rule}' in {pipeline}")
            }
            Self::FailExecuteRule { pipeline, rule } => {
                write!(f, "'{rule}' failed to execute in {pipeline}")
            }
            Self::ContinuePipeline { pipeline, stage } => {
                write!(f, "{pipeline} continues after stage {stage}")
            }
            Self::StopPipeline { pipeline, stage } => {
                write!(f, "{pipeline} stops after stage {stage}")
            }
        }
    }
}

/// 모든 훅 호출을 순서대로 기록하는 관찰자 (시뮬레이션 추적용)
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    /// 빈 기록 리스너를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 기록된 이벤트 사본
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: ListenerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn stage_event(
        stage: &Stage,
        make: fn(String, i32) -> ListenerEvent,
    ) -> ListenerEvent {
        make(stage.pipeline_id().to_owned(), stage.stage())
    }

    fn rule_event(
        rule: &Rule,
        pipeline: &Pipeline,
        make: fn(String, String) -> ListenerEvent,
    ) -> ListenerEvent {
        make(pipeline.id().to_owned(), rule.name().to_owned())
    }
}

impl InterpreterListener for RecordingListener {
    fn start_processing(&self) {
        self.record(ListenerEvent::StartProcessing);
    }

    fn finish_processing(&self) {
        self.record(ListenerEvent::FinishProcessing);
    }

    fn process_streams(&self, message: &Message, pipelines: &[&Pipeline], streams: &BTreeSet<String>) {
        self.record(ListenerEvent::ProcessStreams {
            message_id: message.id().to_owned(),
            pipelines: pipelines.iter().map(|p| p.id().to_owned()).collect(),
            streams: streams.iter().cloned().collect(),
        });
    }

    fn enter_stage(&self, stage: &Stage) {
        self.record(Self::stage_event(stage, |pipeline, stage| {
            ListenerEvent::EnterStage { pipeline, stage }
        }));
    }

    fn exit_stage(&self, stage: &Stage) {
        self.record(Self::stage_event(stage, |pipeline, stage| {
            ListenerEvent::ExitStage { pipeline, stage }
        }));
    }

    fn evaluate_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::EvaluateRule { pipeline, rule }
        }));
    }

    fn satisfy_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::SatisfyRule { pipeline, rule }
        }));
    }

    fn dissatisfy_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::DissatisfyRule { pipeline, rule }
        }));
    }

    fn fail_evaluate_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::FailEvaluateRule { pipeline, rule }
        }));
    }

    fn execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::ExecuteRule { pipeline, rule }
        }));
    }

    fn finish_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::FinishExecuteRule { pipeline, rule }
        }));
    }

    fn fail_execute_rule(&self, rule: &Rule, pipeline: &Pipeline) {
        self.record(Self::rule_event(rule, pipeline, |pipeline, rule| {
            ListenerEvent::FailExecuteRule { pipeline, rule }
        }));
    }

    fn continue_pipeline_execution(&self, pipeline: &Pipeline, stage: &Stage) {
        self.record(ListenerEvent::ContinuePipeline {
            pipeline: pipeline.id().to_owned(),
            stage: stage.stage(),
        });
    }

    fn stop_pipeline_execution(&self, pipeline: &Pipeline, stage: &Stage) {
        self.record(ListenerEvent::StopPipeline {
            pipeline: pipeline.id().to_owned(),
            stage: stage.stage(),
        });
    }
}
