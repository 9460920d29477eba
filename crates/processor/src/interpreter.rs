//! 파이프라인 인터프리터 -- 메시지 스트림 라우팅 고정점 루프
//!
//! 메시지마다 현재 속한 스트림에 연결된 파이프라인을 골라 스테이지 번호순으로
//! 실행하고, 실행 중 새 스트림이 추가되면 같은 메시지를 다음 패스에서 다시 처리합니다.
//! 이미 한 번 처리된 (메시지 id, 스트림 id) 쌍은 블랙리스트에 올라 다시 실행되지 않으므로,
//! 규칙이 이미 속한 스트림을 다시 추가해도 루프가 끝납니다.
//!
//! # 사용 예시
//! ```ignore
//! let interpreter = PipelineInterpreter::new(updater);
//! let processed = interpreter.process_batch(vec![Message::new("hello", "host")]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ironpipe_core::metrics as m;
use ironpipe_core::types::Message;
use tracing::{debug, warn};

use crate::ast::{Pipeline, Rule, Stage};
use crate::context::EvaluationContext;
use crate::listener::{InterpreterListener, NoopInterpreterListener, RuleMetricsListener};
use crate::state::State;
use crate::updater::ConfigurationStateUpdater;

/// 필터링된 메시지를 상위 큐에 확인(ack)하는 협력자
pub trait MessageAcknowledger: Send + Sync {
    fn acknowledge(&self, message: &Message);
}

/// 아무것도 하지 않는 확인자
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAcknowledger;

impl MessageAcknowledger for NoopAcknowledger {
    fn acknowledge(&self, _message: &Message) {}
}

/// 파이프라인 인터프리터
pub struct PipelineInterpreter {
    updater: Arc<ConfigurationStateUpdater>,
    acknowledger: Arc<dyn MessageAcknowledger>,
    /// 메시지당 최대 패스 수 (0 = 제한 없음)
    max_passes: usize,
}

impl PipelineInterpreter {
    /// 업데이터가 게시하는 최신 상태로 처리하는 인터프리터를 만듭니다.
    pub fn new(updater: Arc<ConfigurationStateUpdater>) -> Self {
        Self {
            updater,
            acknowledger: Arc::new(NoopAcknowledger),
            max_passes: 0,
        }
    }

    /// 드롭된 메시지 확인 처리기를 지정합니다.
    pub fn with_acknowledger(mut self, acknowledger: Arc<dyn MessageAcknowledger>) -> Self {
        self.acknowledger = acknowledger;
        self
    }

    /// 메시지당 최대 패스 수를 지정합니다. `0`이면 무제한.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// 메시지당 최대 패스 수
    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// 상태 업데이터
    pub fn updater(&self) -> &Arc<ConfigurationStateUpdater> {
        &self.updater
    }

    /// 최신 상태로 메시지 배치를 처리합니다.
    ///
    /// 상태의 규칙 메트릭 플래그가 켜져 있으면 규칙 실행 시간을 기록합니다.
    pub fn process_batch(&self, messages: Vec<Message>) -> Vec<Message> {
        let started = Instant::now();
        let state = self.updater.latest_state();
        let processed = if state.rule_metrics_enabled() {
            self.process(messages, &RuleMetricsListener::new(), &state)
        } else {
            self.process(messages, &NoopInterpreterListener, &state)
        };
        metrics::histogram!(m::PROCESSOR_EXECUTION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        processed
    }

    /// 스트림 연결에 따라 메시지를 처리하고, 처리가 끝난 메시지와 생성된 메시지를 반환합니다.
    ///
    /// 필터링된 메시지도 확인 후 결과에 포함됩니다 (`filter_out() == true`).
    pub fn process(
        &self,
        messages: Vec<Message>,
        listener: &dyn InterpreterListener,
        state: &State,
    ) -> Vec<Message> {
        listener.start_processing();

        // (메시지 id, 스트림 id)
        let mut blacklist: HashSet<(String, String)> = HashSet::new();
        let mut passes: HashMap<String, usize> = HashMap::new();
        let mut fully_processed = Vec::with_capacity(messages.len());
        let mut to_process = messages;

        while !to_process.is_empty() {
            let current = std::mem::take(&mut to_process);

            for mut message in current {
                let msg_id = message.id().to_owned();
                let pass = {
                    let count = passes.entry(msg_id.clone()).or_insert(0);
                    *count += 1;
                    *count
                };

                let initial_streams = message.streams().clone();
                let pipelines =
                    Self::select_pipelines(listener, &blacklist, &message, &initial_streams, state);

                let created =
                    self.process_for_resolved_pipelines(&mut message, &pipelines, listener, state);
                to_process.extend(created);

                let added_streams =
                    Self::update_stream_blacklist(&mut blacklist, &message, &initial_streams);
                self.potentially_drop_filtered_message(&message);

                if !added_streams || message.filter_out() {
                    debug!(message_id = %msg_id, "no new streams matched or message dropped, not running again");
                    Self::finalize(&mut fully_processed, message);
                } else if self.max_passes > 0 && pass >= self.max_passes {
                    warn!(
                        message_id = %msg_id,
                        passes = pass,
                        "routing did not stabilize, giving up on message"
                    );
                    metrics::counter!(m::PROCESSOR_PASS_LIMIT_EXCEEDED_TOTAL).increment(1);
                    message.add_processing_error(format!(
                        "routing did not stabilize after {pass} passes"
                    ));
                    Self::finalize(&mut fully_processed, message);
                } else {
                    debug!(message_id = %msg_id, "new streams assigned, running again for those streams");
                    to_process.push(message);
                }
            }
        }

        listener.finish_processing();
        fully_processed
    }

    /// 명시한 파이프라인 id로 메시지 하나를 처리합니다. 스트림 연결은 보지 않습니다.
    ///
    /// 처리 중 생성된 메시지를 반환합니다. 입력 메시지는 제자리에서 변경됩니다.
    /// 상태에 없는 id는 무시합니다.
    pub fn process_for_pipelines<S: AsRef<str>>(
        &self,
        message: &mut Message,
        pipeline_ids: &[S],
        listener: &dyn InterpreterListener,
        state: &State,
    ) -> Vec<Message> {
        let mut selected: BTreeMap<&str, Arc<Pipeline>> = BTreeMap::new();
        for id in pipeline_ids {
            if let Some(pipeline) = state.pipeline(id.as_ref()) {
                selected.insert(pipeline.id(), Arc::clone(pipeline));
            }
        }
        let pipelines: Vec<Arc<Pipeline>> = selected.into_values().collect();
        self.process_for_resolved_pipelines(message, &pipelines, listener, state)
    }

    fn finalize(fully_processed: &mut Vec<Message>, message: Message) {
        metrics::counter!(m::PROCESSOR_MESSAGES_PROCESSED_TOTAL).increment(1);
        fully_processed.push(message);
    }

    fn potentially_drop_filtered_message(&self, message: &Message) {
        if message.filter_out() {
            debug!(message_id = %message.id(), "message marked to be discarded, dropping");
            metrics::counter!(m::PROCESSOR_MESSAGES_FILTERED_TOTAL).increment(1);
            self.acknowledger.acknowledge(message);
        }
    }

    /// 처리 전부터 있던 스트림은 블랙리스트에 올리고, 새 스트림이 있었는지 반환합니다.
    fn update_stream_blacklist(
        blacklist: &mut HashSet<(String, String)>,
        message: &Message,
        initial_streams: &BTreeSet<String>,
    ) -> bool {
        let mut added_streams = false;
        for stream_id in message.streams() {
            if initial_streams.contains(stream_id) {
                blacklist.insert((message.id().to_owned(), stream_id.clone()));
            } else {
                added_streams = true;
            }
        }
        added_streams
    }

    /// 블랙리스트에 없는 스트림에 연결된 파이프라인의 합집합 (id 순)
    fn select_pipelines(
        listener: &dyn InterpreterListener,
        blacklist: &HashSet<(String, String)>,
        message: &Message,
        initial_streams: &BTreeSet<String>,
        state: &State,
    ) -> Vec<Arc<Pipeline>> {
        let msg_id = message.id();
        let streams: BTreeSet<String> = initial_streams
            .iter()
            .filter(|s| !blacklist.contains(&(msg_id.to_owned(), (*s).clone())))
            .filter(|s| state.stream_connections().contains_key(s.as_str()))
            .cloned()
            .collect();

        let mut selected: BTreeMap<&str, &Arc<Pipeline>> = BTreeMap::new();
        for stream_id in &streams {
            for pipeline in state.pipelines_for_stream(stream_id) {
                selected.insert(pipeline.id(), pipeline);
            }
        }
        let pipelines: Vec<Arc<Pipeline>> = selected.into_values().map(Arc::clone).collect();

        let refs: Vec<&Pipeline> = pipelines.iter().map(|p| &**p).collect();
        listener.process_streams(message, &refs, &streams);
        debug!(
            message_id = %msg_id,
            pipelines = ?refs.iter().map(|p| p.id()).collect::<Vec<_>>(),
            streams = ?streams,
            "running pipelines for streams"
        );
        pipelines
    }

    fn process_for_resolved_pipelines(
        &self,
        message: &mut Message,
        pipelines: &[Arc<Pipeline>],
        listener: &dyn InterpreterListener,
        state: &State,
    ) -> Vec<Message> {
        let mut result = Vec::new();
        for pipeline in pipelines {
            pipeline.mark_execution();
        }

        let mut pipelines_to_skip: HashSet<String> = HashSet::new();
        for slice in state.stage_iterator(pipelines) {
            if message.filter_out() {
                debug!(message_id = %message.id(), "message dropped, skipping remaining stages");
                break;
            }
            for stage_ref in slice.iter() {
                let pipeline = stage_ref.pipeline();
                if pipelines_to_skip.contains(pipeline.id()) {
                    debug!(
                        message_id = %message.id(),
                        pipeline = %pipeline.name(),
                        "previous stage result prevents further processing of pipeline"
                    );
                    continue;
                }
                let proceed =
                    Self::evaluate_stage(stage_ref.stage(), pipeline, message, &mut result, listener);
                if !proceed {
                    pipelines_to_skip.insert(pipeline.id().to_owned());
                }
            }
        }

        result
    }

    /// 스테이지 하나를 평가하고 파이프라인이 다음 스테이지로 진행할지 반환합니다.
    fn evaluate_stage(
        stage: &Stage,
        pipeline: &Pipeline,
        message: &mut Message,
        result: &mut Vec<Message>,
        listener: &dyn InterpreterListener,
    ) -> bool {
        stage.mark_execution();
        listener.enter_stage(stage);
        debug!(
            message_id = %message.id(),
            stage = stage.stage(),
            match_mode = %stage.match_mode(),
            "evaluating rule conditions in stage"
        );

        let mut ctx = EvaluationContext::new(message);

        let rules = stage.rules();
        let mut rules_to_run: Vec<&Rule> = Vec::with_capacity(rules.len());
        // 규칙이 없으면 다음 스테이지로 진행
        let mut any_matched = rules.is_empty();
        let mut all_matched = true;
        for rule in rules {
            let matched = Self::evaluate_rule_condition(rule, pipeline, &mut ctx, listener);
            if matched {
                rules_to_run.push(rule);
            }
            any_matched |= matched;
            all_matched &= matched;
        }

        for rule in rules_to_run {
            if !Self::execute_rule_actions(rule, pipeline, &mut ctx, listener) {
                // 실패하면 이 스테이지의 나머지 규칙 액션은 건너뜀
                break;
            }
        }

        let proceed = stage.match_mode().proceeds(any_matched, all_matched);
        if proceed {
            listener.continue_pipeline_execution(pipeline, stage);
            debug!(
                stage = stage.stage(),
                pipeline = %pipeline.name(),
                match_mode = %stage.match_mode(),
                "ok to proceed with next stage"
            );
        } else {
            listener.stop_pipeline_execution(pipeline, stage);
            debug!(
                stage = stage.stage(),
                pipeline = %pipeline.name(),
                match_mode = %stage.match_mode(),
                "not ok to proceed with next stage"
            );
        }

        result.extend(ctx.take_created_messages());
        drop(ctx);
        listener.exit_stage(stage);
        proceed
    }

    fn evaluate_rule_condition(
        rule: &Rule,
        pipeline: &Pipeline,
        ctx: &mut EvaluationContext<'_>,
        listener: &dyn InterpreterListener,
    ) -> bool {
        listener.evaluate_rule(rule, pipeline);
        match rule.when().evaluate(ctx) {
            Ok(true) => {
                rule.mark_match();
                listener.satisfy_rule(rule, pipeline);
                debug!(rule = %rule.name(), "rule matches, scheduling to run");
                true
            }
            Ok(false) => {
                rule.mark_non_match();
                listener.dissatisfy_rule(rule, pipeline);
                debug!(rule = %rule.name(), "rule does not match");
                false
            }
            Err(e) => {
                rule.mark_failure();
                Self::append_processing_error(rule, ctx.message_mut(), &e.to_string());
                ctx.add_error(e);
                listener.fail_evaluate_rule(rule, pipeline);
                debug!(rule = %rule.name(), "evaluation error during condition, skipping rule actions");
                false
            }
        }
    }

    fn execute_rule_actions(
        rule: &Rule,
        pipeline: &Pipeline,
        ctx: &mut EvaluationContext<'_>,
        listener: &dyn InterpreterListener,
    ) -> bool {
        rule.mark_execution();
        listener.execute_rule(rule, pipeline);
        debug!(rule = %rule.name(), "rule matched, running actions");

        let mut succeeded = true;
        for statement in rule.then() {
            if let Err(e) = statement.execute(ctx) {
                Self::append_processing_error(rule, ctx.message_mut(), &e.to_string());
                ctx.add_error(e);
                listener.fail_execute_rule(rule, pipeline);
                debug!(rule = %rule.name(), "evaluation error, skipping rest of the rule");
                rule.mark_failure();
                succeeded = false;
                break;
            }
        }

        listener.finish_execute_rule(rule, pipeline);
        succeeded
    }

    fn append_processing_error(rule: &Rule, message: &mut Message, error: &str) {
        message.add_processing_error(format!("For rule '{}': {error}", rule.name()));
    }
}

impl std::fmt::Debug for PipelineInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInterpreter")
            .field("max_passes", &self.max_passes)
            .finish_non_exhaustive()
    }
}
