//! 설정 상태 갱신기
//!
//! [`ConfigurationStateUpdater`]는 최신 [`State`]를 가진 유일한 소유자입니다.
//! 읽기는 잠금 없이 현재 스냅샷의 `Arc`를 복사하고, 재로드는 한 번에 하나만
//! 실행되며 완료되면 새 스냅샷으로 통째로 교체합니다. 재로드가 실패하면
//! 이전 스냅샷이 그대로 유지됩니다.
//!
//! 변경 이벤트마다 재로드가 따로 예약됩니다 (병합하지 않음). 삭제된 규칙/파이프라인의
//! 카운터는 재로드를 기다리지 않고 이벤트 수신 즉시 제거됩니다.
//! 새 상태가 게시되면 [`subscribe`](ConfigurationStateUpdater::subscribe)한
//! 수신자들이 알림을 받습니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ironpipe_core::config::ProcessorConfig;
use ironpipe_core::metrics as m;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ProcessorError;
use crate::metrics::{MetricRegistry, PipelineMetricRegistry};
use crate::resolver::PipelineResolver;
use crate::state::State;

/// 설정 변경 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    RulesChanged {
        updated: Vec<String>,
        deleted: Vec<String>,
    },
    PipelinesChanged {
        updated: Vec<String>,
        deleted: Vec<String>,
    },
    ConnectionsChanged,
    RuleMetricsConfigChanged {
        enabled: bool,
    },
}

/// 최신 상태 보유자 겸 재로드 실행자
pub struct ConfigurationStateUpdater {
    resolver: PipelineResolver,
    metrics: PipelineMetricRegistry,
    cached_iterators: bool,
    rule_metrics_enabled: AtomicBool,
    latest: watch::Sender<Arc<State>>,
    reload_lock: Mutex<()>,
}

impl ConfigurationStateUpdater {
    /// 갱신기를 만들고 첫 상태를 로드합니다.
    ///
    /// # Errors
    /// 첫 재로드가 실패하면 에러를 반환합니다.
    pub fn new(
        resolver: PipelineResolver,
        metrics: PipelineMetricRegistry,
        cached_iterators: bool,
        rule_metrics_enabled: bool,
    ) -> Result<Arc<Self>, ProcessorError> {
        let (latest, _) = watch::channel(Arc::new(State::empty()));
        let updater = Arc::new(Self {
            resolver,
            metrics,
            cached_iterators,
            rule_metrics_enabled: AtomicBool::new(rule_metrics_enabled),
            latest,
            reload_lock: Mutex::new(()),
        });
        updater.reload()?;
        Ok(updater)
    }

    /// 처리 엔진 설정으로 갱신기를 만듭니다.
    pub fn from_config(
        resolver: PipelineResolver,
        registry: Arc<MetricRegistry>,
        config: &ProcessorConfig,
    ) -> Result<Arc<Self>, ProcessorError> {
        Self::new(
            resolver,
            PipelineMetricRegistry::from_config(registry, config),
            config.cached_stage_iterators,
            config.rule_metrics_enabled,
        )
    }

    /// 현재 게시된 상태
    pub fn latest_state(&self) -> Arc<State> {
        self.latest.borrow().clone()
    }

    /// 상태 갱신 알림 수신자
    pub fn subscribe(&self) -> watch::Receiver<Arc<State>> {
        self.latest.subscribe()
    }

    /// 파이프라인/규칙 메트릭 레지스트리
    pub fn metrics(&self) -> &PipelineMetricRegistry {
        &self.metrics
    }

    /// 상태 재구성에 쓰는 리졸버
    pub fn resolver(&self) -> &PipelineResolver {
        &self.resolver
    }

    /// 다음 상태에 적용될 규칙 메트릭 설정
    pub fn rule_metrics_enabled(&self) -> bool {
        self.rule_metrics_enabled.load(Ordering::Relaxed)
    }

    /// 모든 소스를 다시 해석해 새 상태를 게시합니다.
    ///
    /// 동시에 호출되면 하나씩 차례로 실행됩니다.
    pub fn reload(&self) -> Result<Arc<State>, ProcessorError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.build_state() {
            Ok(state) => {
                let state = Arc::new(state);
                self.latest.send_replace(Arc::clone(&state));
                metrics::counter!(m::STATE_RELOADS_TOTAL).increment(1);
                info!(
                    pipelines = state.pipelines().len(),
                    streams = state.stream_connections().len(),
                    rule_metrics = state.rule_metrics_enabled(),
                    "pipeline interpreter state reloaded"
                );
                Ok(state)
            }
            Err(e) => {
                metrics::counter!(m::STATE_RELOAD_FAILURES_TOTAL).increment(1);
                error!(error = %e, "failed to reload pipeline interpreter state, keeping previous state");
                Err(e)
            }
        }
    }

    fn build_state(&self) -> Result<State, ProcessorError> {
        let pipelines = self.resolver.resolve_pipelines(&self.metrics)?;
        let connections = self.resolver.resolve_stream_connections(&pipelines)?;
        Ok(State::new(
            pipelines,
            connections,
            self.rule_metrics_enabled(),
            self.cached_iterators,
        ))
    }

    /// 변경 이벤트를 처리합니다.
    ///
    /// 삭제된 id의 카운터를 즉시 제거한 뒤 재로드를 블로킹 스레드에 예약합니다.
    /// 반환된 핸들은 기다리지 않아도 됩니다.
    pub fn handle_event(self: &Arc<Self>, event: ChangeEvent) -> JoinHandle<()> {
        match &event {
            ChangeEvent::RulesChanged { updated, deleted } => {
                for id in deleted {
                    let removed = self.metrics.remove_rule_metrics(id);
                    debug!(rule_id = %id, removed, "invalidated rule");
                }
                for id in updated {
                    debug!(rule_id = %id, "refreshing rule");
                }
            }
            ChangeEvent::PipelinesChanged { updated, deleted } => {
                for id in deleted {
                    let removed = self.metrics.remove_pipeline_metrics(id);
                    debug!(pipeline_id = %id, removed, "invalidated pipeline");
                }
                for id in updated {
                    debug!(pipeline_id = %id, "refreshing pipeline");
                }
            }
            ChangeEvent::ConnectionsChanged => {
                debug!("pipeline stream connections changed");
            }
            ChangeEvent::RuleMetricsConfigChanged { enabled } => {
                self.rule_metrics_enabled.store(*enabled, Ordering::Relaxed);
                debug!(enabled = *enabled, "rule metrics config changed");
            }
        }

        let updater = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            // 실패는 reload 안에서 기록됨
            let _ = updater.reload();
        })
    }

    /// 이벤트 채널이 닫히거나 취소될 때까지 변경 이벤트를 처리합니다.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
    ) {
        info!("starting configuration state updater");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            debug!(?event, "received configuration change");
                            self.handle_event(event);
                        }
                        None => {
                            info!("change event channel closed, stopping state updater");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("state updater received shutdown signal");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for ConfigurationStateUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStateUpdater")
            .field("cached_iterators", &self.cached_iterators)
            .field("rule_metrics_enabled", &self.rule_metrics_enabled())
            .finish_non_exhaustive()
    }
}
