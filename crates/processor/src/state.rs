//! 설정 스냅샷
//!
//! [`State`]는 한 번 게시되면 바뀌지 않는 설정 묶음입니다. 처리 스레드들은
//! 같은 `Arc<State>`를 공유해 읽고, 새 설정은 항상 새 인스턴스로 교체됩니다.
//! 내부의 스테이지 반복자 캐시만 동시 맵으로 채워집니다.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ironpipe_core::metrics as m;
use tracing::{debug, error};

use crate::ast::Pipeline;
use crate::resolver::{PipelineMap, StreamConnections};
use crate::stage_iter::{StageIterator, StageIteratorConfig};

/// 불변 설정 스냅샷
#[derive(Debug)]
pub struct State {
    pipelines: PipelineMap,
    stream_connections: StreamConnections,
    rule_metrics_enabled: bool,
    cached_iterators: bool,
    /// 정렬된 파이프라인 id 목록 -> 스테이지 묶음
    cache: DashMap<Vec<String>, Arc<StageIteratorConfig>>,
}

impl State {
    /// 해석된 파이프라인과 스트림 연결로 스냅샷을 만듭니다.
    pub fn new(
        pipelines: PipelineMap,
        stream_connections: StreamConnections,
        rule_metrics_enabled: bool,
        cached_iterators: bool,
    ) -> Self {
        Self {
            pipelines,
            stream_connections,
            rule_metrics_enabled,
            cached_iterators,
            cache: DashMap::new(),
        }
    }

    /// 파이프라인도 연결도 없는 상태
    pub fn empty() -> Self {
        Self::new(HashMap::new(), HashMap::new(), false, true)
    }

    /// id -> 파이프라인 맵
    pub fn pipelines(&self) -> &PipelineMap {
        &self.pipelines
    }

    /// id로 파이프라인을 찾습니다.
    pub fn pipeline(&self, id: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    /// 스트림 id -> 연결된 파이프라인 목록
    pub fn stream_connections(&self) -> &StreamConnections {
        &self.stream_connections
    }

    /// 스트림에 연결된 파이프라인. 연결이 없으면 빈 슬라이스.
    pub fn pipelines_for_stream(&self, stream_id: &str) -> &[Arc<Pipeline>] {
        self.stream_connections
            .get(stream_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 규칙 메트릭 기록 여부
    pub fn rule_metrics_enabled(&self) -> bool {
        self.rule_metrics_enabled
    }

    /// 스테이지 반복자 캐시 사용 여부
    pub fn cached_iterators(&self) -> bool {
        self.cached_iterators
    }

    /// 캐시된 스테이지 묶음 수
    pub fn cached_iterator_count(&self) -> usize {
        self.cache.len()
    }

    /// 파이프라인 집합의 스테이지 반복자를 반환합니다.
    ///
    /// 캐시가 켜져 있으면 id 집합을 키로 묶음 계산 결과를 재사용합니다.
    /// 이 스냅샷이 소유하지 않은 파이프라인 인스턴스가 섞여 있으면 캐시를
    /// 건드리지 않고 새로 계산합니다. 캐시 항목은 항상 스냅샷 소유 인스턴스로 만들어집니다.
    pub fn stage_iterator(&self, pipelines: &[Arc<Pipeline>]) -> StageIterator {
        if !self.cached_iterators {
            return StageIterator::uncached(pipelines);
        }
        if !self.owns_all(pipelines) {
            debug!("pipelines are not owned by this state, building uncached stage iterator");
            return StageIterator::uncached(pipelines);
        }

        let mut key: Vec<String> = pipelines.iter().map(|p| p.id().to_owned()).collect();
        key.sort();
        key.dedup();

        let config = if let Some(hit) = self.cache.get(&key) {
            metrics::counter!(m::STATE_STAGE_CACHE_LOOKUPS_TOTAL, m::LABEL_RESULT => "hit")
                .increment(1);
            Arc::clone(hit.value())
        } else {
            metrics::counter!(m::STATE_STAGE_CACHE_LOOKUPS_TOTAL, m::LABEL_RESULT => "miss")
                .increment(1);
            Arc::clone(
                self.cache
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(StageIteratorConfig::new(pipelines)))
                    .value(),
            )
        };

        if config.references(pipelines) {
            StageIterator::new(config)
        } else {
            error!(
                pipelines = ?key,
                "cached stage iterator does not match pipelines, building uncached"
            );
            StageIterator::uncached(pipelines)
        }
    }

    /// 모든 인스턴스가 이 스냅샷의 같은 id 파이프라인과 동일 객체인지
    fn owns_all(&self, pipelines: &[Arc<Pipeline>]) -> bool {
        pipelines.iter().all(|p| {
            self.pipelines
                .get(p.id())
                .is_some_and(|own| Arc::ptr_eq(own, p))
        })
    }
}
