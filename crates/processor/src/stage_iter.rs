//! 스테이지 반복자
//!
//! 파이프라인 집합의 모든 스테이지를 스테이지 번호로 묶어, 번호 오름차순으로
//! 한 묶음(slice)씩 돌려줍니다. 같은 번호의 스테이지는 파이프라인 id 순서입니다.
//! 묶음 계산 결과([`StageIteratorConfig`])는 불변이므로 캐시해 재사용할 수 있고,
//! 반복 위치는 [`StageIterator`]마다 독립적입니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{Pipeline, Stage};

/// 파이프라인 안의 스테이지 하나를 가리키는 참조
#[derive(Debug, Clone)]
pub struct StageRef {
    pipeline: Arc<Pipeline>,
    index: usize,
}

impl StageRef {
    /// 스테이지가 속한 파이프라인
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// 참조하는 스테이지
    pub fn stage(&self) -> &Stage {
        &self.pipeline.stages()[self.index]
    }
}

/// 스테이지 번호별 묶음 (번호 오름차순)
#[derive(Debug, Default)]
pub struct StageIteratorConfig {
    slices: Vec<Arc<[StageRef]>>,
}

impl StageIteratorConfig {
    /// 파이프라인 집합에서 묶음을 계산합니다.
    pub fn new(pipelines: &[Arc<Pipeline>]) -> Self {
        let mut ordered: Vec<&Arc<Pipeline>> = pipelines.iter().collect();
        ordered.sort_by(|a, b| a.id().cmp(b.id()));
        ordered.dedup_by(|a, b| a.id() == b.id());

        let mut by_number: BTreeMap<i32, Vec<StageRef>> = BTreeMap::new();
        for pipeline in ordered {
            for (index, stage) in pipeline.stages().iter().enumerate() {
                by_number.entry(stage.stage()).or_default().push(StageRef {
                    pipeline: Arc::clone(pipeline),
                    index,
                });
            }
        }

        Self {
            slices: by_number.into_values().map(Arc::from).collect(),
        }
    }

    /// 번호 오름차순 스테이지 묶음
    pub fn slices(&self) -> &[Arc<[StageRef]>] {
        &self.slices
    }

    /// 묶음이 참조하는 파이프라인 인스턴스가 `pipelines`와 같은지 확인합니다.
    pub fn references(&self, pipelines: &[Arc<Pipeline>]) -> bool {
        self.slices.iter().flat_map(|slice| slice.iter()).all(|r| {
            pipelines
                .iter()
                .any(|p| p.id() == r.pipeline.id() && Arc::ptr_eq(p, &r.pipeline))
        })
    }
}

/// 스테이지 묶음 반복자
#[derive(Debug, Clone)]
pub struct StageIterator {
    config: Arc<StageIteratorConfig>,
    next: usize,
}

impl StageIterator {
    /// 계산된 묶음 위를 도는 반복자를 만듭니다.
    pub fn new(config: Arc<StageIteratorConfig>) -> Self {
        Self { config, next: 0 }
    }

    /// 캐시 없이 바로 계산한 반복자
    pub fn uncached(pipelines: &[Arc<Pipeline>]) -> Self {
        Self::new(Arc::new(StageIteratorConfig::new(pipelines)))
    }
}

impl Iterator for StageIterator {
    type Item = Arc<[StageRef]>;

    fn next(&mut self) -> Option<Self::Item> {
        let slice = self.config.slices.get(self.next)?;
        self.next += 1;
        Some(Arc::clone(slice))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.config.slices.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for StageIterator {}
