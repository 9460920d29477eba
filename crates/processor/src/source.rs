//! 규칙/파이프라인/연결 레코드와 레코드 소스
//!
//! 리졸버는 [`RecordSource`]에서 레코드를 한 번 끝까지 당겨 읽습니다.
//! 소스는 데이터베이스 커서일 수도, 메모리 컬렉션일 수도 있습니다.
//! 반복자 항목이 `Err`이면 해석 호출 밖으로 그대로 전파됩니다.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;

/// 저장된 규칙 소스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl RuleRecord {
    /// 규칙 레코드를 만듭니다.
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: source.into(),
            created_at: None,
            modified_at: None,
        }
    }
}

/// 저장된 파이프라인 소스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: String,
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl PipelineRecord {
    /// 파이프라인 레코드를 만듭니다.
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: source.into(),
            created_at: None,
            modified_at: None,
        }
    }
}

/// 스트림 하나에 연결된 파이프라인 id 집합
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConnections {
    pub stream_id: String,
    #[serde(default)]
    pub pipeline_ids: BTreeSet<String>,
}

impl PipelineConnections {
    /// 스트림과 파이프라인 id 목록으로 연결을 만듭니다.
    pub fn new<I, S>(stream_id: impl Into<String>, pipeline_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_id: stream_id.into(),
            pipeline_ids: pipeline_ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// 레코드 반복자. 한 번 순회하면 닫힙니다.
pub type RecordIter<'a, T> = Box<dyn Iterator<Item = Result<T, ProcessorError>> + Send + 'a>;

/// 당겨 읽는 레코드 소스
pub trait RecordSource<T>: Send + Sync {
    /// 전체 레코드를 순회하는 새 반복자를 엽니다.
    fn load_all(&self) -> RecordIter<'_, T>;
}

/// 메모리 기반 레코드 소스
///
/// 내용을 교체할 수 있어서 변경 이벤트와 함께 사용하면 저장소 갱신을 흉내냅니다.
#[derive(Debug)]
pub struct InMemorySource<T> {
    records: RwLock<Vec<T>>,
}

impl<T> Default for InMemorySource<T> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone> InMemorySource<T> {
    /// 주어진 레코드로 저장소를 만듭니다.
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// 전체 내용을 교체합니다.
    pub fn replace(&self, records: Vec<T>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
    }

    /// 레코드를 추가합니다.
    pub fn push(&self, record: T) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// 조건에 맞는 레코드를 제거하고 제거한 수를 반환합니다.
    pub fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| !predicate(r));
        before - records.len()
    }

    /// 현재 레코드 사본
    pub fn snapshot(&self) -> Vec<T> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 레코드가 없으면 `true`
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> RecordSource<T> for InMemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn load_all(&self) -> RecordIter<'_, T> {
        // 순회 도중 교체되어도 반복자는 열린 시점의 내용을 봅니다.
        Box::new(self.snapshot().into_iter().map(Ok))
    }
}
