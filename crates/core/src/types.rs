//! 도메인 타입 -- 처리 엔진이 다루는 메시지
//!
//! [`Message`]는 필드 맵, 현재 속한 스트림 집합, 필터 플래그를 가집니다.
//! 한 번의 처리 호출 동안 호출자가 단독으로 소유합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 기본 스트림 id
pub const DEFAULT_STREAM_ID: &str = "000000000000000000000001";

/// 본문 필드 이름
pub const FIELD_MESSAGE: &str = "message";
/// 소스 필드 이름
pub const FIELD_SOURCE: &str = "source";
/// 타임스탬프 필드 이름 (RFC 3339)
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// 처리 에러 필드 이름
pub const FIELD_PROCESSING_ERROR: &str = "processing_error";

/// 처리 대상 로그 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    streams: BTreeSet<String>,
    #[serde(default)]
    filter_out: bool,
}

impl Message {
    /// 본문과 소스로 새 메시지를 만듭니다. 스트림은 비어 있습니다.
    pub fn new(message: impl Into<String>, source: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_MESSAGE.to_owned(), Value::String(message.into()));
        fields.insert(FIELD_SOURCE.to_owned(), Value::String(source.into()));
        fields.insert(
            FIELD_TIMESTAMP.to_owned(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Self {
            id: new_message_id(),
            fields,
            streams: BTreeSet::new(),
            filter_out: false,
        }
    }

    /// 임의의 필드 맵으로 메시지를 만듭니다.
    ///
    /// `timestamp`가 없으면 현재 시각을 채웁니다.
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        let mut fields = fields;
        fields.entry(FIELD_TIMESTAMP.to_owned()).or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        });
        Self {
            id: new_message_id(),
            fields,
            streams: BTreeSet::new(),
            filter_out: false,
        }
    }

    /// 메시지 id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 본문 필드 (문자열일 때만)
    pub fn message(&self) -> Option<&str> {
        self.fields.get(FIELD_MESSAGE).and_then(Value::as_str)
    }

    /// 전체 필드 맵
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// 필드 값. 없으면 `None`.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 필드 존재 여부
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// 필드를 설정하고 이전 값을 반환합니다.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// 필드를 제거하고 이전 값을 반환합니다.
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// 현재 속한 스트림 id 집합
    pub fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    /// 스트림을 추가합니다. 새로 추가되었으면 `true`.
    pub fn add_stream(&mut self, stream_id: impl Into<String>) -> bool {
        self.streams.insert(stream_id.into())
    }

    /// 드롭 표시 여부. 처리 후 출력에서 걸러집니다.
    pub fn filter_out(&self) -> bool {
        self.filter_out
    }

    /// 드롭 표시를 설정합니다.
    pub fn set_filter_out(&mut self, filter_out: bool) {
        self.filter_out = filter_out;
    }

    /// 처리 에러를 `processing_error` 필드에 덧붙입니다.
    ///
    /// 기존 값이 있으면 `,`로 이어 붙입니다.
    pub fn add_processing_error(&mut self, error: impl AsRef<str>) {
        let error = error.as_ref();
        let joined = match self.fields.get(FIELD_PROCESSING_ERROR).and_then(Value::as_str) {
            Some(existing) if !existing.is_empty() => format!("{existing},{error}"),
            _ => error.to_owned(),
        };
        self.fields
            .insert(FIELD_PROCESSING_ERROR.to_owned(), Value::String(joined));
    }

    /// 누적된 처리 에러 문자열
    pub fn processing_error(&self) -> Option<&str> {
        self.fields
            .get(FIELD_PROCESSING_ERROR)
            .and_then(Value::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} streams={} message={}",
            self.id,
            self.streams.len(),
            self.message().unwrap_or("<none>"),
        )
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
