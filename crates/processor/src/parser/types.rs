//! 규칙/파이프라인 YAML 스키마
//!
//! YAML 파일에서 역직렬화되는 구조체들을 정의합니다.
//! 실행 가능한 AST로의 변환은 [`super::YamlRuleParser`]가 담당합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::MatchMode;

/// 규칙 정의 -- 하나의 YAML 규칙 소스에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// rule: tag ssh failures
/// when:
///   - field: message
///     modifier: contains
///     value: "Failed password"
/// then:
///   - action: set_field
///     field: category
///     value: auth
///   - action: route_to_stream
///     stream: security
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// 규칙 이름 (파이프라인 스테이지가 이 이름으로 참조)
    pub rule: String,
    /// 조건. 생략하면 항상 참
    #[serde(default)]
    pub when: WhenClause,
    /// 조건이 참일 때 순서대로 실행할 액션
    #[serde(default)]
    pub then: Vec<ActionDefinition>,
}

/// when 절 -- 불리언 리터럴 또는 AND 결합된 필드 조건 목록
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenClause {
    /// `when: true` / `when: false`
    Literal(bool),
    /// 필드 조건 목록 (모두 참이어야 함)
    Conditions(Vec<ConditionDefinition>),
}

impl Default for WhenClause {
    fn default() -> Self {
        Self::Literal(true)
    }
}

/// 필드 조건
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDefinition {
    /// 대상 필드명
    pub field: String,
    /// 매칭 수정자
    #[serde(default)]
    pub modifier: ConditionModifier,
    /// 비교 값 (`exists`는 생략)
    #[serde(default)]
    pub value: Option<Value>,
}

/// 조건 수정자 -- 매칭 방식을 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionModifier {
    /// 정확히 일치
    #[default]
    Exact,
    /// 부분 문자열 포함
    Contains,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    Regex,
    /// 필드 존재
    Exists,
    /// 숫자 초과
    Gt,
    /// 숫자 미만
    Lt,
}

/// then 절의 액션 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDefinition {
    SetField {
        field: String,
        value: Value,
    },
    RemoveField {
        field: String,
    },
    CopyField {
        from: String,
        to: String,
    },
    RouteToStream {
        stream: String,
    },
    CreateMessage {
        message: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        fields: BTreeMap<String, Value>,
    },
    DropMessage,
}

/// 파이프라인 정의
///
/// # YAML 스키마
/// ```yaml
/// pipeline: auth pipeline
/// stages:
///   - stage: 0
///     match: either
///     rules: ["tag ssh failures"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    /// 파이프라인 이름
    pub pipeline: String,
    /// 스테이지 목록 (순서 무관, 번호로 정렬됨)
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// 스테이지 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDefinition {
    /// 스테이지 번호 (음수 허용, 연속일 필요 없음)
    pub stage: i32,
    /// 매치 정책
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    /// 규칙 이름 참조
    #[serde(default)]
    pub rules: Vec<String>,
}
