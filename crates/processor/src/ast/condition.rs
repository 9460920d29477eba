//! 조건 평가 -- 필드 매칭 연산자
//!
//! 정규식은 파싱 시점에 한 번만 컴파일되어 [`MatchOperator::Regex`]에 보관됩니다.

use regex::Regex;
use serde_json::Value;

use super::Condition;
use crate::context::{EvalError, EvaluationContext};

/// 고정된 참/거짓 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolLiteral(pub bool);

impl Condition for BoolLiteral {
    fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> Result<bool, EvalError> {
        Ok(self.0)
    }
}

/// 필드 매칭 연산자
#[derive(Debug, Clone)]
pub enum MatchOperator {
    /// 정확히 일치
    Exact(String),
    /// 부분 문자열 포함
    Contains(String),
    /// 접두사 일치
    StartsWith(String),
    /// 접미사 일치
    EndsWith(String),
    /// 정규식 매칭
    Regex(Regex),
    /// 필드 존재
    Exists,
    /// 숫자 필드가 값보다 큼
    GreaterThan(f64),
    /// 숫자 필드가 값보다 작음
    LessThan(f64),
}

/// 단일 필드 조건
#[derive(Debug, Clone)]
pub struct FieldMatch {
    field: String,
    operator: MatchOperator,
}

impl FieldMatch {
    /// 필드와 비교 연산자로 조건을 만듭니다.
    pub fn new(field: impl Into<String>, operator: MatchOperator) -> Self {
        Self {
            field: field.into(),
            operator,
        }
    }

    /// 비교 대상 필드 이름
    pub fn field(&self) -> &str {
        &self.field
    }

    /// 비교 연산자
    pub fn operator(&self) -> &MatchOperator {
        &self.operator
    }
}

impl Condition for FieldMatch {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvalError> {
        let Some(value) = ctx.message().get_field(&self.field) else {
            // 필드가 없으면 매칭 실패
            return Ok(false);
        };

        match &self.operator {
            MatchOperator::Exists => Ok(true),
            MatchOperator::Exact(expected) => Ok(text_of(value) == *expected),
            MatchOperator::Contains(needle) => Ok(text_of(value).contains(needle.as_str())),
            MatchOperator::StartsWith(prefix) => Ok(text_of(value).starts_with(prefix.as_str())),
            MatchOperator::EndsWith(suffix) => Ok(text_of(value).ends_with(suffix.as_str())),
            MatchOperator::Regex(regex) => Ok(regex.is_match(&text_of(value))),
            MatchOperator::GreaterThan(bound) => Ok(self.numeric(value)? > *bound),
            MatchOperator::LessThan(bound) => Ok(self.numeric(value)? < *bound),
        }
    }
}

impl FieldMatch {
    fn numeric(&self, value: &Value) -> Result<f64, EvalError> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| EvalError::NotNumeric {
            field: self.field.clone(),
            value: value.to_string(),
        })
    }
}

/// AND 결합된 필드 조건 목록. 비어 있으면 항상 참입니다.
#[derive(Debug, Clone, Default)]
pub struct FieldMatchAll(pub Vec<FieldMatch>);

impl Condition for FieldMatchAll {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvalError> {
        for condition in &self.0 {
            if !condition.evaluate(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// 비교용 문자열 표현. 문자열은 따옴표 없이, 나머지는 JSON 표기로.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
