//! 규칙/파이프라인 소스 파서
//!
//! 엔진은 [`RuleParser`] trait만 소비합니다. 기본 구현 [`YamlRuleParser`]는
//! YAML 소스를 실행 가능한 AST로 변환하고, 정규식은 이 시점에 컴파일합니다.
//! 파싱 실패는 진단 메시지 목록을 가진 [`ParseError`]로 보고됩니다.

pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::ast::{
    Action, BoolLiteral, Condition, FieldMatch, FieldMatchAll, MatchOperator, Pipeline, Rule,
    Stage, Statement,
};

use self::types::{
    ActionDefinition, ConditionDefinition, ConditionModifier, PipelineDefinition, RuleDefinition,
    WhenClause,
};

/// 구조화된 파싱 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse failed: {}", .errors.join("; "))]
pub struct ParseError {
    /// 진단 메시지 목록
    pub errors: Vec<String>,
}

impl ParseError {
    /// 여러 에러 메시지로 만듭니다.
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    /// 에러 메시지 하나로 만듭니다.
    pub fn single(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }
}

/// 소스 텍스트를 AST로 바꾸는 협력자
pub trait RuleParser: Send + Sync {
    /// 규칙 소스를 파싱합니다. 결과 규칙의 id는 `id`입니다.
    fn parse_rule(&self, id: &str, source: &str) -> Result<Rule, ParseError>;

    /// 파이프라인 소스를 파싱합니다. 스테이지의 규칙 참조는 아직 해석되지 않습니다.
    fn parse_pipeline(&self, id: &str, source: &str) -> Result<Pipeline, ParseError>;
}

/// YAML 방언 파서
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlRuleParser;

impl YamlRuleParser {
    /// YAML 파서를 만듭니다.
    pub fn new() -> Self {
        Self
    }

    fn build_condition(
        index: usize,
        def: &ConditionDefinition,
        errors: &mut Vec<String>,
    ) -> Option<FieldMatch> {
        if def.field.is_empty() {
            errors.push(format!("condition[{index}]: field must not be empty"));
            return None;
        }

        let operator = match def.modifier {
            ConditionModifier::Exists => MatchOperator::Exists,
            ConditionModifier::Gt | ConditionModifier::Lt => {
                let bound = def.value.as_ref().and_then(numeric_operand);
                let Some(bound) = bound else {
                    errors.push(format!(
                        "condition[{index}] for field '{}': numeric value required",
                        def.field
                    ));
                    return None;
                };
                if def.modifier == ConditionModifier::Gt {
                    MatchOperator::GreaterThan(bound)
                } else {
                    MatchOperator::LessThan(bound)
                }
            }
            modifier => {
                let Some(value) = def.value.as_ref().and_then(scalar_operand) else {
                    errors.push(format!(
                        "condition[{index}] for field '{}': scalar value required",
                        def.field
                    ));
                    return None;
                };
                match modifier {
                    ConditionModifier::Contains => MatchOperator::Contains(value),
                    ConditionModifier::StartsWith => MatchOperator::StartsWith(value),
                    ConditionModifier::EndsWith => MatchOperator::EndsWith(value),
                    ConditionModifier::Regex => match Regex::new(&value) {
                        Ok(regex) => MatchOperator::Regex(regex),
                        Err(e) => {
                            errors.push(format!(
                                "invalid regex in condition[{index}] for field '{}': {e}",
                                def.field
                            ));
                            return None;
                        }
                    },
                    _ => MatchOperator::Exact(value),
                }
            }
        };

        Some(FieldMatch::new(def.field.clone(), operator))
    }

    fn build_action(
        index: usize,
        def: &ActionDefinition,
        errors: &mut Vec<String>,
    ) -> Option<Action> {
        fn required(index: usize, name: &str, value: &str, errors: &mut Vec<String>) -> bool {
            if value.is_empty() {
                errors.push(format!("action[{index}]: {name} must not be empty"));
                return false;
            }
            true
        }

        match def {
            ActionDefinition::SetField { field, value } => {
                required(index, "field", field, errors).then(|| Action::SetField {
                    field: field.clone(),
                    value: value.clone(),
                })
            }
            ActionDefinition::RemoveField { field } => {
                required(index, "field", field, errors).then(|| Action::RemoveField {
                    field: field.clone(),
                })
            }
            ActionDefinition::CopyField { from, to } => {
                let ok = required(index, "from", from, errors) & required(index, "to", to, errors);
                ok.then(|| Action::CopyField {
                    from: from.clone(),
                    to: to.clone(),
                })
            }
            ActionDefinition::RouteToStream { stream } => {
                required(index, "stream", stream, errors).then(|| Action::RouteToStream {
                    stream_id: stream.clone(),
                })
            }
            ActionDefinition::CreateMessage {
                message,
                source,
                fields,
            } => Some(Action::CreateMessage {
                message: message.clone(),
                source: source.clone(),
                fields: fields.clone(),
            }),
            ActionDefinition::DropMessage => Some(Action::DropMessage),
        }
    }
}

impl RuleParser for YamlRuleParser {
    fn parse_rule(&self, id: &str, source: &str) -> Result<Rule, ParseError> {
        let def: RuleDefinition = serde_yaml::from_str(source)
            .map_err(|e| ParseError::single(format!("YAML parse error: {e}")))?;

        let mut errors = Vec::new();
        if def.rule.trim().is_empty() {
            errors.push("rule name must not be empty".to_owned());
        }

        let when: Arc<dyn Condition> = match &def.when {
            WhenClause::Literal(value) => Arc::new(BoolLiteral(*value)),
            WhenClause::Conditions(conditions) => {
                let built: Vec<FieldMatch> = conditions
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, c)| Self::build_condition(idx, c, &mut errors))
                    .collect();
                Arc::new(FieldMatchAll(built))
            }
        };

        let then: Vec<Arc<dyn Statement>> = def
            .then
            .iter()
            .enumerate()
            .filter_map(|(idx, a)| Self::build_action(idx, a, &mut errors))
            .map(|action| Arc::new(action) as Arc<dyn Statement>)
            .collect();

        if !errors.is_empty() {
            return Err(ParseError::new(errors));
        }

        Ok(Rule::new(Some(id.to_owned()), def.rule.trim(), when, then))
    }

    fn parse_pipeline(&self, id: &str, source: &str) -> Result<Pipeline, ParseError> {
        let def: PipelineDefinition = serde_yaml::from_str(source)
            .map_err(|e| ParseError::single(format!("YAML parse error: {e}")))?;

        let mut errors = Vec::new();
        if def.pipeline.trim().is_empty() {
            errors.push("pipeline name must not be empty".to_owned());
        }

        let mut seen = BTreeSet::new();
        for stage in &def.stages {
            if !seen.insert(stage.stage) {
                errors.push(format!("duplicate stage number {}", stage.stage));
            }
        }

        if !errors.is_empty() {
            return Err(ParseError::new(errors));
        }

        let stages = def
            .stages
            .into_iter()
            .map(|s| Stage::new(s.stage, s.match_mode, s.rules))
            .collect();
        Ok(Pipeline::new(id, def.pipeline.trim(), stages))
    }
}

fn numeric_operand(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_operand(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
