//! 규칙 액션 -- 메시지 변경, 스트림 라우팅, 메시지 생성/드롭

use std::collections::BTreeMap;

use ironpipe_core::types::Message;
use serde_json::Value;

use super::Statement;
use crate::context::{EvalError, EvaluationContext};

/// then 절의 액션 하나
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// 필드 설정 (덮어쓰기)
    SetField { field: String, value: Value },
    /// 필드 제거 (없어도 성공)
    RemoveField { field: String },
    /// 필드 복사. 원본 필드가 없으면 평가 에러
    CopyField { from: String, to: String },
    /// 스트림에 메시지 추가
    RouteToStream { stream_id: String },
    /// 새 메시지 생성. 스트림 없이 시작합니다.
    CreateMessage {
        message: String,
        source: Option<String>,
        fields: BTreeMap<String, Value>,
    },
    /// 메시지를 필터링 대상으로 표시
    DropMessage,
}

impl Statement for Action {
    fn execute(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
        match self {
            Self::SetField { field, value } => {
                ctx.message_mut().set_field(field.clone(), value.clone());
            }
            Self::RemoveField { field } => {
                ctx.message_mut().remove_field(field);
            }
            Self::CopyField { from, to } => {
                let value = ctx
                    .message()
                    .get_field(from)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingField {
                        field: from.clone(),
                    })?;
                ctx.message_mut().set_field(to.clone(), value);
            }
            Self::RouteToStream { stream_id } => {
                ctx.message_mut().add_stream(stream_id.clone());
            }
            Self::CreateMessage {
                message,
                source,
                fields,
            } => {
                let source = source
                    .clone()
                    .or_else(|| {
                        ctx.message()
                            .get_field(ironpipe_core::types::FIELD_SOURCE)
                            .and_then(Value::as_str)
                            .map(str::to_owned)
                    })
                    .unwrap_or_default();
                let mut created = Message::new(message.clone(), source);
                for (name, value) in fields {
                    created.set_field(name.clone(), value.clone());
                }
                ctx.add_created_message(created);
            }
            Self::DropMessage => {
                ctx.message_mut().set_filter_out(true);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironpipe_core::types::FIELD_SOURCE;
    use serde_json::json;

    fn run(action: &Action, msg: &mut Message) -> (Result<(), EvalError>, Vec<Message>) {
        let mut ctx = EvaluationContext::new(msg);
        let result = action.execute(&mut ctx);
        (result, ctx.take_created_messages())
    }

    #[test]
    fn set_and_remove_field() {
        let mut msg = Message::new("body", "host");
        run(
            &Action::SetField {
                field: "category".to_owned(),
                value: json!("auth"),
            },
            &mut msg,
        )
        .0
        .unwrap();
        assert_eq!(msg.get_field("category"), Some(&json!("auth")));

        run(
            &Action::RemoveField {
                field: "category".to_owned(),
            },
            &mut msg,
        )
        .0
        .unwrap();
        assert!(!msg.has_field("category"));
    }

    #[test]
    fn copy_field_from_missing_source_fails() {
        let mut msg = Message::new("body", "host");
        let (result, _) = run(
            &Action::CopyField {
                from: "user".to_owned(),
                to: "actor".to_owned(),
            },
            &mut msg,
        );
        assert_eq!(
            result.unwrap_err(),
            EvalError::MissingField {
                field: "user".to_owned()
            }
        );
        assert!(!msg.has_field("actor"));
    }

    #[test]
    fn copy_field_duplicates_value() {
        let mut msg = Message::new("body", "host");
        run(
            &Action::CopyField {
                from: FIELD_SOURCE.to_owned(),
                to: "origin".to_owned(),
            },
            &mut msg,
        )
        .0
        .unwrap();
        assert_eq!(msg.get_field("origin"), Some(&json!("host")));
    }

    #[test]
    fn route_to_stream_adds_membership() {
        let mut msg = Message::new("body", "host");
        run(
            &Action::RouteToStream {
                stream_id: "security".to_owned(),
            },
            &mut msg,
        )
        .0
        .unwrap();
        assert!(msg.streams().contains("security"));
    }

    #[test]
    fn create_message_inherits_source_and_has_no_streams() {
        let mut msg = Message::new("original", "host-7");
        msg.add_stream("s1");
        let mut extra = BTreeMap::new();
        extra.insert("derived".to_owned(), json!(true));
        let (result, created) = run(
            &Action::CreateMessage {
                message: "derived".to_owned(),
                source: None,
                fields: extra,
            },
            &mut msg,
        );
        result.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].message(), Some("derived"));
        assert_eq!(created[0].get_field(FIELD_SOURCE), Some(&json!("host-7")));
        assert_eq!(created[0].get_field("derived"), Some(&json!(true)));
        assert!(created[0].streams().is_empty());
    }

    #[test]
    fn drop_message_sets_filter_flag() {
        let mut msg = Message::new("body", "host");
        run(&Action::DropMessage, &mut msg).0.unwrap();
        assert!(msg.filter_out());
    }
}
