//! 스테이지 평가 컨텍스트
//!
//! [`EvaluationContext`]는 (메시지, 스테이지) 한 쌍의 평가 동안만 살아 있는
//! 작업 공간입니다. 대상 메시지에 대한 가변 참조, 이번 스테이지에서 새로 만든
//! 메시지, 평가 에러 목록을 담습니다.

use ironpipe_core::types::Message;

/// 규칙 조건/액션 실행 중 발생한 평가 에러
///
/// `Display` 출력이 메시지의 `processing_error` 항목 본문이 됩니다.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// 필요한 필드가 없음
    #[error("field '{field}' does not exist")]
    MissingField { field: String },

    /// 숫자 비교 대상 필드가 숫자가 아님
    #[error("field '{field}' is not numeric: {value}")]
    NotNumeric { field: String, value: String },

    /// 기타 평가 실패
    #[error("{0}")]
    Other(String),
}

/// (메시지, 스테이지) 평가 작업 공간
#[derive(Debug)]
pub struct EvaluationContext<'a> {
    message: &'a mut Message,
    created_messages: Vec<Message>,
    errors: Vec<EvalError>,
}

impl<'a> EvaluationContext<'a> {
    /// 처리 중인 메시지로 컨텍스트를 만듭니다.
    pub fn new(message: &'a mut Message) -> Self {
        Self {
            message,
            created_messages: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// 처리 중인 메시지
    pub fn message(&self) -> &Message {
        self.message
    }

    /// 처리 중인 메시지 (수정 가능)
    pub fn message_mut(&mut self) -> &mut Message {
        self.message
    }

    /// 새 메시지를 생성 버퍼에 추가합니다.
    ///
    /// 같은 스테이지의 조건에서는 보이지 않고, 스테이지 종료 시 결과로 옮겨집니다.
    pub fn add_created_message(&mut self, message: Message) {
        self.created_messages.push(message);
    }

    /// 평가 중 새로 만든 메시지
    pub fn created_messages(&self) -> &[Message] {
        &self.created_messages
    }

    /// 생성 버퍼를 비우고 내용을 반환합니다.
    pub fn take_created_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.created_messages)
    }

    /// 평가 에러를 기록합니다.
    pub fn add_error(&mut self, error: EvalError) {
        self.errors.push(error);
    }

    /// 기록된 에러가 있으면 `true`
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 기록된 에러 전체
    pub fn errors(&self) -> &[EvalError] {
        &self.errors
    }

    /// 마지막으로 기록된 에러
    pub fn last_error(&self) -> Option<&EvalError> {
        self.errors.last()
    }
}
