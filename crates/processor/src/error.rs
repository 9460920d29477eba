//! 처리 엔진 에러 타입
//!
//! [`ProcessorError`]는 레코드 소스, 파일 로더, 상태 갱신에서 발생하는 에러를 표현합니다.
//! 메시지 처리 자체는 실패하지 않으며, 규칙 단위 에러는 메시지의 `processing_error`
//! 필드로 기록됩니다. `From<ProcessorError> for IronpipeError` 변환이 구현되어 있습니다.

use ironpipe_core::error::{IronpipeError, ProcessingError};

/// 처리 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// 상류 레코드 반복자 실패 (해석 호출 밖으로 그대로 전파)
    #[error("record source error: {0}")]
    Source(String),

    /// 규칙/파이프라인/연결 파일 로딩 실패
    #[error("record load error: {path}: {reason}")]
    RecordLoad {
        /// 파일 또는 디렉토리 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessorError> for IronpipeError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Source(reason) => {
                IronpipeError::Processing(ProcessingError::Source(reason))
            }
            ProcessorError::Io(e) => IronpipeError::Io(e),
            other => IronpipeError::Processing(ProcessingError::StateUpdate(other.to_string())),
        }
    }
}
