//! 에러 타입 -- 도메인별 에러 정의

/// Ironpipe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronpipeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 메시지 처리 엔진 에러
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 처리 엔진 에러
///
/// 각 엔진 크레이트는 자기 에러를 이 타입으로 변환하여 상위로 전달합니다.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// 규칙/파이프라인/연결 레코드 소스 실패
    #[error("record source failed: {0}")]
    Source(String),

    /// 상태 갱신 실패
    #[error("state update failed: {0}")]
    StateUpdate(String),
}
