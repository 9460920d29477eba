//! Ironpipe 공통 크레이트
//!
//! 메시지 처리 엔진과 CLI가 함께 사용하는 타입을 정의합니다.
//!
//! - [`error`]: 최상위 에러 계층
//! - [`config`]: `ironpipe.toml` 설정과 환경변수 오버라이드
//! - [`metrics`]: 집계 메트릭 이름 상수
//! - [`types`]: 처리 대상 [`Message`](types::Message)

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, IronpipeError, ProcessingError};

// 설정
pub use config::IronpipeConfig;

// 도메인 타입
pub use types::{DEFAULT_STREAM_ID, Message};
