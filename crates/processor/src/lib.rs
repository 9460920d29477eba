#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`ast`]: 파이프라인/스테이지/규칙 AST와 조건/액션 평가 trait
//! - [`parser`]: YAML 규칙/파이프라인 파서 ([`parser::RuleParser`] 기본 구현)
//! - [`source`]: 규칙/파이프라인/연결 레코드와 당겨 읽는 레코드 소스
//! - [`loader`]: 디렉토리에서 레코드 파일을 읽는 비동기 로더
//! - [`resolver`]: 레코드를 상호 참조가 연결된 AST로 해석
//! - [`stage_iter`]: 스테이지 번호별 묶음 반복자
//! - [`state`]: 불변 설정 스냅샷과 스테이지 반복자 캐시
//! - [`updater`]: 최신 스냅샷 보유, 재로드, 변경 이벤트 처리
//! - [`interpreter`]: 메시지 스트림 라우팅 고정점 루프와 스테이지 평가
//! - [`listener`]: 인터프리터 관찰 훅
//! - [`metrics`]: 파이프라인/스테이지/규칙 카운터 레지스트리
//! - [`context`]: 스테이지 평가 컨텍스트
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! RecordSource --> PipelineResolver --> State --(watch)--> PipelineInterpreter
//!  (rules,            (parse, link,        ^                  (fixpoint loop,
//!   pipelines,         metrics)            |                   stage slices)
//!   connections)                     ConfigurationStateUpdater
//!                                     (reload on ChangeEvent)
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod listener;
pub mod loader;
pub mod metrics;
pub mod parser;
pub mod resolver;
pub mod source;
pub mod stage_iter;
pub mod state;
pub mod updater;

// --- 주요 타입 re-export ---

// AST
pub use ast::{MatchMode, Pipeline, Rule, Stage};

// 에러
pub use error::ProcessorError;

// 파서
pub use parser::{ParseError, RuleParser, YamlRuleParser};

// 소스와 로더
pub use loader::{LoadedRecords, RecordLoader};
pub use source::{InMemorySource, PipelineConnections, PipelineRecord, RecordSource, RuleRecord};

// 해석과 상태
pub use resolver::{PipelineResolver, PipelineResolverConfig};
pub use state::State;
pub use updater::{ChangeEvent, ConfigurationStateUpdater};

// 인터프리터
pub use interpreter::{MessageAcknowledger, NoopAcknowledger, PipelineInterpreter};
pub use listener::{
    InterpreterListener, ListenerEvent, NoopInterpreterListener, RecordingListener,
    RuleMetricsListener,
};

// 카운터
pub use metrics::{MetricRegistry, PipelineMetricRegistry};
