//! 메트릭 상수 및 설명 등록
//!
//! 엔진 전체의 집계 메트릭 이름과 설명을 중앙에서 정의합니다.
//! 파이프라인/스테이지/규칙 단위 카운터는 이 모듈이 아니라
//! `ironpipe-processor`의 메트릭 레지스트리가 관리합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironpipe_`
//! - 모듈명: `processor_`, `state_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ironpipe_core::metrics::PROCESSOR_MESSAGES_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 규칙 id 레이블 키
pub const LABEL_RULE_ID: &str = "rule_id";

/// 결과 레이블 키 (hit, miss)
pub const LABEL_RESULT: &str = "result";

// ─── Processor 메트릭 ──────────────────────────────────────────────

/// Processor: 처리 완료된 메시지 수 (counter)
pub const PROCESSOR_MESSAGES_PROCESSED_TOTAL: &str = "ironpipe_processor_messages_processed_total";

/// Processor: 필터링되어 드롭된 메시지 수 (counter)
pub const PROCESSOR_MESSAGES_FILTERED_TOTAL: &str = "ironpipe_processor_messages_filtered_total";

/// Processor: 배치 처리 시간 (histogram, 초)
pub const PROCESSOR_EXECUTION_DURATION_SECONDS: &str =
    "ironpipe_processor_execution_duration_seconds";

/// Processor: 패스 상한 초과로 강제 종료된 메시지 수 (counter)
pub const PROCESSOR_PASS_LIMIT_EXCEEDED_TOTAL: &str =
    "ironpipe_processor_pass_limit_exceeded_total";

/// Processor: 규칙 실행 시간 (histogram, 초, label: rule_id)
pub const PROCESSOR_RULE_EXECUTION_DURATION_SECONDS: &str =
    "ironpipe_processor_rule_execution_duration_seconds";

// ─── State 메트릭 ──────────────────────────────────────────────────

/// State: 완료된 상태 재구성 수 (counter)
pub const STATE_RELOADS_TOTAL: &str = "ironpipe_state_reloads_total";

/// State: 실패한 상태 재구성 수 (counter)
pub const STATE_RELOAD_FAILURES_TOTAL: &str = "ironpipe_state_reload_failures_total";

/// State: 스테이지 반복자 캐시 조회 수 (counter, label: result)
pub const STATE_STAGE_CACHE_LOOKUPS_TOTAL: &str = "ironpipe_state_stage_cache_lookups_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더가 설치되지 않았으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        PROCESSOR_MESSAGES_PROCESSED_TOTAL,
        "Total number of messages that left the processor"
    );
    describe_counter!(
        PROCESSOR_MESSAGES_FILTERED_TOTAL,
        "Total number of messages dropped by a drop_message action"
    );
    describe_histogram!(
        PROCESSOR_EXECUTION_DURATION_SECONDS,
        "Time spent processing one message batch in seconds"
    );
    describe_counter!(
        PROCESSOR_PASS_LIMIT_EXCEEDED_TOTAL,
        "Messages finalized because routing did not stabilize within max_passes"
    );
    describe_histogram!(
        PROCESSOR_RULE_EXECUTION_DURATION_SECONDS,
        "Time spent executing one rule's actions in seconds"
    );
    describe_counter!(
        STATE_RELOADS_TOTAL,
        "Total number of processor state rebuilds"
    );
    describe_counter!(
        STATE_RELOAD_FAILURES_TOTAL,
        "Total number of processor state rebuilds that failed"
    );
    describe_counter!(
        STATE_STAGE_CACHE_LOOKUPS_TOTAL,
        "Stage iterator cache lookups by result (hit, miss)"
    );
}
