//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 컴포넌트는 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더가 설치되지 않으면 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `zdstats_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(zdstats_core::metrics::EVENTS_WRITTEN_TOTAL).increment(1);
//! ```

/// 카테고리 레이블 키
pub const LABEL_CATEGORY: &str = "category";

/// 종료 사유 레이블 키 (process_exited, cancelled, failed)
pub const LABEL_OUTCOME: &str = "outcome";

/// 테일러가 읽은 완전한 라인 수 (counter)
pub const LINES_READ_TOTAL: &str = "zdstats_lines_read_total";

/// 룰에 매칭된 라인 수 (counter, label: category)
pub const EVENTS_CLASSIFIED_TOTAL: &str = "zdstats_events_classified_total";

/// 필터에서 제외된 이벤트 수 (counter)
pub const EVENTS_FILTERED_TOTAL: &str = "zdstats_events_filtered_total";

/// 출력에 기록된 이벤트 수 (counter, label: category)
pub const EVENTS_WRITTEN_TOTAL: &str = "zdstats_events_written_total";

/// 최대 길이를 초과해 버려진 라인 수 (counter)
pub const LINES_DISCARDED_TOTAL: &str = "zdstats_lines_discarded_total";

/// 종료된 실행 수 (counter, label: outcome)
pub const RUNS_FINISHED_TOTAL: &str = "zdstats_runs_finished_total";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 기록을 시작할 때 호출합니다. 전역 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        LINES_READ_TOTAL,
        "Total number of complete lines read from the tailed log"
    );
    describe_counter!(
        EVENTS_CLASSIFIED_TOTAL,
        "Total number of lines that matched a classification rule"
    );
    describe_counter!(
        EVENTS_FILTERED_TOTAL,
        "Total number of classified events dropped by the event filter"
    );
    describe_counter!(
        EVENTS_WRITTEN_TOTAL,
        "Total number of events written to the event stream"
    );
    describe_counter!(
        LINES_DISCARDED_TOTAL,
        "Total number of oversized partial lines discarded by the tailer"
    );
    describe_counter!(RUNS_FINISHED_TOTAL, "Total number of finished recording runs");
}
