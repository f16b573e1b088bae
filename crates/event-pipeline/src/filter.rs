//! 이벤트 필터
//!
//! 콘솔 명령 에코는 게임 상황이 아니므로 버립니다.
//! 단, 맵 변경은 시간 동기화 기준점이라 `command` 카테고리에서 유일하게 유지됩니다.

use zdstats_core::types::{CandidateEvent, Category};

/// `command` 카테고리에서 유지되는 유일한 타입
pub const MAP_CHANGE_TYPE: &str = "map_change";

/// 후보 이벤트를 유지할지 결정합니다.
///
/// `category != command` 이거나 `type == "map_change"`이면 유지합니다.
pub fn retain(candidate: &CandidateEvent) -> bool {
    retains(candidate.category, &candidate.event_type)
}

/// (category, type) 쌍에 대한 필터 판정
pub fn retains(category: Category, event_type: &str) -> bool {
    category != Category::Command || event_type == MAP_CHANGE_TYPE
}
