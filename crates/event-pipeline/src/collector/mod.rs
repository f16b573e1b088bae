//! 로그 수집 모듈 -- 외부 프로세스가 기록 중인 로그 파일에서 라인을 수집합니다.
//!
//! # 수집 소스
//! - [`LogTailer`]: 파일 테일링 (tail -f 방식, 폴링)
//!
//! # 아키텍처
//! 테일러는 코디네이터 태스크가 직접 소유하고 호출합니다.
//! 채널이나 별도 태스크 없이 한 태스크에서 순차적으로 동작합니다.

pub mod file;

pub use file::{LogTailer, TailerOptions};

/// 테일러 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailerStatus {
    /// 파일을 읽는 중
    Tailing,
    /// 치명적 에러로 중단됨
    Error(String),
    /// 정상적으로 닫힘
    Closed,
}

impl TailerStatus {
    /// 더 이상 읽을 수 없는 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Tailing)
    }
}
