//! 타임스탬프 산출
//!
//! 이벤트가 분류된 시각에서 기준 시각(epoch)을 뺀 경과 시간을
//! `"<초>.<마이크로초 6자리>"` 문자열로 만듭니다.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use zdstats_core::config::TimestampEpoch;

/// 기준 시각보다 이른 시각에 대한 값
pub const CLAMPED_TIMESTAMP: &str = "0.0";

/// 벽시계 추상화
pub trait Clock: Send + Sync {
    /// 현재 시각
    fn now(&self) -> SystemTime;
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// 타임스탬프 산출기
///
/// 실행마다 하나씩 생성됩니다. `run_start` 정책이면 생성 시각이 기준 시각이 됩니다.
#[derive(Clone)]
pub struct TimestampDeriver {
    epoch: SystemTime,
    clock: Arc<dyn Clock>,
}

impl TimestampDeriver {
    /// 시스템 시계로 산출기를 생성합니다.
    pub fn new(policy: TimestampEpoch) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// 주어진 시계로 산출기를 생성합니다.
    pub fn with_clock(policy: TimestampEpoch, clock: Arc<dyn Clock>) -> Self {
        let epoch = match policy {
            TimestampEpoch::RunStart => clock.now(),
            TimestampEpoch::Unix => UNIX_EPOCH,
        };
        Self { epoch, clock }
    }

    /// 기준 시각
    pub fn epoch(&self) -> SystemTime {
        self.epoch
    }

    /// 현재 시각의 타임스탬프
    pub fn derive(&self) -> String {
        self.derive_at(self.clock.now())
    }

    /// 주어진 시각의 타임스탬프
    pub fn derive_at(&self, moment: SystemTime) -> String {
        match moment.duration_since(self.epoch) {
            Ok(elapsed) => format_elapsed(elapsed),
            Err(_) => CLAMPED_TIMESTAMP.to_owned(),
        }
    }
}

impl fmt::Debug for TimestampDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampDeriver")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// 경과 시간을 `"<초>.<마이크로초>"`로 포맷합니다. 마이크로초는 6자리로 채웁니다.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{}.{:06}", elapsed.as_secs(), elapsed.subsec_micros())
}
