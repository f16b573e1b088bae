//! zdstats 이벤트 파이프라인
//!
//! 외부 프로세스(ZDaemon 클라이언트)가 기록 중인 로그 파일을 테일링하여
//! 라인마다 규칙 기반으로 분류하고, 필터링과 타임스탬프 부여를 거쳐
//! 이벤트 스트림으로 기록합니다.
//!
//! # 모듈 구성
//!
//! - [`collector`]: 로그 파일 테일러 (파일 생성 대기, 완전한 라인만 반환)
//! - [`rule`]: YAML 기반 분류 규칙 엔진
//! - [`filter`]: 이벤트 유지 여부 판정
//! - [`timestamp`]: 경과 시간 타임스탬프 산출
//! - [`writer`]: JSON 배열 / JSON Lines 이벤트 출력
//! - [`pipeline`]: 실행 코디네이터 (프로세스 종료/취소 감시)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! LogTailer -> RuleSet -> filter -> TimestampDeriver -> EventWriter
//!     |            |         |              |                |
//!  polling     YAML rules  command     run_start/unix    json_array/
//!  tail -f     first match  drop        epoch            json_lines
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod timestamp;
pub mod writer;

pub mod collector;
pub mod rule;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{
    EventPipeline, EventPipelineBuilder, RunOutcome, RunSummary, SessionReport, record_session,
};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::EventPipelineError;

// 규칙 엔진
pub use rule::{ClassificationRule, RuleLoader, RuleSet};

// 테일러
pub use collector::{LogTailer, TailerOptions};

// 타임스탬프
pub use timestamp::{Clock, SystemClock, TimestampDeriver};

// 출력
pub use writer::{EventWriter, output_file_name};
