//! zdstats 공통 크레이트
//!
//! 이벤트 파이프라인과 CLI가 공유하는 타입, trait, 에러, 설정을 정의합니다.
//!
//! - [`config`]: `zdstats.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 최상위 에러 타입
//! - [`metrics`]: 메트릭 이름 상수
//! - [`pipeline`]: 분류기/프로세스 감시 trait
//! - [`types`]: 이벤트 도메인 타입

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, PipelineError, ZdstatsError};

// 설정
pub use config::{ExitPolicy, OutputFormat, TimestampEpoch, ZdstatsConfig};

// 파이프라인 trait
pub use pipeline::{LineClassifier, ProcessExit, ProcessMonitor};

// 도메인 타입
pub use types::{CandidateEvent, Category, Event};
