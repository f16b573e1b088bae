//! 이벤트 파이프라인 에러 타입
//!
//! [`EventPipelineError`]는 이벤트 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<EventPipelineError> for ZdstatsError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use zdstats_core::error::{ConfigError, PipelineError, ZdstatsError};

/// 이벤트 파이프라인 도메인 에러
///
/// 룰 로딩, 테일링, 출력, 프로세스 감시 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum EventPipelineError {
    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 제한 시간 안에 로그 파일이 생성되지 않음
    #[error("log file not found after {waited_secs}s: {path}")]
    LogFileNotFound {
        /// 로그 파일 경로
        path: String,
        /// 대기한 시간 (초)
        waited_secs: u64,
    },

    /// 테일링 중 치명적 에러 (파일 소실, truncation, 읽기 실패)
    #[error("tailer error: {path}: {reason}")]
    Tailer {
        /// 로그 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 이벤트 출력 에러
    #[error("writer error: {0}")]
    Writer(String),

    /// 외부 프로세스 핸들 에러
    #[error("process handle error: {0}")]
    Process(String),

    /// 실행이 시작되기 전에 취소됨 (파일 생성 대기 중 취소 등)
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 이벤트 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<EventPipelineError> for ZdstatsError {
    fn from(err: EventPipelineError) -> Self {
        match err {
            EventPipelineError::Config { field, reason } => {
                ZdstatsError::Config(ConfigError::InvalidValue { field, reason })
            }
            EventPipelineError::RuleLoad { .. } | EventPipelineError::RuleValidation { .. } => {
                ZdstatsError::Pipeline(PipelineError::InitFailed(err.to_string()))
            }
            other => ZdstatsError::Pipeline(PipelineError::RunFailed(other.to_string())),
        }
    }
}
