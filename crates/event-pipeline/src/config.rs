//! 이벤트 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`ZdstatsConfig`](zdstats_core::config::ZdstatsConfig)에서
//! 파이프라인이 사용하는 섹션(`tailer`, `rules`, `output`, `pipeline`)을 모아
//! 실행 단위 설정으로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use zdstats_core::config::ZdstatsConfig;
//! use zdstats_event_pipeline::config::PipelineConfig;
//!
//! let core_config = ZdstatsConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zdstats_core::config::{ExitPolicy, OutputFormat, TimestampEpoch, ZdstatsConfig};

use crate::collector::TailerOptions;
use crate::error::EventPipelineError;

/// 폴링/백오프 간격 상한 (밀리초)
const MAX_INTERVAL_MS: u64 = 60_000;

/// `max_line_length` 최소값 (바이트)
const MIN_MAX_LINE_LENGTH: usize = 256;

/// 이벤트 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 로그 파일 생성 대기 중 폴링 간격 (밀리초)
    pub open_poll_interval_ms: u64,
    /// 새 라인이 없을 때 대기 시간 (밀리초)
    pub read_backoff_ms: u64,
    /// 로그 파일 생성 대기 제한 시간 (초). 0이면 무제한
    pub open_timeout_secs: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 룰 파일/디렉토리 경로. 비어 있으면 내장 룰셋
    pub rules_path: String,
    /// 출력 디렉토리
    pub output_dir: String,
    /// 출력 파일명 접두어
    pub output_prefix: String,
    /// 출력 형식
    pub output_format: OutputFormat,
    /// 프로세스 종료 후 처리 정책
    pub exit_policy: ExitPolicy,
    /// 타임스탬프 기준 시각
    pub timestamp_epoch: TimestampEpoch,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&ZdstatsConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &ZdstatsConfig) -> Self {
        Self {
            open_poll_interval_ms: core.tailer.open_poll_interval_ms,
            read_backoff_ms: core.tailer.read_backoff_ms,
            open_timeout_secs: core.tailer.open_timeout_secs,
            max_line_length: core.tailer.max_line_length,
            rules_path: core.rules.path.clone(),
            output_dir: core.output.dir.clone(),
            output_prefix: core.output.prefix.clone(),
            output_format: core.output.format,
            exit_policy: core.pipeline.exit_policy,
            timestamp_epoch: core.pipeline.timestamp_epoch,
        }
    }

    /// 테일러 옵션
    pub fn tailer_options(&self) -> TailerOptions {
        TailerOptions {
            open_poll_interval: Duration::from_millis(self.open_poll_interval_ms),
            open_timeout: (self.open_timeout_secs > 0)
                .then(|| Duration::from_secs(self.open_timeout_secs)),
            max_line_length: self.max_line_length,
        }
    }

    /// 읽기 백오프 간격
    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    /// 룰 경로 (내장 룰셋을 쓰는 경우 None)
    pub fn rules_path(&self) -> Option<&Path> {
        (!self.rules_path.is_empty()).then(|| Path::new(&self.rules_path))
    }

    /// 출력 디렉토리
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EventPipelineError> {
        if self.open_poll_interval_ms == 0 || self.open_poll_interval_ms > MAX_INTERVAL_MS {
            return Err(EventPipelineError::Config {
                field: "open_poll_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_INTERVAL_MS}"),
            });
        }

        if self.read_backoff_ms == 0 || self.read_backoff_ms > MAX_INTERVAL_MS {
            return Err(EventPipelineError::Config {
                field: "read_backoff_ms".to_owned(),
                reason: format!("must be 1-{MAX_INTERVAL_MS}"),
            });
        }

        if self.max_line_length < MIN_MAX_LINE_LENGTH {
            return Err(EventPipelineError::Config {
                field: "max_line_length".to_owned(),
                reason: format!("must be at least {MIN_MAX_LINE_LENGTH} bytes"),
            });
        }

        if self.output_dir.is_empty() {
            return Err(EventPipelineError::Config {
                field: "output_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        Self::validate_prefix(&self.output_prefix)?;

        Ok(())
    }

    /// 출력 파일명 접두어가 단일 파일명 컴포넌트인지 검증합니다.
    fn validate_prefix(prefix: &str) -> Result<(), EventPipelineError> {
        if prefix.is_empty() {
            return Err(EventPipelineError::Config {
                field: "output_prefix".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if prefix == "." || prefix == ".." {
            return Err(EventPipelineError::Config {
                field: "output_prefix".to_owned(),
                reason: format!("'{prefix}' is not a file name"),
            });
        }

        if prefix
            .chars()
            .any(|c| std::path::is_separator(c) || c.is_control())
        {
            return Err(EventPipelineError::Config {
                field: "output_prefix".to_owned(),
                reason: format!("'{prefix}' must not contain path separators"),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
///
/// 3개 이상의 설정 필드가 있으므로 빌더 패턴을 사용합니다.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일 생성 대기 폴링 간격(밀리초)을 설정합니다.
    pub fn open_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.open_poll_interval_ms = ms;
        self
    }

    /// 읽기 백오프(밀리초)를 설정합니다.
    pub fn read_backoff_ms(mut self, ms: u64) -> Self {
        self.config.read_backoff_ms = ms;
        self
    }

    /// 파일 생성 대기 제한 시간(초)을 설정합니다.
    pub fn open_timeout_secs(mut self, secs: u64) -> Self {
        self.config.open_timeout_secs = secs;
        self
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// 룰 경로를 설정합니다.
    pub fn rules_path(mut self, path: impl Into<String>) -> Self {
        self.config.rules_path = path.into();
        self
    }

    /// 출력 디렉토리를 설정합니다.
    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// 출력 파일명 접두어를 설정합니다.
    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.output_prefix = prefix.into();
        self
    }

    /// 출력 형식을 설정합니다.
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// 종료 정책을 설정합니다.
    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.config.exit_policy = policy;
        self
    }

    /// 타임스탬프 기준 시각을 설정합니다.
    pub fn timestamp_epoch(mut self, epoch: TimestampEpoch) -> Self {
        self.config.timestamp_epoch = epoch;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, EventPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
