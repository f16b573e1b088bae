//! 설정 관리 — zdstats.toml 파싱 및 런타임 설정
//!
//! [`ZdstatsConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ZDSTATS_OUTPUT_DIR=/tmp/stats` 형식)
//! 3. 설정 파일 (`zdstats.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), zdstats_core::error::ZdstatsError> {
//! use zdstats_core::config::ZdstatsConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ZdstatsConfig::load("zdstats.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ZdstatsConfig::parse("[output]\nformat = \"json_lines\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ZdstatsError};

/// zdstats 통합 설정
///
/// `zdstats.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZdstatsConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 테일러 설정
    #[serde(default)]
    pub tailer: TailerConfig,
    /// 분류 룰 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// 이벤트 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// 라이프사이클 코디네이터 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl ZdstatsConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    ///
    /// 검증은 모든 레이어가 적용된 후 한 번만 수행되므로, 파일의 잘못된 값을
    /// 환경변수로 바로잡을 수 있습니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ZdstatsError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ZdstatsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ZdstatsError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ZdstatsError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ZdstatsError> {
        toml::from_str(toml_str).map_err(|e| {
            ZdstatsError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ZDSTATS_{SECTION}_{FIELD}`
    /// 예: `ZDSTATS_PIPELINE_EXIT_POLICY=immediate`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ZDSTATS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ZDSTATS_GENERAL_LOG_FORMAT");

        // Tailer
        override_u64(
            &mut self.tailer.open_poll_interval_ms,
            "ZDSTATS_TAILER_OPEN_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.tailer.read_backoff_ms,
            "ZDSTATS_TAILER_READ_BACKOFF_MS",
        );
        override_u64(
            &mut self.tailer.open_timeout_secs,
            "ZDSTATS_TAILER_OPEN_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.tailer.max_line_length,
            "ZDSTATS_TAILER_MAX_LINE_LENGTH",
        );

        // Rules
        override_string(&mut self.rules.path, "ZDSTATS_RULES_PATH");

        // Output
        override_string(&mut self.output.dir, "ZDSTATS_OUTPUT_DIR");
        override_string(&mut self.output.prefix, "ZDSTATS_OUTPUT_PREFIX");
        override_parsed(&mut self.output.format, "ZDSTATS_OUTPUT_FORMAT");

        // Pipeline
        override_parsed(
            &mut self.pipeline.exit_policy,
            "ZDSTATS_PIPELINE_EXIT_POLICY",
        );
        override_parsed(
            &mut self.pipeline.timestamp_epoch,
            "ZDSTATS_PIPELINE_TIMESTAMP_EPOCH",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ZdstatsError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        const MAX_POLL_INTERVAL_MS: u64 = 60_000;
        if self.tailer.open_poll_interval_ms == 0
            || self.tailer.open_poll_interval_ms > MAX_POLL_INTERVAL_MS
        {
            return Err(ConfigError::InvalidValue {
                field: "tailer.open_poll_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            }
            .into());
        }

        if self.tailer.read_backoff_ms == 0 || self.tailer.read_backoff_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                field: "tailer.read_backoff_ms".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            }
            .into());
        }

        if self.tailer.max_line_length < 256 {
            return Err(ConfigError::InvalidValue {
                field: "tailer.max_line_length".to_owned(),
                reason: "must be at least 256 bytes".to_owned(),
            }
            .into());
        }

        if self.output.prefix.is_empty()
            || self
                .output
                .prefix
                .chars()
                .any(|c| std::path::is_separator(c) || c.is_control())
        {
            return Err(ConfigError::InvalidValue {
                field: "output.prefix".to_owned(),
                reason: "must be a non-empty file name component".to_owned(),
            }
            .into());
        }

        if self.output.dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 로그 테일러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailerConfig {
    /// 로그 파일이 생성되기를 기다리는 동안의 폴링 간격 (밀리초)
    pub open_poll_interval_ms: u64,
    /// 새 라인이 없을 때 재시도 전 대기 시간 (밀리초)
    pub read_backoff_ms: u64,
    /// 파일 생성 대기 제한 시간 (초). 0이면 무제한
    pub open_timeout_secs: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            open_poll_interval_ms: 1000,
            read_backoff_ms: 27,
            open_timeout_secs: 0,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// 분류 룰 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 룰 파일 또는 디렉토리 경로. 비어 있으면 내장 룰셋 사용
    pub path: String,
}

/// 이벤트 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 출력 디렉토리
    pub dir: String,
    /// 출력 파일명 접두어
    pub prefix: String,
    /// 출력 프레이밍 형식
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_owned(),
            prefix: "zdstats".to_owned(),
            format: OutputFormat::JsonArray,
        }
    }
}

/// 코디네이터 설정 (`[pipeline]` 섹션)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 외부 프로세스 종료 감지 후 처리 정책
    pub exit_policy: ExitPolicy,
    /// 타임스탬프 기준 시각
    pub timestamp_epoch: TimestampEpoch,
}

/// 이벤트 스트림 출력 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `{"events": [...]}` 단일 JSON 문서 (기본값, 비정상 종료 시 문서가 닫히지 않음)
    #[default]
    JsonArray,
    /// 한 줄에 이벤트 하나 (항상 유효)
    JsonLines,
}

impl OutputFormat {
    /// 출력 파일 확장자를 반환합니다.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::JsonArray => "json",
            Self::JsonLines => "jsonl",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonArray => "json_array",
            Self::JsonLines => "json_lines",
        }
    }
}

/// 외부 프로세스 종료 후 남은 라인 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// 종료 감지 후 "새 라인 없음"이 한 번 나올 때까지 계속 읽음 (기본값)
    #[default]
    Drain,
    /// 종료 감지 즉시 닫음. 읽지 않은 라인은 유실됨
    Immediate,
}

impl ExitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drain => "drain",
            Self::Immediate => "immediate",
        }
    }
}

/// 타임스탬프 기준 시각
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampEpoch {
    /// 실행 시작 시각 기준 경과 시간 (기본값)
    #[default]
    RunStart,
    /// Unix epoch 기준
    Unix,
}

impl TimestampEpoch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::Unix => "unix",
        }
    }
}

/// 문자열 열거값 파싱 실패
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// 입력값
    pub value: String,
    /// 허용되는 값 목록
    pub expected: &'static [&'static str],
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown value '{}', expected one of: {}",
            self.value,
            self.expected.join(", ")
        )
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for OutputFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json_array" | "json" => Ok(Self::JsonArray),
            "json_lines" | "jsonl" => Ok(Self::JsonLines),
            other => Err(UnknownVariant {
                value: other.to_owned(),
                expected: &["json_array", "json_lines"],
            }),
        }
    }
}

impl FromStr for ExitPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drain" => Ok(Self::Drain),
            "immediate" => Ok(Self::Immediate),
            other => Err(UnknownVariant {
                value: other.to_owned(),
                expected: &["drain", "immediate"],
            }),
        }
    }
}

impl FromStr for TimestampEpoch {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_start" => Ok(Self::RunStart),
            "unix" => Ok(Self::Unix),
            other => Err(UnknownVariant {
                value: other.to_owned(),
                expected: &["run_start", "unix"],
            }),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_parsed<T>(target: &mut T, env_key: &str)
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(e) => warn!(
                env_key,
                value = val.as_str(),
                error = %e,
                "failed to parse env var, ignoring"
            ),
        }
    }
}
