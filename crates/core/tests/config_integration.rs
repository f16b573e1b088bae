//! zdstats.toml 통합 설정 테스트
//!
//! - zdstats.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use zdstats_core::config::{ExitPolicy, OutputFormat, TimestampEpoch, ZdstatsConfig};
use zdstats_core::error::{ConfigError, ZdstatsError};

// =============================================================================
// zdstats.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../zdstats.toml.example");
    let config = ZdstatsConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.tailer.read_backoff_ms, 27);
    assert_eq!(config.output.format, OutputFormat::JsonArray);
    assert_eq!(config.pipeline.exit_policy, ExitPolicy::Drain);
    assert_eq!(config.pipeline.timestamp_epoch, TimestampEpoch::RunStart);
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../zdstats.toml.example");
    let config = ZdstatsConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../zdstats.toml.example");
    let from_file = ZdstatsConfig::parse(content).expect("should parse");
    let from_code = ZdstatsConfig::default();

    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);

    assert_eq!(
        from_file.tailer.open_poll_interval_ms,
        from_code.tailer.open_poll_interval_ms
    );
    assert_eq!(
        from_file.tailer.read_backoff_ms,
        from_code.tailer.read_backoff_ms
    );
    assert_eq!(
        from_file.tailer.open_timeout_secs,
        from_code.tailer.open_timeout_secs
    );
    assert_eq!(
        from_file.tailer.max_line_length,
        from_code.tailer.max_line_length
    );

    assert_eq!(from_file.rules.path, from_code.rules.path);

    assert_eq!(from_file.output.dir, from_code.output.dir);
    assert_eq!(from_file.output.prefix, from_code.output.prefix);
    assert_eq!(from_file.output.format, from_code.output.format);

    assert_eq!(
        from_file.pipeline.exit_policy,
        from_code.pipeline.exit_policy
    );
    assert_eq!(
        from_file.pipeline.timestamp_epoch,
        from_code.pipeline.timestamp_epoch
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_output_only() {
    let toml = r#"
[output]
dir = "/tmp/stats"
format = "json_lines"
"#;
    let config = ZdstatsConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.output.dir, "/tmp/stats");
    assert_eq!(config.output.format, OutputFormat::JsonLines);
    // 나머지는 기본값
    assert_eq!(config.output.prefix, "zdstats");
    assert_eq!(config.tailer.open_poll_interval_ms, 1000);
    assert_eq!(config.pipeline.exit_policy, ExitPolicy::Drain);
}

#[test]
fn partial_config_legacy_behaviour() {
    let toml = r#"
[pipeline]
exit_policy = "immediate"
timestamp_epoch = "unix"
"#;
    let config = ZdstatsConfig::parse(toml).expect("should parse");

    assert_eq!(config.pipeline.exit_policy, ExitPolicy::Immediate);
    assert_eq!(config.pipeline.timestamp_epoch, TimestampEpoch::Unix);
    assert_eq!(config.output.format, OutputFormat::JsonArray);
}

#[test]
fn partial_config_tailer_only() {
    let toml = r#"
[tailer]
read_backoff_ms = 100
open_timeout_secs = 30
"#;
    let config = ZdstatsConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.tailer.read_backoff_ms, 100);
    assert_eq!(config.tailer.open_timeout_secs, 30);
    assert_eq!(config.tailer.max_line_length, 64 * 1024);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

/// 환경변수를 설정한 상태로 `f`를 실행하고 원래 값을 복원합니다.
fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let result = with_env("ZDSTATS_GENERAL_LOG_LEVEL", "error", || {
        let mut config = ZdstatsConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_enum_field() {
    let result = with_env("ZDSTATS_OUTPUT_FORMAT", "json_lines", || {
        let mut config = ZdstatsConfig::default();
        config.apply_env_overrides();
        config.output.format
    });

    assert_eq!(result, OutputFormat::JsonLines);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_enum_keeps_value() {
    let toml = r#"
[pipeline]
exit_policy = "immediate"
"#;
    let result = with_env("ZDSTATS_PIPELINE_EXIT_POLICY", "whenever", || {
        let mut config = ZdstatsConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.pipeline.exit_policy
    });

    assert_eq!(result, ExitPolicy::Immediate);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env("ZDSTATS_TAILER_READ_BACKOFF_MS", "5", || {
        let mut config = ZdstatsConfig::default();
        config.apply_env_overrides();
        config.tailer.read_backoff_ms
    });

    assert_eq!(result, 5);
}

#[test]
#[serial_test::serial]
fn env_override_unparseable_number_keeps_value() {
    let result = with_env("ZDSTATS_TAILER_MAX_LINE_LENGTH", "lots", || {
        let mut config = ZdstatsConfig::default();
        config.apply_env_overrides();
        config.tailer.max_line_length
    });

    assert_eq!(result, 64 * 1024);
}

#[tokio::test]
#[serial_test::serial]
async fn env_override_repairs_invalid_file_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("zdstats.toml");
    std::fs::write(&path, "[output]\nprefix = \"bad/prefix\"\n").expect("write");

    // 파일만으로는 유효하지 않음
    let raw = ZdstatsConfig::from_file(&path).await.expect("from_file does not validate");
    assert!(raw.validate().is_err());

    let original = std::env::var("ZDSTATS_OUTPUT_PREFIX").ok();
    // SAFETY: 직렬화된 테스트
    unsafe {
        std::env::set_var("ZDSTATS_OUTPUT_PREFIX", "duel");
    }
    let result = ZdstatsConfig::load(&path).await;
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ZDSTATS_OUTPUT_PREFIX", val),
            None => std::env::remove_var("ZDSTATS_OUTPUT_PREFIX"),
        }
    }

    let config = result.expect("env override should make the config valid");
    assert_eq!(config.output.prefix, "duel");
}

#[tokio::test]
#[serial_test::serial]
async fn load_applies_env_then_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("zdstats.toml");
    std::fs::write(&path, "[output]\nprefix = \"match\"\n").expect("write");

    let original = std::env::var("ZDSTATS_OUTPUT_PREFIX").ok();
    // SAFETY: 직렬화된 테스트
    unsafe {
        std::env::set_var("ZDSTATS_OUTPUT_PREFIX", "bad/prefix");
    }
    let result = ZdstatsConfig::load(&path).await;
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ZDSTATS_OUTPUT_PREFIX", val),
            None => std::env::remove_var("ZDSTATS_OUTPUT_PREFIX"),
        }
    }

    assert!(matches!(
        result.unwrap_err(),
        ZdstatsError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = ZdstatsConfig::parse("").expect("empty string should parse");
    config.validate().expect("should validate");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.output.prefix, "zdstats");
}

#[test]
fn comments_only_parses_with_defaults() {
    let toml = r#"
# 주석만 있는 파일
# [output]
"#;
    let config = ZdstatsConfig::parse(toml).expect("comments-only should parse");
    config.validate().expect("should validate");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let err = ZdstatsConfig::parse("[invalid toml").unwrap_err();
    assert!(matches!(
        err,
        ZdstatsError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn unknown_enum_value_returns_parse_error() {
    let toml = r#"
[output]
format = "xml"
"#;
    assert!(matches!(
        ZdstatsConfig::parse(toml).unwrap_err(),
        ZdstatsError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[tailer]
read_backoff_ms = "fast"
"#;
    assert!(matches!(
        ZdstatsConfig::parse(toml).unwrap_err(),
        ZdstatsError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn zero_backoff_fails_validation() {
    let toml = r#"
[tailer]
read_backoff_ms = 0
"#;
    let config = ZdstatsConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("tailer.read_backoff_ms"));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = ZdstatsConfig::from_file(dir.path().join("missing.toml")).await;
    assert!(matches!(
        result.unwrap_err(),
        ZdstatsError::Config(ConfigError::FileNotFound { .. })
    ));
}

// =============================================================================
// 직렬화 라운드트립
// =============================================================================

#[test]
fn serialize_and_reparse_preserves_values() {
    let mut original = ZdstatsConfig::default();
    original.output.format = OutputFormat::JsonLines;
    original.pipeline.timestamp_epoch = TimestampEpoch::Unix;
    original.rules.path = "/etc/zdstats/rules".to_owned();

    let toml_str = toml::to_string_pretty(&original).expect("should serialize");
    let reparsed = ZdstatsConfig::parse(&toml_str).expect("should reparse");

    assert_eq!(reparsed.output.format, OutputFormat::JsonLines);
    assert_eq!(reparsed.pipeline.timestamp_epoch, TimestampEpoch::Unix);
    assert_eq!(reparsed.rules.path, "/etc/zdstats/rules");
}
