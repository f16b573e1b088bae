//! 통합 테스트 -- 파이프라인 전체 흐름 검증
//!
//! 외부 프로세스가 로그를 기록하는 상황을 흉내 내어
//! 테일링부터 이벤트 파일 생성까지의 전체 파이프라인을 검증합니다.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use zdstats_core::config::{ExitPolicy, OutputFormat, TimestampEpoch};
use zdstats_core::pipeline::{ProcessExit, ProcessMonitor};
use zdstats_core::types::{Category, Event};
use zdstats_event_pipeline::{
    EventPipelineBuilder, EventWriter, LogTailer, PipelineConfig, PipelineConfigBuilder,
    RunOutcome, RuleSet, TailerOptions, record_session,
};

/// 외부에서 종료 여부를 제어하는 가짜 프로세스
#[derive(Clone, Default)]
struct FakeProcess {
    exited: Arc<AtomicBool>,
}

impl FakeProcess {
    fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

impl ProcessMonitor for FakeProcess {
    fn try_exit_status(&mut self) -> std::io::Result<Option<ProcessExit>> {
        Ok(self
            .exited
            .load(Ordering::SeqCst)
            .then_some(ProcessExit { code: Some(0) }))
    }
}

fn append(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f.flush().unwrap();
}

fn fast_config(dir: &Path) -> PipelineConfigBuilder {
    PipelineConfigBuilder::new()
        .open_poll_interval_ms(5)
        .read_backoff_ms(1)
        .output_dir(dir.display().to_string())
}

fn read_array_events(path: &Path) -> Vec<Event> {
    let text = std::fs::read_to_string(path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    doc["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| serde_json::from_value(v.clone()).unwrap())
        .collect()
}

/// 로그 파일이 생기기 전에 세션을 시작해도 이후 기록된 라인을 순서대로 처리하는지 검증
#[tokio::test]
async fn test_session_waits_for_log_and_records_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("zdaemon.txt");
    let config = fast_config(dir.path()).build().unwrap();
    let process = FakeProcess::default();

    let producer = {
        let log = log.clone();
        let process = process.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            append(&log, "MAP: CHANGED to MAP01\n");
            append(&log, "CMD: say hello\n");
            append(&log, "Ant has connected.\n");
            tokio::time::sleep(Duration::from_millis(20)).await;
            append(&log, "Ant was splintered by Ladna's BFG.\n");
            append(&log, "Ladna disconnected.\n");
            process.exit();
        })
    };

    let report = record_session(
        &config,
        Arc::new(RuleSet::builtin().unwrap()),
        &log,
        process,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    producer.await.unwrap();

    assert!(matches!(report.summary.outcome, RunOutcome::ProcessExited(_)));
    assert_eq!(report.summary.lines_read, 5);
    assert_eq!(report.summary.events_filtered, 1);
    assert_eq!(report.summary.events_written, 4);

    let events = read_array_events(&report.output_path);
    let kinds: Vec<_> = events
        .iter()
        .map(|e| (e.category, e.event_type.as_str()))
        .collect();
    assert_eq!(
        kinds,
        [
            (Category::Command, "map_change"),
            (Category::Connect, "connection"),
            (Category::Frag, "frag"),
            (Category::Disconnect, "disconnection"),
        ]
    );
    assert_eq!(events[2].data["weapon"], "bfg");
    assert_eq!(events[2].data["fragger"], "Ladna");

    // 타임스탬프는 단조 증가
    let stamps: Vec<f64> = events
        .iter()
        .map(|e| e.timestamp.parse().unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

/// 출력 파일 이름과 JSON Lines 형식 검증
#[tokio::test]
async fn test_session_json_lines_output() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("zdaemon.txt");
    append(&log, "<Ant> gg\nRed team wins!\n");

    let config = fast_config(dir.path())
        .output_prefix("match")
        .output_format(OutputFormat::JsonLines)
        .build()
        .unwrap();
    let process = FakeProcess::default();
    process.exit();

    let report = record_session(
        &config,
        Arc::new(RuleSet::builtin().unwrap()),
        &log,
        process,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let name = report
        .output_path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(name.starts_with("match-"));
    assert!(name.ends_with(".jsonl"));

    let text = std::fs::read_to_string(&report.output_path).unwrap();
    let events: Vec<Event> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].category, Category::Chat);
    assert_eq!(events[1].category, Category::Game);
}

/// 사용자 규칙 디렉토리로 분류하는 흐름 검증
#[tokio::test]
async fn test_custom_rule_directory() {
    let dir = tempfile::tempdir().unwrap();
    let rules_dir = dir.path().join("rules");
    std::fs::create_dir(&rules_dir).unwrap();
    std::fs::write(
        rules_dir.join("10-custom.yml"),
        r#"
rules:
  - id: vote
    category: game
    type: vote
    pattern: '^(?P<player>\S+) called a vote: (?P<motion>.+)$'
    constants:
      source: custom
"#,
    )
    .unwrap();

    let log = dir.path().join("zdaemon.txt");
    append(&log, "Ant called a vote: map MAP03\nMAP: CHANGED to MAP03\n");

    let config = fast_config(dir.path())
        .rules_path(rules_dir.display().to_string())
        .build()
        .unwrap();
    let rules = RuleSet::load_or_builtin(config.rules_path()).await.unwrap();
    assert_eq!(rules.rule_count(), 1);

    let process = FakeProcess::default();
    process.exit();
    let report = record_session(
        &config,
        Arc::new(rules),
        &log,
        process,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let events = read_array_events(&report.output_path);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "vote");
    assert_eq!(events[0].data["motion"], "map MAP03");
    assert_eq!(events[0].data["source"], "custom");
    assert_eq!(report.summary.lines_read, 2);
}

/// 부분 라인은 프로세스가 종료되어도 기록되지 않음
#[tokio::test]
async fn test_trailing_partial_line_is_never_emitted() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("zdaemon.txt");
    append(&log, "Ant has connected.\nLadna has conn");

    let config = fast_config(dir.path()).build().unwrap();
    let process = FakeProcess::default();
    process.exit();

    let report = record_session(
        &config,
        Arc::new(RuleSet::builtin().unwrap()),
        &log,
        process,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.summary.lines_read, 1);
    let events = read_array_events(&report.output_path);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["player"], "Ant");
}

/// Unix epoch 정책은 매우 큰 타임스탬프를 만든다
#[tokio::test]
async fn test_unix_epoch_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("zdaemon.txt");
    append(&log, "Ant has connected.\n");

    let config = fast_config(dir.path())
        .timestamp_epoch(TimestampEpoch::Unix)
        .build()
        .unwrap();
    let process = FakeProcess::default();
    process.exit();

    let report = record_session(
        &config,
        Arc::new(RuleSet::builtin().unwrap()),
        &log,
        process,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let events = read_array_events(&report.output_path);
    let (secs, micros) = events[0].timestamp.split_once('.').unwrap();
    assert!(secs.parse::<u64>().unwrap() > 1_600_000_000);
    assert_eq!(micros.len(), 6);
}

/// 테일링 중 로그 파일 truncation은 치명적이지만 출력 문서는 닫힘
#[tokio::test]
async fn test_truncation_fails_run_and_closes_output() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("zdaemon.txt");
    append(&log, "Ant has connected.\n");
    let out: PathBuf = dir.path().join("out.json");

    let cancel = CancellationToken::new();
    let tailer = LogTailer::open(&log, &TailerOptions::default(), &cancel)
        .await
        .unwrap();
    let file = tokio::fs::File::create(&out).await.unwrap();
    let writer = EventWriter::open(file, OutputFormat::JsonArray).await.unwrap();
    let config = PipelineConfig {
        read_backoff_ms: 1,
        exit_policy: ExitPolicy::Drain,
        ..PipelineConfig::default()
    };

    let pipeline = EventPipelineBuilder::new()
        .config(config)
        .cancel_token(cancel)
        .build(tailer, writer, FakeProcess::default())
        .unwrap();

    let truncator = {
        let log = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(&log, b"").unwrap();
        })
    };

    let err = pipeline.run().await.unwrap_err();
    truncator.await.unwrap();
    assert!(err.to_string().contains("truncated"));

    let events = read_array_events(&out);
    assert_eq!(events.len(), 1);
}

/// 생성 대기 중 취소
#[tokio::test]
async fn test_cancel_while_waiting_for_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path()).build().unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = record_session(
        &config,
        Arc::new(RuleSet::builtin().unwrap()),
        &dir.path().join("never.txt"),
        FakeProcess::default(),
        cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        zdstats_event_pipeline::EventPipelineError::Cancelled(_)
    ));
}
