//! 파이프라인 오케스트레이션 -- 읽기/분류/필터/타임스탬프/출력의 전체 흐름을 관리합니다.
//!
//! [`EventPipeline`]은 외부 프로세스의 생존 여부와 취소 토큰을 관찰하면서
//! 한 태스크 안에서 순차적으로 로그를 처리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! LogTailer -> LineClassifier -> filter -> TimestampDeriver -> EventWriter
//!                 ^                                               |
//!          ProcessMonitor / CancellationToken ---- 종료 판단 ---- close
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use zdstats_core::config::ExitPolicy;
use zdstats_core::metrics as zm;
use zdstats_core::pipeline::{LineClassifier, ProcessExit, ProcessMonitor};

use crate::collector::LogTailer;
use crate::config::PipelineConfig;
use crate::error::EventPipelineError;
use crate::filter;
use crate::rule::RuleSet;
use crate::timestamp::TimestampDeriver;
use crate::writer::EventWriter;

/// 실행 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 외부 프로세스가 종료됨
    ProcessExited(ProcessExit),
    /// 취소 토큰에 의해 중단됨
    Cancelled,
}

impl RunOutcome {
    /// 메트릭 레이블 값
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::ProcessExited(_) => "process_exited",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessExited(exit) => write!(f, "process exited ({exit})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// 실행 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// 읽은 라인 수
    pub lines_read: u64,
    /// 규칙에 매칭된 라인 수
    pub events_classified: u64,
    /// 필터에서 제외된 이벤트 수
    pub events_filtered: u64,
    /// 출력에 기록된 이벤트 수
    pub events_written: u64,
    /// 종료 사유
    pub outcome: RunOutcome,
}

/// 실행 중 누적 카운터
#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    lines_read: u64,
    events_classified: u64,
    events_filtered: u64,
    events_written: u64,
}

impl RunStats {
    fn into_summary(self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            lines_read: self.lines_read,
            events_classified: self.events_classified,
            events_filtered: self.events_filtered,
            events_written: self.events_written,
            outcome,
        }
    }
}

/// 이벤트 파이프라인 (실행 코디네이터)
///
/// 테일러/출력기 한 쌍을 소유하며 [`run`](Self::run)에서 정확히 한 번 닫습니다.
/// 재사용되지 않습니다.
///
/// # 사용 예시
/// ```ignore
/// use zdstats_event_pipeline::EventPipelineBuilder;
///
/// let pipeline = EventPipelineBuilder::new()
///     .config(config)
///     .classifier(Arc::new(rules))
///     .cancel_token(cancel.clone())
///     .build(tailer, writer, &mut child)?;
///
/// let summary = pipeline.run().await?;
/// ```
pub struct EventPipeline<W, P> {
    classifier: Arc<dyn LineClassifier>,
    deriver: TimestampDeriver,
    tailer: LogTailer,
    writer: EventWriter<W>,
    process: P,
    exit_policy: ExitPolicy,
    read_backoff: Duration,
    cancel: CancellationToken,
    stats: RunStats,
}

impl<W, P> EventPipeline<W, P>
where
    W: AsyncWrite + Unpin + Send,
    P: ProcessMonitor,
{
    /// 종료 조건을 만날 때까지 실행합니다.
    ///
    /// 어떤 경우에도 출력기를 닫으려고 시도합니다. 에러로 중단된 경우
    /// 닫기 실패는 경고로만 남기고 원래 에러를 반환합니다.
    pub async fn run(mut self) -> Result<RunSummary, EventPipelineError> {
        tracing::info!(
            classifier = self.classifier.name(),
            log = %self.tailer.path().display(),
            exit_policy = self.exit_policy.as_str(),
            "event pipeline started"
        );

        let span = tracing::info_span!("event_pipeline", log = %self.tailer.path().display());
        let result = self.run_loop().instrument(span).await;
        self.tailer.close();

        match result {
            Ok(outcome) => {
                self.writer.close().await?;
                let summary = self.stats.into_summary(outcome);
                metrics::counter!(zm::RUNS_FINISHED_TOTAL, zm::LABEL_OUTCOME => outcome.as_label())
                    .increment(1);
                tracing::info!(
                    outcome = %outcome,
                    lines = summary.lines_read,
                    classified = summary.events_classified,
                    filtered = summary.events_filtered,
                    written = summary.events_written,
                    "event pipeline finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(close_err) = self.writer.close().await {
                    tracing::warn!(error = %close_err, "failed to close event output after error");
                }
                metrics::counter!(zm::RUNS_FINISHED_TOTAL, zm::LABEL_OUTCOME => "failed")
                    .increment(1);
                tracing::error!(
                    error = %e,
                    written = self.stats.events_written,
                    "event pipeline failed"
                );
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<RunOutcome, EventPipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested");
                return Ok(RunOutcome::Cancelled);
            }

            if let Some(exit) = self.poll_process()? {
                tracing::info!(status = %exit, "log producer exited");
                if self.exit_policy == ExitPolicy::Drain {
                    self.drain().await?;
                }
                return Ok(RunOutcome::ProcessExited(exit));
            }

            match self.tailer.next_line().await? {
                Some(line) => self.handle_line(&line).await?,
                None => {
                    tokio::select! {
                        () = self.cancel.cancelled() => {}
                        () = tokio::time::sleep(self.read_backoff) => {}
                    }
                }
            }
        }
    }

    /// 테일러가 "새 라인 없음"을 한 번 보고할 때까지 남은 라인을 처리합니다.
    async fn drain(&mut self) -> Result<(), EventPipelineError> {
        let before = self.stats.lines_read;
        while let Some(line) = self.tailer.next_line().await? {
            self.handle_line(&line).await?;
        }
        tracing::debug!(lines = self.stats.lines_read - before, "drained remaining lines");
        Ok(())
    }

    fn poll_process(&mut self) -> Result<Option<ProcessExit>, EventPipelineError> {
        self.process
            .try_exit_status()
            .map_err(|e| EventPipelineError::Process(format!("failed to query process: {e}")))
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), EventPipelineError> {
        self.stats.lines_read += 1;
        metrics::counter!(zm::LINES_READ_TOTAL).increment(1);

        let Some(candidate) = self.classifier.classify(line) else {
            tracing::trace!(line, "unclassified line");
            return Ok(());
        };

        self.stats.events_classified += 1;
        metrics::counter!(
            zm::EVENTS_CLASSIFIED_TOTAL,
            zm::LABEL_CATEGORY => candidate.category.as_str()
        )
        .increment(1);

        if !filter::retain(&candidate) {
            self.stats.events_filtered += 1;
            metrics::counter!(zm::EVENTS_FILTERED_TOTAL).increment(1);
            tracing::trace!(
                category = %candidate.category,
                event_type = %candidate.event_type,
                "event filtered out"
            );
            return Ok(());
        }

        let category = candidate.category;
        let event = candidate.into_event(self.deriver.derive());
        self.writer.write(&event).await?;

        self.stats.events_written += 1;
        metrics::counter!(zm::EVENTS_WRITTEN_TOTAL, zm::LABEL_CATEGORY => category.as_str())
            .increment(1);
        tracing::debug!(event = %event, "event written");
        Ok(())
    }
}

/// 이벤트 파이프라인 빌더
pub struct EventPipelineBuilder {
    config: PipelineConfig,
    classifier: Option<Arc<dyn LineClassifier>>,
    deriver: Option<TimestampDeriver>,
    cancel: CancellationToken,
}

impl EventPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            classifier: None,
            deriver: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 라인 분류기를 지정합니다. 지정하지 않으면 내장 룰셋을 사용합니다.
    pub fn classifier(mut self, classifier: Arc<dyn LineClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// 타임스탬프 산출기를 지정합니다.
    ///
    /// 지정하지 않으면 `build` 시점을 기준으로 설정의 epoch 정책을 적용합니다.
    pub fn deriver(mut self, deriver: TimestampDeriver) -> Self {
        self.deriver = Some(deriver);
        self
    }

    /// 취소 토큰을 지정합니다.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build<W, P>(
        self,
        tailer: LogTailer,
        writer: EventWriter<W>,
        process: P,
    ) -> Result<EventPipeline<W, P>, EventPipelineError>
    where
        W: AsyncWrite + Unpin + Send,
        P: ProcessMonitor,
    {
        self.config.validate()?;

        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => Arc::new(RuleSet::builtin()?),
        };
        let deriver = self
            .deriver
            .unwrap_or_else(|| TimestampDeriver::new(self.config.timestamp_epoch));

        Ok(EventPipeline {
            classifier,
            deriver,
            tailer,
            writer,
            process,
            exit_policy: self.config.exit_policy,
            read_backoff: self.config.read_backoff(),
            cancel: self.cancel,
            stats: RunStats::default(),
        })
    }
}

impl Default for EventPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 한 세션(로그 파일 하나, 출력 파일 하나)의 결과
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// 출력 파일 경로
    pub output_path: PathBuf,
    /// 실행 요약
    pub summary: RunSummary,
}

/// 로그 파일이 생길 때까지 기다린 뒤 출력 파일을 만들고 파이프라인을 실행합니다.
///
/// 타임스탬프 기준 시각은 이 함수가 호출된 시각입니다.
/// 로그 파일이 생기기 전에 프로세스가 끝나면 [`EventPipelineError::Process`]를 반환하고
/// 출력 파일은 만들지 않습니다.
pub async fn record_session<P: ProcessMonitor>(
    config: &PipelineConfig,
    classifier: Arc<dyn LineClassifier>,
    log_path: &Path,
    mut process: P,
    cancel: CancellationToken,
) -> Result<SessionReport, EventPipelineError> {
    config.validate()?;

    let started = chrono::Local::now();
    let deriver = TimestampDeriver::new(config.timestamp_epoch);

    let tailer = {
        let options = config.tailer_options();
        let open = LogTailer::open(log_path, &options, &cancel);
        let exited = wait_for_exit(&mut process, options.open_poll_interval);
        tokio::select! {
            tailer = open => tailer?,
            exit = exited => {
                let exit = exit?;
                // 종료 직전에 생성된 로그 파일은 마지막으로 한 번 더 확인
                if tokio::fs::try_exists(log_path).await? {
                    LogTailer::open(log_path, &options, &cancel).await?
                } else {
                    return Err(EventPipelineError::Process(format!(
                        "process exited ({exit}) before {} appeared",
                        log_path.display()
                    )));
                }
            }
        }
    };

    let (writer, output_path) = EventWriter::create(
        config.output_dir(),
        &config.output_prefix,
        config.output_format,
        &started,
    )
    .await?;

    let pipeline = EventPipelineBuilder::new()
        .config(config.clone())
        .classifier(classifier)
        .deriver(deriver)
        .cancel_token(cancel)
        .build(tailer, writer, process)?;

    let summary = pipeline.run().await?;
    Ok(SessionReport {
        output_path,
        summary,
    })
}

/// 프로세스가 끝날 때까지 주기적으로 확인합니다.
async fn wait_for_exit<P: ProcessMonitor>(
    process: &mut P,
    interval: Duration,
) -> Result<ProcessExit, EventPipelineError> {
    loop {
        if let Some(exit) = process
            .try_exit_status()
            .map_err(|e| EventPipelineError::Process(format!("failed to query process: {e}")))?
        {
            return Ok(exit);
        }
        tokio::time::sleep(interval).await;
    }
}
