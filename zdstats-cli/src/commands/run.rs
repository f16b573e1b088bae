//! `zdstats run` command handler
//!
//! Launches the game client, tails its console log and writes the event stream
//! until the client exits or the user interrupts the run.
//!
//! The client is owned by the run: when recording is cancelled or fails while
//! the client is still alive, it is killed and reaped before the command returns.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zdstats_core::config::ZdstatsConfig;
use zdstats_event_pipeline::{
    EventPipelineError, PipelineConfig, RuleSet, RunOutcome, SessionReport, record_session,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Argument through which ZDaemon clients accept a console log path.
const LOGFILE_FLAG: &str = "+logfile";

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    config: ZdstatsConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));
    let result = record(args, config, writer, cancel).await;
    signal_task.abort();
    result
}

/// Launch the client and record until it exits or `cancel` fires.
async fn record(
    args: RunArgs,
    mut config: ZdstatsConfig,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    zdstats_core::metrics::describe_all();
    apply_overrides(&mut config, &args);
    config.validate()?;

    let pipeline_config = PipelineConfig::from_core(&config);
    let rules = RuleSet::load_or_builtin(pipeline_config.rules_path()).await?;

    let output_dir = pipeline_config.output_dir();
    tokio::fs::create_dir_all(&output_dir).await?;

    let (log_path, pass_logfile) = match args.log {
        Some(path) => (path, args.pass_logfile),
        None => (
            default_log_path(&output_dir, &config.output.prefix, &Local::now()),
            true,
        ),
    };

    let argv = command_line(&args.command, &log_path, pass_logfile)?;
    info!(
        program = %argv[0],
        log = %log_path.display(),
        "launching client"
    );

    let mut child = tokio::process::Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CliError::Command(format!("failed to launch {}: {e}", argv[0])))?;

    let result = record_session(
        &pipeline_config,
        Arc::new(rules),
        &log_path,
        &mut child,
        cancel,
    )
    .await;

    let report = match result {
        Ok(session) => {
            match session.summary.outcome {
                RunOutcome::ProcessExited(exit) if !exit.success() => {
                    warn!(exit = %exit, "client exited unsuccessfully");
                }
                RunOutcome::ProcessExited(_) => {}
                RunOutcome::Cancelled => stop_client(&mut child).await,
            }
            RunReport::new(&session, &log_path)
        }
        Err(EventPipelineError::Cancelled(reason)) => {
            info!(%reason, "run cancelled before the log file appeared");
            stop_client(&mut child).await;
            RunReport::cancelled_before_log(&log_path)
        }
        Err(e) => {
            stop_client(&mut child).await;
            return Err(e.into());
        }
    };

    writer.render(&report)?;
    Ok(())
}

/// Kill the client if it is still running and reap it.
async fn stop_client(child: &mut tokio::process::Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    match child.kill().await {
        Ok(()) => info!("client stopped"),
        Err(e) => warn!(error = %e, "failed to stop client"),
    }
}

/// Command-line values win over file and environment settings.
fn apply_overrides(config: &mut ZdstatsConfig, args: &RunArgs) {
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.to_string_lossy().into_owned();
    }
    if let Some(format) = args.format {
        config.output.format = format.into();
    }
    if let Some(rules) = &args.rules {
        config.rules.path = rules.to_string_lossy().into_owned();
    }
    if let Some(policy) = args.exit_policy {
        config.pipeline.exit_policy = policy.into();
    }
    if let Some(epoch) = args.epoch {
        config.pipeline.timestamp_epoch = epoch.into();
    }
}

/// `<prefix>-YYYYMMDD_HHMMSS.txt`, used when the log path is generated.
fn log_file_name(prefix: &str, started: &DateTime<Local>) -> String {
    format!("{prefix}-{}.txt", started.format("%Y%m%d_%H%M%S"))
}

/// The client's argv, with `+logfile <path>` appended when requested.
fn command_line(
    command: &[String],
    log_path: &Path,
    pass_logfile: bool,
) -> Result<Vec<String>, CliError> {
    if command.is_empty() {
        return Err(CliError::Command("no command to run".to_owned()));
    }

    let mut argv = command.to_vec();
    if pass_logfile {
        argv.push(LOGFILE_FLAG.to_owned());
        argv.push(log_path.to_string_lossy().into_owned());
    }
    Ok(argv)
}

/// Cancel the run on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    match wait_for_shutdown_signal().await {
        Ok(signal) => {
            info!(signal, "shutdown signal received, closing event stream");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "failed to install signal handlers"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Summary of a finished recording.
#[derive(Serialize)]
pub struct RunReport {
    pub log_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub lines_read: u64,
    pub events_classified: u64,
    pub events_filtered: u64,
    pub events_written: u64,
}

impl RunReport {
    fn new(session: &SessionReport, log_path: &Path) -> Self {
        let summary = &session.summary;
        let exit_code = match summary.outcome {
            RunOutcome::ProcessExited(exit) => exit.code,
            RunOutcome::Cancelled => None,
        };
        Self {
            log_file: log_path.display().to_string(),
            output_file: Some(session.output_path.display().to_string()),
            outcome: summary.outcome.to_string(),
            exit_code,
            lines_read: summary.lines_read,
            events_classified: summary.events_classified,
            events_filtered: summary.events_filtered,
            events_written: summary.events_written,
        }
    }

    /// The run was interrupted while waiting for the log; nothing was written.
    fn cancelled_before_log(log_path: &Path) -> Self {
        Self {
            log_file: log_path.display().to_string(),
            output_file: None,
            outcome: RunOutcome::Cancelled.to_string(),
            exit_code: None,
            lines_read: 0,
            events_classified: 0,
            events_filtered: 0,
            events_written: 0,
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Recording finished: {}", self.outcome.bold())?;
        writeln!(w, "  Log:     {}", self.log_file)?;
        match &self.output_file {
            Some(path) => writeln!(w, "  Events:  {}", path.green())?,
            None => writeln!(w, "  Events:  {}", "(none)".dimmed())?,
        }
        writeln!(
            w,
            "  Lines: {} read, {} classified, {} filtered, {} written",
            self.lines_read, self.events_classified, self.events_filtered, self.events_written
        )?;
        Ok(())
    }
}

/// Generated log paths live next to the event stream.
fn default_log_path(output_dir: &Path, prefix: &str, started: &DateTime<Local>) -> PathBuf {
    output_dir.join(log_file_name(prefix, started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands, OutputFormat};
    use clap::Parser;
    use chrono::TimeZone;
    use zdstats_core::config::{ExitPolicy, OutputFormat as EventFormat, TimestampEpoch};

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).expect("should parse");
        match cli.command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = run_args(&[
            "zdstats",
            "run",
            "--output-dir",
            "/tmp/stats",
            "--format",
            "json-lines",
            "--rules",
            "custom.yml",
            "--exit-policy",
            "immediate",
            "--epoch",
            "unix",
            "--",
            "zdaemon",
        ]);
        let mut config = ZdstatsConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.output.dir, "/tmp/stats");
        assert_eq!(config.output.format, EventFormat::JsonLines);
        assert_eq!(config.rules.path, "custom.yml");
        assert_eq!(config.pipeline.exit_policy, ExitPolicy::Immediate);
        assert_eq!(config.pipeline.timestamp_epoch, TimestampEpoch::Unix);
    }

    #[test]
    fn absent_overrides_keep_config_values() {
        let args = run_args(&["zdstats", "run", "--", "zdaemon"]);
        let mut config = ZdstatsConfig::default();
        config.output.prefix = "duel".to_owned();
        apply_overrides(&mut config, &args);

        assert_eq!(config.output.prefix, "duel");
        assert_eq!(config.output.dir, ".");
        assert_eq!(config.pipeline.exit_policy, ExitPolicy::Drain);
    }

    #[test]
    fn command_line_appends_logfile() {
        let argv = command_line(
            &["zdaemon".to_owned(), "-iwad".to_owned(), "doom2.wad".to_owned()],
            Path::new("/tmp/zd.txt"),
            true,
        )
        .expect("argv");
        assert_eq!(argv, ["zdaemon", "-iwad", "doom2.wad", "+logfile", "/tmp/zd.txt"]);
    }

    #[test]
    fn command_line_without_logfile() {
        let argv = command_line(&["zdaemon".to_owned()], Path::new("/tmp/zd.txt"), false)
            .expect("argv");
        assert_eq!(argv, ["zdaemon"]);
        assert!(command_line(&[], Path::new("/tmp/zd.txt"), true).is_err());
    }

    #[test]
    fn generated_log_name_uses_prefix_and_time() {
        let started = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("valid local time");
        assert_eq!(log_file_name("zdstats", &started), "zdstats-20240309_070501.txt");
        assert_eq!(
            default_log_path(Path::new("/tmp"), "zdstats", &started),
            PathBuf::from("/tmp/zdstats-20240309_070501.txt")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn records_a_client_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("client.txt");
        let script = format!(
            "printf 'MAP: CHANGED to MAP01\\nCMD: say hi\\nAnt has connected.\\n' > '{}'",
            log.display()
        );

        let args = run_args(&[
            "zdstats",
            "run",
            "--log",
            log.to_str().expect("utf-8 path"),
            "--output-dir",
            dir.path().to_str().expect("utf-8 path"),
            "--format",
            "json-lines",
            "--",
            "sh",
            "-c",
            script.as_str(),
        ]);

        let mut config = ZdstatsConfig::default();
        config.tailer.open_poll_interval_ms = 10;
        config.tailer.read_backoff_ms = 1;

        let writer = OutputWriter::new(OutputFormat::Json);
        execute(args, config, &writer).await.expect("run should succeed");

        let output = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .expect("event stream file");
        let text = std::fs::read_to_string(output).expect("read output");
        let types: Vec<String> = text
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).expect("json line");
                v["type"].as_str().expect("type").to_owned()
            })
            .collect();
        assert_eq!(types, ["map_change", "connection"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_before_log_stops_client_and_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("never.txt");
        let marker = dir.path().join("still-running");
        let script = format!("sleep 2; touch '{}'", marker.display());

        let args = run_args(&[
            "zdstats",
            "run",
            "--log",
            log.to_str().expect("utf-8 path"),
            "--output-dir",
            dir.path().to_str().expect("utf-8 path"),
            "--",
            "sh",
            "-c",
            script.as_str(),
        ]);

        let mut config = ZdstatsConfig::default();
        config.tailer.open_poll_interval_ms = 10;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let writer = OutputWriter::new(OutputFormat::Json);
        record(args, config, &writer, cancel)
            .await
            .expect("cancelled run is not an error");

        // 클라이언트가 살아 있었다면 marker를 만들었을 시간
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists(), "client kept running after cancel");
        assert!(!log.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_run_stops_client() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("never.txt");
        let marker = dir.path().join("still-running");
        let script = format!("sleep 3; touch '{}'", marker.display());

        let args = run_args(&[
            "zdstats",
            "run",
            "--log",
            log.to_str().expect("utf-8 path"),
            "--output-dir",
            dir.path().to_str().expect("utf-8 path"),
            "--",
            "sh",
            "-c",
            script.as_str(),
        ]);

        let mut config = ZdstatsConfig::default();
        config.tailer.open_poll_interval_ms = 10;
        config.tailer.open_timeout_secs = 1;

        let writer = OutputWriter::new(OutputFormat::Json);
        let err = record(args, config, &writer, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists(), "client kept running after failure");
    }

    #[test]
    fn cancelled_before_log_report_has_no_output() {
        let report = RunReport::cancelled_before_log(Path::new("/tmp/zd.txt"));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["outcome"], "cancelled");
        assert!(json.get("output_file").is_none());
        assert_eq!(json["events_written"], 0);
    }
}
