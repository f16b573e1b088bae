//! zdstats -- record ZDaemon client console logs as a classified event stream.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use anyhow::Result;
use clap::Parser;

use zdstats_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::commands::{ConfigSource, load_layers};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = ConfigSource::resolve(cli.config.clone());
    let log_level = cli.log_level.as_deref();
    // 파일, 환경변수, --log-level까지 적용한 뒤 명령별로 한 번만 검증
    let layered = load_layers(&source, log_level).await;

    // 설정 로딩이 실패해도 에러를 보고할 수 있도록 로깅은 먼저 초기화
    let general = match &layered {
        Ok(config) if config.validate().is_ok() => config.general.clone(),
        _ => GeneralConfig {
            log_level: log_level.unwrap_or("info").to_owned(),
            ..GeneralConfig::default()
        },
    };
    logging::init_tracing(&general)?;

    tracing::debug!(config = %source, "zdstats starting");

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Config(args) => {
            commands::config::execute(args, &source, log_level, &writer).await
        }
        Commands::Run(args) => match layered {
            // run 명령은 자체 플래그를 적용한 뒤 검증
            Ok(config) => commands::run::execute(args, config, &writer).await,
            Err(e) => Err(e),
        },
        Commands::Rules(args) => match layered.and_then(|config| {
            config.validate()?;
            Ok(config)
        }) {
            Ok(config) => commands::rules::execute(args, &config, &writer).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        report_and_exit(e);
    }

    Ok(())
}

fn report_and_exit(err: CliError) -> ! {
    tracing::error!(error = %err, "command failed");
    eprintln!("error: {err}");
    std::process::exit(err.exit_code());
}
