//! `zdstats config` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use zdstats_core::config::ZdstatsConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::commands::{ConfigSource, load_config};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
const SECTIONS: [&str; 5] = ["general", "tailer", "rules", "output", "pipeline"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    source: &ConfigSource,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(source, log_level, writer).await,
        ConfigAction::Show { section } => execute_show(source, log_level, section, writer).await,
    }
}

/// Load and validate the configuration, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values,
/// missing explicit file).
async fn execute_validate(
    source: &ConfigSource,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(source = %source, "validating configuration");

    let report = match load_config(source, log_level).await {
        Ok(_) => ConfigValidationReport {
            source: source.to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: source.to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Display the effective configuration (file + env overrides + defaults).
async fn execute_show(
    source: &ConfigSource,
    log_level: Option<&str>,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(source = %source, "loading configuration");

    let config = load_config(source, log_level).await?;
    let report = build_report(&config, source.to_string(), section)?;
    writer.render(&report)?;

    Ok(())
}

/// Build the report for the whole configuration or a single section.
fn build_report(
    config: &ZdstatsConfig,
    source: String,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let (config_toml, config_json) = match section.as_deref() {
        None => serialize(config)?,
        Some("general") => serialize(&config.general)?,
        Some("tailer") => serialize(&config.tailer)?,
        Some("rules") => serialize(&config.rules)?,
        Some("output") => serialize(&config.output)?,
        Some("pipeline") => serialize(&config.pipeline)?,
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source,
        section,
        config: config_json,
        config_toml,
    })
}

fn serialize<T: Serialize>(value: &T) -> Result<(String, serde_json::Value), CliError> {
    let toml = toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize configuration: {e}")))?;
    let json = serde_json::to_value(value)?;
    Ok((toml, json))
}

/// Configuration display report.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Where the configuration came from
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Effective values
    pub config: serde_json::Value,
    /// TOML rendering used for text output
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Where the configuration came from
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
