//! Command handlers -- one module per subcommand

pub mod config;
pub mod rules;
pub mod run;

use std::fmt;
use std::path::{Path, PathBuf};

use zdstats_core::config::ZdstatsConfig;

use crate::error::CliError;

/// Configuration file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "zdstats.toml";

/// Where the effective configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A TOML file (explicit or discovered). Missing files are an error.
    File(PathBuf),
    /// No file: built-in defaults plus environment overrides.
    Defaults,
}

impl ConfigSource {
    /// Resolve the source from the `--config` flag.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(path) => Self::File(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::File(PathBuf::from(DEFAULT_CONFIG_FILE))
            }
            None => Self::Defaults,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("<defaults>"),
        }
    }
}

/// Layer defaults, the file (if any), `ZDSTATS_*` overrides and the global
/// `--log-level` flag. The result is not validated yet: commands with their own
/// flags layer those on top first.
pub async fn load_layers(
    source: &ConfigSource,
    log_level: Option<&str>,
) -> Result<ZdstatsConfig, CliError> {
    let mut config = match source {
        ConfigSource::File(path) => ZdstatsConfig::from_file(path).await?,
        ConfigSource::Defaults => ZdstatsConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
    }
    Ok(config)
}

/// [`load_layers`] followed by validation.
pub async fn load_config(
    source: &ConfigSource,
    log_level: Option<&str>,
) -> Result<ZdstatsConfig, CliError> {
    let config = load_layers(source, log_level).await?;
    config.validate()?;
    Ok(config)
}

/// Pick the rule path: the command-line value wins over `rules.path`.
/// `None` selects the built-in rule set.
pub fn rules_path(explicit: Option<PathBuf>, config: &ZdstatsConfig) -> Option<PathBuf> {
    explicit.or_else(|| {
        (!config.rules.path.is_empty()).then(|| PathBuf::from(&config.rules.path))
    })
}
