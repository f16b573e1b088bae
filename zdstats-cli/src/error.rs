//! CLI-specific error types and exit code mapping

use zdstats_core::error::ZdstatsError;
use zdstats_event_pipeline::EventPipelineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Rule loading or validation failure.
    #[error("rule error: {0}")]
    Rule(String),

    /// Failure while recording the event stream.
    #[error("recording failed: {0}")]
    Pipeline(#[source] EventPipelineError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                  |
    /// |------|--------------------------|
    /// | 0    | Success                  |
    /// | 1    | General / command error  |
    /// | 2    | Configuration error      |
    /// | 3    | Rule error               |
    /// | 10   | IO error                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Rule(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Pipeline(_) => 1,
        }
    }
}

impl From<ZdstatsError> for CliError {
    fn from(e: ZdstatsError) -> Self {
        match e {
            ZdstatsError::Io(io) => Self::Io(io),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<EventPipelineError> for CliError {
    fn from(e: EventPipelineError) -> Self {
        match e {
            EventPipelineError::RuleLoad { .. } | EventPipelineError::RuleValidation { .. } => {
                Self::Rule(e.to_string())
            }
            EventPipelineError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Pipeline(other),
        }
    }
}
