//! CLI-specific error types and exit code mapping

use ironpipe_core::error::IronpipeError;
use ironpipe_processor::ProcessorError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Rule or pipeline sources failed validation.
    #[error("rule error: {0}")]
    Rule(String),

    /// The message given to `simulate` is not a JSON object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ironpipe-core.
    #[error("{0}")]
    Core(#[from] IronpipeError),

    /// Record loading or state building failed.
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command error               |
    /// | 2    | Configuration error                   |
    /// | 3    | Invalid rule or pipeline sources      |
    /// | 4    | Invalid simulated message             |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(IronpipeError::Config(_)) => 2,
            Self::Rule(_) => 3,
            Self::InvalidMessage(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Processor(_) => 1,
        }
    }
}
