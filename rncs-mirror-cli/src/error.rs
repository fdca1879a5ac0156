//! CLI error type and exit codes.

use std::path::PathBuf;

use rncs_mirror::logging::LoggingError;
use rncs_mirror::MirrorError;
use thiserror::Error;

/// Errors surfaced to the user by the `rncs-mirror` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{}: checksum mismatch", path.display())]
    VerificationFailed { path: PathBuf },

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// 2 for configuration or usage problems, 3 for integrity failures,
    /// 130 after Ctrl-C, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_)
            | Self::InvalidArgument(_)
            | Self::Mirror(MirrorError::InvalidConfig(_)) => 2,
            Self::VerificationFailed { .. } => 3,
            Self::Mirror(e) if e.is_integrity() => 3,
            Self::Mirror(MirrorError::Cancelled) => 130,
            _ => 1,
        }
    }
}
