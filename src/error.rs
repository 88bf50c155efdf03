//! Error kinds shared by both invokers.
//!
//! Every failure an invoker can hit maps to exactly one variant, and every
//! variant maps to one process exit code.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code used for every failure that has no more specific code.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for an invocation that ran past its timeout (same as coreutils `timeout`).
pub const EXIT_TIMED_OUT: u8 = 124;
/// Exit code for an interrupted invocation (128 + SIGINT).
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Error)]
pub enum InvokeError {
    /// A file the invoker depends on (executable, voice model, recognition model) is absent
    #[error("{what} not found at {}", .path.display())]
    DependencyMissing { what: &'static str, path: PathBuf },

    /// The caller's input file is absent
    #[error("File not found: {}", .0.display())]
    InputMissing(PathBuf),

    /// The child process ran and exited non-zero
    #[error("{program} failed with exit code {code}: {stderr}")]
    ExternalProcessFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// The child process could not be started at all
    #[error("Failed to run {program}: {source}")]
    ExternalProcessUnreachable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    ProcessingFailed(String),

    #[error("Timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

impl InvokeError {
    /// Process exit code the invoker terminates with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ExternalProcessFailed { code, .. } => {
                u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(EXIT_FAILURE)
            }
            Self::TimedOut(_) => EXIT_TIMED_OUT,
            Self::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }

    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DependencyMissing { .. } => "dependency_missing",
            Self::InputMissing(_) => "input_missing",
            Self::ExternalProcessFailed { .. } => "external_process_failed",
            Self::ExternalProcessUnreachable { .. } => "external_process_unreachable",
            Self::ProcessingFailed(_) => "processing_failed",
            Self::TimedOut(_) => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Configuration(_) => "configuration",
        }
    }
}
