//! Plumbing shared by the two invoker binaries.

use crate::config_loader::{timeout_from_secs, Settings};
use crate::error::InvokeError;
use crate::supervisor::CancelToken;
use clap::{ArgAction, Args};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Settings file to merge over the defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory relative asset paths are resolved against
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Give up after this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn load_settings(&self) -> Result<Settings, InvokeError> {
        let mut settings = Settings::new(self.config.as_deref())?;
        if let Some(base_dir) = &self.base_dir {
            let base_dir = if base_dir.is_relative() {
                std::env::current_dir().unwrap_or_default().join(base_dir)
            } else {
                base_dir.clone()
            };
            settings.base_dir = base_dir.display().to_string();
        }
        Ok(settings)
    }

    /// The `--timeout` flag if given, otherwise `configured`.
    pub fn timeout_or(&self, configured: Option<Duration>) -> Option<Duration> {
        match self.timeout {
            Some(secs) => timeout_from_secs(secs),
            None => configured,
        }
    }
}

/// Run blocking invoker work off the runtime, cancelling it on Ctrl-C.
pub async fn run_supervised<T, F>(job: F) -> Result<T, InvokeError>
where
    F: FnOnce(CancelToken) -> Result<T, InvokeError> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || job(worker_cancel));

    let joined = tokio::select! {
        joined = &mut handle => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            cancel.cancel();
            handle.await
        }
    };

    joined.map_err(|e| InvokeError::ProcessingFailed(format!("Invoker task failed: {}", e)))?
}

/// Report a failure on stderr and turn it into the process exit code.
pub fn fail(err: InvokeError) -> ExitCode {
    debug!(kind = err.kind(), exit_code = err.exit_code(), "Invocation failed");
    eprintln!("Error: {}", err);
    ExitCode::from(err.exit_code())
}
