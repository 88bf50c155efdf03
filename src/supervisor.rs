//! Bounded, cancellable waits for child processes and in-process work.

use crate::error::InvokeError;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use wait_timeout::ChildExt;

/// How often a blocked wait wakes up to look at the deadline and the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that asks a running invocation to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A time budget shared by every wait of one invocation. `None` never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Option<Duration>,
    started: Instant,
}

impl Deadline {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            started: Instant::now(),
        }
    }

    fn expired(&self) -> InvokeError {
        InvokeError::TimedOut(self.timeout.unwrap_or_default())
    }

    /// Next slice to sleep for, or None once the deadline has passed.
    fn next_slice(&self) -> Option<Duration> {
        match self.timeout {
            None => Some(POLL_INTERVAL),
            Some(limit) => {
                let remaining = limit.checked_sub(self.started.elapsed())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(POLL_INTERVAL))
                }
            }
        }
    }
}

/// Wait for `child` to exit. On timeout or cancellation the child is killed and reaped.
pub fn wait_child(
    child: &mut Child,
    deadline: &Deadline,
    cancel: &CancelToken,
) -> Result<ExitStatus, InvokeError> {
    loop {
        if cancel.is_cancelled() {
            kill_and_reap(child);
            return Err(InvokeError::Cancelled);
        }

        let Some(slice) = deadline.next_slice() else {
            warn!(pid = child.id(), "Child exceeded its timeout, killing it");
            kill_and_reap(child);
            return Err(deadline.expired());
        };

        match child.wait_timeout(slice) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => continue,
            Err(e) => {
                kill_and_reap(child);
                return Err(InvokeError::ProcessingFailed(format!(
                    "Failed to wait for child process: {}",
                    e
                )));
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `job` on a worker thread and wait for its result under the same
/// timeout/cancel rules as [`wait_child`].
///
/// Work that is still running when the wait gives up is abandoned; its
/// thread is torn down when the process exits.
pub fn run_with_deadline<T, F>(
    job: F,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<T, InvokeError>
where
    F: FnOnce() -> Result<T, InvokeError> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("voicebridge-worker".to_string())
        .spawn(move || {
            let _ = tx.send(job());
        })
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to start worker: {}", e)))?;

    recv_within(&rx, &Deadline::new(timeout), cancel)?
}

/// Receive one value from a helper thread, giving up at the deadline or on cancel.
pub fn recv_within<T>(
    rx: &Receiver<T>,
    deadline: &Deadline,
    cancel: &CancelToken,
) -> Result<T, InvokeError> {
    loop {
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }

        let Some(slice) = deadline.next_slice() else {
            return Err(deadline.expired());
        };

        match rx.recv_timeout(slice) {
            Ok(value) => return Ok(value),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(InvokeError::ProcessingFailed(
                    "Worker thread stopped without a result".to_string(),
                ))
            }
        }
    }
}

/// Exit code of a finished child. Signal deaths map to 128 + signal on unix.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
