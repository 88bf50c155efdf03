use crate::backends::{Recognizer, Transcript};
use crate::error::InvokeError;
use crate::supervisor::{self, CancelToken};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    pub audio_path: PathBuf,
}

impl TranscriptionRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
        }
    }
}

/// How the transcript is written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// `{"text": "..."}`
    Json,
}

/// Checks the input, runs a recognizer under a deadline and cleans up its text.
pub struct TranscriptionInvoker<R> {
    recognizer: Arc<R>,
    timeout: Option<Duration>,
}

impl<R: Recognizer + 'static> TranscriptionInvoker<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transcribe the request's audio file and return the stripped text.
    ///
    /// A missing file is rejected before the recognizer is touched.
    pub fn transcribe(
        &self,
        request: &TranscriptionRequest,
        cancel: &CancelToken,
    ) -> Result<String, InvokeError> {
        if !request.audio_path.exists() {
            return Err(InvokeError::InputMissing(request.audio_path.clone()));
        }

        debug!(
            "Transcribing {} with {}",
            request.audio_path.display(),
            self.recognizer.id()
        );

        let recognizer = Arc::clone(&self.recognizer);
        let audio_path = request.audio_path.clone();
        let transcript =
            supervisor::run_with_deadline(move || recognizer.recognize(&audio_path), self.timeout, cancel)?;

        Ok(transcript.text.trim().to_string())
    }
}

/// Write the transcript to `out` followed by a newline.
pub fn write_transcript<W: Write>(
    out: &mut W,
    text: &str,
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Text => writeln!(out, "{}", text),
        OutputFormat::Json => {
            let json = serde_json::to_string(&Transcript::new(text))?;
            writeln!(out, "{}", json)
        }
    }
}
