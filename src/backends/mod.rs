pub mod piper;
pub mod whisper;

use crate::error::InvokeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw result of a recognition pass, before any cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Trait that speech recognition engines implement.
/// The transcription invoker only talks to this, so tests can swap the model out.
#[cfg_attr(test, mockall::automock)]
pub trait Recognizer: Send + Sync {
    /// Returns the unique ID of the engine (e.g., "whisper")
    fn id(&self) -> &'static str;

    /// Load whatever model is needed and transcribe the audio file at `audio_path`
    fn recognize(&self, audio_path: &Path) -> Result<Transcript, InvokeError>;
}
