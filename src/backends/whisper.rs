//! Native Whisper backend using whisper.cpp via whisper-rs bindings
//!
//! The model is loaded fresh for every recognition; each invocation is its
//! own process, so there is nothing to keep warm between calls.

use super::{Recognizer, Transcript};
use crate::audio;
use crate::config_loader::Settings;
use crate::error::InvokeError;
use crate::model_store;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Native Whisper recognizer for speech-to-text
#[derive(Debug, Clone)]
pub struct WhisperRecognizer {
    model_path: PathBuf,
    model_url: String,
    auto_download: bool,
    language: String,
    beam_size: u32,
    threads: u32,
    ffmpeg_binary: String,
}

impl WhisperRecognizer {
    pub fn new(model_path: impl Into<PathBuf>, language: &str) -> Self {
        Self {
            model_path: model_path.into(),
            model_url: String::new(),
            auto_download: false,
            language: language.to_string(),
            beam_size: 1,
            threads: 0,
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_path: settings.whisper_model_path(),
            model_url: settings.whisper_model_url.clone(),
            auto_download: settings.whisper_auto_download,
            language: settings.whisper_language.clone(),
            beam_size: settings.whisper_beam_size,
            threads: settings.whisper_threads,
            ffmpeg_binary: settings.ffmpeg_binary.clone(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn load_context(&self) -> Result<WhisperContext, InvokeError> {
        model_store::ensure_model(&self.model_path, &self.model_url, self.auto_download)?;

        let path = self.model_path.to_str().ok_or_else(|| {
            InvokeError::ProcessingFailed(format!(
                "Model path is not valid UTF-8: {}",
                self.model_path.display()
            ))
        })?;

        info!("Whisper: Loading model from {}...", path);
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| {
                InvokeError::ProcessingFailed(format!("Failed to load Whisper model: {:?}", e))
            })?;
        info!("Whisper: Model loaded");
        Ok(ctx)
    }

    fn params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(sampling_strategy(self.beam_size));

        // "auto" leaves language detection to whisper.cpp
        if self.language != "auto" {
            params.set_language(Some(self.language.as_str()));
        }
        if self.threads > 0 {
            params.set_n_threads(i32::try_from(self.threads).unwrap_or(i32::MAX));
        }

        // Keep whisper.cpp off stdout; it belongs to the transcript
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params
    }
}

/// Beam width 1 is plain greedy decoding.
fn sampling_strategy(beam_size: u32) -> SamplingStrategy {
    if beam_size <= 1 {
        SamplingStrategy::Greedy { best_of: 1 }
    } else {
        SamplingStrategy::BeamSearch {
            beam_size: i32::try_from(beam_size).unwrap_or(i32::MAX),
            patience: -1.0,
        }
    }
}

impl Recognizer for WhisperRecognizer {
    fn id(&self) -> &'static str {
        "whisper"
    }

    fn recognize(&self, audio_path: &Path) -> Result<Transcript, InvokeError> {
        let start = Instant::now();

        let ctx = self.load_context()?;

        let samples = audio::load_audio(audio_path, &self.ffmpeg_binary)?;
        debug!(
            "Whisper: Loaded {} samples from {}",
            samples.len(),
            audio_path.display()
        );

        let mut state = ctx
            .create_state()
            .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to create state: {:?}", e)))?;

        state
            .full(self.params(), &samples)
            .map_err(|e| InvokeError::ProcessingFailed(format!("Transcription failed: {:?}", e)))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            let segment_text = segment.to_str().map_err(|e| {
                InvokeError::ProcessingFailed(format!("Unreadable segment text: {:?}", e))
            })?;
            text.push_str(segment_text);
        }

        info!("Whisper: Transcribed {} chars in {:?}", text.trim().len(), start.elapsed());
        Ok(Transcript::new(text))
    }
}
