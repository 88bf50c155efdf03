//! voicebridge: single-shot speech invokers for host applications.
//!
//! `piper-invoke` turns text into a WAV file through the Piper executable and
//! `whisper-invoke` turns an audio file into text with an in-process Whisper
//! model. Both report through exit codes and standard streams only.

pub mod audio;
pub mod backends;
pub mod cli;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod model_store;
pub mod supervisor;
pub mod transcription;

pub use backends::piper::{SynthesisInvoker, SynthesisOutcome, SynthesisRequest};
pub use backends::whisper::WhisperRecognizer;
pub use backends::{Recognizer, Transcript};
pub use config_loader::Settings;
pub use error::InvokeError;
pub use supervisor::CancelToken;
pub use transcription::{OutputFormat, TranscriptionInvoker, TranscriptionRequest};
