//! whisper-invoke - transcribe an audio file with a local Whisper model
//!
//! Usage: whisper-invoke <AUDIO_FILE>
//! The transcript is the only thing written to stdout; diagnostics go to stderr.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use voicebridge::cli::{self, CommonArgs};
use voicebridge::logging::{self, LogTarget};
use voicebridge::transcription::write_transcript;
use voicebridge::{InvokeError, OutputFormat, TranscriptionInvoker, TranscriptionRequest, WhisperRecognizer};

/// Transcribe speech with a local Whisper model
#[derive(Parser)]
#[command(name = "whisper-invoke")]
#[command(version)]
#[command(about = "Print the transcription of AUDIO_FILE", long_about = None)]
struct Cli {
    /// Audio file to transcribe (WAV, or anything ffmpeg can decode)
    audio_file: PathBuf,

    /// Print {"text": "..."} instead of plain text
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(LogTarget::Stderr, cli.common.verbose);

    let settings = match cli.common.load_settings() {
        Ok(s) => s,
        Err(e) => return cli::fail(e),
    };

    let invoker = TranscriptionInvoker::new(WhisperRecognizer::from_settings(&settings))
        .with_timeout(cli.common.timeout_or(settings.stt_timeout()));
    let request = TranscriptionRequest::new(cli.audio_file);
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let text = match cli::run_supervised(move |cancel| invoker.transcribe(&request, &cancel)).await {
        Ok(text) => text,
        Err(e) => return cli::fail(e),
    };

    let mut stdout = std::io::stdout().lock();
    let written = write_transcript(&mut stdout, &text, format).and_then(|_| stdout.flush());
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => cli::fail(InvokeError::ProcessingFailed(format!(
            "Failed to write transcript: {}",
            e
        ))),
    }
}
