//! piper-invoke - speak text into a WAV file with Piper
//!
//! Usage: piper-invoke <TEXT> <OUTPUT_FILE>
//! Exits 0 on success, with Piper's own code when Piper fails, 1 otherwise.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use voicebridge::cli::{self, CommonArgs};
use voicebridge::logging::{self, LogTarget};
use voicebridge::{SynthesisInvoker, SynthesisRequest};

/// Synthesize speech with a local Piper voice
#[derive(Parser)]
#[command(name = "piper-invoke")]
#[command(version)]
#[command(about = "Synthesize TEXT into OUTPUT_FILE with the local Piper executable", long_about = None)]
struct Cli {
    /// Text to speak
    text: String,

    /// Where Piper should write the WAV file (its directory must exist)
    output_file: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(LogTarget::Stdout, cli.common.verbose);

    let settings = match cli.common.load_settings() {
        Ok(s) => s,
        Err(e) => return cli::fail(e),
    };

    let invoker = SynthesisInvoker::from_settings(&settings)
        .with_timeout(cli.common.timeout_or(settings.tts_timeout()));
    let request = SynthesisRequest::new(cli.text, cli.output_file);

    match cli::run_supervised(move |cancel| invoker.synthesize(&request, &cancel)).await {
        Ok(outcome) => {
            debug!("Piper finished in {:?}", outcome.elapsed);
            if !outcome.child_stderr.trim().is_empty() {
                debug!("Piper stderr: {}", outcome.child_stderr.trim());
            }
            println!("Audio saved to {}", outcome.output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => cli::fail(e),
    }
}
