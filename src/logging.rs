use tracing_subscriber::EnvFilter;

/// Which standard stream diagnostics go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Synthesis: progress lines are part of the caller-visible output
    Stdout,
    /// Transcription: stdout is reserved for the transcript
    Stderr,
}

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init(target: LogTarget, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    // A second init (tests, embedding) is harmless
    let _ = match target {
        LogTarget::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
    };
}
