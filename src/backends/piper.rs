use crate::config_loader::Settings;
use crate::error::InvokeError;
use crate::supervisor::{self, CancelToken, Deadline};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One text-to-speech job: speak `text` into the WAV file at `output_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub output_path: PathBuf,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            output_path: output_path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub output_path: PathBuf,
    pub elapsed: Duration,
    /// Whatever Piper logged on stderr while succeeding
    pub child_stderr: String,
}

/// Drives the Piper executable as a child process.
#[derive(Debug, Clone)]
pub struct SynthesisInvoker {
    binary_path: PathBuf,
    model_path: PathBuf,
    timeout: Option<Duration>,
}

impl SynthesisInvoker {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            timeout: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.piper_binary_path(), settings.piper_model_path())
            .with_timeout(settings.tts_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Both the executable and the voice model must be on disk before anything is spawned.
    pub fn check_dependencies(&self) -> Result<(), InvokeError> {
        if !self.binary_path.exists() {
            return Err(InvokeError::DependencyMissing {
                what: "Piper executable",
                path: self.binary_path.clone(),
            });
        }
        if !self.model_path.exists() {
            return Err(InvokeError::DependencyMissing {
                what: "Piper model",
                path: self.model_path.clone(),
            });
        }
        Ok(())
    }

    fn command(&self, output_path: &Path) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--model")
            .arg(&self.model_path)
            .arg("--output_file")
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    pub fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: &CancelToken,
    ) -> Result<SynthesisOutcome, InvokeError> {
        info!("Piper binary: {}", self.binary_path.display());
        info!("Model: {}", self.model_path.display());
        info!("Output: {}", request.output_path.display());

        self.check_dependencies()?;

        info!("Generating audio for {} chars of text", request.text.chars().count());
        let start = Instant::now();
        let deadline = Deadline::new(self.timeout);

        let mut cmd = self.command(&request.output_path);
        debug!("Running piper: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| InvokeError::ExternalProcessUnreachable {
                program: self.binary_path.display().to_string(),
                source: e,
            })?;

        // Drain both output pipes so Piper never stalls on a full buffer
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        // Feed the text from its own thread; dropping stdin at the end closes the pipe
        let payload = request.text.clone().into_bytes();
        let stdin = child.stdin.take();
        let (written_tx, written_rx) = mpsc::channel();
        thread::spawn(move || {
            let result = stdin.map_or(Ok(()), |mut stdin| {
                stdin.write_all(&payload)?;
                stdin.flush()
            });
            let _ = written_tx.send(result);
        });

        let status = supervisor::wait_child(&mut child, &deadline, cancel)?;

        // Anything Piper left running in the background can keep these pipes
        // open after it exits, so they share the child's deadline.
        let collected = supervisor::recv_within(&written_rx, &deadline, cancel).and_then(|w| {
            let stdout = supervisor::recv_within(&stdout_reader, &deadline, cancel)?;
            let stderr = supervisor::recv_within(&stderr_reader, &deadline, cancel)?;
            Ok((w, stdout, stderr))
        });
        let (write_result, stdout, stderr) = match collected {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Piper exited with {} but its pipes stayed open", status);
                return Err(e);
            }
        };
        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !stdout.trim().is_empty() {
            debug!("Piper stdout: {}", stdout.trim());
        }

        if !status.success() {
            return Err(InvokeError::ExternalProcessFailed {
                program: "Piper".to_string(),
                code: supervisor::exit_code_of(&status),
                stderr: stderr.trim().to_string(),
            });
        }

        if let Err(e) = write_result {
            return Err(InvokeError::ProcessingFailed(format!(
                "Failed to deliver text to Piper: {}",
                e
            )));
        }

        Ok(SynthesisOutcome {
            output_path: request.output_path.clone(),
            elapsed: start.elapsed(),
            child_stderr: stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(buf);
            });
        }
        None => {
            let _ = tx.send(Vec::new());
        }
    }
    rx
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stand-in for Piper: copies stdin to the file named by --output_file.
    const ECHO_PIPER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --output_file) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat > "$out"
"#;

    const FAILING_PIPER: &str = r#"#!/bin/sh
cat > /dev/null
echo "voice model is corrupt" >&2
exit 3
"#;

    fn fake_piper(dir: &TempDir, script: &str) -> SynthesisInvoker {
        let binary = dir.path().join("piper");
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        let model = dir.path().join("en_US-joe-medium.onnx");
        std::fs::write(&model, b"onnx").unwrap();
        SynthesisInvoker::new(binary, model).with_timeout(Some(Duration::from_secs(10)))
    }

    #[test]
    #[serial]
    fn synthesize_delivers_text_and_reports_output() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = fake_piper(&dir, ECHO_PIPER);
        let out = dir.path().join("out.wav");

        let outcome = invoker
            .synthesize(&SynthesisRequest::new("hello world", &out), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.output_path, out);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello world");
    }

    #[test]
    #[serial]
    fn child_failure_forwards_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = fake_piper(&dir, FAILING_PIPER);
        let out = dir.path().join("out.wav");

        let err = invoker
            .synthesize(&SynthesisRequest::new("hi", &out), &CancelToken::new())
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("voice model is corrupt"));
    }

    #[test]
    fn missing_binary_is_reported_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"onnx").unwrap();
        let invoker = SynthesisInvoker::new(dir.path().join("no-piper"), model);

        let err = invoker
            .synthesize(
                &SynthesisRequest::new("hi", dir.path().join("out.wav")),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, InvokeError::DependencyMissing { what: "Piper executable", .. }));
        assert!(!dir.path().join("out.wav").exists());
    }

    #[test]
    #[serial]
    fn missing_model_is_reported_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        // Would leave a marker behind if it were ever run
        let marker = dir.path().join("spawned");
        let script = format!("#!/bin/sh\ntouch '{}'\n", marker.display());
        let invoker = fake_piper(&dir, &script);
        std::fs::remove_file(invoker.model_path()).unwrap();

        let err = invoker
            .synthesize(
                &SynthesisRequest::new("hi", dir.path().join("out.wav")),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, InvokeError::DependencyMissing { what: "Piper model", .. }));
        assert!(!marker.exists());
    }

    #[test]
    #[serial]
    fn unspawnable_binary_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        // Present but not executable
        let binary = dir.path().join("piper");
        std::fs::write(&binary, "not a program").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"onnx").unwrap();

        let err = SynthesisInvoker::new(binary, model)
            .synthesize(
                &SynthesisRequest::new("hi", dir.path().join("out.wav")),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, InvokeError::ExternalProcessUnreachable { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    #[serial]
    fn hung_child_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = fake_piper(&dir, "#!/bin/sh\nexec sleep 5\n")
            .with_timeout(Some(Duration::from_millis(300)));

        let err = invoker
            .synthesize(
                &SynthesisRequest::new("hi", dir.path().join("out.wav")),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, InvokeError::TimedOut(_)));
        assert_eq!(err.exit_code(), 124);
    }

    #[test]
    #[serial]
    fn background_helper_holding_pipes_is_bounded_by_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = fake_piper(&dir, "#!/bin/sh\ncat > /dev/null\nsleep 5 &\nexit 0\n")
            .with_timeout(Some(Duration::from_secs(1)));

        let started = Instant::now();
        let err = invoker
            .synthesize(
                &SynthesisRequest::new("hi", dir.path().join("out.wav")),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, InvokeError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn successful_run_keeps_piper_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("{}echo 'Real-time factor: 0.12' >&2\n", ECHO_PIPER);
        let invoker = fake_piper(&dir, &script);
        let out = dir.path().join("out.wav");

        let outcome = invoker
            .synthesize(&SynthesisRequest::new("hi", &out), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.child_stderr.trim(), "Real-time factor: 0.12");
        assert!(outcome.elapsed > Duration::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        #[serial]
        fn any_text_reaches_piper_unchanged(text in "\\PC{0,400}") {
            let dir = tempfile::tempdir().unwrap();
            let invoker = fake_piper(&dir, ECHO_PIPER);
            let out = dir.path().join("out.wav");

            invoker
                .synthesize(&SynthesisRequest::new(text.clone(), &out), &CancelToken::new())
                .unwrap();

            prop_assert_eq!(std::fs::read_to_string(&out).unwrap(), text);
        }
    }
}
