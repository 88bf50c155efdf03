use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory relative asset paths are resolved against
    pub base_dir: String,
    // Synthesis (Piper)
    pub piper_binary: String,
    pub piper_model: String,
    pub tts_timeout_secs: u64, // 0 = wait forever
    // Recognition (native Whisper)
    pub whisper_model: String,     // "tiny.en", "base", "small", ...
    pub whisper_model_dir: String, // Where ggml-<model>.bin lives
    pub whisper_model_url: String, // Base URL for fetching missing models
    pub whisper_auto_download: bool,
    pub whisper_language: String,
    pub whisper_beam_size: u32,
    pub whisper_threads: u32, // 0 = whisper.cpp default
    pub stt_timeout_secs: u64,
    pub ffmpeg_binary: String,
}

fn default_piper_binary() -> &'static str {
    if cfg!(windows) {
        "piper/piper.exe"
    } else {
        "piper/piper"
    }
}

const DEFAULT_PIPER_MODEL: &str = "piper/models/en_US-joe-medium.onnx";
const DEFAULT_WHISPER_MODEL_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            piper_binary: default_piper_binary().to_string(),
            piper_model: DEFAULT_PIPER_MODEL.to_string(),
            tts_timeout_secs: 30,
            whisper_model: "tiny.en".to_string(),
            whisper_model_dir: "~/.cache/whisper".to_string(),
            whisper_model_url: DEFAULT_WHISPER_MODEL_URL.to_string(),
            whisper_auto_download: true,
            whisper_language: "en".to_string(),
            whisper_beam_size: 1,
            whisper_threads: 0,
            stt_timeout_secs: 300,
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, local/user config files, an optional
    /// explicit file and `VOICEBRIDGE_*` environment variables (in that order).
    pub fn new(config_file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("base_dir", ".")?
            .set_default("piper_binary", default_piper_binary())?
            .set_default("piper_model", DEFAULT_PIPER_MODEL)?
            .set_default("tts_timeout_secs", 30)?
            .set_default("whisper_model", "tiny.en")?
            .set_default("whisper_model_dir", "~/.cache/whisper")?
            .set_default("whisper_model_url", DEFAULT_WHISPER_MODEL_URL)?
            .set_default("whisper_auto_download", true)?
            .set_default("whisper_language", "en")?
            .set_default("whisper_beam_size", 1)?
            .set_default("whisper_threads", 0)?
            .set_default("stt_timeout_secs", 300)?
            .set_default("ffmpeg_binary", "ffmpeg")?
            // Merge with local config file (if exists)
            .add_source(File::with_name("VoiceBridge").required(false));

        if let Some(home) = dirs::home_dir() {
            builder = builder.add_source(
                File::with_name(&home.join(".config/voicebridge/VoiceBridge").display().to_string())
                    .required(false),
            );
        }

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Environment wins (e.g. VOICEBRIDGE_PIPER_BINARY)
        builder = builder.add_source(config::Environment::with_prefix("VOICEBRIDGE"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        settings.anchor_base_dir();
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.whisper_beam_size == 0 {
            return Err(config::ConfigError::Message(
                "whisper_beam_size must be at least 1".to_string(),
            ));
        }
        if i32::try_from(self.whisper_beam_size).is_err() {
            return Err(config::ConfigError::Message(format!(
                "whisper_beam_size must not exceed {}",
                i32::MAX
            )));
        }
        if i32::try_from(self.whisper_threads).is_err() {
            return Err(config::ConfigError::Message(format!(
                "whisper_threads must not exceed {}",
                i32::MAX
            )));
        }
        if self.whisper_model.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "whisper_model must not be empty".to_string(),
            ));
        }
        if self.whisper_language.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "whisper_language must not be empty (use \"auto\" to detect)".to_string(),
            ));
        }
        if self.piper_binary.is_empty() || self.piper_model.is_empty() {
            return Err(config::ConfigError::Message(
                "piper_binary and piper_model must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Pin a relative base_dir to the working directory as seen right now.
    fn anchor_base_dir(&mut self) {
        let base = expand_home(&self.base_dir);
        if base.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                self.base_dir = cwd.join(base).display().to_string();
            }
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        expand_home(&self.base_dir)
    }

    /// Resolve a configured path: `~/` expands to home, relative paths hang off base_dir.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir().join(expanded)
        }
    }

    pub fn piper_binary_path(&self) -> PathBuf {
        self.resolve(&self.piper_binary)
    }

    pub fn piper_model_path(&self) -> PathBuf {
        self.resolve(&self.piper_model)
    }

    pub fn whisper_model_path(&self) -> PathBuf {
        self.resolve(&self.whisper_model_dir)
            .join(crate::model_store::model_file_name(&self.whisper_model))
    }

    pub fn tts_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.tts_timeout_secs)
    }

    pub fn stt_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.stt_timeout_secs)
    }
}

/// `0` means no timeout.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new(None).expect("Failed to load settings");
        assert!(settings.whisper_beam_size >= 1);
        assert!(settings.base_dir().is_absolute());
    }

    #[test]
    fn default_layout_is_relative_to_base_dir() {
        let settings = Settings {
            base_dir: "/srv/interview".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.piper_model_path(),
            PathBuf::from("/srv/interview/piper/models/en_US-joe-medium.onnx")
        );
        assert!(settings
            .piper_binary_path()
            .starts_with("/srv/interview/piper"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let settings = Settings {
            base_dir: "/srv/interview".to_string(),
            piper_binary: "/usr/local/bin/piper".to_string(),
            whisper_model_dir: "/var/cache/whisper".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.piper_binary_path(), PathBuf::from("/usr/local/bin/piper"));
        assert_eq!(
            settings.whisper_model_path(),
            PathBuf::from("/var/cache/whisper/ggml-tiny.en.bin")
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        let settings = Settings {
            tts_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.tts_timeout(), None);
        assert_eq!(settings.stt_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn validate_rejects_zero_beam() {
        let settings = Settings {
            whisper_beam_size: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_counts_beyond_i32() {
        let oversized_beam = Settings {
            whisper_beam_size: i32::MAX as u32 + 1,
            ..Settings::default()
        };
        assert!(oversized_beam.validate().is_err());

        let oversized_threads = Settings {
            whisper_threads: u32::MAX,
            ..Settings::default()
        };
        assert!(oversized_threads.validate().is_err());

        let largest = Settings {
            whisper_beam_size: i32::MAX as u32,
            whisper_threads: i32::MAX as u32,
            ..Settings::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    #[serial]
    fn explicit_file_and_environment_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(
            &file,
            "piper_model = \"voices/en_GB-alan-medium.onnx\"\nwhisper_language = \"fr\"\n",
        )
        .unwrap();

        std::env::set_var("VOICEBRIDGE_WHISPER_LANGUAGE", "de");
        let result = Settings::new(Some(&file));
        std::env::remove_var("VOICEBRIDGE_WHISPER_LANGUAGE");

        let settings = result.expect("settings should load");
        assert_eq!(settings.piper_model, "voices/en_GB-alan-medium.onnx");
        assert_eq!(settings.whisper_language, "de");
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::new(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
