//! Audio decoding for the recognizer: anything in, 16kHz mono f32 out.

use crate::error::InvokeError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Sample rate whisper.cpp expects
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Load an audio file as f32 mono 16kHz samples.
///
/// WAV files are read directly. Anything hound can't open is converted with
/// `ffmpeg` first.
pub fn load_audio(path: &Path, ffmpeg_binary: &str) -> Result<Vec<f32>, InvokeError> {
    match hound::WavReader::open(path) {
        Ok(reader) => decode_wav(reader),
        Err(e) => {
            debug!("Not a readable WAV ({}), converting with ffmpeg", e);
            let converted = convert_with_ffmpeg(path, ffmpeg_binary)?;
            let reader = hound::WavReader::open(converted.path()).map_err(|e| {
                InvokeError::ProcessingFailed(format!("Failed to open converted WAV: {}", e))
            })?;
            decode_wav(reader)
        }
    }
}

fn decode_wav<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<Vec<f32>, InvokeError> {
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(InvokeError::ProcessingFailed(
            "WAV declares a zero sample rate".to_string(),
        ));
    }
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(wav_error)?
        }
    };

    let mono = to_mono(samples, channels);
    if spec.sample_rate != WHISPER_SAMPLE_RATE {
        Ok(resample(&mono, spec.sample_rate, WHISPER_SAMPLE_RATE))
    } else {
        Ok(mono)
    }
}

fn wav_error(e: hound::Error) -> InvokeError {
    InvokeError::ProcessingFailed(format!("Failed to read WAV samples: {}", e))
}

/// Average interleaved frames down to one channel
pub fn to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx = src_idx as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = match (input.get(idx), input.get(idx + 1)) {
            (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
            (Some(a), None) => *a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}

fn convert_with_ffmpeg(
    input: &Path,
    ffmpeg_binary: &str,
) -> Result<tempfile::NamedTempFile, InvokeError> {
    let converted = tempfile::Builder::new()
        .prefix("voicebridge-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| InvokeError::ProcessingFailed(format!("Failed to create temp file: {}", e)))?;

    let output = Command::new(ffmpeg_binary)
        .arg("-nostdin")
        .args(["-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le", "-f", "wav"])
        .arg(converted.path())
        .output()
        .map_err(|e| InvokeError::ExternalProcessUnreachable {
            program: ffmpeg_binary.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        // A decode failure is a processing failure of this invoker, not a child code to forward
        return Err(InvokeError::ProcessingFailed(format!(
            "ffmpeg could not decode {}: {}",
            input.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(converted)
}
