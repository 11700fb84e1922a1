//! # Speech Synthesis
//!
//! Text-to-speech via the Piper CLI, followed by a SoX pitch shift. Piper
//! writes an intermediate WAV to a temp file; SoX then shifts it by the
//! requested number of semitones (SoX works in cents, 100 cents per semitone)
//! and resamples to 16kHz for the device.
//!
//! ## Degraded Mode:
//! SoX availability is probed once at construction. When it is missing, a
//! requested pitch shift falls back to a pass-through copy of the unshifted
//! Piper output. A missing Piper voice model, by contrast, is a fatal
//! configuration error at startup.

use crate::error::{AppError, AppResult};
use crate::inference::SpeechSynthesizer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Fixed Piper synthesis parameters (phoneme length / noise scales).
const LENGTH_SCALE: f32 = 1.0;
const NOISE_SCALE: f32 = 0.667;
const NOISE_W: f32 = 0.8;

/// Piper + SoX synthesis backend.
#[derive(Debug)]
pub struct PiperSynthesizer {
    model_path: PathBuf,
    has_sox: bool,
}

impl PiperSynthesizer {
    /// Create a synthesizer for the given Piper voice model.
    ///
    /// ## Errors:
    /// Returns `AppError::Config` when the voice model file does not exist.
    /// The process must not start without its synthesis model.
    pub fn new(model_path: impl Into<PathBuf>) -> AppResult<Self> {
        let model_path = model_path.into();
        if !model_path.exists() {
            return Err(AppError::Config(format!(
                "piper voice model not found: {}",
                model_path.display()
            )));
        }

        let has_sox = probe_sox();
        if !has_sox {
            warn!("sox not found; pitch shifting disabled, synthesis will be pass-through");
        }

        Ok(Self {
            model_path,
            has_sox,
        })
    }

    /// Run Piper, writing unshifted audio to `output`.
    async fn run_piper(&self, text: &str, output: &Path) -> AppResult<()> {
        let mut child = Command::new("piper")
            .arg("--model")
            .arg(&self.model_path)
            .arg("--length_scale")
            .arg(LENGTH_SCALE.to_string())
            .arg("--noise_scale")
            .arg(NOISE_SCALE.to_string())
            .arg("--noise_w")
            .arg(NOISE_W.to_string())
            .arg("--output_file")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Piper reads the text to synthesize from stdin
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Internal("failed to open piper stdin".to_string()))?;
        stdin.write_all(text.as_bytes()).await?;
        drop(stdin);

        let status = child.wait().await?;
        if !status.success() {
            return Err(AppError::Inference(format!(
                "piper exited with status {}",
                status
            )));
        }
        Ok(())
    }

    /// Shift `input` by `semitones` with SoX and resample to 16kHz.
    async fn run_sox_pitch(&self, input: &Path, output: &Path, semitones: i32) -> AppResult<()> {
        if !self.has_sox {
            return Err(AppError::ResourceUnavailable(
                "sox is not installed".to_string(),
            ));
        }

        let status = Command::new("sox")
            .arg(input)
            .arg(output)
            .arg("pitch")
            .arg((semitones * 100).to_string())
            .arg("rate")
            .arg("16000")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(AppError::Inference(format!(
                "sox exited with status {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        output_path: &Path,
        pitch_semitones: i32,
    ) -> AppResult<()> {
        let tmp = tempfile::Builder::new().suffix(".wav").tempfile()?;

        debug!(chars = text.len(), "generating audio with piper");
        self.run_piper(text, tmp.path()).await?;

        if pitch_semitones != 0 {
            debug!(semitones = pitch_semitones, "adjusting pitch with sox");
            match self
                .run_sox_pitch(tmp.path(), output_path, pitch_semitones)
                .await
            {
                Ok(()) => {}
                Err(AppError::ResourceUnavailable(msg)) => {
                    warn!("{}, copying unshifted audio", msg);
                    tokio::fs::copy(tmp.path(), output_path).await?;
                }
                Err(err) => return Err(err),
            }
        } else {
            tokio::fs::copy(tmp.path(), output_path).await?;
        }

        info!("synthesized audio written to {}", output_path.display());
        Ok(())
    }
}

/// Probe whether the SoX binary is on the PATH.
fn probe_sox() -> bool {
    std::process::Command::new("sox")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_fatal() {
        let err = PiperSynthesizer::new("/nonexistent/voice.onnx").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
