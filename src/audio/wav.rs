//! # WAV Persistence
//!
//! Writes captured command audio to a standard uncompressed WAV container
//! (16kHz, mono, 16-bit) before handing it to speech-to-text. The incoming
//! bytes are the raw little-endian PCM stream received from the device.

use crate::error::{AppError, AppResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

/// Persist a raw PCM byte buffer as a mono 16-bit WAV file.
///
/// ## Validation:
/// - buffer must be non-empty
/// - buffer length must be even (16-bit samples)
pub fn write_pcm_wav(path: &Path, pcm: &[u8], sample_rate: u32) -> AppResult<()> {
    if pcm.is_empty() {
        return Err(AppError::Internal("no audio data to persist".to_string()));
    }
    if pcm.len() % 2 != 0 {
        return Err(AppError::Internal(
            "audio data length must be even for 16-bit samples".to_string(),
        ));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let mut cursor = Cursor::new(pcm);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!("audio saved ({} bytes) to {}", pcm.len(), path.display());
    Ok(())
}
