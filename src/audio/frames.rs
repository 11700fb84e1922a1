//! # PCM Frame Splitting
//!
//! Splits a raw byte buffer into fixed-length audio frames for wake-word
//! evaluation. The wake-word engine consumes whole frames of a fixed sample
//! count; any trailing bytes shorter than one frame are never evaluated.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::slice::ChunksExact;

/// Bytes per sample for 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Split a byte buffer into consecutive non-overlapping frames of
/// `frame_length` samples each.
///
/// ## Parameters:
/// - **buffer**: raw 16-bit little-endian PCM bytes
/// - **frame_length**: required frame length in samples (engine-defined)
///
/// ## Returns:
/// A finite iterator of `frame_length * 2` byte slices. A trailing remainder
/// shorter than one frame is discarded without evaluation.
pub fn pcm_frames(buffer: &[u8], frame_length: usize) -> ChunksExact<'_, u8> {
    debug_assert!(frame_length > 0, "frame length must be positive");
    buffer.chunks_exact(frame_length * BYTES_PER_SAMPLE)
}

/// Decode one frame of little-endian bytes into 16-bit signed samples.
pub fn decode_samples(frame: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(frame);
    let mut samples = Vec::with_capacity(frame.len() / BYTES_PER_SAMPLE);

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_multiple_yields_all_frames() {
        // 4 frames of 512 samples each
        let buffer = vec![0u8; 512 * BYTES_PER_SAMPLE * 4];
        let frames: Vec<_> = pcm_frames(&buffer, 512).collect();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() == 1024));
    }

    #[test]
    fn test_trailing_remainder_is_discarded() {
        // 2 full frames plus 100 leftover bytes
        let buffer = vec![0u8; 512 * BYTES_PER_SAMPLE * 2 + 100];
        let frames: Vec<_> = pcm_frames(&buffer, 512).collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_buffer_shorter_than_one_frame() {
        let buffer = vec![0u8; 100];
        assert_eq!(pcm_frames(&buffer, 512).count(), 0);
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(pcm_frames(&[], 512).count(), 0);
    }

    #[test]
    fn test_decode_samples_little_endian() {
        // 0x0100 = 256, 0xFFFF = -1
        let frame = [0x00, 0x01, 0xFF, 0xFF];
        assert_eq!(decode_samples(&frame), vec![256, -1]);
    }
}
