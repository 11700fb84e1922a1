//! # Wake-Word Detection
//!
//! The detector adapter feeds fixed-length PCM frames to a `WakeWordEngine`
//! in order and stops at the first frame reporting a non-negative match index.
//! Engines follow the common keyword-spotter contract: they declare a required
//! frame length in samples and return a match index per frame (negative means
//! no match).
//!
//! The bundled `EnergyWakeEngine` is a lightweight engine that triggers on a
//! run of consecutive high-energy frames. It carries per-evaluation state, so
//! the adapter resets it before each scan.

use crate::audio::frames::{decode_samples, pcm_frames};
use tracing::{debug, info};

/// Common interface for wake-word detection backends.
pub trait WakeWordEngine: Send {
    /// Required frame length in samples.
    fn frame_length(&self) -> usize;

    /// Evaluate one frame. Non-negative return value is the matched keyword
    /// index; negative means no match.
    fn process(&mut self, frame: &[i16]) -> i32;

    /// Reset internal state before scanning a new capture buffer.
    fn reset(&mut self);
}

/// Run wake-word detection over a captured byte buffer.
///
/// Frames are evaluated in order; scanning stops at the first match. A buffer
/// shorter than one frame yields no frames and therefore no detection.
pub fn detect_wake_word(buffer: &[u8], engine: &mut dyn WakeWordEngine) -> bool {
    engine.reset();

    for frame in pcm_frames(buffer, engine.frame_length()) {
        let samples = decode_samples(frame);
        if engine.process(&samples) >= 0 {
            info!("wake word detected");
            return true;
        }
    }

    debug!("wake word not detected in {} bytes", buffer.len());
    false
}

/// RMS-energy keyword spotter.
///
/// Triggers (match index 0) once `trigger_frames` consecutive frames exceed
/// the energy threshold. Samples are normalized to [-1.0, 1.0] before the
/// energy calculation.
pub struct EnergyWakeEngine {
    frame_length: usize,
    energy_threshold: f32,
    trigger_frames: u32,
    run: u32,
}

impl EnergyWakeEngine {
    pub fn new(frame_length: usize, energy_threshold: f32, trigger_frames: u32) -> Self {
        Self {
            frame_length,
            energy_threshold,
            trigger_frames: trigger_frames.max(1),
            run: 0,
        }
    }
}

impl WakeWordEngine for EnergyWakeEngine {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> i32 {
        let energy = rms_energy(frame);

        if energy > self.energy_threshold {
            self.run += 1;
            if self.run >= self.trigger_frames {
                self.run = 0;
                return 0;
            }
        } else {
            self.run = 0;
        }

        -1
    }

    fn reset(&mut self) {
        self.run = 0;
    }
}

/// Root-mean-square energy of a frame, on normalized samples.
fn rms_energy(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = frame
        .iter()
        .map(|&s| {
            let normalized = s as f32 / 32768.0;
            normalized * normalized
        })
        .sum();

    (sum_squares / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frames::BYTES_PER_SAMPLE;

    /// Engine that matches at a scripted frame index.
    struct ScriptedEngine {
        frame_length: usize,
        match_at: Option<usize>,
        frames_seen: usize,
        resets: usize,
    }

    impl ScriptedEngine {
        fn new(frame_length: usize, match_at: Option<usize>) -> Self {
            Self {
                frame_length,
                match_at,
                frames_seen: 0,
                resets: 0,
            }
        }
    }

    impl WakeWordEngine for ScriptedEngine {
        fn frame_length(&self) -> usize {
            self.frame_length
        }

        fn process(&mut self, frame: &[i16]) -> i32 {
            assert_eq!(frame.len(), self.frame_length);
            let index = self.frames_seen;
            self.frames_seen += 1;
            match self.match_at {
                Some(at) if at == index => 0,
                _ => -1,
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.frames_seen = 0;
        }
    }

    fn buffer_of_frames(frame_length: usize, count: usize) -> Vec<u8> {
        vec![0u8; frame_length * BYTES_PER_SAMPLE * count]
    }

    #[test]
    fn test_short_buffer_never_detects() {
        let mut engine = ScriptedEngine::new(512, Some(0));
        // One byte short of a full frame
        let buffer = vec![0u8; 512 * BYTES_PER_SAMPLE - 1];
        assert!(!detect_wake_word(&buffer, &mut engine));
        assert_eq!(engine.frames_seen, 0);
    }

    #[test]
    fn test_match_mid_buffer_with_trailing_partial() {
        let mut engine = ScriptedEngine::new(512, Some(10));
        let mut buffer = buffer_of_frames(512, 20);
        buffer.extend_from_slice(&[0u8; 37]); // trailing partial frame
        assert!(detect_wake_word(&buffer, &mut engine));
        // Scanning stops at the matching frame
        assert_eq!(engine.frames_seen, 11);
    }

    #[test]
    fn test_exhaustion_without_match() {
        let mut engine = ScriptedEngine::new(512, None);
        let buffer = buffer_of_frames(512, 40);
        assert!(!detect_wake_word(&buffer, &mut engine));
        assert_eq!(engine.frames_seen, 40);
    }

    #[test]
    fn test_engine_reset_before_each_scan() {
        let mut engine = ScriptedEngine::new(512, None);
        let buffer = buffer_of_frames(512, 2);
        detect_wake_word(&buffer, &mut engine);
        detect_wake_word(&buffer, &mut engine);
        assert_eq!(engine.resets, 2);
    }

    #[test]
    fn test_energy_engine_triggers_on_consecutive_loud_frames() {
        let mut engine = EnergyWakeEngine::new(4, 0.05, 3);
        let loud = [12000i16; 4];
        let quiet = [0i16; 4];

        assert_eq!(engine.process(&loud), -1);
        assert_eq!(engine.process(&loud), -1);
        assert_eq!(engine.process(&loud), 0);

        // A quiet frame breaks the run
        engine.reset();
        assert_eq!(engine.process(&loud), -1);
        assert_eq!(engine.process(&quiet), -1);
        assert_eq!(engine.process(&loud), -1);
        assert_eq!(engine.process(&loud), -1);
        assert_eq!(engine.process(&loud), 0);
    }
}
