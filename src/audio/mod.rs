//! # Audio Handling Module
//!
//! Byte-level audio plumbing for the device protocol.
//!
//! ## Key Components:
//! - **Frame splitting**: fixed-length PCM frames for wake-word evaluation
//! - **WAV persistence**: captured command audio written as a standard
//!   uncompressed WAV container before speech-to-text
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod frames; // Fixed-length frame splitting for wake-word detection
pub mod wav;    // WAV container persistence for captured command audio
