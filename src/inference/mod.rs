//! # Inference Capabilities
//!
//! Interfaces for the three external inference capabilities the pipeline
//! orchestrates, plus their concrete backends:
//!
//! - **Speech-to-text**: Whisper-compatible HTTP transcription API (`stt`)
//! - **Chat completion**: OpenAI-compatible chat completions API (`chat`)
//! - **Speech synthesis**: Piper subprocess with SoX pitch shifting (`tts`)
//!
//! The pipeline depends only on the traits defined here, so tests swap the
//! backends for mocks that record calls.

pub mod chat; // OpenAI-compatible chat completions client
pub mod stt;  // Whisper-compatible transcription client
pub mod tts;  // Piper synthesis + SoX pitch shift

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role of a conversation turn, serialized in API wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `{role, content}` turn, as sent to the chat completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Converts a recorded audio artifact into a transcript.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the WAV file at `audio_path` with a fixed language hint.
    /// The returned transcript may be empty when no speech was recognized.
    async fn transcribe(&self, audio_path: &Path, language: &str) -> AppResult<String>;
}

/// Produces a response for an ordered message list (system prompt + history).
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String>;
}

/// Synthesizes speech with a pitch adjustment in semitones.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write synthesized audio for `text` to `output_path`. A pitch shift of
    /// zero (or a missing pitch backend) produces unshifted audio.
    async fn synthesize(&self, text: &str, output_path: &Path, pitch_semitones: i32)
        -> AppResult<()>;
}
