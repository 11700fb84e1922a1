//! # Speech-to-Text Client
//!
//! Whisper-compatible HTTP transcription backend. The recorded command audio
//! is uploaded as a multipart WAV file together with the model name and the
//! fixed language hint, and the response body carries the transcript.

use crate::error::{AppError, AppResult};
use crate::inference::SpeechToText;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Response body of the transcription endpoint.
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-compatible transcription API client.
pub struct WhisperApiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl WhisperApiClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperApiClient {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> AppResult<String> {
        let audio = tokio::fs::read(audio_path).await?;
        debug!(
            audio_bytes = audio.len(),
            model = %self.model,
            "starting transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Inference(format!(
                "transcription API error {}: {}",
                status, body
            )));
        }

        let body: TranscriptionResponse = response.json().await?;
        Ok(body.text.trim().to_string())
    }
}
