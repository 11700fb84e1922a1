//! # Pipeline Orchestrator
//!
//! Sequential inference driver, run once per guard acquisition:
//!
//! 1. Speech-to-text on the persisted command audio (fixed language hint)
//! 2. Empty transcript: abort, no history update, no chat, no synthesis
//! 3. Append the user turn to the conversation history
//! 4. Chat completion over system persona + full history
//! 5. Append the assistant turn to the conversation history
//! 6. Speech synthesis with the fixed pitch shift
//!
//! Any stage failure is caught here, logged, and surfaced to the caller only
//! as "no response". The pipeline never sends protocol notifications; that is
//! the session's responsibility, which keeps `interaction_ended` a single
//! notification per cycle on every path.

use crate::error::AppResult;
use crate::history::ConversationHistory;
use crate::inference::{ChatCompletion, ChatMessage, Role, SpeechSynthesizer, SpeechToText};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// File name for captured command audio within the recordings directory.
pub const INPUT_AUDIO_FILE: &str = "input.wav";

/// File name for synthesized response audio within the recordings directory.
pub const OUTPUT_AUDIO_FILE: &str = "output.wav";

/// Orchestrates the STT -> chat -> TTS sequence against the shared history.
pub struct Pipeline {
    stt: Arc<dyn SpeechToText>,
    chat: Arc<dyn ChatCompletion>,
    tts: Arc<dyn SpeechSynthesizer>,
    history: ConversationHistory,
    system_prompt: String,
    language: String,
    pitch_semitones: i32,
    output_path: PathBuf,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatCompletion>,
        tts: Arc<dyn SpeechSynthesizer>,
        history: ConversationHistory,
        system_prompt: String,
        language: String,
        pitch_semitones: i32,
        output_path: PathBuf,
    ) -> Self {
        Self {
            stt,
            chat,
            tts,
            history,
            system_prompt,
            language,
            pitch_semitones,
            output_path,
        }
    }

    /// Where the synthesized response artifact is written on success.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Run the full pipeline over the persisted command audio.
    ///
    /// ## Returns:
    /// The response text when every stage succeeded, `None` when the
    /// transcript was empty or any stage failed. Errors never escape.
    pub async fn run(&self, input_path: &Path) -> Option<String> {
        match self.execute(input_path).await {
            Ok(response) => response,
            Err(err) => {
                error!("pipeline failed: {}", err);
                None
            }
        }
    }

    async fn execute(&self, input_path: &Path) -> AppResult<Option<String>> {
        let transcript = self.stt.transcribe(input_path, &self.language).await?;
        let transcript = transcript.trim();

        if transcript.is_empty() {
            warn!("no speech detected in command audio");
            return Ok(None);
        }
        info!("user said: {}", transcript);

        self.history.push(Role::User, transcript);

        // Fixed persona instruction followed by the full current history
        let mut messages = vec![ChatMessage::new(Role::System, self.system_prompt.clone())];
        messages.extend(self.history.snapshot());

        let response = self.chat.complete(&messages).await?;
        self.history.push(Role::Assistant, response.clone());
        info!("assistant: {}", response);

        self.tts
            .synthesize(&response, &self.output_path, self.pitch_semitones)
            .await?;

        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockStt {
        transcript: String,
    }

    #[async_trait]
    impl SpeechToText for MockStt {
        async fn transcribe(&self, _audio_path: &Path, _language: &str) -> AppResult<String> {
            Ok(self.transcript.clone())
        }
    }

    #[derive(Default)]
    struct MockChat {
        reply: String,
        fail: bool,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatCompletion for MockChat {
        async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages.to_vec();
            if self.fail {
                return Err(AppError::Inference("chat unavailable".to_string()));
            }
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    struct MockTts {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for MockTts {
        async fn synthesize(
            &self,
            _text: &str,
            _output_path: &Path,
            _pitch_semitones: i32,
        ) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Inference("synthesis failed".to_string()));
            }
            Ok(())
        }
    }

    fn pipeline_with(
        transcript: &str,
        chat: Arc<MockChat>,
        tts: Arc<MockTts>,
        history: ConversationHistory,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(MockStt {
                transcript: transcript.to_string(),
            }),
            chat,
            tts,
            history,
            "Você é Apollo.".to_string(),
            "pt".to_string(),
            2,
            PathBuf::from("output.wav"),
        )
    }

    #[tokio::test]
    async fn test_empty_transcript_aborts_before_chat_and_tts() {
        let chat = Arc::new(MockChat {
            reply: "unused".to_string(),
            ..Default::default()
        });
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("", chat.clone(), tts.clone(), history.clone());

        let result = pipeline.run(Path::new("input.wav")).await;

        assert!(result.is_none());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_transcript_treated_as_empty() {
        let chat = Arc::new(MockChat::default());
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("   \n ", chat.clone(), tts.clone(), history.clone());

        assert!(pipeline.run(Path::new("input.wav")).await.is_none());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_success_path_appends_both_turns() {
        let chat = Arc::new(MockChat {
            reply: "Olá!".to_string(),
            ..Default::default()
        });
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("oi", chat.clone(), tts.clone(), history.clone());

        let result = pipeline.run(Path::new("input.wav")).await;

        assert_eq!(result.as_deref(), Some("Olá!"));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], ChatMessage::new(Role::User, "oi"));
        assert_eq!(snapshot[1], ChatMessage::new(Role::Assistant, "Olá!"));
    }

    #[tokio::test]
    async fn test_chat_request_has_system_prompt_then_history() {
        let chat = Arc::new(MockChat {
            reply: "resposta".to_string(),
            ..Default::default()
        });
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        history.push(Role::User, "pergunta antiga");
        history.push(Role::Assistant, "resposta antiga");

        let pipeline = pipeline_with("nova pergunta", chat.clone(), tts, history);
        pipeline.run(Path::new("input.wav")).await;

        let messages = chat.last_messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "pergunta antiga");
        assert_eq!(messages[3].content, "nova pergunta");
    }

    #[tokio::test]
    async fn test_chat_failure_yields_no_response_and_skips_tts() {
        let chat = Arc::new(MockChat {
            fail: true,
            ..Default::default()
        });
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("oi", chat, tts.clone(), history.clone());

        assert!(pipeline.run(Path::new("input.wav")).await.is_none());
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
        // The user turn was already recorded before the failing chat call
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_tts_failure_yields_no_response() {
        let chat = Arc::new(MockChat {
            reply: "Olá!".to_string(),
            ..Default::default()
        });
        let tts = Arc::new(MockTts {
            fail: true,
            ..Default::default()
        });
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("oi", chat, tts, history.clone());

        assert!(pipeline.run(Path::new("input.wav")).await.is_none());
        // Both turns recorded; only synthesis failed
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_stays_bounded_across_runs() {
        let chat = Arc::new(MockChat {
            reply: "resposta".to_string(),
            ..Default::default()
        });
        let tts = Arc::new(MockTts::default());
        let history = ConversationHistory::new(6);
        let pipeline = pipeline_with("oi", chat, tts, history.clone());

        for _ in 0..5 {
            pipeline.run(Path::new("input.wav")).await;
        }

        assert_eq!(history.len(), 6);
    }
}
