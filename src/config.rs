//! # Configuration Management
//!
//! Loads gateway configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special environment variables (HOST, PORT, OPENAI_API_KEY)
//! 2. Environment variables (APP_SERVER__HOST, APP_INFERENCE__STT_API_URL,
//!    etc. — sections separated by a double underscore, so multi-word keys
//!    stay addressable)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub assistant: AssistantConfig,
    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub history: HistoryConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External inference API and model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Transcription endpoint (Whisper-compatible)
    pub stt_api_url: String,
    pub stt_model: String,

    /// Chat completions endpoint (OpenAI-compatible)
    pub chat_api_url: String,
    pub chat_model: String,

    /// Bearer token for both HTTP APIs (usually set via OPENAI_API_KEY)
    pub api_key: String,

    /// Fixed language hint passed to speech-to-text
    pub language: String,

    /// Piper voice model path; the process does not start without it
    pub piper_model_path: String,
}

/// Assistant persona and interaction pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Fixed leading system instruction for every chat request
    pub system_prompt: String,

    /// Fixed pitch shift applied to synthesized speech, in semitones
    pub pitch_semitones: i32,

    /// Delay before `interaction_ended` is sent, in milliseconds
    pub end_delay_ms: u64,
}

/// Audio format and streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Nominal device sample rate (16kHz mono 16-bit PCM)
    pub sample_rate: u32,

    /// Maximum bytes per outbound audio chunk
    pub chunk_size: usize,

    /// Delay between outbound chunks, in milliseconds
    pub chunk_delay_ms: u64,

    /// Settle delay after the final chunk, in milliseconds
    pub settle_delay_ms: u64,

    /// Directory for the input/output audio artifacts
    pub recordings_dir: String,
}

/// Wake-word engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Engine frame length in samples
    pub frame_length: usize,

    /// RMS energy threshold on normalized samples
    pub energy_threshold: f32,

    /// Consecutive high-energy frames required to trigger
    pub trigger_frames: u32,
}

/// Conversation history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum retained conversation turns
    pub max_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            inference: InferenceConfig {
                stt_api_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                stt_model: "whisper-1".to_string(),
                chat_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
                chat_model: "gpt-4.1-nano".to_string(),
                api_key: String::new(),
                language: "pt".to_string(),
                piper_model_path: "models/pt_BR-faber-medium.onnx".to_string(),
            },
            assistant: AssistantConfig {
                system_prompt: "Você é Apollo, um astronauta inteligente e sua missão é \
                                conversar e brincar com crianças.\n\
                                Responda com frases curtas, de forma alegre e carinhosa.\n\
                                Evite temas adultos, palavrões ou assuntos sérios.\n\
                                Conte histórias, curiosidades e piadas engraçadas.\n\
                                Sugira brincadeiras de advinhas e outras.\n\
                                Nunca responda com emojis.\n"
                    .to_string(),
                pitch_semitones: 2,
                end_delay_ms: 1000,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                chunk_size: 1024,
                chunk_delay_ms: 24,
                settle_delay_ms: 500,
                recordings_dir: "recordings".to_string(),
            },
            wake: WakeConfig {
                frame_length: 512,
                energy_threshold: 0.03,
                trigger_frames: 3,
            },
            history: HistoryConfig { max_entries: 6 },
        }
    }
}

/// Environment variable source: `APP_` prefix, sections separated by a
/// double underscore. Keys with underscores of their own map cleanly
/// (`APP_INFERENCE__STT_API_URL` -> `inference.stt_api_url`).
fn env_source() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with built-in defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Override with config.toml if present
            .add_source(config::File::with_name("config").required(false))
            // 3. Override with APP_-prefixed environment variables
            .add_source(env_source());

        // Special environment variables used by deployment platforms
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The API key normally comes from the environment, not the file
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("inference.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.audio.chunk_size == 0 {
            return Err(anyhow::anyhow!("Audio chunk size must be greater than 0"));
        }

        if self.wake.frame_length == 0 {
            return Err(anyhow::anyhow!("Wake frame length must be greater than 0"));
        }

        if self.history.max_entries == 0 {
            return Err(anyhow::anyhow!("History cap must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.chunk_size, 1024);
        assert_eq!(config.audio.chunk_delay_ms, 24);
        assert_eq!(config.history.max_entries, 6);
        assert_eq!(config.assistant.pitch_semitones, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_reaches_multi_word_keys() {
        env::set_var("APP_INFERENCE__STT_API_URL", "http://localhost:9000/v1");
        env::set_var("APP_AUDIO__CHUNK_DELAY_MS", "48");

        let config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(env_source())
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.inference.stt_api_url, "http://localhost:9000/v1");
        assert_eq!(config.audio.chunk_delay_ms, 48);

        env::remove_var("APP_INFERENCE__STT_API_URL");
        env::remove_var("APP_AUDIO__CHUNK_DELAY_MS");
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.wake.frame_length = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.history.max_entries = 0;
        assert!(config.validate().is_err());
    }
}
