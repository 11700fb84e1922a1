//! # Error Handling
//!
//! Custom error types for the gateway. Device-facing behavior is deliberately
//! narrow: per the protocol, the connected device only ever sees the documented
//! notification strings, never a structured error payload. Errors are therefore
//! contained and logged at the boundary where they occur.
//!
//! ## Error Categories:
//! - **Transport**: the WebSocket connection closed or broke mid-session
//! - **Inference**: a speech-to-text, chat, or synthesis call failed
//! - **ResourceUnavailable**: an optional backend (SoX pitch shift) is missing
//! - **Config**: configuration or required model problems; fatal at startup
//! - **Internal**: everything else (I/O, audio encoding)

use std::fmt;

/// Application error type used across the pipeline and inference adapters.
#[derive(Debug)]
pub enum AppError {
    /// Device connection closed or broken mid-session
    Transport(String),

    /// Speech-to-text, chat completion, or synthesis failure
    Inference(String),

    /// Optional backend missing at runtime (non-fatal, triggers fallback)
    ResourceUnavailable(String),

    /// Configuration file, environment, or required model problems
    Config(String),

    /// Internal errors (file I/O, audio encoding, etc.)
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Inference(msg) => write!(f, "Inference error: {}", msg),
            AppError::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<hound::Error> for AppError {
    fn from(err: hound::Error) -> Self {
        AppError::Internal(format!("WAV encoding error: {}", err))
    }
}

/// HTTP client failures from the inference API adapters.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Inference(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        let err = AppError::Inference("chat API returned 500".to_string());
        assert_eq!(err.to_string(), "Inference error: chat API returned 500");

        let err = AppError::Config("piper model not found".to_string());
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
