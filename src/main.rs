//! # Voice Agent Backend - Main Application Entry Point
//!
//! Gateway between an embedded audio device (persistent WebSocket) and the
//! speech-to-text, chat completion, and speech synthesis capabilities.
//!
//! ## Application Architecture:
//! - **config**: application configuration (TOML file + environment variables)
//! - **state**: shared state, metrics, and the single-flight processing guard
//! - **session / websocket**: per-connection protocol state machine
//! - **wake**: wake-word frame evaluation
//! - **pipeline**: STT -> chat -> TTS orchestration
//! - **sender**: paced chunked audio streaming back to the device
//! - **inference**: external capability backends behind traits
//! - **health**: health and metrics endpoints

mod audio;      // Frame splitting and WAV persistence
mod config;     // Configuration management
mod error;      // Error handling types
mod health;     // Health check endpoints
mod history;    // Bounded conversation history
mod inference;  // Inference capability traits and backends
mod pipeline;   // Pipeline orchestrator
mod sender;     // Chunked audio sender
mod session;    // Session state machine
mod state;      // Application state management
mod wake;       // Wake-word detection
mod websocket;  // Device WebSocket actor

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use inference::chat::ChatApiClient;
use inference::stt::WhisperApiClient;
use inference::tts::PiperSynthesizer;
use inference::{ChatCompletion, SpeechSynthesizer, SpeechToText};
use pipeline::{Pipeline, OUTPUT_AUDIO_FILE};
use state::AppState;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wake::EnergyWakeEngine;
use websocket::SharedWakeEngine;

/// Global shutdown signal set by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-agent-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    // Artifact directory for captured and synthesized audio
    std::fs::create_dir_all(&config.audio.recordings_dir)?;

    let app_state = AppState::new(config.clone());

    // Inference backends. A missing Piper voice model is fatal here; the
    // gateway must not accept devices it cannot answer.
    let stt: Arc<dyn SpeechToText> = Arc::new(WhisperApiClient::new(
        config.inference.stt_api_url.clone(),
        config.inference.api_key.clone(),
        config.inference.stt_model.clone(),
    ));
    let chat: Arc<dyn ChatCompletion> = Arc::new(ChatApiClient::new(
        config.inference.chat_api_url.clone(),
        config.inference.api_key.clone(),
        config.inference.chat_model.clone(),
    ));
    let tts: Arc<dyn SpeechSynthesizer> =
        Arc::new(PiperSynthesizer::new(&config.inference.piper_model_path)?);

    let pipeline = Pipeline::new(
        stt,
        chat,
        tts,
        app_state.history.clone(),
        config.assistant.system_prompt.clone(),
        config.inference.language.clone(),
        config.assistant.pitch_semitones,
        PathBuf::from(&config.audio.recordings_dir).join(OUTPUT_AUDIO_FILE),
    );

    let wake_engine: SharedWakeEngine = Arc::new(Mutex::new(Box::new(EnergyWakeEngine::new(
        config.wake.frame_length,
        config.wake.energy_threshold,
        config.wake.trigger_frames,
    ))));

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let pipeline_data = web::Data::new(pipeline);
    let wake_data = web::Data::new(wake_engine);

    setup_signal_handlers();

    info!("Starting WebSocket server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(pipeline_data.clone())
            .app_data(wake_data.clone())
            .wrap(Logger::default())
            .route("/ws", web::get().to(websocket::device_websocket))
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing subscriber, honoring RUST_LOG when set.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_agent_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown flag, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
