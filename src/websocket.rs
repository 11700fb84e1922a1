//! # Device WebSocket Handler
//!
//! One actor per connected device, owning that connection's protocol state.
//! The device speaks a small text/binary protocol over a persistent WebSocket:
//!
//! ## Protocol:
//! - **Client → Server (text)**: `ping`, `wake_buffer_start`, `wake_buffer_end`,
//!   `start_audio`, `end_audio`; anything else is logged and ignored
//! - **Client → Server (binary)**: raw 16-bit little-endian PCM, routed by the
//!   current session mode
//! - **Server → Client (text)**: `pong`, `wake_word_detected`,
//!   `wake_word_rejected`, `interaction_ended`
//! - **Server → Client (binary)**: paced chunks of synthesized audio
//!
//! ## Pipeline Hand-off:
//! `end_audio` persists the captured audio, then acquires the process-wide
//! processing guard with an atomic compare-and-swap before spawning the
//! pipeline task. The acquire happens on the actor thread with no await in
//! between, so two sessions can never both pass the "guard is free" check.
//! The spawned task owns the guard token and releases it on drop, which also
//! covers the device disconnecting mid-pipeline.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::pipeline::{Pipeline, INPUT_AUDIO_FILE};
use crate::sender::{stream_artifact, ChunkSink, ChunkerConfig};
use crate::session::{SessionState, WakeOutcome};
use crate::state::{AppState, ProcessingGuard, ProcessingToken};
use crate::wake::WakeWordEngine;
use crate::audio::wav;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the server probes connection liveness.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period before a silent connection is considered dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wake engine shared by all sessions (the engine is stateful per evaluation,
/// and evaluations are short and synchronous).
pub type SharedWakeEngine = Arc<Mutex<Box<dyn WakeWordEngine>>>;

/// WebSocket actor for one device connection.
pub struct DeviceSession {
    /// Unique id for this connection, for log correlation
    session_id: String,

    /// Protocol state machine (buffers, mode, armed flag)
    state: SessionState,

    /// Shared application state (metrics, history, processing guard)
    app_state: web::Data<AppState>,

    /// Inference pipeline, shared across sessions
    pipeline: Arc<Pipeline>,

    /// Wake-word engine used by `wake_buffer_end`
    wake_engine: SharedWakeEngine,

    /// Where captured command audio is persisted before transcription
    input_path: PathBuf,

    /// Outbound chunk pacing
    chunker: ChunkerConfig,

    /// Delay before `interaction_ended` after a pipeline cycle
    end_delay: Duration,

    /// Device sample rate for WAV persistence
    sample_rate: u32,

    /// Last heartbeat time
    last_heartbeat: Instant,
}

impl DeviceSession {
    pub fn new(
        app_state: web::Data<AppState>,
        pipeline: Arc<Pipeline>,
        wake_engine: SharedWakeEngine,
    ) -> Self {
        let config = app_state.get_config();
        Self {
            session_id: Uuid::new_v4().to_string(),
            state: SessionState::default(),
            app_state,
            pipeline,
            wake_engine,
            input_path: PathBuf::from(&config.audio.recordings_dir).join(INPUT_AUDIO_FILE),
            chunker: chunker_config(&config),
            end_delay: Duration::from_millis(config.assistant.end_delay_ms),
            sample_rate: config.audio.sample_rate,
            last_heartbeat: Instant::now(),
        }
    }

    /// Dispatch one text control message.
    fn handle_control(&mut self, msg: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            "ping" => {
                self.last_heartbeat = Instant::now();
                ctx.text("pong");
            }
            "wake_buffer_start" => {
                info!(session_id = %self.session_id, "starting wake word buffer");
                self.state.begin_wake_capture();
            }
            "wake_buffer_end" => {
                info!(session_id = %self.session_id, "wake word buffer ended");
                let outcome = {
                    let mut engine = self.wake_engine.lock().unwrap();
                    self.state.end_wake_capture(engine.as_mut())
                };
                match outcome {
                    WakeOutcome::Detected => {
                        self.app_state.record_wake(true);
                        ctx.text("wake_word_detected");
                    }
                    WakeOutcome::Rejected => {
                        info!(session_id = %self.session_id, "wake word not detected");
                        self.app_state.record_wake(false);
                        ctx.text("wake_word_rejected");
                    }
                }
            }
            "start_audio" => {
                info!(session_id = %self.session_id, "starting audio reception");
                self.state.begin_command_capture();
            }
            "end_audio" => {
                info!(session_id = %self.session_id, "audio reception ended");
                self.handle_audio_end(ctx);
            }
            other => {
                info!(session_id = %self.session_id, "unhandled text message: {}", other);
            }
        }
    }

    /// `end_audio`: persist the capture, acquire the guard, run the pipeline.
    fn handle_audio_end(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let action = prepare_audio_end(
            &self.state,
            &self.app_state.guard,
            &self.input_path,
            self.sample_rate,
        );

        let token = match action {
            AudioEndAction::Ignore => {
                debug!(session_id = %self.session_id, "end_audio with empty buffer, ignoring");
                return;
            }
            AudioEndAction::Failed(err) => {
                error!(session_id = %self.session_id, "failed to persist command audio: {}", err);
                return;
            }
            AudioEndAction::Busy => {
                info!(session_id = %self.session_id, "pipeline already in flight, dropping end_audio");
                return;
            }
            AudioEndAction::Launch(token) => token,
        };

        let pipeline = self.pipeline.clone();
        let app_state = self.app_state.clone();
        let input_path = self.input_path.clone();
        let chunker = self.chunker.clone();
        let end_delay = self.end_delay;
        let session_id = self.session_id.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            // The token lives for the whole task; dropping it at the end
            // releases the guard on every exit path, including a device
            // disconnect mid-pipeline.
            let _token = token;

            let response = pipeline.run(&input_path).await;
            app_state.record_pipeline(response.is_some());

            if response.is_some() {
                let mut sink = SessionSink { addr: addr.clone() };
                match stream_artifact(pipeline.output_path(), &chunker, &mut sink).await {
                    Ok(bytes) => {
                        app_state.add_audio_bytes_streamed(bytes);
                        info!(session_id = %session_id, "audio sent successfully");
                    }
                    Err(err) => {
                        warn!(session_id = %session_id, "failed to send audio: {}", err);
                    }
                }
            }

            tokio::time::sleep(end_delay).await;

            if addr.send(OutboundText("interaction_ended".to_string())).await.is_err() {
                debug!(session_id = %session_id, "device disconnected before interaction_ended");
            }
            addr.do_send(InteractionFinished);

            info!(session_id = %session_id, "interaction completed, ready for new wake word");
        });
    }
}

/// Outcome of the `end_audio` decision, before any pipeline task is spawned.
#[derive(Debug)]
enum AudioEndAction {
    /// Command buffer was empty; nothing happens, no notification
    Ignore,
    /// Persisting the capture failed
    Failed(AppError),
    /// A pipeline execution is already in flight; dropped silently
    Busy,
    /// Audio persisted and the guard acquired; run the pipeline
    Launch(ProcessingToken),
}

/// Decide what `end_audio` does: empty check, WAV persistence, guard
/// acquisition. The command buffer is read without being consumed, so a
/// `Busy` outcome leaves the capture intact for a later re-trigger.
fn prepare_audio_end(
    state: &SessionState,
    guard: &ProcessingGuard,
    input_path: &Path,
    sample_rate: u32,
) -> AudioEndAction {
    let audio = state.command_audio();
    if audio.is_empty() {
        return AudioEndAction::Ignore;
    }

    // Persist before checking the guard, matching the protocol ordering
    if let Err(err) = wav::write_pcm_wav(input_path, audio, sample_rate) {
        return AudioEndAction::Failed(err);
    }

    // Atomic test-and-set; no await between the check and the acquire
    match guard.try_acquire() {
        Some(token) => AudioEndAction::Launch(token),
        None => AudioEndAction::Busy,
    }
}

/// Text notification to the device.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundText(pub String);

/// Binary audio chunk to the device.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundChunk(pub Vec<u8>);

/// Pipeline cycle finished; the session disarms and waits for a new wake word.
#[derive(Message)]
#[rtype(result = "()")]
struct InteractionFinished;

/// Chunk sink that delivers through the session mailbox. A mailbox error
/// means the actor (and therefore the connection) is gone, which aborts the
/// send loop promptly instead of completing a doomed transfer.
struct SessionSink {
    addr: Addr<DeviceSession>,
}

#[async_trait]
impl ChunkSink for SessionSink {
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> AppResult<()> {
        self.addr
            .send(OutboundChunk(chunk))
            .await
            .map_err(|err| AppError::Transport(format!("device connection closed: {}", err)))
    }
}

impl Actor for DeviceSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "device connected");
        self.app_state.device_connected();

        // Liveness probe; closes connections that stop responding
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "device disconnected");
        self.app_state.device_disconnected();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for DeviceSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.handle_control(text.trim(), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                if self.state.on_binary(&data) {
                    self.app_state.add_audio_bytes_received(data.len());
                } else {
                    debug!(
                        session_id = %self.session_id,
                        "dropped {} audio bytes (not wake-buffering, not armed)",
                        data.len()
                    );
                }
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, "connection closed by device: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session_id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, "websocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<OutboundText> for DeviceSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<OutboundChunk> for DeviceSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundChunk, ctx: &mut Self::Context) {
        ctx.binary(msg.0);
    }
}

impl Handler<InteractionFinished> for DeviceSession {
    type Result = ();

    fn handle(&mut self, _msg: InteractionFinished, _ctx: &mut Self::Context) {
        self.state.disarm();
    }
}

fn chunker_config(config: &AppConfig) -> ChunkerConfig {
    ChunkerConfig {
        chunk_size: config.audio.chunk_size,
        chunk_delay: Duration::from_millis(config.audio.chunk_delay_ms),
        settle_delay: Duration::from_millis(config.audio.settle_delay_ms),
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and starts one
/// `DeviceSession` actor for the connection.
pub async fn device_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    pipeline: web::Data<Pipeline>,
    wake_engine: web::Data<SharedWakeEngine>,
) -> ActixResult<HttpResponse> {
    info!(
        "new device connection request from {:?}",
        req.connection_info().peer_addr()
    );

    let session = DeviceSession::new(
        app_state,
        pipeline.into_inner(),
        wake_engine.get_ref().clone(),
    );

    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wake::EnergyWakeEngine;

    /// Session armed through a detected wake evaluation, with `audio` bytes
    /// already captured as the command utterance.
    fn armed_state_with_audio(audio: &[u8]) -> SessionState {
        let mut state = SessionState::default();
        let mut engine = EnergyWakeEngine::new(512, 0.05, 3);

        state.begin_wake_capture();
        let loud: Vec<u8> = vec![12000i16; 512 * 10]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        state.on_binary(&loud);
        assert_eq!(state.end_wake_capture(&mut engine), WakeOutcome::Detected);

        state.begin_command_capture();
        state.on_binary(audio);
        state
    }

    #[test]
    fn test_end_audio_with_empty_buffer_is_ignored() {
        let state = SessionState::default();
        let guard = ProcessingGuard::default();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");

        let action = prepare_audio_end(&state, &guard, &input, 16000);

        // No pipeline, no persistence, no guard acquisition
        assert!(matches!(action, AudioEndAction::Ignore));
        assert!(!guard.is_held());
        assert!(!input.exists());
    }

    #[test]
    fn test_end_audio_persists_capture_and_acquires_guard() {
        let state = armed_state_with_audio(&[0u8; 640]);
        let guard = ProcessingGuard::default();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");

        let action = prepare_audio_end(&state, &guard, &input, 16000);

        let token = match action {
            AudioEndAction::Launch(token) => token,
            other => panic!("expected Launch, got {:?}", other),
        };
        assert!(guard.is_held());
        assert!(input.exists());

        // Pipeline task finishing releases the guard
        drop(token);
        assert!(!guard.is_held());
    }

    #[test]
    fn test_end_audio_while_guard_held_is_dropped() {
        let state = armed_state_with_audio(&[0u8; 640]);
        let guard = ProcessingGuard::default();
        let held = guard.try_acquire().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");

        let action = prepare_audio_end(&state, &guard, &input, 16000);

        assert!(matches!(action, AudioEndAction::Busy));
        // The capture is retained so the device can re-trigger
        assert_eq!(state.command_audio().len(), 640);

        // Once the in-flight run finishes, the same capture goes through
        drop(held);
        let action = prepare_audio_end(&state, &guard, &input, 16000);
        assert!(matches!(action, AudioEndAction::Launch(_)));
    }
}
