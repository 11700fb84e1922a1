//! # Application State Management
//!
//! Shared state for the gateway process: configuration, gateway metrics, the
//! process-wide conversation history, and the single-flight processing guard.
//!
//! ## Thread Safety Pattern:
//! All mutable pieces live behind Arc so every session actor and pipeline task
//! holds the same state. The processing guard is an atomic flag rather than a
//! lock: its try-acquire must test and set in one step, with no suspension
//! point in between, or two sessions could both observe "free" and start
//! overlapping pipeline runs.

use crate::config::AppConfig;
use crate::history::ConversationHistory;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all sessions.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Gateway metrics (updated by session actors and pipeline tasks)
    pub metrics: Arc<RwLock<GatewayMetrics>>,

    /// Process-wide conversation history shared by all sessions
    pub history: ConversationHistory,

    /// Process-wide single-flight pipeline guard
    pub guard: ProcessingGuard,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let history = ConversationHistory::new(config.history.max_entries);
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(GatewayMetrics::default())),
            history,
            guard: ProcessingGuard::default(),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Get a snapshot of the current metrics.
    pub fn get_metrics_snapshot(&self) -> GatewayMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn device_connected(&self) {
        self.metrics.write().unwrap().connected_devices += 1;
    }

    pub fn device_disconnected(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.connected_devices = metrics.connected_devices.saturating_sub(1);
    }

    pub fn record_wake(&self, detected: bool) {
        let mut metrics = self.metrics.write().unwrap();
        if detected {
            metrics.wake_detections += 1;
        } else {
            metrics.wake_rejections += 1;
        }
    }

    pub fn record_pipeline(&self, produced_response: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.pipeline_runs += 1;
        if !produced_response {
            metrics.pipeline_failures += 1;
        }
    }

    pub fn add_audio_bytes_received(&self, bytes: usize) {
        self.metrics.write().unwrap().audio_bytes_received += bytes as u64;
    }

    pub fn add_audio_bytes_streamed(&self, bytes: u64) {
        self.metrics.write().unwrap().audio_bytes_streamed += bytes;
    }
}

/// Counters describing gateway activity since process start.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GatewayMetrics {
    /// Devices currently connected
    pub connected_devices: u32,

    /// Wake-word evaluations that matched
    pub wake_detections: u64,

    /// Wake-word evaluations that did not match
    pub wake_rejections: u64,

    /// Pipeline executions started (runs that produced no response included)
    pub pipeline_runs: u64,

    /// Pipeline executions that produced no response
    pub pipeline_failures: u64,

    /// Raw PCM bytes accepted into capture buffers
    pub audio_bytes_received: u64,

    /// Synthesized audio bytes streamed back to devices
    pub audio_bytes_streamed: u64,
}

/// Process-wide single-flight token preventing overlapping pipeline runs.
///
/// ## Invariant:
/// At most one `ProcessingToken` exists at any time, across all sessions.
/// `try_acquire` uses compare-and-swap so the test and the set are one atomic
/// step. The token releases the guard on drop, so a pipeline task can never
/// leak the guard regardless of which path it exits through.
#[derive(Debug, Clone, Default)]
pub struct ProcessingGuard {
    busy: Arc<AtomicBool>,
}

impl ProcessingGuard {
    /// Non-blocking acquire. Returns the token on success, `None` when a
    /// pipeline execution is already in flight.
    pub fn try_acquire(&self) -> Option<ProcessingToken> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(ProcessingToken {
                busy: self.busy.clone(),
            })
        } else {
            None
        }
    }

    /// Whether a pipeline execution currently holds the guard.
    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Release-on-drop token proving guard ownership.
#[derive(Debug)]
pub struct ProcessingToken {
    busy: Arc<AtomicBool>,
}

impl Drop for ProcessingToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
