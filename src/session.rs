//! # Session State Machine
//!
//! Per-connection protocol state, kept separate from the WebSocket actor so
//! the transition rules are testable without a transport. A session is always
//! in exactly one buffering mode (`None` or `WakeBuffering`) plus an orthogonal
//! armed flag; pipeline execution is signaled by the process-wide guard, not by
//! session-local state.
//!
//! ## Binary Frame Routing:
//! - mode = wake_buffering: bytes go to the wake capture buffer
//! - mode = none, armed: bytes go to the command capture buffer
//! - mode = none, unarmed: bytes are dropped without state change

use crate::wake::{detect_wake_word, WakeWordEngine};

/// Which capture buffer binary frames are currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingMode {
    /// Not capturing for wake-word evaluation
    Idle,
    /// Capturing audio for wake-word evaluation
    WakeBuffering,
}

/// Result of a wake-word evaluation over the capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    Detected,
    Rejected,
}

/// Protocol state owned by one device connection.
#[derive(Debug)]
pub struct SessionState {
    mode: BufferingMode,
    armed: bool,
    wake_buffer: Vec<u8>,
    command_buffer: Vec<u8>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: BufferingMode::Idle,
            armed: false,
            wake_buffer: Vec::new(),
            command_buffer: Vec::new(),
        }
    }
}

impl SessionState {
    /// `wake_buffer_start`: clear the wake capture buffer and begin routing
    /// binary frames into it.
    pub fn begin_wake_capture(&mut self) {
        self.wake_buffer.clear();
        self.mode = BufferingMode::WakeBuffering;
    }

    /// `wake_buffer_end`: evaluate the buffered audio, then clear the buffer
    /// and reset the mode regardless of the outcome. The armed flag follows
    /// the detection result, so a rejected evaluation also disarms.
    pub fn end_wake_capture(&mut self, engine: &mut dyn WakeWordEngine) -> WakeOutcome {
        let detected = detect_wake_word(&self.wake_buffer, engine);
        self.wake_buffer.clear();
        self.mode = BufferingMode::Idle;
        self.armed = detected;

        if detected {
            WakeOutcome::Detected
        } else {
            WakeOutcome::Rejected
        }
    }

    /// `start_audio`: reset the command capture buffer unconditionally,
    /// regardless of the armed state.
    pub fn begin_command_capture(&mut self) {
        self.command_buffer.clear();
    }

    /// Route one binary frame to the buffer matching the current mode.
    /// Returns `true` when the frame was buffered, `false` when dropped.
    pub fn on_binary(&mut self, data: &[u8]) -> bool {
        match self.mode {
            BufferingMode::WakeBuffering => {
                self.wake_buffer.extend_from_slice(data);
                true
            }
            BufferingMode::Idle if self.armed => {
                self.command_buffer.extend_from_slice(data);
                true
            }
            BufferingMode::Idle => false,
        }
    }

    /// Captured command audio. `end_audio` reads this without consuming it;
    /// the buffer is only reset by the next `start_audio`, so a dropped
    /// `end_audio` (guard held) can be re-triggered by the device.
    pub fn command_audio(&self) -> &[u8] {
        &self.command_buffer
    }

    /// Clear the armed flag after a pipeline cycle completes.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn mode(&self) -> BufferingMode {
        self.mode
    }
}
