//! # Chunked Audio Sender
//!
//! Streams a finished audio artifact back to the device in consecutive
//! bounded-size chunks, pacing each write with a fixed delay so the device's
//! receive buffer is never overrun. After the final chunk a settle delay gives
//! the device time to drain before `interaction_ended` follows.
//!
//! The sink is checked on every chunk: a send failure means the connection is
//! gone, and the loop aborts instead of completing a doomed transfer.

use crate::error::AppResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Pacing parameters for one artifact transfer.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum bytes per chunk
    pub chunk_size: usize,

    /// Delay between consecutive chunks
    pub chunk_delay: Duration,

    /// Delay after the final chunk before returning
    pub settle_delay: Duration,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_delay: Duration::from_millis(24),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Destination for outbound binary chunks (the session actor in production,
/// a recorder in tests).
#[async_trait]
pub trait ChunkSink: Send {
    /// Deliver one chunk. An error means the connection is closed.
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> AppResult<()>;
}

/// Read the artifact at `path` in full and stream it through `sink`.
///
/// ## Returns:
/// Total bytes sent. Chunk count is `ceil(len / chunk_size)` and every chunk
/// is at most `chunk_size` bytes.
pub async fn stream_artifact(
    path: &Path,
    config: &ChunkerConfig,
    sink: &mut dyn ChunkSink,
) -> AppResult<u64> {
    let data = tokio::fs::read(path).await?;
    info!("sending {} bytes of audio", data.len());

    let mut sent = 0u64;
    for chunk in data.chunks(config.chunk_size) {
        sink.send_chunk(chunk.to_vec()).await?;
        sent += chunk.len() as u64;
        tokio::time::sleep(config.chunk_delay).await;
    }

    tokio::time::sleep(config.settle_delay).await;
    Ok(sent)
}
