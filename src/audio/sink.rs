//! PCM delivery capability
//!
//! The core pushes decoded frames at a single sink per session. The sink is
//! untrusted: its errors are propagated out of the receive loops instead of
//! being swallowed, and it is never called with the buffer mutex held.

use bytes::Bytes;
use thiserror::Error;

/// One decoded audio frame
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// RTP sequence number the frame was admitted under
    pub sequence: u16,
    /// RTP timestamp of the frame
    pub rtp_timestamp: u32,
    /// Presentation time, wall-clock microseconds
    pub pts_us: i64,
    /// Interleaved signed-16 stereo PCM
    pub pcm: Bytes,
}

/// Failure reported by a sink callback
#[derive(Debug, Error)]
#[error("sink failed: {0}")]
pub struct SinkError(Box<dyn std::error::Error + Send + Sync>);

impl SinkError {
    /// Wrap an arbitrary sink-side error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Build from a plain message.
    #[must_use]
    pub fn msg(message: &str) -> Self {
        Self(message.to_string().into())
    }
}

/// Downstream consumer of decoded audio
pub trait PcmSink: Send + Sync {
    /// Deliver one decoded frame.
    ///
    /// # Errors
    /// A [`SinkError`] terminates the receive loop that was delivering.
    fn on_pcm(&self, frame: PcmFrame) -> Result<(), SinkError>;

    /// Observe a stream flush; anything queued downstream should be
    /// discarded.
    ///
    /// # Errors
    /// Returned errors surface to the flush caller.
    fn on_flush(&self) -> Result<(), SinkError>;
}
