//! Retransmission requests
//!
//! When the data loop sees a leading gap in the dejitter window it asks the
//! sender to retransmit the missing range with an 8-byte NACK on the
//! control socket. Only the data loop drives this, and never during
//! mirroring, where retransmitted audio would arrive too late to play.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::protocol::control::ResendRequest;

/// Emits NACKs for leading gaps, one per distinct gap
pub struct ResendRequester {
    control_seq: u16,
    last_requested: Option<(u16, u16)>,
}

impl ResendRequester {
    /// Create a requester with a random initial control sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial_sequence(rand::random())
    }

    /// Create a requester starting at a fixed control sequence.
    #[must_use]
    pub fn with_initial_sequence(control_seq: u16) -> Self {
        Self {
            control_seq,
            last_requested: None,
        }
    }

    /// Next control sequence to be stamped.
    #[must_use]
    pub fn control_sequence(&self) -> u16 {
        self.control_seq
    }

    /// Forget the last requested gap.
    ///
    /// Called when the window no longer has a leading gap, so a later gap
    /// that happens to span the same range is requested again.
    pub fn reset(&mut self) {
        self.last_requested = None;
    }

    /// Request retransmission of `count` packets starting at `first_missing`.
    ///
    /// A gap identical to the previously requested one is suppressed, so a
    /// hole that persists across many arrivals is asked for once. The
    /// control sequence advances on every emission whether or not the send
    /// succeeds; send failures are logged and not retried.
    ///
    /// Returns whether a request was emitted.
    pub async fn request(
        &mut self,
        control_socket: &UdpSocket,
        peer: SocketAddr,
        first_missing: u16,
        count: u16,
    ) -> bool {
        if count == 0 || self.last_requested == Some((first_missing, count)) {
            return false;
        }

        let request = ResendRequest {
            control_sequence: self.control_seq,
            first_missing,
            count,
        };
        self.control_seq = self.control_seq.wrapping_add(1);
        self.last_requested = Some((first_missing, count));

        match control_socket.send_to(&request.encode(), peer).await {
            Ok(_) => {
                tracing::debug!(first_missing, count, "requested retransmission");
            }
            Err(e) => {
                tracing::warn!(first_missing, count, error = %e, "resend request failed to send");
            }
        }
        true
    }
}

impl Default for ResendRequester {
    fn default() -> Self {
        Self::new()
    }
}
