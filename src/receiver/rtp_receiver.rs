//! Data socket receive loop
//!
//! The primary audio path: every datagram goes through the common admit
//! pipeline, ready frames are drained to the sink, and (outside mirroring)
//! a leading gap in the window triggers a retransmission request back to
//! the packet's source over the control socket.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::audio::sink::SinkError;
use crate::protocol::constants::MAX_PACKET_SIZE;
use crate::protocol::crypto::PacketCipher;

use super::pipeline::{bump, SharedStream};
use super::resend::ResendRequester;

/// Consecutive receive failures tolerated before the loop gives up.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 16;

/// Receive loop for the data socket
pub(crate) struct RtpReceiver {
    socket: Arc<UdpSocket>,
    control_socket: Arc<UdpSocket>,
    shared: Arc<SharedStream>,
    shutdown: watch::Receiver<bool>,
    resend: ResendRequester,
}

impl RtpReceiver {
    pub fn new(
        socket: Arc<UdpSocket>,
        control_socket: Arc<UdpSocket>,
        shared: Arc<SharedStream>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            control_socket,
            shared,
            shutdown,
            resend: ResendRequester::new(),
        }
    }

    /// Run until cancellation, socket closure, or a sink failure.
    pub async fn run(mut self) -> Result<(), SinkError> {
        let mut cipher = PacketCipher::new();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut consecutive_errors = 0u32;

        loop {
            let (len, src) = tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::debug!("data receiver cancelled");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => {
                        consecutive_errors = 0;
                        received
                    }
                    Err(e) => {
                        bump(&self.shared.counters.recv_errors);
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                            tracing::warn!(error = %e, "data socket unusable, stopping receiver");
                            break;
                        }
                        tracing::debug!(error = %e, "transient data receive error");
                        continue;
                    }
                },
            };

            bump(&self.shared.counters.data_packets);

            let admitted = self.shared.ingest(&mut cipher, &buf[..len]);
            self.shared.drain_and_deliver(self.shared.is_mirroring)?;

            if admitted && !self.shared.is_mirroring {
                let gap = self.shared.buffer.lock().unwrap().leading_gap();
                match gap {
                    Some((first_missing, count)) => {
                        if self
                            .resend
                            .request(&self.control_socket, src, first_missing, count)
                            .await
                        {
                            bump(&self.shared.counters.resend_requests);
                        }
                    }
                    None => self.resend.reset(),
                }
            }
        }

        Ok(())
    }
}
