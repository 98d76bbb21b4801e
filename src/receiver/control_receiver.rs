//! Control socket receive loop
//!
//! Handles clock-sync packets and, while mirroring, the out-of-band audio
//! the sender pushes over the control port.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::audio::sink::SinkError;
use crate::protocol::constants::MAX_PACKET_SIZE;
use crate::protocol::control::SyncPacket;
use crate::protocol::crypto::PacketCipher;
use crate::protocol::rtp::{control_packet_type, TYPE_AUDIO_OVER_CONTROL, TYPE_SYNC};

use super::pipeline::{bump, SharedStream};

/// Consecutive receive failures tolerated before the loop gives up.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 16;

/// Receive loop for the control socket
pub(crate) struct ControlReceiver {
    socket: Arc<UdpSocket>,
    shared: Arc<SharedStream>,
    shutdown: watch::Receiver<bool>,
}

impl ControlReceiver {
    pub fn new(
        socket: Arc<UdpSocket>,
        shared: Arc<SharedStream>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            shared,
            shutdown,
        }
    }

    /// Run until cancellation, socket closure, or a sink failure.
    pub async fn run(mut self) -> Result<(), SinkError> {
        // The cipher is receiver-local: the control and data loops must
        // never share one.
        let mut cipher = PacketCipher::new();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut consecutive_errors = 0u32;

        loop {
            let len = tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::debug!("control receiver cancelled");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, _src)) => {
                        consecutive_errors = 0;
                        len
                    }
                    Err(e) => {
                        bump(&self.shared.counters.recv_errors);
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                            tracing::warn!(error = %e, "control socket unusable, stopping receiver");
                            break;
                        }
                        tracing::debug!(error = %e, "transient control receive error");
                        continue;
                    }
                },
            };

            bump(&self.shared.counters.control_packets);
            let datagram = &buf[..len];

            match control_packet_type(datagram) {
                Some(TYPE_AUDIO_OVER_CONTROL) if len > 4 => {
                    // The wrapped data packet starts at byte 4.
                    self.shared.ingest(&mut cipher, &datagram[4..]);
                    self.shared.drain_and_deliver(true)?;
                }
                Some(TYPE_SYNC) => match SyncPacket::parse(datagram) {
                    Ok(sync) => {
                        self.shared.clock.observe_sync(&sync);
                        bump(&self.shared.counters.syncs);
                        tracing::trace!(
                            rtp_timestamp = sync.rtp_timestamp,
                            next_timestamp = sync.next_timestamp,
                            "sync point updated"
                        );
                    }
                    Err(e) => {
                        bump(&self.shared.counters.malformed);
                        tracing::warn!(error = %e, "dropping malformed sync packet");
                    }
                },
                _ => {}
            }
        }

        Ok(())
    }
}
