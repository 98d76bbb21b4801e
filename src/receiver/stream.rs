//! Audio stream session core
//!
//! Binds the control and data sockets, spawns the two receive loops, and
//! exposes the operations collaborators drive: flush, stats, shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::sink::{PcmSink, SinkError};
use crate::error::AudioStreamError;
use crate::protocol::crypto::KeyUnwrap;

use super::config::StreamConfig;
use super::control_receiver::ControlReceiver;
use super::pipeline::{SharedStream, StreamStats};
use super::rtp_receiver::RtpReceiver;
use super::session_manager::SessionStore;

/// How long shutdown waits for the receive loops before aborting them.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(1_000);

/// A running audio streaming session
///
/// Two receiver tasks run until [`AudioStream::shutdown`] is called or the
/// stream is dropped; either way both sockets close and the sink stops
/// receiving callbacks.
pub struct AudioStream {
    shared: Arc<SharedStream>,
    control_port: u16,
    data_port: u16,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AudioStream {
    /// Bind the session's UDP sockets and start both receive loops.
    ///
    /// The session record is looked up in `store` under
    /// `config.session_id`, creating a default record for an unknown id the
    /// way the control plane's announce path does.
    ///
    /// # Errors
    /// Returns [`AudioStreamError`] when a socket cannot be bound.
    pub async fn spawn(
        config: StreamConfig,
        store: &SessionStore,
        key_unwrap: Arc<dyn KeyUnwrap>,
        sink: Arc<dyn PcmSink>,
    ) -> Result<Self, AudioStreamError> {
        let session = store.get_or_default(&config.session_id);

        let control_socket =
            Arc::new(UdpSocket::bind(("0.0.0.0", config.control_port)).await?);
        let data_socket = Arc::new(UdpSocket::bind(("0.0.0.0", config.data_port)).await?);
        let control_port = control_socket.local_addr()?.port();
        let data_port = data_socket.local_addr()?.port();

        let shared = Arc::new(SharedStream::new(session, key_unwrap, sink, &config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            session_id = %config.session_id,
            control_port,
            data_port,
            is_mirroring = config.is_mirroring,
            "audio stream started"
        );

        let control = ControlReceiver::new(
            control_socket.clone(),
            shared.clone(),
            shutdown_rx.clone(),
        );
        let data = RtpReceiver::new(data_socket, control_socket, shared.clone(), shutdown_rx);

        let tasks = vec![
            tokio::spawn(supervise("control", control.run())),
            tokio::spawn(supervise("data", data.run())),
        ];

        Ok(Self {
            shared,
            control_port,
            data_port,
            shutdown_tx,
            tasks,
        })
    }

    /// Local port of the control socket.
    #[must_use]
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// Local port of the data socket.
    #[must_use]
    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    /// Drop everything buffered and restart the window at `next_seq`.
    ///
    /// The sink's `on_flush` runs after the buffer mutex is released.
    ///
    /// # Errors
    /// Propagates the sink's [`SinkError`], if any.
    pub fn flush(&self, next_seq: i32) -> Result<(), SinkError> {
        tracing::debug!(next_seq, "flushing audio stream");
        self.shared.flush(next_seq)
    }

    /// Counters accumulated since the stream started.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.shared.counters.snapshot()
    }

    /// Stop both receive loops and wait for them to finish.
    ///
    /// Loops that fail to observe cancellation within the close timeout are
    /// aborted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for mut task in self.tasks {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("receiver did not stop within close timeout, aborting");
                task.abort();
            }
        }
        tracing::info!("audio stream stopped");
    }
}

/// Log the terminal state of a receive loop.
async fn supervise(
    name: &'static str,
    loop_future: impl std::future::Future<Output = Result<(), SinkError>>,
) {
    match loop_future.await {
        Ok(()) => tracing::debug!(receiver = name, "receive loop finished"),
        Err(e) => tracing::error!(receiver = name, error = %e, "receive loop stopped by sink failure"),
    }
}
