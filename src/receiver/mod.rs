//! Audio session receiver
//!
//! Owns the two UDP sockets of a streaming session and everything between a
//! datagram and a PCM frame at the sink: the common admit pipeline, the
//! control and data receive loops, retransmission requests, and teardown.

pub mod config;
pub mod resend;
pub mod session;
pub mod session_manager;
pub mod stream;

pub(crate) mod control_receiver;
pub(crate) mod pipeline;
pub(crate) mod rtp_receiver;

#[cfg(feature = "dump")]
pub(crate) mod dump;

#[cfg(test)]
mod resend_tests;
#[cfg(test)]
mod session_tests;
#[cfg(test)]
mod stream_tests;

pub use config::StreamConfig;
pub use pipeline::StreamStats;
pub use resend::ResendRequester;
pub use session::AudioSession;
pub use session_manager::SessionStore;
pub use stream::AudioStream;
