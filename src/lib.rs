//! # raop-audio
//!
//! The real-time audio core of an `AirPlay` receiver: ingests the two UDP
//! flows of a RAOP session, recovers clock sync, decrypts and decodes the
//! payloads, dejitters them through a bounded ring, requests retransmission
//! of missing packets, and emits PCM frames with monotonic presentation
//! timestamps to a downstream sink.
//!
//! Discovery, RTSP, pairing, and audio output live with the embedding
//! application; this crate consumes a session record (keys, codec identity)
//! from a [`SessionStore`] and drives a [`PcmSink`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raop_audio::{
//!     AudioStream, PcmFrame, PcmSink, PassthroughKeyUnwrap, SessionStore, SinkError,
//!     StreamConfig,
//! };
//!
//! struct Player;
//!
//! impl PcmSink for Player {
//!     fn on_pcm(&self, frame: PcmFrame) -> Result<(), SinkError> {
//!         println!("{} bytes at pts {}", frame.pcm.len(), frame.pts_us);
//!         Ok(())
//!     }
//!     fn on_flush(&self) -> Result<(), SinkError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), raop_audio::AudioStreamError> {
//! let store = SessionStore::new();
//! let config = StreamConfig {
//!     session_id: "living-room".into(),
//!     ..StreamConfig::default()
//! };
//!
//! let stream = AudioStream::spawn(
//!     config,
//!     &store,
//!     Arc::new(PassthroughKeyUnwrap),
//!     Arc::new(Player),
//! )
//! .await?;
//!
//! println!("audio on {}, control on {}", stream.data_port(), stream.control_port());
//! stream.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;

/// Audio-side building blocks (buffer, decoders, clock, sink)
pub mod audio;
/// Wire formats, sequence arithmetic, payload decryption
pub mod protocol;
/// Session core: sockets, receive loops, resend, teardown
pub mod receiver;

// Re-exports
pub use audio::buffer::{AdmitOutcome, CircularBuffer};
pub use audio::clock::SyncClock;
pub use audio::decoder::{AudioFormat, DecodeError, Decoder, DecoderSpec};
pub use audio::sink::{PcmFrame, PcmSink, SinkError};
pub use error::AudioStreamError;
pub use protocol::crypto::{KeyUnwrap, PassthroughKeyUnwrap};
pub use receiver::{
    AudioSession, AudioStream, ResendRequester, SessionStore, StreamConfig, StreamStats,
};
