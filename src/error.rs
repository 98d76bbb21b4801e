use std::io;
use thiserror::Error;

use crate::audio::decoder::DecodeError;
use crate::audio::sink::SinkError;
use crate::protocol::crypto::DecryptError;
use crate::protocol::rtp::PacketError;

/// Errors surfaced by the audio streaming core
///
/// Packet-level failures (malformed, undecryptable, undecodable) are
/// recovered inside the receive loops and never appear here; this type
/// covers the session-level operations a collaborator drives.
#[derive(Debug, Error)]
pub enum AudioStreamError {
    /// Socket bind/IO failure
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Packet parsing failure
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Payload decryption failure
    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    /// Decoder selection or decode failure
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The sink rejected a callback
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Result type alias for audio streaming operations
pub type Result<T> = std::result::Result<T, AudioStreamError>;
