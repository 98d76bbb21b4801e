//! Wire-level protocol support for the RAOP audio path
//!
//! Packet layouts for the two UDP flows (data and control), sequence-number
//! arithmetic, and payload decryption.

pub mod control;
pub mod crypto;
pub mod rtp;
pub mod seq;


pub use control::{ResendRequest, SyncPacket};
pub use rtp::{PacketError, RtpHeader};

/// Protocol constants shared across the audio path.
pub mod constants {
    /// Nominal RAOP sample rate.
    pub const SAMPLE_RATE: u32 = 44_100;

    /// Audio channels (stereo).
    pub const CHANNELS: u8 = 2;

    /// Bits per decoded sample.
    pub const BITS_PER_SAMPLE: u8 = 16;

    /// Largest UDP datagram either receive loop will accept.
    pub const MAX_PACKET_SIZE: usize = 50_000;

    /// Samples per packet for ALAC/PCM streams unless the session says otherwise.
    pub const DEFAULT_FRAMES_PER_PACKET: u32 = 352;
}
