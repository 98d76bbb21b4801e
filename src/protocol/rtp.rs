//! RTP-style packet parsing for the audio sockets
//!
//! The data socket carries plain 12-byte-header packets; the control socket
//! can carry the same payload wrapped behind a 4-byte prefix (type 0x56,
//! used while mirroring). Both are reduced to [`RtpHeader`] + payload here.

use thiserror::Error;

use super::constants::MAX_PACKET_SIZE;

/// Payload type carried on the control socket for out-of-band audio.
pub const TYPE_AUDIO_OVER_CONTROL: u8 = 0x56;

/// Payload type of a clock-sync packet on the control socket.
pub const TYPE_SYNC: u8 = 0x54;

/// Offset of the audio payload inside a data packet.
pub const PAYLOAD_OFFSET: usize = 12;

/// Trailer that marks a 16-byte no-data keepalive packet.
const KEEPALIVE_TRAILER: [u8; 4] = [0x00, 0x68, 0x34, 0x00];

/// Errors from packet parsing
#[derive(Debug, Error)]
pub enum PacketError {
    /// Datagram shorter than the fixed RTP header
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    /// Datagram longer than the receive contract allows
    #[error("packet too long: {0} bytes")]
    TooLong(usize),
}

/// Parsed RTP header of an audio packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Byte 0 (version/padding/extension bits, kept opaque)
    pub flags: u8,
    /// Byte 1 with the marker bit intact
    pub payload_type: u8,
    /// Sequence number (bytes 2-3, big-endian)
    pub sequence: u16,
    /// RTP timestamp (bytes 4-7, big-endian)
    pub timestamp: u32,
    /// Synchronization source (bytes 8-11, big-endian)
    pub ssrc: u32,
}

impl RtpHeader {
    /// Fixed RTP header size.
    pub const SIZE: usize = PAYLOAD_OFFSET;

    /// Parse the header of a data packet.
    ///
    /// # Errors
    /// Returns [`PacketError`] when the datagram falls outside the accepted
    /// size bounds.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::TooShort(data.len()));
        }
        if data.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLong(data.len()));
        }

        Ok(Self {
            flags: data[0],
            payload_type: data[1],
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }

    /// Payload type with the marker bit masked off.
    #[must_use]
    pub fn type_bits(&self) -> u8 {
        self.payload_type & 0x7F
    }
}

/// Packet type of a control-socket datagram (byte 1 with the marker masked).
#[must_use]
pub fn control_packet_type(data: &[u8]) -> Option<u8> {
    if data.len() < 2 {
        return None;
    }
    Some(data[1] & 0x7F)
}

/// Is this datagram the 16-byte no-data keepalive marker?
#[must_use]
pub fn is_keepalive(data: &[u8]) -> bool {
    data.len() == 16 && data[12..16] == KEEPALIVE_TRAILER
}
