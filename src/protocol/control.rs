//! Control-socket packet formats
//!
//! Two shapes matter to the audio core: the sender's NTP sync packets
//! (type 0x54, consumed) and our retransmission requests (type 0x55,
//! produced).

use super::rtp::PacketError;

/// Seconds between the NTP epoch (1900) and the POSIX epoch (1970).
pub const NTP_EPOCH_OFFSET: u64 = 2_208_988_800;

/// Clock-sync packet from the sender
///
/// Layout: `[0]=flags`, `[1]=0xD4`, `[2..4]` unused, `[4..8]` RTP timestamp,
/// `[8..12]` NTP seconds, `[12..16]` NTP fraction, `[16..20]` RTP timestamp
/// of the next packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    /// RTP timestamp at the sync point
    pub rtp_timestamp: u32,
    /// NTP seconds (read unsigned; valid past 2036)
    pub ntp_seconds: u32,
    /// NTP fraction of a second (1/2^32 units)
    pub ntp_fraction: u32,
    /// RTP timestamp of the next audio packet; passed through for
    /// observability only
    pub next_timestamp: u32,
}

impl SyncPacket {
    /// Minimum sync packet size.
    pub const SIZE: usize = 20;

    /// Parse a sync packet.
    ///
    /// # Errors
    /// Returns [`PacketError::TooShort`] when fewer than 20 bytes arrive.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::TooShort(data.len()));
        }

        Ok(Self {
            rtp_timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ntp_seconds: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            ntp_fraction: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            next_timestamp: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }

    /// Wall-clock microseconds of the sync point, shifted to the POSIX epoch.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, reason = "post-1970 timestamps fit i64")]
    pub fn wall_clock_us(&self) -> i64 {
        let ntp_us = u64::from(self.ntp_seconds) * 1_000_000
            + ((u64::from(self.ntp_fraction) * 1_000_000) >> 32);
        ntp_us as i64 - (NTP_EPOCH_OFFSET * 1_000_000) as i64
    }
}

/// Retransmission request (RTCP-style NACK) for a leading contiguous gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRequest {
    /// Our control sequence, stamped into bytes 2-3
    pub control_sequence: u16,
    /// First missing sequence number
    pub first_missing: u16,
    /// Number of consecutive missing packets
    pub count: u16,
}

impl ResendRequest {
    /// Encoded request size.
    pub const SIZE: usize = 8;

    /// Encode to the 8-byte wire format.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = 0x80;
        buf[1] = 0x55 | 0x80;
        buf[2..4].copy_from_slice(&self.control_sequence.to_be_bytes());
        buf[4..6].copy_from_slice(&self.first_missing.to_be_bytes());
        buf[6..8].copy_from_slice(&self.count.to_be_bytes());
        buf
    }
}
