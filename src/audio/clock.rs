//! Clock synchronization between RTP time and wall-clock time
//!
//! Sync packets on the control socket pin one RTP timestamp to an NTP wall
//! clock instant. [`SyncClock`] publishes that pair as a consistent snapshot
//! and converts packet timestamps into presentation timestamps against it.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::protocol::constants::SAMPLE_RATE;
use crate::protocol::control::SyncPacket;

/// Published sync point: wall-clock microseconds at one RTP timestamp
///
/// Readers and the (single) writer go through a version-stamped snapshot so
/// a PTS computation never mixes the time of one sync with the timestamp of
/// another.
pub struct SyncClock {
    version: AtomicU64,
    sync_time_us: AtomicI64,
    sync_rtp_ts: AtomicU32,
}

impl SyncClock {
    /// Create a clock with no sync observed yet.
    ///
    /// PTS values computed before the first sync are small offsets from
    /// zero; the sink's prebuffer absorbs them.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            sync_time_us: AtomicI64::new(0),
            sync_rtp_ts: AtomicU32::new(0),
        }
    }

    /// Record a sync packet as the new reference point.
    pub fn observe_sync(&self, sync: &SyncPacket) {
        self.set(sync.wall_clock_us(), sync.rtp_timestamp);
    }

    /// Publish a new sync point.
    pub fn set(&self, sync_time_us: i64, sync_rtp_ts: u32) {
        let v = self.version.load(Ordering::Relaxed);
        self.version.store(v.wrapping_add(1), Ordering::Release);
        self.sync_time_us.store(sync_time_us, Ordering::Release);
        self.sync_rtp_ts.store(sync_rtp_ts, Ordering::Release);
        self.version.store(v.wrapping_add(2), Ordering::Release);
    }

    /// Read a consistent `(sync_time_us, sync_rtp_ts)` pair.
    #[must_use]
    pub fn snapshot(&self) -> (i64, u32) {
        loop {
            let v1 = self.version.load(Ordering::Acquire);
            let time_us = self.sync_time_us.load(Ordering::Acquire);
            let rtp_ts = self.sync_rtp_ts.load(Ordering::Acquire);
            let v2 = self.version.load(Ordering::Acquire);
            if v1 == v2 && v1 % 2 == 0 {
                return (time_us, rtp_ts);
            }
            std::hint::spin_loop();
        }
    }

    /// Presentation timestamp in wall-clock microseconds for `rtp_ts`.
    ///
    /// The timestamp delta is taken as signed 32-bit so small reorderings
    /// across the sync point stay finite; it wraps past ~12 hours of stream
    /// time like the protocol it mirrors.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, reason = "signed delta is the contract")]
    pub fn pts_for(&self, rtp_ts: u32) -> i64 {
        let (sync_time_us, sync_rtp_ts) = self.snapshot();
        let delta = rtp_ts.wrapping_sub(sync_rtp_ts) as i32;
        i64::from(delta) * 1_000_000 / i64::from(SAMPLE_RATE) + sync_time_us
    }
}

impl Default for SyncClock {
    fn default() -> Self {
        Self::new()
    }
}
