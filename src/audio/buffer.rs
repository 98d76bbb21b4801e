//! Circular dejitter buffer
//!
//! A fixed ring of 1024 slots addressed by `sequence % 1024`, bounded by the
//! `first_seq..=last_seq` window. Slots inside the window are either decoded
//! payload (`available`) or holes awaiting retransmission. All slots are
//! preallocated at session start; the steady-state receive path allocates
//! only the per-frame copy handed out of `dequeue`.
//!
//! The window state after draining the last slot depends on the delivery
//! mode. In resend mode the cursors are left one past the consumed window
//! (`first == last + 1`) so a later arrival still exposes the gap in between
//! and the NACK path can see it. In no-resend mode the buffer goes fully
//! empty and the next admit restarts the window at its own sequence, which
//! is what lets reordered packets play in arrival order while mirroring.

use bytes::Bytes;

use crate::protocol::seq;

/// Number of ring slots.
pub const BUFFER_SLOTS: usize = 1024;

/// Decoded PCM capacity of one slot, sized for the largest codec frame
/// (1024 samples of 16-bit stereo).
pub const SLOT_PCM_CAPACITY: usize = 4096;

/// One ring slot
struct BufferEntry {
    available: bool,
    sequence: u16,
    rtp_timestamp: u32,
    ssrc: u32,
    payload_type: u8,
    flags: u8,
    pcm: Vec<u8>,
    pcm_len: usize,
}

impl BufferEntry {
    fn new() -> Self {
        Self {
            available: false,
            sequence: 0,
            rtp_timestamp: 0,
            ssrc: 0,
            payload_type: 0,
            flags: 0,
            pcm: vec![0; SLOT_PCM_CAPACITY],
            pcm_len: 0,
        }
    }
}

/// Result of admitting a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Packet entered the window
    Admitted,
    /// Slot already holds this sequence
    Duplicate,
    /// Sequence is behind the window
    Old,
    /// Payload cannot fit a slot
    Rejected,
}

/// Frame handed out of the buffer
#[derive(Debug, Clone)]
pub struct DequeuedFrame {
    /// Sequence number of the dequeued slot
    pub sequence: u16,
    /// RTP flags byte recorded at admit
    pub flags: u8,
    /// RTP payload-type byte recorded at admit
    pub payload_type: u8,
    /// RTP timestamp recorded at admit
    pub rtp_timestamp: u32,
    /// Synchronization source recorded at admit
    pub ssrc: u32,
    /// Decoded PCM (empty when a hole was skipped in no-resend mode)
    pub pcm: Bytes,
}

/// Sequence-indexed dejitter ring
pub struct CircularBuffer {
    entries: Vec<BufferEntry>,
    first_seq: u16,
    last_seq: u16,
    empty: bool,
}

impl CircularBuffer {
    /// Create a buffer with all slots preallocated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: (0..BUFFER_SLOTS).map(|_| BufferEntry::new()).collect(),
            first_seq: 0,
            last_seq: 0,
            empty: true,
        }
    }

    /// Is there nothing to dequeue?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sequence positions in the current window, holes included.
    #[must_use]
    pub fn len(&self) -> u16 {
        if self.empty {
            0
        } else {
            seq::distance(self.first_seq, self.last_seq).wrapping_add(1)
        }
    }

    /// Earliest sequence of the window.
    #[must_use]
    pub fn first_sequence(&self) -> u16 {
        self.first_seq
    }

    /// Latest sequence of the window.
    #[must_use]
    pub fn last_sequence(&self) -> u16 {
        self.last_seq
    }

    /// Admit a decoded packet into the ring.
    ///
    /// An arrival more than a full window ahead of `first_seq` is a buffer
    /// overrun: everything pending is flushed and the window restarts at the
    /// new sequence.
    pub fn admit(
        &mut self,
        sequence: u16,
        flags: u8,
        payload_type: u8,
        rtp_timestamp: u32,
        ssrc: u32,
        pcm: &[u8],
    ) -> AdmitOutcome {
        if pcm.len() > SLOT_PCM_CAPACITY {
            return AdmitOutcome::Rejected;
        }

        if !self.empty {
            if seq::before(sequence, self.first_seq) {
                return AdmitOutcome::Old;
            }
            if usize::from(seq::distance(self.first_seq, sequence)) >= BUFFER_SLOTS {
                self.flush(i32::from(sequence));
            }
        }

        let slot = &mut self.entries[usize::from(sequence) % BUFFER_SLOTS];
        if slot.available && slot.sequence == sequence {
            return AdmitOutcome::Duplicate;
        }

        slot.flags = flags;
        slot.payload_type = payload_type;
        slot.sequence = sequence;
        slot.rtp_timestamp = rtp_timestamp;
        slot.ssrc = ssrc;
        slot.pcm[..pcm.len()].copy_from_slice(pcm);
        slot.pcm_len = pcm.len();
        slot.available = true;

        if self.empty {
            self.first_seq = sequence;
            self.last_seq = sequence;
            self.empty = false;
        } else if seq::before(self.last_seq, sequence) {
            self.last_seq = sequence;
        }

        AdmitOutcome::Admitted
    }

    /// Take the next frame off the head of the window.
    ///
    /// In resend mode (`no_resend == false`) a missing head blocks the queue
    /// until either the retransmission lands or the window fills up, at
    /// which point the hole is abandoned. In no-resend mode the head is
    /// handed out unconditionally.
    pub fn dequeue(&mut self, no_resend: bool) -> Option<DequeuedFrame> {
        let buflen = self.len();
        if buflen == 0 {
            return None;
        }

        let index = usize::from(self.first_seq) % BUFFER_SLOTS;
        if !no_resend && !self.entries[index].available {
            if usize::from(buflen) < BUFFER_SLOTS {
                // Hole at the head: hold out for the retransmission.
                return None;
            }
            // Window is full and the head never arrived. Give up on it so
            // the stream can move; the caller dequeues again for the rest.
            self.entries[index].available = false;
            self.advance_first(no_resend);
            return None;
        }

        let sequence = self.first_seq;
        let slot = &mut self.entries[index];
        let frame = DequeuedFrame {
            sequence,
            flags: slot.flags,
            payload_type: slot.payload_type,
            rtp_timestamp: slot.rtp_timestamp,
            ssrc: slot.ssrc,
            pcm: Bytes::copy_from_slice(&slot.pcm[..slot.pcm_len]),
        };
        slot.available = false;
        slot.pcm_len = 0;

        self.advance_first(no_resend);
        Some(frame)
    }

    fn advance_first(&mut self, hard_empty: bool) {
        let drained = self.first_seq == self.last_seq;
        self.first_seq = self.first_seq.wrapping_add(1);
        if drained && hard_empty {
            self.empty = true;
        }
    }

    /// Drop every pending slot and restart the window.
    ///
    /// An in-range `next_seq` parks the cursors so that `next_seq` is the
    /// next expected sequence; anything else just empties the buffer. Either
    /// way no stale slot can be handed out afterwards.
    pub fn flush(&mut self, next_seq: i32) {
        for entry in &mut self.entries {
            entry.available = false;
            entry.pcm_len = 0;
        }
        self.empty = true;
        if let Ok(next) = u16::try_from(next_seq) {
            self.first_seq = next;
            self.last_seq = next.wrapping_sub(1);
        }
    }

    /// Contiguous missing range at the head of the window, if any.
    ///
    /// Returns `(first_missing, count)` for the leading gap; `None` when the
    /// head slot is present or the buffer holds nothing.
    #[must_use]
    pub fn leading_gap(&self) -> Option<(u16, u16)> {
        if self.len() == 0 {
            return None;
        }

        let mut cursor = self.first_seq;
        loop {
            let slot = &self.entries[usize::from(cursor) % BUFFER_SLOTS];
            if slot.available && slot.sequence == cursor {
                break;
            }
            if cursor == self.last_seq {
                break;
            }
            cursor = cursor.wrapping_add(1);
        }

        if cursor == self.first_seq {
            None
        } else {
            Some((self.first_seq, seq::distance(self.first_seq, cursor)))
        }
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self::new()
    }
}
