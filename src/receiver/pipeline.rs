//! Common admit pipeline shared by the two receive loops
//!
//! Both sockets feed packets through the same path: bounds check →
//! keepalive short-circuit → header extract → decrypt → decode → admit.
//! The buffer mutex covers only the ring mutation; decrypt and decode run
//! outside it, and PCM delivery to the sink happens after the batch leaves
//! the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::buffer::{AdmitOutcome, CircularBuffer};
use crate::audio::clock::SyncClock;
use crate::audio::decoder::Decoder;
use crate::audio::sink::{PcmFrame, PcmSink, SinkError};
use crate::protocol::constants::MAX_PACKET_SIZE;
use crate::protocol::crypto::{KeyUnwrap, PacketCipher};
use crate::protocol::rtp::{is_keepalive, RtpHeader};

use super::config::StreamConfig;
use super::session::AudioSession;

/// Cumulative counters for one stream
///
/// Snapshot of the internal atomics; every field counts since stream start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Datagrams seen on the data socket
    pub data_packets: u64,
    /// Datagrams seen on the control socket
    pub control_packets: u64,
    /// Sync packets applied to the clock
    pub syncs: u64,
    /// No-data keepalive markers
    pub keepalives: u64,
    /// Packets admitted to the buffer
    pub admitted: u64,
    /// Packets dropped as duplicates
    pub duplicates: u64,
    /// Packets dropped as older than the window
    pub old_packets: u64,
    /// Packets dropped as malformed
    pub malformed: u64,
    /// Packets dropped by decryption failures
    pub decrypt_errors: u64,
    /// Frames replaced with silence by decode failures
    pub decode_errors: u64,
    /// Retransmission requests emitted
    pub resend_requests: u64,
    /// Transient socket receive errors
    pub recv_errors: u64,
    /// PCM frames delivered to the sink
    pub frames_delivered: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StreamCounters {
    pub data_packets: AtomicU64,
    pub control_packets: AtomicU64,
    pub syncs: AtomicU64,
    pub keepalives: AtomicU64,
    pub admitted: AtomicU64,
    pub duplicates: AtomicU64,
    pub old_packets: AtomicU64,
    pub malformed: AtomicU64,
    pub decrypt_errors: AtomicU64,
    pub decode_errors: AtomicU64,
    pub resend_requests: AtomicU64,
    pub recv_errors: AtomicU64,
    pub frames_delivered: AtomicU64,
}

impl StreamCounters {
    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            data_packets: self.data_packets.load(Ordering::Relaxed),
            control_packets: self.control_packets.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            old_packets: self.old_packets.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            decrypt_errors: self.decrypt_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            resend_requests: self.resend_requests.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared by the two receive loops of one stream
pub(crate) struct SharedStream {
    pub session: Arc<AudioSession>,
    pub key_unwrap: Arc<dyn KeyUnwrap>,
    pub buffer: Mutex<CircularBuffer>,
    pub decoder: Mutex<Option<Decoder>>,
    pub clock: SyncClock,
    pub sink: Arc<dyn PcmSink>,
    pub counters: StreamCounters,
    pub is_mirroring: bool,
    eld_helper: Option<std::path::PathBuf>,
    /// Serializes drain batches so frames reach the sink in dequeue order
    /// even when both loops drain concurrently.
    delivery: Mutex<()>,
    #[cfg(feature = "dump")]
    dump: Option<super::dump::DumpWriter>,
}

impl SharedStream {
    pub fn new(
        session: Arc<AudioSession>,
        key_unwrap: Arc<dyn KeyUnwrap>,
        sink: Arc<dyn PcmSink>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            session,
            key_unwrap,
            buffer: Mutex::new(CircularBuffer::new()),
            decoder: Mutex::new(None),
            clock: SyncClock::new(),
            sink,
            counters: StreamCounters::default(),
            is_mirroring: config.is_mirroring,
            eld_helper: config.eld_helper.clone(),
            delivery: Mutex::new(()),
            #[cfg(feature = "dump")]
            dump: config.dump_path.as_deref().map(super::dump::DumpWriter::new),
        }
    }

    /// Run one packet through the admit pipeline.
    ///
    /// Returns whether the packet was admitted to the buffer, which is what
    /// gates the resend scan on the data loop.
    pub fn ingest(&self, cipher: &mut PacketCipher, datagram: &[u8]) -> bool {
        if datagram.len() < RtpHeader::SIZE || datagram.len() > MAX_PACKET_SIZE {
            bump(&self.counters.malformed);
            tracing::warn!(len = datagram.len(), "dropping out-of-bounds packet");
            return false;
        }

        if is_keepalive(datagram) {
            bump(&self.counters.keepalives);
            return false;
        }

        let header = match RtpHeader::parse(datagram) {
            Ok(header) => header,
            Err(e) => {
                bump(&self.counters.malformed);
                tracing::warn!(error = %e, "dropping malformed packet");
                return false;
            }
        };

        let mut payload = datagram[RtpHeader::SIZE..].to_vec();

        #[cfg(feature = "dump")]
        if let Some(dump) = &self.dump {
            dump.raw(header.sequence, &payload);
        }

        // Decrypt outside the buffer mutex. Key material is pulled lazily
        // the first time this receiver's cipher sees a packet.
        if !cipher.is_ready() {
            match self.session.stream_key(&*self.key_unwrap) {
                Ok(stream_key) => cipher.install(stream_key, self.session.iv),
                Err(e) => {
                    bump(&self.counters.decrypt_errors);
                    tracing::warn!(error = %e, "cannot initialize payload cipher");
                    return false;
                }
            }
        }
        if let Err(e) = cipher.decrypt_in_place(&mut payload) {
            bump(&self.counters.decrypt_errors);
            tracing::warn!(error = %e, "dropping undecryptable packet");
            return false;
        }

        // Decode under the decoder mutex; AAC decoders carry state across
        // frames, so both loops share one instance.
        let pcm = {
            let mut decoder = self.decoder.lock().unwrap();
            if decoder.is_none() {
                match Decoder::select(
                    self.session.format,
                    self.session.samples_per_frame,
                    self.session.compression_type,
                    self.eld_helper.as_deref(),
                ) {
                    Ok(selected) => {
                        tracing::info!(codec = selected.name(), "decoder selected");
                        *decoder = Some(selected);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "no decoder available, dropping packet");
                        return false;
                    }
                }
            }
            let decoder = decoder.as_mut().unwrap();
            match decoder.decode(&payload) {
                Ok(pcm) => pcm,
                Err(e) => {
                    // Keep the frame's slot in the presentation cadence.
                    bump(&self.counters.decode_errors);
                    tracing::warn!(codec = decoder.name(), error = %e, "decode failed, substituting silence");
                    vec![0; decoder.output_size()]
                }
            }
        };

        #[cfg(feature = "dump")]
        if let Some(dump) = &self.dump {
            dump.pcm(header.sequence, &pcm);
        }

        let outcome = self.buffer.lock().unwrap().admit(
            header.sequence,
            header.flags,
            header.payload_type,
            header.timestamp,
            header.ssrc,
            &pcm,
        );

        match outcome {
            AdmitOutcome::Admitted => {
                bump(&self.counters.admitted);
                true
            }
            AdmitOutcome::Duplicate => {
                bump(&self.counters.duplicates);
                false
            }
            AdmitOutcome::Old => {
                bump(&self.counters.old_packets);
                false
            }
            AdmitOutcome::Rejected => {
                bump(&self.counters.malformed);
                tracing::warn!(
                    sequence = header.sequence,
                    pcm_len = pcm.len(),
                    "decoded frame does not fit a buffer slot"
                );
                false
            }
        }
    }

    /// Dequeue everything that is ready and hand it to the sink.
    ///
    /// The batch is collected under the buffer mutex, which is released
    /// before the sink runs; batches from the two loops are serialized so
    /// the sink observes buffer-dequeue order.
    pub fn drain_and_deliver(&self, no_resend: bool) -> Result<(), SinkError> {
        let _ordered = self.delivery.lock().unwrap();

        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            let mut batch = Vec::new();
            loop {
                let head = buffer.first_sequence();
                match buffer.dequeue(no_resend) {
                    Some(frame) => batch.push(frame),
                    // A full window abandoned its missing head: the cursor
                    // moved, so the frames behind it are ready now.
                    None if buffer.first_sequence() != head => {}
                    None => break,
                }
            }
            batch
        };

        for frame in batch {
            if frame.pcm.is_empty() {
                continue;
            }
            let pts_us = self.clock.pts_for(frame.rtp_timestamp);
            self.sink.on_pcm(PcmFrame {
                sequence: frame.sequence,
                rtp_timestamp: frame.rtp_timestamp,
                pts_us,
                pcm: frame.pcm,
            })?;
            bump(&self.counters.frames_delivered);
        }
        Ok(())
    }

    /// Flush the buffer to `next_seq` and notify the sink.
    pub fn flush(&self, next_seq: i32) -> Result<(), SinkError> {
        self.buffer.lock().unwrap().flush(next_seq);
        self.sink.on_flush()
    }
}
