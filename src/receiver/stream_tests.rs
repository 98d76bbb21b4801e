use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use tokio::net::UdpSocket;

use super::config::StreamConfig;
use super::session::AudioSession;
use super::session_manager::SessionStore;
use super::stream::AudioStream;
use crate::audio::decoder::AudioFormat;
use crate::audio::sink::{PcmFrame, PcmSink, SinkError};
use crate::protocol::control::NTP_EPOCH_OFFSET;
use crate::protocol::crypto::{derive_stream_key, PassthroughKeyUnwrap};

const SESSION_KEY: [u8; 16] = [0x42; 16];
const SHARED_SECRET: [u8; 32] = [0x7F; 32];
const SESSION_IV: [u8; 16] = [0x11; 16];
const FRAME_BYTES: usize = 1_408;

struct CollectSink {
    frames: Mutex<Vec<PcmFrame>>,
    flushes: AtomicUsize,
}

impl CollectSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        })
    }

    fn sequences(&self) -> Vec<u16> {
        self.frames.lock().unwrap().iter().map(|f| f.sequence).collect()
    }

    fn frames(&self) -> Vec<PcmFrame> {
        self.frames.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl PcmSink for CollectSink {
    fn on_pcm(&self, frame: PcmFrame) -> Result<(), SinkError> {
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    fn on_flush(&self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingSink;

impl PcmSink for FailingSink {
    fn on_pcm(&self, _frame: PcmFrame) -> Result<(), SinkError> {
        Err(SinkError::msg("sink rejected the frame"))
    }

    fn on_flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Loopback sender plus a spawned stream under test.
struct Harness {
    stream: AudioStream,
    sink: Arc<CollectSink>,
    data_sock: UdpSocket,
    control_sock: UdpSocket,
    data_target: SocketAddr,
    control_target: SocketAddr,
    stream_key: [u8; 16],
}

fn keyed_session() -> AudioSession {
    let mut session = AudioSession::new(AudioFormat::Pcm);
    session.encrypted_key = SESSION_KEY.to_vec();
    session.shared_secret = SHARED_SECRET;
    session.iv = SESSION_IV;
    session.samples_per_frame = Some(352);
    session
}

impl Harness {
    async fn start(is_mirroring: bool) -> Self {
        Self::start_with_session(is_mirroring, keyed_session()).await
    }

    async fn start_with_session(is_mirroring: bool, session: AudioSession) -> Self {
        let store = SessionStore::new();
        store.upsert("test", session);

        let sink = CollectSink::new();
        let config = StreamConfig {
            session_id: "test".into(),
            is_mirroring,
            ..StreamConfig::default()
        };
        let stream = AudioStream::spawn(
            config,
            &store,
            Arc::new(PassthroughKeyUnwrap),
            sink.clone(),
        )
        .await
        .unwrap();

        let data_target: SocketAddr = format!("127.0.0.1:{}", stream.data_port()).parse().unwrap();
        let control_target: SocketAddr =
            format!("127.0.0.1:{}", stream.control_port()).parse().unwrap();

        Self {
            stream,
            sink,
            data_sock: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            control_sock: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            data_target,
            control_target,
            stream_key: derive_stream_key(&SESSION_KEY, &SHARED_SECRET),
        }
    }

    fn data_packet(&self, sequence: u16, rtp_timestamp: u32) -> Vec<u8> {
        let mut packet = vec![0x80, 0x60];
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(&rtp_timestamp.to_be_bytes());
        packet.extend_from_slice(&0xCAFE_F00Du32.to_be_bytes());

        let payload = vec![sequence as u8; FRAME_BYTES];
        packet.extend_from_slice(&encrypt_payload(&self.stream_key, &SESSION_IV, &payload));
        packet
    }

    async fn send_audio(&self, sequence: u16, rtp_timestamp: u32) {
        let packet = self.data_packet(sequence, rtp_timestamp);
        self.data_sock.send_to(&packet, self.data_target).await.unwrap();
        // Give loopback delivery a head start so arrival order is the send
        // order.
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    async fn send_audio_over_control(&self, sequence: u16, rtp_timestamp: u32) {
        let mut packet = vec![0x80, 0x56, 0x00, 0x00];
        packet.extend_from_slice(&self.data_packet(sequence, rtp_timestamp));
        self.control_sock
            .send_to(&packet, self.control_target)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    /// Send a sync packet mapping `rtp_timestamp` to `posix_secs` of wall
    /// clock, then wait for the clock to pick it up.
    async fn sync_at(&self, rtp_timestamp: u32, posix_secs: u32) {
        #[allow(clippy::cast_possible_truncation)]
        let ntp_seconds = NTP_EPOCH_OFFSET as u32 + posix_secs;

        let mut packet = vec![0x80, 0xD4, 0x00, 0x07];
        packet.extend_from_slice(&rtp_timestamp.to_be_bytes());
        packet.extend_from_slice(&ntp_seconds.to_be_bytes());
        packet.extend_from_slice(&0u32.to_be_bytes());
        packet.extend_from_slice(&rtp_timestamp.to_be_bytes());

        let stats = || self.stream.stats().syncs;
        let before = stats();
        self.control_sock
            .send_to(&packet, self.control_target)
            .await
            .unwrap();
        wait_until("sync observed", || stats() > before).await;
    }

    async fn expect_frames(&self, count: usize) {
        wait_until("frames delivered", || self.sink.len() >= count).await;
        assert_eq!(self.sink.len(), count);
    }

    async fn expect_nack(&self) -> [u8; 8] {
        let mut buf = [0u8; 16];
        let (len, _src) = tokio::time::timeout(
            Duration::from_secs(2),
            self.data_sock.recv_from(&mut buf),
        )
        .await
        .expect("timed out waiting for a resend request")
        .unwrap();
        assert_eq!(len, 8);
        buf[..8].try_into().unwrap()
    }

    async fn expect_no_nack(&self) {
        let mut buf = [0u8; 16];
        let outcome = tokio::time::timeout(
            Duration::from_millis(300),
            self.data_sock.recv_from(&mut buf),
        )
        .await;
        assert!(outcome.is_err(), "unexpected resend request");
    }
}

fn encrypt_payload(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let full = plaintext.len() / 16 * 16;

    let mut out = plaintext.to_vec();
    let mut prev = *iv;
    for chunk in out[..full].chunks_exact_mut(16) {
        for (b, p) in chunk.iter_mut().zip(prev.iter()) {
            *b ^= *p;
        }
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block);
        prev.copy_from_slice(chunk);
    }
    out
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn ordered_lossless_stream_gets_exact_pts() {
    let harness = Harness::start(false).await;
    harness.sync_at(1000, 0).await;

    for (i, sequence) in (100u16..105).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rtp_timestamp = 1000 + 352 * i as u32;
        harness.send_audio(sequence, rtp_timestamp).await;
    }
    harness.expect_frames(5).await;

    let frames = harness.sink.frames();
    let sequences: Vec<u16> = frames.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![100, 101, 102, 103, 104]);

    let pts: Vec<i64> = frames.iter().map(|f| f.pts_us).collect();
    assert_eq!(pts, vec![0, 7_981, 15_963, 23_945, 31_927]);

    // Payloads pass through the PCM decoder intact.
    assert_eq!(frames[0].pcm.len(), FRAME_BYTES);
    assert!(frames[0].pcm.iter().all(|&b| b == 100));

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn single_loss_recovers_through_resend() {
    let harness = Harness::start(false).await;
    harness.sync_at(0, 0).await;

    harness.send_audio(100, 1000).await;
    harness.send_audio(101, 1352).await;
    harness.expect_frames(2).await;

    // 102 is lost; 103 opens a leading gap and exactly one NACK goes out.
    harness.send_audio(103, 2056).await;
    let nack = harness.expect_nack().await;
    assert_eq!(nack[0], 0x80);
    assert_eq!(nack[1], 0xD5);
    assert_eq!(u16::from_be_bytes([nack[4], nack[5]]), 102);
    assert_eq!(u16::from_be_bytes([nack[6], nack[7]]), 1);

    for (i, sequence) in (104u16..=120).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rtp_timestamp = 2408 + 352 * i as u32;
        harness.send_audio(sequence, rtp_timestamp).await;
    }
    harness.expect_no_nack().await;
    assert_eq!(harness.sink.len(), 2, "frames must wait for the resend");

    // The retransmission releases everything in order.
    harness.send_audio(102, 1704).await;
    harness.expect_frames(21).await;
    let expected: Vec<u16> = (100..=120).collect();
    assert_eq!(harness.sink.sequences(), expected);
    assert_eq!(harness.stream.stats().resend_requests, 1);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn loss_beyond_the_window_flushes_forward() {
    let harness = Harness::start(false).await;
    harness.sync_at(0, 0).await;

    harness.send_audio(100, 1000).await;
    harness.expect_frames(1).await;

    // Everything between was lost and the jump exceeds the buffer window:
    // the stream restarts at the new sequence instead of waiting on a
    // hopeless gap.
    let jumped = 100 + 1025;
    harness.send_audio(jumped, 500_000).await;
    harness.expect_frames(2).await;

    assert_eq!(harness.sink.sequences(), vec![100, jumped]);
    harness.expect_no_nack().await;

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn mirroring_plays_in_arrival_order_without_nacks() {
    let harness = Harness::start(true).await;
    harness.sync_at(0, 0).await;

    harness.send_audio(100, 1000).await;
    harness.send_audio(102, 1704).await;
    harness.send_audio(101, 1352).await;
    harness.send_audio(103, 2056).await;

    harness.expect_frames(4).await;
    assert_eq!(harness.sink.sequences(), vec![100, 102, 101, 103]);
    harness.expect_no_nack().await;
    assert_eq!(harness.stream.stats().resend_requests, 0);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn mirroring_accepts_audio_on_the_control_socket() {
    let harness = Harness::start(true).await;
    harness.sync_at(0, 0).await;

    harness.send_audio_over_control(50, 1000).await;
    harness.send_audio_over_control(51, 1352).await;

    harness.expect_frames(2).await;
    assert_eq!(harness.sink.sequences(), vec![50, 51]);
    assert!(harness.stream.stats().control_packets >= 2);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn flush_discards_and_restarts_the_window() {
    let harness = Harness::start(false).await;
    harness.sync_at(0, 0).await;

    for (i, sequence) in (100u16..=110).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rtp_timestamp = 1000 + 352 * i as u32;
        harness.send_audio(sequence, rtp_timestamp).await;
    }
    harness.expect_frames(11).await;

    harness.stream.flush(200).unwrap();
    assert_eq!(harness.sink.flushes(), 1);
    assert_eq!(harness.sink.len(), 11);

    for (i, sequence) in (200u16..=205).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rtp_timestamp = 40_000 + 352 * i as u32;
        harness.send_audio(sequence, rtp_timestamp).await;
    }
    harness.expect_frames(17).await;

    let mut expected: Vec<u16> = (100..=110).collect();
    expected.extend(200..=205);
    assert_eq!(harness.sink.sequences(), expected);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn sequence_numbers_wrap_with_monotonic_pts() {
    let harness = Harness::start(false).await;
    harness.sync_at(1000, 0).await;

    for (i, sequence) in [65_534u16, 65_535, 0, 1].into_iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rtp_timestamp = 1000 + 352 * i as u32;
        harness.send_audio(sequence, rtp_timestamp).await;
    }
    harness.expect_frames(4).await;

    let frames = harness.sink.frames();
    let sequences: Vec<u16> = frames.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![65_534, 65_535, 0, 1]);

    let pts: Vec<i64> = frames.iter().map(|f| f.pts_us).collect();
    assert!(pts.windows(2).all(|w| w[0] < w[1]), "pts regressed: {pts:?}");

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn keepalive_markers_do_not_touch_the_buffer() {
    let harness = Harness::start(false).await;

    let mut keepalive = vec![0x80, 0x60, 0x00, 0x01];
    keepalive.extend_from_slice(&[0u8; 8]);
    keepalive.extend_from_slice(&[0x00, 0x68, 0x34, 0x00]);
    assert_eq!(keepalive.len(), 16);
    harness
        .data_sock
        .send_to(&keepalive, harness.data_target)
        .await
        .unwrap();

    wait_until("keepalive counted", || harness.stream.stats().keepalives == 1).await;
    assert_eq!(harness.sink.len(), 0);
    assert_eq!(harness.stream.stats().admitted, 0);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn malformed_packets_are_dropped_and_counted() {
    let harness = Harness::start(false).await;

    harness
        .data_sock
        .send_to(&[0x80, 0x60, 0x00], harness.data_target)
        .await
        .unwrap();

    wait_until("malformed counted", || harness.stream.stats().malformed == 1).await;
    assert_eq!(harness.sink.len(), 0);

    // The loop keeps running and accepts good packets afterwards.
    harness.send_audio(7, 1000).await;
    harness.expect_frames(1).await;

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn missing_key_material_drops_packets() {
    let mut session = AudioSession::new(AudioFormat::Pcm);
    session.iv = SESSION_IV;
    let harness = Harness::start_with_session(false, session).await;

    harness.send_audio(1, 1000).await;

    wait_until("decrypt error counted", || {
        harness.stream.stats().decrypt_errors >= 1
    })
    .await;
    assert_eq!(harness.sink.len(), 0);

    harness.stream.shutdown().await;
}

#[tokio::test]
async fn sink_failure_stops_the_receive_loop() {
    let store = SessionStore::new();
    store.upsert("test", keyed_session());

    let config = StreamConfig {
        session_id: "test".into(),
        ..StreamConfig::default()
    };
    let stream = AudioStream::spawn(
        config,
        &store,
        Arc::new(PassthroughKeyUnwrap),
        Arc::new(FailingSink),
    )
    .await
    .unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target: SocketAddr = format!("127.0.0.1:{}", stream.data_port()).parse().unwrap();

    let stream_key = derive_stream_key(&SESSION_KEY, &SHARED_SECRET);
    let mut packet = vec![0x80, 0x60, 0x00, 0x01];
    packet.extend_from_slice(&1000u32.to_be_bytes());
    packet.extend_from_slice(&1u32.to_be_bytes());
    packet.extend_from_slice(&encrypt_payload(
        &stream_key,
        &SESSION_IV,
        &vec![9u8; FRAME_BYTES],
    ));

    sender.send_to(&packet, target).await.unwrap();
    wait_until("first packet seen", || stream.stats().data_packets == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The sink error terminated the data loop: later packets go unread.
    sender.send_to(&packet, target).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stream.stats().data_packets, 1);

    stream.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_both_loops_quickly() {
    let harness = Harness::start(false).await;
    harness.sync_at(0, 0).await;
    harness.send_audio(5, 1000).await;
    harness.expect_frames(1).await;

    let started = std::time::Instant::now();
    harness.stream.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
}
