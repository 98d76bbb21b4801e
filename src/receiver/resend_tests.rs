use std::time::Duration;

use tokio::net::UdpSocket;

use super::resend::ResendRequester;

async fn recv_request(socket: &UdpSocket) -> [u8; 8] {
    let mut buf = [0u8; 16];
    let (len, _src) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a resend request")
        .unwrap();
    assert_eq!(len, 8);
    buf[..8].try_into().unwrap()
}

async fn expect_silence(socket: &UdpSocket) {
    let mut buf = [0u8; 16];
    let outcome =
        tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
    assert!(outcome.is_err(), "unexpected packet on the control path");
}

#[tokio::test]
async fn emits_the_wire_format() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut requester = ResendRequester::with_initial_sequence(0x0102);
    assert!(requester.request(&control, peer_addr, 102, 1).await);

    let packet = recv_request(&peer).await;
    assert_eq!(packet, [0x80, 0xD5, 0x01, 0x02, 0x00, 0x66, 0x00, 0x01]);
    assert_eq!(requester.control_sequence(), 0x0103);
}

#[tokio::test]
async fn identical_gap_is_requested_once() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut requester = ResendRequester::with_initial_sequence(7);
    assert!(requester.request(&control, peer_addr, 200, 3).await);
    let _ = recv_request(&peer).await;

    // The same hole reported by later arrivals stays quiet.
    assert!(!requester.request(&control, peer_addr, 200, 3).await);
    expect_silence(&peer).await;
    assert_eq!(requester.control_sequence(), 8);

    // A different gap goes out with the next control sequence.
    assert!(requester.request(&control, peer_addr, 210, 2).await);
    let packet = recv_request(&peer).await;
    assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 8);
    assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 210);
    assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 2);
}

#[tokio::test]
async fn reset_allows_rerequesting_the_same_range() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut requester = ResendRequester::with_initial_sequence(0);
    assert!(requester.request(&control, peer_addr, 50, 1).await);
    let _ = recv_request(&peer).await;

    requester.reset();
    assert!(requester.request(&control, peer_addr, 50, 1).await);
    let _ = recv_request(&peer).await;
}

#[tokio::test]
async fn empty_gap_is_ignored() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut requester = ResendRequester::with_initial_sequence(3);
    assert!(!requester.request(&control, peer_addr, 100, 0).await);
    assert_eq!(requester.control_sequence(), 3);
    expect_silence(&peer).await;
}
