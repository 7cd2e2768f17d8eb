/// End-to-end tests over a loopback UDP transport: two relays' worth of
/// wiring (transport + state + ingress) without a real network or MIDI
/// device.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use midinet_protocol::{clock, MidiMessage, Packet, UniqueIdentifier};
use midinet_relay::clocksync::ClockEstimators;
use midinet_relay::ingress::{dispatch_packet, handle_local_midi, Outcome};
use midinet_relay::received::ReceivedSet;
use midinet_relay::state::RelayState;
use midinet_transport::{hmac, udp};

async fn bind_pair() -> (SocketAddr, SocketAddr, midinet_transport::Transport, midinet_transport::Transport) {
    let a_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let b_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

    // Bind both ends up front so each side knows the other's ephemeral port.
    let a_sock = tokio::net::UdpSocket::bind(a_addr).await.unwrap();
    let b_sock = tokio::net::UdpSocket::bind(b_addr).await.unwrap();
    let a_local = a_sock.local_addr().unwrap();
    let b_local = b_sock.local_addr().unwrap();
    drop(a_sock);
    drop(b_sock);

    let a = udp::symmetric(a_local, b_local).await.unwrap();
    let b = udp::symmetric(b_local, a_local).await.unwrap();
    (a_local, b_local, a, b)
}

#[tokio::test]
async fn midi_message_round_trips_over_loopback_udp() {
    let (_a_addr, _b_addr, mut a, mut b) = bind_pair().await;

    let packet = Packet::MidiMessage {
        message: MidiMessage::new(clock::now(), &[0x90, 0x40, 0x7F]),
        identifier: UniqueIdentifier {
            serial: 1,
            timestamp: clock::now(),
        },
    };
    a.send(packet.encode()).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), b.recv())
        .await
        .expect("timed out waiting for datagram")
        .expect("channel closed");
    let decoded = Packet::decode(&received).unwrap();
    assert_eq!(decoded, packet);
}

#[tokio::test]
async fn hmac_wrapped_transport_rejects_wrong_key() {
    let (_a_addr, _b_addr, a, b) = bind_pair().await;
    let mut a = hmac::wrap(a, b"shared-secret".to_vec());
    let mut b = hmac::wrap(b, b"different-secret".to_vec());

    a.send(Packet::Ping.encode()).unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), b.recv()).await;
    assert!(result.is_err(), "mismatched-key datagram should never be delivered");
}

#[tokio::test]
async fn duplicate_midi_identifier_is_suppressed_end_to_end() {
    let state = Arc::new(RelayState::new(0.0, false, 1));
    let mut received = ReceivedSet::default();
    let mut estimators = ClockEstimators::default();

    let local = handle_local_midi(&[0x90, 0x3C, 0x64], 10.0, &state).unwrap();
    let wire = Packet::decode(&local.wire).unwrap();
    let encoded = wire.encode();

    let first = dispatch_packet(&encoded, 10.01, &state, &mut received, &mut estimators);
    assert!(matches!(first, Outcome::PlayLocal { .. }));

    // A retransmitted duplicate of the same identifier must be dropped, not
    // double-scheduled.
    let second = dispatch_packet(&encoded, 10.02, &state, &mut received, &mut estimators);
    assert!(matches!(second, Outcome::Ignored));
}

#[tokio::test]
async fn clock_sync_round_trip_converges_delta_and_latency() {
    let state = Arc::new(RelayState::new(0.0, true, 1));
    let mut received = ReceivedSet::default();
    let mut estimators = ClockEstimators::default();

    // Simulate a peer that is 0.25s ahead with ~20ms one-way latency, over
    // several exchanges, and confirm the relay's published estimates move
    // toward the simulated truth.
    for i in 0..30 {
        let sent = i as f64 * 0.2;
        let one_way = 0.02;
        let ack_packet = Packet::ClockSyncAck {
            timestamp_sent: sent,
            timestamp_ack: sent + 0.25 + one_way,
        }
        .encode();
        let t_final = sent + 2.0 * one_way;
        let outcome = dispatch_packet(&ack_packet, t_final, &state, &mut received, &mut estimators);
        assert!(matches!(outcome, Outcome::Ignored));
    }

    assert!((state.delta.load() - 0.25).abs() < 0.01);
    assert!((state.network_latency.load() - 0.02).abs() < 0.01);
    // auto_latency was enabled, so playback_latency should track latency * 1.1.
    assert!((state.playback_latency.load() - state.network_latency.load() * 1.1).abs() < 1e-9);
}

#[tokio::test]
async fn oversized_local_midi_message_never_reaches_the_queue() {
    let state = Arc::new(RelayState::new(0.0, false, 1));
    assert!(handle_local_midi(&[0u8; 32], 1.0, &state).is_none());
    let outputs: Vec<Box<dyn midinet_device::MidiOutput>> = Vec::new();
    assert_eq!(state.queue.release_ready(f64::MAX, &outputs), 0);
}
