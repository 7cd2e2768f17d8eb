/// Packet dispatch and local-MIDI ingress — the network-to-playback and
/// MIDI-to-network-and-playback data-flow entry points. Kept as plain
/// functions over explicit state (rather than methods that also perform I/O)
/// so the dedup/ordering/timestamp-adjustment logic is exercised directly in
/// tests without standing up a transport or a MIDI device.
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use midinet_protocol::{MidiMessage, Packet, UniqueIdentifier, MIDI_MAX_MESSAGE_SIZE};

use crate::clocksync::ClockEstimators;
use crate::received::ReceivedSet;
use crate::state::RelayState;

/// What the caller should do after `dispatch_packet` has updated relay
/// state. Keeping the actual transport `send`/queue `push` calls at the call
/// site is what lets this function stay synchronous and side-effect-free
/// beyond the state it's explicitly given.
pub enum Outcome {
    Ignored,
    Reply(Vec<u8>),
    PlayLocal { timestamp: f64, bytes: Vec<u8> },
}

/// Handle one inbound network datagram: decode, dispatch by packet type,
/// update clock-sync estimators or the dedup set as appropriate.
pub fn dispatch_packet(
    data: &[u8],
    now: f64,
    state: &Arc<RelayState>,
    received: &mut ReceivedSet,
    estimators: &mut ClockEstimators,
) -> Outcome {
    state.num_packets.fetch_add(1, Ordering::Relaxed);

    let packet = match Packet::decode(data) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, len = data.len(), "dropping malformed packet");
            return Outcome::Ignored;
        }
    };

    match packet {
        Packet::Ping => Outcome::Ignored,
        Packet::ClockSync { timestamp_sent } => {
            let ack = Packet::ClockSyncAck {
                timestamp_sent,
                timestamp_ack: now,
            };
            Outcome::Reply(ack.encode())
        }
        Packet::ClockSyncAck {
            timestamp_sent,
            timestamp_ack,
        } => {
            if let Some((delta, latency)) = estimators.observe_ack(timestamp_sent, timestamp_ack, now) {
                state.delta.store(delta);
                state.network_latency.store(latency);
                if state.auto_latency {
                    state.playback_latency.store(latency * 1.1);
                }
            }
            Outcome::Ignored
        }
        Packet::MidiMessage {
            mut message,
            identifier,
        } => {
            message.timestamp = message.timestamp - state.delta.load() + state.playback_latency.load();
            if received.insert_if_new(identifier, now) {
                Outcome::PlayLocal {
                    timestamp: message.timestamp,
                    bytes: message.bytes,
                }
            } else {
                Outcome::Ignored
            }
        }
    }
}

/// What the caller should do with one local MIDI callback: transmit the wire
/// packet `duplication` times, then enqueue the local copy for playback.
pub struct LocalMidi {
    pub wire: Vec<u8>,
    pub local_timestamp: f64,
    pub local_bytes: Vec<u8>,
}

/// Handle one inbound message from a local MIDI input port. Returns `None`
/// (after logging a warning) for messages longer than
/// [`MIDI_MAX_MESSAGE_SIZE`].
pub fn handle_local_midi(bytes: &[u8], now: f64, state: &Arc<RelayState>) -> Option<LocalMidi> {
    if bytes.len() > MIDI_MAX_MESSAGE_SIZE {
        warn!(len = bytes.len(), "ignored oversized MIDI message");
        return None;
    }
    if bytes.is_empty() {
        return None;
    }

    let serial = state.take_serial();
    let message = MidiMessage::new(now, bytes);
    let identifier = UniqueIdentifier {
        serial,
        timestamp: message.timestamp,
    };
    let wire = Packet::MidiMessage { message, identifier }.encode();

    Some(LocalMidi {
        wire,
        local_timestamp: now + state.playback_latency.load(),
        local_bytes: bytes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<RelayState> {
        Arc::new(RelayState::new(0.0, false, 1))
    }

    #[test]
    fn clock_sync_produces_a_reply() {
        let s = state();
        let mut received = ReceivedSet::default();
        let mut estimators = ClockEstimators::default();
        let packet = Packet::ClockSync { timestamp_sent: 10.0 }.encode();
        match dispatch_packet(&packet, 10.1, &s, &mut received, &mut estimators) {
            Outcome::Reply(bytes) => {
                let decoded = Packet::decode(&bytes).unwrap();
                assert_eq!(
                    decoded,
                    Packet::ClockSyncAck {
                        timestamp_sent: 10.0,
                        timestamp_ack: 10.1
                    }
                );
            }
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn midi_message_is_deduplicated() {
        let s = state();
        let mut received = ReceivedSet::default();
        let mut estimators = ClockEstimators::default();
        let packet = Packet::MidiMessage {
            message: MidiMessage::new(5.0, &[0x90, 0x3C, 0x7F]),
            identifier: UniqueIdentifier {
                serial: 1,
                timestamp: 5.0,
            },
        }
        .encode();

        let first = dispatch_packet(&packet, 5.01, &s, &mut received, &mut estimators);
        assert!(matches!(first, Outcome::PlayLocal { .. }));

        let second = dispatch_packet(&packet, 5.02, &s, &mut received, &mut estimators);
        assert!(matches!(second, Outcome::Ignored));
    }

    #[test]
    fn midi_message_timestamp_is_adjusted_by_delta_and_latency() {
        let s = state();
        s.delta.store(1.0);
        s.playback_latency.store(0.05);
        let mut received = ReceivedSet::default();
        let mut estimators = ClockEstimators::default();
        let packet = Packet::MidiMessage {
            message: MidiMessage::new(5.0, &[0x80, 0x3C, 0x40]),
            identifier: UniqueIdentifier {
                serial: 2,
                timestamp: 5.0,
            },
        }
        .encode();

        match dispatch_packet(&packet, 5.0, &s, &mut received, &mut estimators) {
            Outcome::PlayLocal { timestamp, .. } => {
                assert!((timestamp - (5.0 - 1.0 + 0.05)).abs() < 1e-12);
            }
            _ => panic!("expected PlayLocal"),
        }
    }

    #[test]
    fn oversized_local_message_is_dropped() {
        let s = state();
        let result = handle_local_midi(&[0u8; 9], 1.0, &s);
        assert!(result.is_none());
    }

    #[test]
    fn local_midi_serial_increments_and_identifier_matches_timestamp() {
        let s = state();
        let a = handle_local_midi(&[0x90, 0x40, 0x7F], 10.0, &s).unwrap();
        let b = handle_local_midi(&[0x80, 0x40, 0x00], 10.0, &s).unwrap();
        let packet_a = Packet::decode(&a.wire).unwrap();
        let packet_b = Packet::decode(&b.wire).unwrap();
        match (packet_a, packet_b) {
            (
                Packet::MidiMessage { identifier: id_a, .. },
                Packet::MidiMessage { identifier: id_b, .. },
            ) => {
                assert_eq!(id_a.serial, 0);
                assert_eq!(id_b.serial, 1);
            }
            _ => panic!("expected MidiMessage packets"),
        }
    }
}
