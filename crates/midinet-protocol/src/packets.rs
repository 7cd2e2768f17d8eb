/// Wire packet encode/decode.
///
/// All packets are packed, little-endian, with no padding, encoded and
/// decoded explicitly via `to_*_bytes`/`from_*_bytes` rather than through a
/// serde/bincode layout.
use std::hash::{Hash, Hasher};

use crate::error::DecodeError;

pub const TYPE_PING: u8 = 0;
pub const TYPE_CLOCK_SYNC: u8 = 1;
pub const TYPE_CLOCK_SYNC_ACK: u8 = 2;
pub const TYPE_MIDI_MESSAGE: u8 = 100;

/// Maximum payload length of a single MIDI message carried over the wire.
pub const MIDI_MAX_MESSAGE_SIZE: usize = 8;

/// A MIDI identifier: `(serial, timestamp)`, totally ordered lexicographically
/// by `(timestamp, serial)`. Equality (used for dedup) compares both fields.
#[derive(Debug, Clone, Copy)]
pub struct UniqueIdentifier {
    pub serial: u32,
    pub timestamp: f64,
}

impl PartialEq for UniqueIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial && self.timestamp.to_bits() == other.timestamp.to_bits()
    }
}

impl Eq for UniqueIdentifier {}

impl Hash for UniqueIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
        self.timestamp.to_bits().hash(state);
    }
}

impl PartialOrd for UniqueIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UniqueIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .partial_cmp(&other.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.serial.cmp(&other.serial))
    }
}

impl UniqueIdentifier {
    pub const WIRE_SIZE: usize = 4 + 8;

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.serial.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        let serial = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let timestamp = f64::from_le_bytes(data[4..12].try_into().ok()?);
        Some(Self { serial, timestamp })
    }
}

/// A MIDI message in flight: up to 8 raw MIDI bytes plus the local-clock
/// timestamp at which it should be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMessage {
    pub timestamp: f64,
    pub bytes: Vec<u8>,
}

impl MidiMessage {
    pub fn new(timestamp: f64, bytes: &[u8]) -> Self {
        Self {
            timestamp,
            bytes: bytes.to_vec(),
        }
    }

    /// Wire size: `i32` length + `f64` timestamp + 8-byte fixed payload.
    pub const WIRE_SIZE: usize = 4 + 8 + MIDI_MAX_MESSAGE_SIZE;

    fn encode(&self, buf: &mut Vec<u8>) {
        let length = self.bytes.len() as i32;
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        let mut payload = [0u8; MIDI_MAX_MESSAGE_SIZE];
        let n = self.bytes.len().min(MIDI_MAX_MESSAGE_SIZE);
        payload[..n].copy_from_slice(&self.bytes[..n]);
        buf.extend_from_slice(&payload);
    }

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::WIRE_SIZE {
            return Err(DecodeError::Truncated {
                got: data.len(),
                min: Self::WIRE_SIZE,
            });
        }
        let length = i32::from_le_bytes(data[0..4].try_into().unwrap());
        if length < 1 || length as usize > MIDI_MAX_MESSAGE_SIZE {
            return Err(DecodeError::InvalidMidiLength(length));
        }
        let timestamp = f64::from_le_bytes(data[4..12].try_into().unwrap());
        let bytes = data[12..12 + length as usize].to_vec();
        Ok(Self { timestamp, bytes })
    }
}

/// A decoded inbound packet, dispatched on by the relay's ingress pipeline.
/// `Ping` and any unrecognized type byte are folded into a no-op at the call
/// site rather than here.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Ping,
    ClockSync {
        timestamp_sent: f64,
    },
    ClockSyncAck {
        timestamp_sent: f64,
        timestamp_ack: f64,
    },
    MidiMessage {
        message: MidiMessage,
        identifier: UniqueIdentifier,
    },
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Packet::Ping => {
                buf.push(TYPE_PING);
            }
            Packet::ClockSync { timestamp_sent } => {
                buf.push(TYPE_CLOCK_SYNC);
                buf.extend_from_slice(&timestamp_sent.to_le_bytes());
                buf.extend_from_slice(&0.0f64.to_le_bytes());
            }
            Packet::ClockSyncAck {
                timestamp_sent,
                timestamp_ack,
            } => {
                buf.push(TYPE_CLOCK_SYNC_ACK);
                buf.extend_from_slice(&timestamp_sent.to_le_bytes());
                buf.extend_from_slice(&timestamp_ack.to_le_bytes());
            }
            Packet::MidiMessage {
                message,
                identifier,
            } => {
                buf.push(TYPE_MIDI_MESSAGE);
                message.encode(&mut buf);
                identifier.encode(&mut buf);
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Truncated { got: 0, min: 1 });
        }
        match data[0] {
            TYPE_PING => Ok(Packet::Ping),
            TYPE_CLOCK_SYNC => {
                const SIZE: usize = 1 + 8 + 8;
                if data.len() < SIZE {
                    return Err(DecodeError::Truncated {
                        got: data.len(),
                        min: SIZE,
                    });
                }
                let timestamp_sent = f64::from_le_bytes(data[1..9].try_into().unwrap());
                Ok(Packet::ClockSync { timestamp_sent })
            }
            TYPE_CLOCK_SYNC_ACK => {
                const SIZE: usize = 1 + 8 + 8;
                if data.len() < SIZE {
                    return Err(DecodeError::Truncated {
                        got: data.len(),
                        min: SIZE,
                    });
                }
                let timestamp_sent = f64::from_le_bytes(data[1..9].try_into().unwrap());
                let timestamp_ack = f64::from_le_bytes(data[9..17].try_into().unwrap());
                Ok(Packet::ClockSyncAck {
                    timestamp_sent,
                    timestamp_ack,
                })
            }
            TYPE_MIDI_MESSAGE => {
                let rest = &data[1..];
                let message = MidiMessage::decode(rest)?;
                let identifier = UniqueIdentifier::decode(&rest[MidiMessage::WIRE_SIZE..])
                    .ok_or(DecodeError::Truncated {
                        got: rest.len(),
                        min: MidiMessage::WIRE_SIZE + UniqueIdentifier::WIRE_SIZE,
                    })?;
                Ok(Packet::MidiMessage {
                    message,
                    identifier,
                })
            }
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_roundtrip() {
        let encoded = Packet::Ping.encode();
        assert_eq!(encoded, vec![TYPE_PING]);
        assert_eq!(Packet::decode(&encoded).unwrap(), Packet::Ping);
    }

    #[test]
    fn clock_sync_roundtrip() {
        let pkt = Packet::ClockSync {
            timestamp_sent: 12345.678,
        };
        let encoded = pkt.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), pkt);
    }

    #[test]
    fn clock_sync_ack_roundtrip() {
        let pkt = Packet::ClockSyncAck {
            timestamp_sent: 1.0,
            timestamp_ack: 2.5,
        };
        let encoded = pkt.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), pkt);
    }

    #[test]
    fn midi_message_roundtrip() {
        let pkt = Packet::MidiMessage {
            message: MidiMessage::new(999.123, &[0x90, 0x3C, 0x7F]),
            identifier: UniqueIdentifier {
                serial: 42,
                timestamp: 999.123,
            },
        };
        let encoded = pkt.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn midi_message_rejects_zero_length() {
        let mut buf = Vec::new();
        buf.push(TYPE_MIDI_MESSAGE);
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&0.0f64.to_le_bytes());
        buf.extend_from_slice(&[0u8; MIDI_MAX_MESSAGE_SIZE]);
        buf.extend_from_slice(&[0u8; UniqueIdentifier::WIRE_SIZE]);
        assert!(matches!(
            Packet::decode(&buf),
            Err(DecodeError::InvalidMidiLength(0))
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            Packet::decode(&[0xEE]),
            Err(DecodeError::UnknownType(0xEE))
        ));
    }

    #[test]
    fn rejects_truncated_clock_sync() {
        assert!(matches!(
            Packet::decode(&[TYPE_CLOCK_SYNC, 0, 0]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn identifier_orders_by_timestamp_then_serial() {
        let a = UniqueIdentifier {
            serial: 5,
            timestamp: 1.0,
        };
        let b = UniqueIdentifier {
            serial: 1,
            timestamp: 2.0,
        };
        assert!(a < b);

        let c = UniqueIdentifier {
            serial: 1,
            timestamp: 1.0,
        };
        assert!(c < a);
    }
}
