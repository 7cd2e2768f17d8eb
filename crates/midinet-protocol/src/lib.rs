pub mod clock;
pub mod error;
pub mod packets;
pub mod stats;

pub use error::DecodeError;
pub use packets::{MidiMessage, Packet, UniqueIdentifier, MIDI_MAX_MESSAGE_SIZE};
pub use stats::RunningMean;

/// Maximum size of a single UDP datagram this protocol will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Length, in bytes, of an HMAC-SHA1 authentication tag appended to a
/// datagram by `midinet-transport`'s HMAC wrapper.
pub const HMAC_TAG_LEN: usize = 20;
