use thiserror::Error;

/// Errors raised while decoding a wire packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet shorter than the minimum size for its type ({got} < {min})")]
    Truncated { got: usize, min: usize },
    #[error("unknown packet type byte {0}")]
    UnknownType(u8),
    #[error("MIDI message length {0} outside [1,8]")]
    InvalidMidiLength(i32),
}
