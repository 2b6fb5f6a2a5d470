//! Error types for entity message framing.

use std::fmt;

use bitstream::BitError;
use codec::CodecError;

use crate::header::PeerId;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while encoding, decoding or validating entity messages.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum WireError {
    /// Payload could not be packed or unpacked.
    Codec(CodecError),

    /// Opcode byte does not name a known message.
    UnknownOpCode { opcode: u8 },

    /// Header id differs from the peer that sent the packet.
    IdMismatch { header: PeerId, sender: PeerId },

    /// Packet is larger than the configured limit.
    PacketTooLarge { limit: usize, actual: usize },

    /// Packet has bytes left over after the message.
    TrailingBytes { remaining_bits: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "codec error: {err}"),
            Self::UnknownOpCode { opcode } => write!(f, "unknown opcode: {opcode}"),
            Self::IdMismatch { header, sender } => {
                write!(
                    f,
                    "header id {header} does not match sending peer {sender}"
                )
            }
            Self::PacketTooLarge { limit, actual } => {
                write!(f, "packet too large: {actual} bytes > {limit}")
            }
            Self::TrailingBytes { remaining_bits } => {
                write!(f, "{remaining_bits} bits left after message")
            }
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for WireError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<BitError> for WireError {
    fn from(err: BitError) -> Self {
        Self::Codec(CodecError::Bitstream(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_id_mismatch() {
        let err = WireError::IdMismatch {
            header: PeerId::new(7),
            sender: PeerId::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn display_packet_too_large() {
        let err = WireError::PacketTooLarge {
            limit: 1200,
            actual: 4000,
        };
        assert!(err.to_string().contains("4000"));
    }

    #[test]
    fn bit_error_converts_through_codec() {
        let err: WireError = BitError::InvalidVarint.into();
        assert_eq!(err, WireError::Codec(CodecError::Bitstream(BitError::InvalidVarint)));
        assert!(err.source().is_some());
    }

    #[test]
    fn unknown_opcode_has_no_source() {
        let err = WireError::UnknownOpCode { opcode: 9 };
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "unknown opcode: 9");
    }
}
