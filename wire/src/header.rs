//! Entity header and opcodes.

use std::fmt;

use bitstream::{BitReader, BitWriter};

use crate::error::{WireError, WireResult};

/// Identity of a connected peer. Also the id of the entity it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(u32);

impl PeerId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Spawn = 1,
    Destroy = 2,
    PositionUpdate = 3,
}

impl OpCode {
    /// Parses an opcode from a raw byte.
    pub fn parse(raw: u8) -> WireResult<Self> {
        match raw {
            1 => Ok(Self::Spawn),
            2 => Ok(Self::Destroy),
            3 => Ok(Self::PositionUpdate),
            _ => Err(WireError::UnknownOpCode { opcode: raw }),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// Upper bound on the encoded header: a 5-group varint plus the opcode byte.
pub const HEADER_MAX_BITS: usize = 5 * 8 + 8;

/// Prefix of every entity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHeader {
    pub id: PeerId,
    pub opcode: OpCode,
}

impl EntityHeader {
    #[must_use]
    pub const fn new(id: PeerId, opcode: OpCode) -> Self {
        Self { id, opcode }
    }

    /// Writes the id as a varint followed by the opcode byte.
    pub fn encode(&self, writer: &mut BitWriter) {
        writer.write_varu32(self.id.raw());
        writer.write_u8(self.opcode.raw());
    }

    /// Reads a header, rejecting unknown opcodes.
    pub fn decode(reader: &mut BitReader<'_>) -> WireResult<Self> {
        let id = PeerId::new(reader.read_varu32()?);
        let opcode = OpCode::parse(reader.read_u8()?)?;
        Ok(Self { id, opcode })
    }
}

/// Decodes only the header at the front of `buf`.
pub fn decode_header(buf: &[u8]) -> WireResult<EntityHeader> {
    EntityHeader::decode(&mut BitReader::new(buf))
}

/// Checks that a received header names the peer that sent it.
pub fn validate_sender(header: &EntityHeader, sender: PeerId) -> WireResult<()> {
    if header.id != sender {
        return Err(WireError::IdMismatch {
            header: header.id,
            sender,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(OpCode::Spawn.raw(), 1);
        assert_eq!(OpCode::Destroy.raw(), 2);
        assert_eq!(OpCode::PositionUpdate.raw(), 3);
    }

    #[test]
    fn opcode_parse_rejects_unknown() {
        assert_eq!(OpCode::parse(3).unwrap(), OpCode::PositionUpdate);
        assert_eq!(
            OpCode::parse(0).unwrap_err(),
            WireError::UnknownOpCode { opcode: 0 }
        );
        assert!(OpCode::parse(255).is_err());
    }

    #[test]
    fn header_layout() {
        let mut writer = BitWriter::new();
        EntityHeader::new(PeerId::new(5), OpCode::Destroy).encode(&mut writer);
        assert_eq!(writer.finish(), vec![5, 2]);
    }

    #[test]
    fn header_roundtrip_large_id() {
        let header = EntityHeader::new(PeerId::new(u32::MAX), OpCode::Spawn);
        let mut writer = BitWriter::new();
        header.encode(&mut writer);
        assert_eq!(writer.bits_written(), HEADER_MAX_BITS);
        let bytes = writer.finish();
        assert_eq!(decode_header(&bytes).unwrap(), header);
    }

    #[test]
    fn decode_header_empty_fails() {
        assert!(matches!(decode_header(&[]), Err(WireError::Codec(_))));
    }

    #[test]
    fn validate_sender_checks_id() {
        let header = EntityHeader::new(PeerId::new(2), OpCode::PositionUpdate);
        assert!(validate_sender(&header, PeerId::new(2)).is_ok());
        assert_eq!(
            validate_sender(&header, PeerId::new(1)).unwrap_err(),
            WireError::IdMismatch {
                header: PeerId::new(2),
                sender: PeerId::new(1),
            }
        );
    }

    #[test]
    fn peer_id_display() {
        assert_eq!(PeerId::new(42).to_string(), "42");
    }
}
