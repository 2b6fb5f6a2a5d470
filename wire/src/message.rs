//! Entity messages: spawn, position update and destroy.
//!
//! Layout, bit-packed, MSB first:
//!
//! ```text
//! id:varu32  opcode:u8  [position:quantized xyz  heading:f32]
//! ```
//!
//! `Destroy` carries only the header.

use bitstream::{BitReader, BitWriter};
use bytes::Bytes;
use codec::{Vec3, WorldBounds};

use crate::channel::{Delivery, Packet};
use crate::error::{WireError, WireResult};
use crate::header::{EntityHeader, OpCode, PeerId};
use crate::limits::Limits;

/// A decoded entity message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityMessage {
    Spawn {
        id: PeerId,
        position: Vec3,
        heading: f32,
    },
    PositionUpdate {
        id: PeerId,
        position: Vec3,
        heading: f32,
    },
    Destroy {
        id: PeerId,
    },
}

impl EntityMessage {
    #[must_use]
    pub const fn id(&self) -> PeerId {
        match self {
            Self::Spawn { id, .. } | Self::PositionUpdate { id, .. } | Self::Destroy { id } => *id,
        }
    }

    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Spawn { .. } => OpCode::Spawn,
            Self::PositionUpdate { .. } => OpCode::PositionUpdate,
            Self::Destroy { .. } => OpCode::Destroy,
        }
    }

    #[must_use]
    pub const fn header(&self) -> EntityHeader {
        EntityHeader::new(self.id(), self.opcode())
    }

    /// Position updates tolerate loss; lifecycle messages do not.
    #[must_use]
    pub const fn delivery(&self) -> Delivery {
        match self {
            Self::PositionUpdate { .. } => Delivery::Unreliable,
            Self::Spawn { .. } | Self::Destroy { .. } => Delivery::Reliable,
        }
    }

    /// Appends the message to `writer`.
    pub fn encode_into(&self, bounds: &WorldBounds, writer: &mut BitWriter) -> WireResult<()> {
        self.header().encode(writer);
        match self {
            Self::Spawn {
                position, heading, ..
            }
            | Self::PositionUpdate {
                position, heading, ..
            } => {
                bounds.write_vec3(*position, writer)?;
                writer.write_f32(*heading);
            }
            Self::Destroy { .. } => {}
        }
        Ok(())
    }

    /// Encodes the message into a standalone buffer.
    pub fn encode(&self, bounds: &WorldBounds, limits: &Limits) -> WireResult<Bytes> {
        let mut writer = BitWriter::with_capacity(16);
        self.encode_into(bounds, &mut writer)?;
        let bytes = writer.finish();
        if bytes.len() > limits.max_packet_bytes {
            return Err(WireError::PacketTooLarge {
                limit: limits.max_packet_bytes,
                actual: bytes.len(),
            });
        }
        Ok(Bytes::from(bytes))
    }

    /// Encodes the message into a packet with its natural delivery class.
    pub fn to_packet(&self, bounds: &WorldBounds, limits: &Limits) -> WireResult<Packet> {
        Ok(Packet::new(self.encode(bounds, limits)?, self.delivery()))
    }

    /// Reads one message from `reader`.
    pub fn decode_from(bounds: &WorldBounds, reader: &mut BitReader<'_>) -> WireResult<Self> {
        let header = EntityHeader::decode(reader)?;
        let id = header.id;
        let message = match header.opcode {
            OpCode::Spawn => {
                let position = bounds.read_vec3(reader)?;
                let heading = reader.read_f32()?;
                Self::Spawn {
                    id,
                    position,
                    heading,
                }
            }
            OpCode::PositionUpdate => {
                let position = bounds.read_vec3(reader)?;
                let heading = reader.read_f32()?;
                Self::PositionUpdate {
                    id,
                    position,
                    heading,
                }
            }
            OpCode::Destroy => Self::Destroy { id },
        };
        Ok(message)
    }

    /// Decodes a buffer holding exactly one message.
    pub fn decode(buf: &[u8], bounds: &WorldBounds, limits: &Limits) -> WireResult<Self> {
        if buf.len() > limits.max_packet_bytes {
            return Err(WireError::PacketTooLarge {
                limit: limits.max_packet_bytes,
                actual: buf.len(),
            });
        }
        let mut reader = BitReader::new(buf);
        let message = Self::decode_from(bounds, &mut reader)?;
        let remaining_bits = reader.bits_remaining();
        if remaining_bits >= 8 {
            return Err(WireError::TrailingBytes { remaining_bits });
        }
        Ok(message)
    }
}
