//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while packing, unpacking or quantizing values.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Bitstream error.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// Slot index does not fit in a dirty mask.
    #[error("slot {slot} is outside the {max} slots of a dirty mask")]
    InvalidSlot { slot: u8, max: u8 },

    /// A variable in an aggregate has no slot, or shares one with another.
    #[error("bit flag 0x{bit_flag:08X} is unassigned or used twice")]
    SlotConflict { bit_flag: u32 },

    /// A received dirty mask names slots that no local variable owns.
    #[error("dirty mask carries unknown slots 0x{unknown:08X}")]
    UnknownSlots { unknown: u32 },

    /// ASCII codec was given (or decoded) a non-ASCII character.
    #[error("non-ascii byte 0x{byte:02X} in ascii string")]
    NonAscii { byte: u8 },

    /// Bounded range parameters are unusable.
    #[error("invalid bounded range [{min}, {max}] with precision {precision}")]
    InvalidRange { min: f32, max: f32, precision: f32 },
}
