//! Entity-level dirty masks.
//!
//! Each [`SyncVar`] of an entity owns one bit of a 32-bit mask. A delta is
//! the varint mask followed by the dirty fields in slot order.

use bitstream::{BitReader, BitWriter};

use crate::error::{CodecError, CodecResult};
use crate::variable::SyncVar;

/// Number of slots in a [`DirtyMask`].
pub const MAX_SLOTS: u32 = u32::BITS;

/// Set of dirty slots for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirtyMask(u32);

impl DirtyMask {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, bit_flag: u32) -> bool {
        bit_flag != 0 && self.0 & bit_flag == bit_flag
    }

    pub fn insert(&mut self, bit_flag: u32) {
        self.0 |= bit_flag;
    }

    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Collects the bit flags of every dirty variable.
#[must_use]
pub fn dirty_mask(vars: &[&dyn SyncVar]) -> DirtyMask {
    let mut mask = DirtyMask::EMPTY;
    for var in vars {
        if var.is_dirty() {
            mask.insert(var.bit_flag());
        }
    }
    mask
}

/// Writes the dirty mask of `vars` followed by each dirty value, in slot order.
///
/// Returns the mask that was written. Nothing is written when a variable has
/// no slot or two variables share one.
pub fn pack_dirty(vars: &[&dyn SyncVar], writer: &mut BitWriter) -> CodecResult<DirtyMask> {
    validate_slots(vars.iter().map(|v| v.bit_flag()))?;
    let mask = dirty_mask(vars);
    writer.write_varu32(mask.bits());
    for var in ordered(vars.iter().copied()) {
        if var.is_dirty() {
            var.pack_value(writer)?;
        }
    }
    Ok(mask)
}

/// Reads a mask written by [`pack_dirty`] and applies each carried value.
///
/// Returns the mask of slots whose value actually changed.
pub fn unpack_dirty(
    vars: &mut [&mut dyn SyncVar],
    reader: &mut BitReader<'_>,
) -> CodecResult<DirtyMask> {
    validate_slots(vars.iter().map(|v| v.bit_flag()))?;
    let received = reader.read_varu32()?;
    let known = vars.iter().fold(0u32, |acc, v| acc | v.bit_flag());
    let unknown = received & !known;
    if unknown != 0 {
        return Err(CodecError::UnknownSlots { unknown });
    }

    vars.sort_by_key(|v| v.bit_flag());
    let received = DirtyMask::from_bits(received);
    let mut changed = DirtyMask::EMPTY;
    for var in vars.iter_mut() {
        if received.contains(var.bit_flag()) && var.unpack_value(reader)? {
            changed.insert(var.bit_flag());
        }
    }
    Ok(changed)
}

/// Clears the dirty flag of every variable.
pub fn reset_all(vars: &mut [&mut dyn SyncVar]) {
    for var in vars.iter_mut() {
        var.reset_dirty();
    }
}

fn validate_slots(flags: impl Iterator<Item = u32>) -> CodecResult<()> {
    let mut seen = 0u32;
    for bit_flag in flags {
        if bit_flag == 0 || seen & bit_flag != 0 {
            return Err(CodecError::SlotConflict { bit_flag });
        }
        seen |= bit_flag;
    }
    Ok(())
}

fn ordered<'a>(vars: impl Iterator<Item = &'a dyn SyncVar>) -> Vec<&'a dyn SyncVar> {
    let mut out: Vec<_> = vars.collect();
    out.sort_by_key(|v| v.bit_flag());
    out
}
