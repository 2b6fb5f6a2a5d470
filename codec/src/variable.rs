//! Dirty-tracked synchronized variables.
//!
//! A [`SynchronizedVariable`] holds one replicated value. Setting a value that
//! differs from the current one marks it dirty and queues a change
//! notification; setting an equal value does nothing. The dirty flag stays up
//! until the owner calls [`SynchronizedVariable::reset_dirty`] after a
//! successful send.

use std::fmt;

use bitstream::{BitError, BitReader, BitWriter};

use crate::error::{CodecError, CodecResult};
use crate::mask::MAX_SLOTS;

/// Wire representation of one synchronized value type.
pub trait VarCodec {
    /// The in-memory value type.
    type Value: Clone + PartialEq + Default + fmt::Debug;

    /// Writes `value` into `writer`.
    fn pack(value: &Self::Value, writer: &mut BitWriter) -> CodecResult<()>;

    /// Reads one value from `reader`.
    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<Self::Value>;
}

/// Signed integer, zigzag varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntCodec;

/// Unsigned integer, varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UIntCodec;

/// Native-width float, raw IEEE-754 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatCodec;

/// UTF-8 string through the bitstream string codec (512 byte limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringCodec;

/// ASCII string of any length: varint length, then one byte per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AsciiCodec;

impl VarCodec for IntCodec {
    type Value = i32;

    fn pack(value: &i32, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_vars32(*value);
        Ok(())
    }

    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<i32> {
        Ok(reader.read_vars32()?)
    }
}

impl VarCodec for UIntCodec {
    type Value = u32;

    fn pack(value: &u32, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_varu32(*value);
        Ok(())
    }

    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<u32> {
        Ok(reader.read_varu32()?)
    }
}

impl VarCodec for FloatCodec {
    type Value = f32;

    fn pack(value: &f32, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_f32(*value);
        Ok(())
    }

    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<f32> {
        Ok(reader.read_f32()?)
    }
}

impl VarCodec for StringCodec {
    type Value = String;

    fn pack(value: &String, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_string(value)?;
        Ok(())
    }

    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<String> {
        Ok(reader.read_string()?)
    }
}

impl VarCodec for AsciiCodec {
    type Value = String;

    fn pack(value: &String, writer: &mut BitWriter) -> CodecResult<()> {
        if let Some(byte) = value.bytes().find(|b| !b.is_ascii()) {
            return Err(CodecError::NonAscii { byte });
        }
        let len = u32::try_from(value.len()).map_err(|_| BitError::ValueOutOfRange {
            value: value.len() as u64,
            bits: 32,
        })?;
        writer.write_varu32(len);
        for byte in value.bytes() {
            writer.write_u8(byte);
        }
        Ok(())
    }

    fn unpack(reader: &mut BitReader<'_>) -> CodecResult<String> {
        let len = reader.read_varu32()? as usize;
        let requested = len.saturating_mul(8);
        let available = reader.bits_remaining();
        if requested > available {
            return Err(BitError::UnexpectedEof {
                requested,
                available,
            }
            .into());
        }
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            let byte = reader.read_u8()?;
            if !byte.is_ascii() {
                return Err(CodecError::NonAscii { byte });
            }
            out.push(char::from(byte));
        }
        Ok(out)
    }
}

/// A replicated value with dirty tracking and a slot in the entity dirty mask.
#[derive(Clone)]
pub struct SynchronizedVariable<C: VarCodec> {
    value: C::Value,
    dirty: bool,
    bit_flag: u32,
    pending: Option<C::Value>,
}

pub type SyncInt = SynchronizedVariable<IntCodec>;
pub type SyncUInt = SynchronizedVariable<UIntCodec>;
pub type SyncFloat = SynchronizedVariable<FloatCodec>;
pub type SyncString = SynchronizedVariable<StringCodec>;
pub type SyncAscii = SynchronizedVariable<AsciiCodec>;

impl<C: VarCodec> SynchronizedVariable<C> {
    /// Creates a clean variable without a mask slot.
    #[must_use]
    pub fn new(initial: C::Value) -> Self {
        Self {
            value: initial,
            dirty: false,
            bit_flag: 0,
            pending: None,
        }
    }

    /// Creates a clean variable owning mask slot `slot`.
    pub fn with_slot(slot: u8, initial: C::Value) -> CodecResult<Self> {
        if u32::from(slot) >= MAX_SLOTS {
            return Err(CodecError::InvalidSlot {
                slot,
                max: MAX_SLOTS as u8,
            });
        }
        Ok(Self {
            bit_flag: 1 << slot,
            ..Self::new(initial)
        })
    }

    /// Current value.
    #[must_use]
    pub const fn value(&self) -> &C::Value {
        &self.value
    }

    /// Whether the value changed since the last [`reset_dirty`](Self::reset_dirty).
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The single bit this variable owns in an entity dirty mask, 0 if unassigned.
    #[must_use]
    pub const fn bit_flag(&self) -> u32 {
        self.bit_flag
    }

    /// Stores `value`. Returns `true` and marks the variable dirty only if it
    /// differs from the current value.
    pub fn set(&mut self, value: C::Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.dirty = true;
        self.pending = Some(self.value.clone());
        true
    }

    /// Clears the dirty flag after the value has been sent.
    pub fn reset_dirty(&mut self) {
        self.dirty = false;
    }

    /// Takes the latest unobserved change, if any.
    pub fn take_change(&mut self) -> Option<C::Value> {
        self.pending.take()
    }

    /// Serializes the current value.
    pub fn pack(&self, writer: &mut BitWriter) -> CodecResult<()> {
        C::pack(&self.value, writer)
    }

    /// Deserializes a value and applies it through [`set`](Self::set).
    pub fn unpack(&mut self, reader: &mut BitReader<'_>) -> CodecResult<bool> {
        let value = C::unpack(reader)?;
        Ok(self.set(value))
    }
}

impl<C> SynchronizedVariable<C>
where
    C: VarCodec<Value = String>,
{
    /// Stores an optional string, treating `None` as the empty string.
    pub fn set_or_empty(&mut self, value: Option<String>) -> bool {
        self.set(value.unwrap_or_default())
    }
}

impl<C: VarCodec> Default for SynchronizedVariable<C> {
    fn default() -> Self {
        Self::new(C::Value::default())
    }
}

impl<C: VarCodec> fmt::Debug for SynchronizedVariable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedVariable")
            .field("value", &self.value)
            .field("dirty", &self.dirty)
            .field("bit_flag", &format_args!("0x{:08X}", self.bit_flag))
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a synchronized variable, used to pack heterogeneous
/// fields of one entity together.
pub trait SyncVar {
    fn bit_flag(&self) -> u32;
    fn is_dirty(&self) -> bool;
    fn reset_dirty(&mut self);
    fn pack_value(&self, writer: &mut BitWriter) -> CodecResult<()>;
    fn unpack_value(&mut self, reader: &mut BitReader<'_>) -> CodecResult<bool>;
}

impl<C: VarCodec> SyncVar for SynchronizedVariable<C> {
    fn bit_flag(&self) -> u32 {
        self.bit_flag
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn reset_dirty(&mut self) {
        self.dirty = false;
    }

    fn pack_value(&self, writer: &mut BitWriter) -> CodecResult<()> {
        self.pack(writer)
    }

    fn unpack_value(&mut self, reader: &mut BitReader<'_>) -> CodecResult<bool> {
        self.unpack(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<C: VarCodec>(value: C::Value) -> SynchronizedVariable<C> {
        let mut source = SynchronizedVariable::<C>::default();
        source.set(value);
        let mut writer = BitWriter::new();
        source.pack(&mut writer).unwrap();
        let bytes = writer.finish();

        let mut target = SynchronizedVariable::<C>::default();
        target.unpack(&mut BitReader::new(&bytes)).unwrap();
        target
    }

    #[test]
    fn set_marks_dirty_only_on_change() {
        let mut var = SyncInt::new(5);
        assert!(!var.is_dirty());
        assert!(!var.set(5));
        assert!(!var.is_dirty());
        assert!(var.set(6));
        assert!(var.is_dirty());
        assert_eq!(*var.value(), 6);
    }

    #[test]
    fn reset_dirty_clears_flag() {
        let mut var = SyncUInt::new(0);
        var.set(1);
        var.reset_dirty();
        assert!(!var.is_dirty());
        assert!(!var.set(1));
        assert!(!var.is_dirty());
    }

    #[test]
    fn take_change_reports_latest_value_once() {
        let mut var = SyncFloat::new(0.0);
        var.set(1.0);
        var.set(2.0);
        assert_eq!(var.take_change(), Some(2.0));
        assert_eq!(var.take_change(), None);
        var.set(2.0);
        assert_eq!(var.take_change(), None);
    }

    #[test]
    fn nan_always_changes() {
        let mut var = SyncFloat::new(f32::NAN);
        assert!(var.set(f32::NAN));
    }

    #[test]
    fn with_slot_sets_bit_flag() {
        let var = SyncInt::with_slot(3, 0).unwrap();
        assert_eq!(var.bit_flag(), 0b1000);
        assert_eq!(SyncInt::new(0).bit_flag(), 0);
    }

    #[test]
    fn with_slot_rejects_out_of_range() {
        let err = SyncInt::with_slot(32, 0).unwrap_err();
        assert_eq!(err, CodecError::InvalidSlot { slot: 32, max: 32 });
    }

    #[test]
    fn int_roundtrip() {
        let target = roundtrip::<IntCodec>(i32::MIN);
        assert_eq!(*target.value(), i32::MIN);
        assert!(target.is_dirty());
    }

    #[test]
    fn uint_roundtrip() {
        assert_eq!(*roundtrip::<UIntCodec>(u32::MAX).value(), u32::MAX);
    }

    #[test]
    fn float_roundtrip() {
        assert_eq!(*roundtrip::<FloatCodec>(-0.125).value(), -0.125);
    }

    #[test]
    fn string_roundtrip() {
        assert_eq!(roundtrip::<StringCodec>("héllo".into()).value(), "héllo");
    }

    #[test]
    fn string_over_limit_fails_to_pack() {
        let var = SyncString::new("x".repeat(bitstream::MAX_STRING_BYTES + 1));
        let err = var.pack(&mut BitWriter::new()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Bitstream(BitError::StringTooLong { .. })
        ));
    }

    #[test]
    fn ascii_roundtrip_beyond_string_limit() {
        let long = "a".repeat(bitstream::MAX_STRING_BYTES * 4);
        assert_eq!(roundtrip::<AsciiCodec>(long.clone()).value(), &long);
    }

    #[test]
    fn ascii_none_encodes_as_empty() {
        let mut var = SyncAscii::new("x".into());
        assert!(var.set_or_empty(None));
        let mut writer = BitWriter::new();
        var.pack(&mut writer).unwrap();
        let bytes = writer.finish();
        assert_eq!(bytes, vec![0]);

        let mut target = SyncAscii::new("y".into());
        assert!(target.unpack(&mut BitReader::new(&bytes)).unwrap());
        assert_eq!(target.value(), "");
    }

    #[test]
    fn ascii_rejects_non_ascii() {
        let var = SyncAscii::new("caf\u{e9}".into());
        let err = var.pack(&mut BitWriter::new()).unwrap_err();
        assert_eq!(err, CodecError::NonAscii { byte: 0xC3 });
    }

    #[test]
    fn ascii_truncated_input_fails_before_allocating() {
        let mut writer = BitWriter::new();
        writer.write_varu32(1_000_000);
        let bytes = writer.finish();
        let mut var = SyncAscii::default();
        let err = var.unpack(&mut BitReader::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Bitstream(BitError::UnexpectedEof { .. })
        ));
        assert!(!var.is_dirty());
    }

    #[test]
    fn unpack_equal_value_stays_clean() {
        let mut writer = BitWriter::new();
        writer.write_vars32(9);
        let bytes = writer.finish();
        let mut var = SyncInt::new(9);
        assert!(!var.unpack(&mut BitReader::new(&bytes)).unwrap());
        assert!(!var.is_dirty());
    }
}
