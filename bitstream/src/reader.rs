//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};
use crate::{MAX_STRING_BYTES, STRING_LEN_BITS};

/// Maximum number of 8-bit groups a varint `u32` may span.
const MAX_VARINT_GROUPS: usize = 5;

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let byte_idx = self.bit_pos / 8;
        let bit_idx = self.bit_pos % 8;
        let bit = (self.data[byte_idx] >> (7 - bit_idx)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: usize) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits)?;

        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Reads a full byte (8 bits, no alignment required).
    pub fn read_u8(&mut self) -> BitResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads a varint `u32` written by [`BitWriter::write_varu32`](crate::BitWriter::write_varu32).
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        let mut result = 0u64;
        for group_idx in 0..MAX_VARINT_GROUPS {
            let group = self.read_u8()?;
            result |= u64::from(group & 0x7F) << (7 * group_idx);
            if group & 0x80 == 0 {
                return u32::try_from(result).map_err(|_| BitError::InvalidVarint);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Reads a zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        let value = self.read_varu32()?;
        Ok(((value >> 1) as i32) ^ (-((value & 1) as i32)))
    }

    /// Reads the raw IEEE-754 bits of an `f32`.
    pub fn read_f32(&mut self) -> BitResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)? as u32))
    }

    /// Reads a length-prefixed UTF-8 string of at most
    /// [`MAX_STRING_BYTES`](crate::MAX_STRING_BYTES) bytes.
    pub fn read_string(&mut self) -> BitResult<String> {
        let len = self.read_bits(STRING_LEN_BITS)? as usize;
        if len > MAX_STRING_BYTES {
            return Err(BitError::StringTooLong {
                len,
                max: MAX_STRING_BYTES,
            });
        }
        self.ensure_bits(len * 8)?;
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_u8()?);
        }
        String::from_utf8(bytes).map_err(|_| BitError::InvalidUtf8)
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }
}
