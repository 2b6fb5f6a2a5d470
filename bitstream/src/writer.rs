//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};
use crate::{MAX_STRING_BYTES, STRING_LEN_BITS};

/// A bit-level writer for encoding packed binary data.
///
/// Writes are accumulated in an internal buffer. Call [`finish`](Self::finish)
/// to get the final byte buffer, or [`take_bytes`](Self::take_bytes) to reuse
/// the writer as scratch space.
#[derive(Debug, Default)]
pub struct BitWriter {
    /// The accumulated bytes.
    bytes: Vec<u8>,
    /// Current byte being written (not yet pushed to bytes).
    current_byte: u8,
    /// Number of bits written to `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Returns the number of bytes [`finish`](Self::finish) would produce.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len() + usize::from(self.bit_count > 0)
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        self.current_byte = (self.current_byte << 1) | u8::from(value);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Writes up to 64 bits from an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: usize) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }

        for i in (0..bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Writes a full byte (8 bits, no alignment required).
    pub fn write_u8(&mut self, value: u8) {
        for i in (0..8).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes a varint `u32` as 8-bit groups of 7 payload bits.
    ///
    /// Small values cost 8 bits; `u32::MAX` costs 40.
    pub fn write_varu32(&mut self, mut value: u32) {
        loop {
            let mut group = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                group |= 0x80;
            }
            self.write_u8(group);
            if value == 0 {
                break;
            }
        }
    }

    /// Writes a zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varu32(zigzag);
    }

    /// Writes the raw IEEE-754 bits of an `f32` (32 bits, lossless).
    pub fn write_f32(&mut self, value: f32) {
        for i in (0..32).rev() {
            self.write_bit((value.to_bits() >> i) & 1 == 1);
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::StringTooLong`] if the string exceeds
    /// [`MAX_STRING_BYTES`] bytes. Nothing is written in that case.
    pub fn write_string(&mut self, value: &str) -> BitResult<()> {
        let len = value.len();
        if len > MAX_STRING_BYTES {
            return Err(BitError::StringTooLong {
                len,
                max: MAX_STRING_BYTES,
            });
        }
        self.write_bits(len as u64, STRING_LEN_BITS)?;
        for byte in value.bytes() {
            self.write_u8(byte);
        }
        Ok(())
    }

    /// Discards everything written so far, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.current_byte = 0;
        self.bit_count = 0;
    }

    /// Returns the padded bytes written so far and resets the writer.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        std::mem::take(self).finish_into(&mut out);
        out
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.bytes.push(self.current_byte);
        }
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    pub fn finish_into(mut self, buf: &mut Vec<u8>) {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.bytes.push(self.current_byte);
        }
        buf.append(&mut self.bytes);
    }
}
