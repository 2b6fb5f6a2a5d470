//! Bounded-range quantization.
//!
//! A [`BoundedRange`] maps a float in `[min, max]` to an integer step count at
//! a declared precision. The round trip is lossy: a decoded value lies within
//! one `precision` unit of the input. Inputs outside the window are clamped.

use bitstream::{BitReader, BitWriter};

use crate::error::{CodecError, CodecResult};
use crate::types::Vec3;

/// Default half-width of the world window on each axis.
pub const DEFAULT_EXTENT: f32 = 5.0;

/// Default quantization step on each axis.
pub const DEFAULT_PRECISION: f32 = 0.05;

// Keeps the step count representable in a single `write_bits` call.
const MAX_RANGE_BITS: u8 = 32;

/// Plain description of a range, used for (de)serialization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeSpec {
    pub min: f32,
    pub max: f32,
    pub precision: f32,
}

/// A lossy quantization window for one scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RangeSpec", into = "RangeSpec")
)]
pub struct BoundedRange {
    min: f32,
    max: f32,
    precision: f32,
    steps: u32,
    bits: u8,
}

impl BoundedRange {
    /// Creates a range over `[min, max]` quantized at `precision`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidRange`] when a bound is not finite, when
    /// `min >= max`, when `precision` is not positive, or when the window
    /// needs more than 32 bits.
    pub fn new(min: f32, max: f32, precision: f32) -> CodecResult<Self> {
        let invalid = CodecError::InvalidRange {
            min,
            max,
            precision,
        };
        if !(min.is_finite() && max.is_finite() && precision.is_finite()) {
            return Err(invalid);
        }
        if min >= max || precision <= 0.0 {
            return Err(invalid);
        }

        let steps = ((f64::from(max) - f64::from(min)) / f64::from(precision)).round();
        if steps < 1.0 || steps > f64::from(u32::MAX) {
            return Err(invalid);
        }
        let steps = steps as u32;
        let bits = required_bits(steps);
        if bits > MAX_RANGE_BITS {
            return Err(invalid);
        }

        Ok(Self {
            min,
            max,
            precision,
            steps,
            bits,
        })
    }

    /// Creates the window `[-extent, extent]`.
    pub fn symmetric(extent: f32, precision: f32) -> CodecResult<Self> {
        Self::new(-extent, extent, precision)
    }

    #[must_use]
    pub const fn min(&self) -> f32 {
        self.min
    }

    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    #[must_use]
    pub const fn precision(&self) -> f32 {
        self.precision
    }

    /// Largest quantized value.
    #[must_use]
    pub const fn steps(&self) -> u32 {
        self.steps
    }

    /// Bits needed to carry one quantized value.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Collapses `value` to a step index. NaN maps to step 0.
    #[must_use]
    pub fn quantize(&self, value: f32) -> u32 {
        if value.is_nan() {
            return 0;
        }
        let clamped = f64::from(value.clamp(self.min, self.max));
        let offset = (clamped - f64::from(self.min)) / self.step();
        (offset.round() as u32).min(self.steps)
    }

    /// Reconstructs the value of step `quantized`, clamped to the window.
    #[must_use]
    pub fn dequantize(&self, quantized: u32) -> f32 {
        let q = f64::from(quantized.min(self.steps));
        let value = f64::from(self.min) + q * self.step();
        (value as f32).clamp(self.min, self.max)
    }

    // Width of one step; `precision` adjusted so `steps` steps span the window exactly.
    fn step(&self) -> f64 {
        (f64::from(self.max) - f64::from(self.min)) / f64::from(self.steps)
    }

    /// Quantizes `value` and writes it with [`bits`](Self::bits) bits.
    pub fn write(&self, value: f32, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_bits(u64::from(self.quantize(value)), usize::from(self.bits))?;
        Ok(())
    }

    /// Reads a quantized value and reconstructs it.
    pub fn read(&self, reader: &mut BitReader<'_>) -> CodecResult<f32> {
        let raw = reader.read_bits(usize::from(self.bits))?;
        Ok(self.dequantize(raw as u32))
    }
}

impl TryFrom<RangeSpec> for BoundedRange {
    type Error = CodecError;

    fn try_from(spec: RangeSpec) -> CodecResult<Self> {
        Self::new(spec.min, spec.max, spec.precision)
    }
}

impl From<BoundedRange> for RangeSpec {
    fn from(range: BoundedRange) -> Self {
        Self {
            min: range.min,
            max: range.max,
            precision: range.precision,
        }
    }
}

/// Bits needed to represent every integer in `0..=steps`.
#[must_use]
pub const fn required_bits(steps: u32) -> u8 {
    (u32::BITS - steps.leading_zeros()) as u8
}

/// A position quantized per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuantizedVec3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Three independent ranges quantizing a [`Vec3`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldBounds {
    pub x: BoundedRange,
    pub y: BoundedRange,
    pub z: BoundedRange,
}

impl WorldBounds {
    /// Uses `range` on all three axes.
    #[must_use]
    pub const fn uniform(range: BoundedRange) -> Self {
        Self {
            x: range,
            y: range,
            z: range,
        }
    }

    /// Bits used by one encoded position.
    #[must_use]
    pub const fn bits(&self) -> usize {
        self.x.bits as usize + self.y.bits as usize + self.z.bits as usize
    }

    #[must_use]
    pub fn quantize_vec3(&self, v: Vec3) -> QuantizedVec3 {
        QuantizedVec3 {
            x: self.x.quantize(v.x),
            y: self.y.quantize(v.y),
            z: self.z.quantize(v.z),
        }
    }

    #[must_use]
    pub fn dequantize_vec3(&self, q: QuantizedVec3) -> Vec3 {
        Vec3::new(
            self.x.dequantize(q.x),
            self.y.dequantize(q.y),
            self.z.dequantize(q.z),
        )
    }

    pub fn write_vec3(&self, v: Vec3, writer: &mut BitWriter) -> CodecResult<()> {
        self.x.write(v.x, writer)?;
        self.y.write(v.y, writer)?;
        self.z.write(v.z, writer)
    }

    pub fn read_vec3(&self, reader: &mut BitReader<'_>) -> CodecResult<Vec3> {
        let x = self.x.read(reader)?;
        let y = self.y.read(reader)?;
        let z = self.z.read(reader)?;
        Ok(Vec3::new(x, y, z))
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        let range = BoundedRange {
            min: -DEFAULT_EXTENT,
            max: DEFAULT_EXTENT,
            precision: DEFAULT_PRECISION,
            steps: 200,
            bits: 8,
        };
        Self::uniform(range)
    }
}
