//! Delta-replication codec for tether.
//!
//! This crate decides *what* goes on the wire for replicated state:
//!
//! - [`SynchronizedVariable`] - one typed value with a dirty flag and a slot
//!   in the entity dirty mask.
//! - [`pack_dirty`] / [`unpack_dirty`] - entity deltas carrying only the
//!   fields that changed.
//! - [`BoundedRange`] / [`WorldBounds`] - lossy, bounded-error quantization of
//!   continuous values.
//!
//! # Design Principles
//!
//! - **Change is explicit** - `set` returns whether anything changed; nothing
//!   is fired from inside a setter.
//! - **Bounded loss** - quantized values decode within one precision unit.
//! - **No transport knowledge** - this crate writes bits, it never sends them.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//! use codec::{pack_dirty, unpack_dirty, SyncFloat, SyncInt};
//!
//! let mut hp = SyncInt::with_slot(0, 100).unwrap();
//! let speed = SyncFloat::with_slot(1, 1.5).unwrap();
//! assert!(hp.set(75));
//!
//! let mut writer = BitWriter::new();
//! pack_dirty(&[&hp, &speed], &mut writer).unwrap();
//! let bytes = writer.finish();
//!
//! let mut remote_hp = SyncInt::with_slot(0, 100).unwrap();
//! let mut remote_speed = SyncFloat::with_slot(1, 1.5).unwrap();
//! unpack_dirty(&mut [&mut remote_hp, &mut remote_speed], &mut BitReader::new(&bytes)).unwrap();
//! assert_eq!(*remote_hp.value(), 75);
//! ```

mod error;
mod mask;
mod quantize;
mod types;
mod variable;

pub use error::{CodecError, CodecResult};
pub use mask::{dirty_mask, pack_dirty, reset_all, unpack_dirty, DirtyMask, MAX_SLOTS};
pub use quantize::{
    required_bits, BoundedRange, QuantizedVec3, RangeSpec, WorldBounds, DEFAULT_EXTENT,
    DEFAULT_PRECISION,
};
pub use types::Vec3;
pub use variable::{
    AsciiCodec, FloatCodec, IntCodec, StringCodec, SyncAscii, SyncFloat, SyncInt, SyncString,
    SyncUInt, SyncVar, SynchronizedVariable, UIntCodec, VarCodec,
};
