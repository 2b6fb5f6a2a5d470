//! Entity message framing for tether.
//!
//! Every message starts with an [`EntityHeader`] (peer id + opcode) followed by
//! an opcode-specific payload. Positions are quantized through
//! [`codec::WorldBounds`]. This crate also fixes the channel convention:
//! [`Channel::CONTROL`] for reliable targeted traffic, [`Channel::STATE`] for
//! broadcast state.
//!
//! # Design Principles
//!
//! - **Bounded decoding** - packet size is checked against [`Limits`] before
//!   any field is read.
//! - **Sender validation** - [`validate_sender`] ties a header to the peer
//!   that delivered it.
//! - **No transport knowledge** - this crate builds and parses buffers only.

mod channel;
mod error;
mod header;
mod limits;
mod message;

pub use channel::{Channel, Delivery, Packet};
pub use error::{WireError, WireResult};
pub use header::{decode_header, validate_sender, EntityHeader, OpCode, PeerId, HEADER_MAX_BITS};
pub use limits::Limits;
pub use message::EntityMessage;
