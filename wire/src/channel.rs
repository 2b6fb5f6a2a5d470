//! Channels, delivery classes and owned packets.

use std::fmt;

use bytes::Bytes;

/// Transport channel a packet travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Channel(u8);

impl Channel {
    /// Reliable, individually targeted control traffic: spawn acks, backfill.
    pub const CONTROL: Self = Self(0);

    /// High-frequency broadcast state: position updates, spawn/destroy notices.
    pub const STATE: Self = Self(1);

    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery guarantee requested for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delivery {
    #[default]
    Reliable,
    Unreliable,
}

/// An owned packet buffer.
///
/// Dropping the packet releases its buffer. Stages hand packets off by move,
/// so each buffer is released exactly once by whichever stage consumes it.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
    delivery: Delivery,
}

impl Packet {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, delivery: Delivery) -> Self {
        Self {
            data: data.into(),
            delivery,
        }
    }

    #[must_use]
    pub fn reliable(data: impl Into<Bytes>) -> Self {
        Self::new(data, Delivery::Reliable)
    }

    #[must_use]
    pub fn unreliable(data: impl Into<Bytes>) -> Self {
        Self::new(data, Delivery::Unreliable)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload, for fan-out without copying.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    #[must_use]
    pub const fn delivery(&self) -> Delivery {
        self.delivery
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.data.len())
            .field("delivery", &self.delivery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_constants() {
        assert_eq!(Channel::CONTROL.id(), 0);
        assert_eq!(Channel::STATE.id(), 1);
        assert_eq!(Channel::new(1), Channel::STATE);
    }

    #[test]
    fn packet_accessors() {
        let packet = Packet::unreliable(vec![1, 2, 3]);
        assert_eq!(packet.data(), &[1, 2, 3]);
        assert_eq!(packet.len(), 3);
        assert!(!packet.is_empty());
        assert_eq!(packet.delivery(), Delivery::Unreliable);
        assert_eq!(Packet::reliable(Vec::new()).delivery(), Delivery::Reliable);
    }

    #[test]
    fn clone_shares_payload() {
        let packet = Packet::reliable(vec![9; 16]);
        let copy = packet.clone();
        assert_eq!(packet.bytes().as_ptr(), copy.bytes().as_ptr());
    }

    #[test]
    fn debug_hides_payload() {
        let packet = Packet::reliable(vec![0xAA; 4]);
        let text = format!("{packet:?}");
        assert!(text.contains("len: 4"));
        assert!(!text.contains("170"));
    }
}
