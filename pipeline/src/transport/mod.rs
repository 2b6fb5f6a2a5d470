//! Transport seam.
//!
//! The pipeline never reimplements connection handling, retransmission or
//! congestion control. It drives a [`Transport`] from the transport thread,
//! which owns the session for the thread's whole lifetime.

mod loopback;
mod stats;

use std::time::Duration;

use thiserror::Error;
use wire::{Channel, Packet, PeerId};

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use stats::{format_byte_count, HostStats, PeerState, PeerStats, StatsCell};

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Reason code used for an orderly disconnect.
pub const DISCONNECT_NORMAL: u32 = 0;

/// Reason code reported to a client whose connection was refused.
pub const DISCONNECT_REFUSED: u32 = 1;

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("host is not live")]
    NotLive,

    #[error("host is already live")]
    AlreadyLive,

    #[error("address {0} is already in use")]
    AddressInUse(String),

    #[error("no host listening at {0}")]
    Unreachable(String),

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("channel {channel} is outside the {count} configured channels")]
    InvalidChannel { channel: Channel, count: usize },

    #[error("transport state is unavailable: {0}")]
    Unavailable(&'static str),
}

/// Event produced by polling a transport.
///
/// An empty poll is `Ok(None)` from [`Transport::service`], so no "none"
/// event ever crosses a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect { peer: PeerId },
    Disconnect { peer: PeerId, reason: u32 },
    Timeout { peer: PeerId },
    Receive {
        peer: PeerId,
        channel: Channel,
        packet: Packet,
    },
}

impl TransportEvent {
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        match self {
            Self::Connect { peer }
            | Self::Disconnect { peer, .. }
            | Self::Timeout { peer }
            | Self::Receive { peer, .. } => *peer,
        }
    }
}

/// Parameters for creating a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Address to listen on; `None` for a client host.
    pub bind: Option<String>,
    pub peer_limit: usize,
    pub channel_count: usize,
}

/// A reliable/unreliable datagram session.
///
/// Every method is called from the transport thread only.
pub trait Transport: Send {
    /// Creates the local host.
    fn create_host(&mut self, spec: &HostSpec) -> TransportResult<()>;

    /// Starts connecting to `address`. The [`TransportEvent::Connect`] for
    /// the returned peer arrives through [`service`](Self::service).
    fn connect(&mut self, address: &str) -> TransportResult<PeerId>;

    /// Tears the host down. Safe to call when not live.
    fn destroy_host(&mut self);

    fn is_live(&self) -> bool;

    /// Waits at most `timeout` for the next event. A zero timeout returns
    /// immediately.
    fn service(&mut self, timeout: Duration) -> TransportResult<Option<TransportEvent>>;

    fn send(&mut self, peer: PeerId, channel: Channel, packet: Packet) -> TransportResult<()>;

    fn broadcast(&mut self, channel: Channel, packet: Packet) -> TransportResult<()>;

    fn disconnect(&mut self, peer: PeerId, reason: u32) -> TransportResult<()>;

    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Pushes out anything buffered.
    fn flush(&mut self);

    fn stats(&self) -> HostStats;
}

/// Builds the transport on the transport thread when it starts.
pub type TransportFactory = Box<dyn FnOnce() -> Box<dyn Transport> + Send>;
