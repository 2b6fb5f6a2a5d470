//! Transport counters and their publication to the presentation thread.

use std::fmt;
use std::sync::PoisonError;

use crossbeam::sync::ShardedLock;
use serde::Serialize;

/// Connection state of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    Connecting,
    Connected,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStats {
    pub id: u32,
    pub state: PeerState,
    pub round_trip_ms: u32,
    pub packets_lost: u64,
}

/// Snapshot of a host's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub live: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub peer_count: usize,
    pub peers: Vec<PeerStats>,
}

impl fmt::Display for HostStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\tSent", format_byte_count(self.bytes_sent))?;
        writeln!(f, "{}\tReceived", format_byte_count(self.bytes_received))?;
        writeln!(f)?;
        writeln!(f, "{}\tPackets Sent", self.packets_sent)?;
        writeln!(f, "{}\tPackets Received", self.packets_received)?;
        writeln!(f)?;
        // A client host has exactly one peer worth describing: its server.
        match self.peers.as_slice() {
            [peer] if self.peer_count <= 1 => {
                writeln!(f, "{}\tPackets Lost", peer.packets_lost)?;
                writeln!(f, "{}\tRTT", peer.round_trip_ms)?;
                writeln!(f, "{}\tState", peer.state)
            }
            _ => writeln!(f, "{}\tPeer Count", self.peer_count),
        }
    }
}

/// Renders a byte counter as bytes, kb or mb.
#[must_use]
pub fn format_byte_count(bytes: u64) -> String {
    if bytes > 1_000_000 {
        format!("{} mb", bytes as f64 / 1e6)
    } else if bytes > 1000 {
        format!("{} kb", bytes as f64 / 1e3)
    } else {
        format!("{bytes} bytes")
    }
}

/// Latest [`HostStats`] published by the transport thread.
#[derive(Debug, Default)]
pub struct StatsCell {
    inner: ShardedLock<HostStats>,
}

impl StatsCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, stats: HostStats) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = stats;
    }

    #[must_use]
    pub fn snapshot(&self) -> HostStats {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
