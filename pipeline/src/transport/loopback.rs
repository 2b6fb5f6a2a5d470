//! Loopback transport for in-process hosts.
//!
//! A [`LoopbackNetwork`] is a shared hub where server hosts bind addresses.
//! Every [`LoopbackTransport`] owns an inbox; frames travel between inboxes
//! over unbounded channels, so delivery is lossless and ordered per sender.
//! Used by the tests and the demo in place of a UDP library.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace};
use wire::{Channel, Packet, PeerId};

use super::stats::{HostStats, PeerState, PeerStats};
use super::{
    HostSpec, Transport, TransportError, TransportEvent, TransportFactory, TransportResult,
    DISCONNECT_NORMAL, DISCONNECT_REFUSED,
};

struct Envelope {
    from: u64,
    frame: Frame,
}

enum Frame {
    Hello { reply: Sender<Envelope>, token: u32 },
    Welcome { token: u32 },
    Refused { token: u32 },
    Data { channel: Channel, packet: Packet },
    Bye { reason: u32 },
}

#[derive(Default)]
struct Hub {
    listeners: Mutex<HashMap<String, Sender<Envelope>>>,
    next_endpoint: AtomicU64,
}

/// Shared in-memory network. Clones refer to the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Hub>,
}

impl LoopbackNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unbound transport attached to this network.
    #[must_use]
    pub fn transport(&self) -> LoopbackTransport {
        let (inbox_tx, inbox) = unbounded();
        LoopbackTransport {
            hub: Arc::clone(&self.hub),
            endpoint: self.hub.next_endpoint.fetch_add(1, Ordering::Relaxed),
            inbox_tx,
            inbox,
            bound: None,
            live: false,
            peer_limit: 0,
            channel_count: 0,
            links: BTreeMap::new(),
            by_endpoint: HashMap::new(),
            next_peer: 1,
            local_events: VecDeque::new(),
            counters: Counters::default(),
        }
    }

    /// Factory that builds a transport for this network on the calling thread.
    #[must_use]
    pub fn factory(&self) -> TransportFactory {
        let network = self.clone();
        Box::new(move || Box::new(network.transport()))
    }

    /// Whether a host is currently bound to `address`.
    #[must_use]
    pub fn is_listening(&self, address: &str) -> bool {
        self.hub
            .listeners
            .lock()
            .map(|listeners| listeners.contains_key(address))
            .unwrap_or(false)
    }
}

impl fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.hub.next_endpoint.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct Link {
    endpoint: Option<u64>,
    tx: Sender<Envelope>,
    state: PeerState,
}

#[derive(Default)]
struct Counters {
    bytes_sent: u64,
    bytes_received: u64,
    packets_sent: u64,
    packets_received: u64,
}

/// One host on a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    hub: Arc<Hub>,
    endpoint: u64,
    inbox_tx: Sender<Envelope>,
    inbox: Receiver<Envelope>,
    bound: Option<String>,
    live: bool,
    peer_limit: usize,
    channel_count: usize,
    links: BTreeMap<PeerId, Link>,
    by_endpoint: HashMap<u64, PeerId>,
    next_peer: u32,
    local_events: VecDeque<TransportEvent>,
    counters: Counters,
}

impl LoopbackTransport {
    fn ensure_live(&self) -> TransportResult<()> {
        if self.live {
            Ok(())
        } else {
            Err(TransportError::NotLive)
        }
    }

    fn allocate_peer(&mut self) -> PeerId {
        let peer = PeerId::new(self.next_peer);
        self.next_peer = self.next_peer.wrapping_add(1).max(1);
        peer
    }

    fn envelope(&self, frame: Frame) -> Envelope {
        Envelope {
            from: self.endpoint,
            frame,
        }
    }

    fn connected_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.links
            .iter()
            .filter(|(_, link)| link.state == PeerState::Connected)
            .map(|(peer, _)| *peer)
    }

    fn drop_link(&mut self, peer: PeerId) -> Option<Link> {
        let link = self.links.remove(&peer)?;
        if let Some(endpoint) = link.endpoint {
            self.by_endpoint.remove(&endpoint);
        }
        Some(link)
    }

    fn handle(&mut self, envelope: Envelope) -> Option<TransportEvent> {
        let from = envelope.from;
        match envelope.frame {
            Frame::Hello { reply, token } => {
                if self.bound.is_none() || self.links.len() >= self.peer_limit {
                    debug!(endpoint = from, "refusing loopback connection");
                    let _ = reply.send(self.envelope(Frame::Refused { token }));
                    return None;
                }
                let peer = self.allocate_peer();
                if reply.send(self.envelope(Frame::Welcome { token })).is_err() {
                    return None;
                }
                self.links.insert(
                    peer,
                    Link {
                        endpoint: Some(from),
                        tx: reply,
                        state: PeerState::Connected,
                    },
                );
                self.by_endpoint.insert(from, peer);
                Some(TransportEvent::Connect { peer })
            }
            Frame::Welcome { token } => {
                let peer = PeerId::new(token);
                let link = self.links.get_mut(&peer)?;
                if link.state != PeerState::Connecting {
                    return None;
                }
                link.state = PeerState::Connected;
                link.endpoint = Some(from);
                self.by_endpoint.insert(from, peer);
                Some(TransportEvent::Connect { peer })
            }
            Frame::Refused { token } => {
                let peer = PeerId::new(token);
                self.drop_link(peer)?;
                Some(TransportEvent::Disconnect {
                    peer,
                    reason: DISCONNECT_REFUSED,
                })
            }
            Frame::Data { channel, packet } => {
                let peer = *self.by_endpoint.get(&from)?;
                self.counters.bytes_received += packet.len() as u64;
                self.counters.packets_received += 1;
                Some(TransportEvent::Receive {
                    peer,
                    channel,
                    packet,
                })
            }
            Frame::Bye { reason } => {
                let peer = *self.by_endpoint.get(&from)?;
                self.drop_link(peer);
                Some(TransportEvent::Disconnect { peer, reason })
            }
        }
    }

    fn deliver(&mut self, peer: PeerId, frame: Frame) -> TransportResult<()> {
        let link = self
            .links
            .get(&peer)
            .filter(|link| link.state == PeerState::Connected)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let envelope = self.envelope(frame);
        if link.tx.send(envelope).is_err() {
            // The remote host vanished without saying goodbye.
            self.drop_link(peer);
            self.local_events.push_back(TransportEvent::Timeout { peer });
        }
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn create_host(&mut self, spec: &HostSpec) -> TransportResult<()> {
        if self.live {
            return Err(TransportError::AlreadyLive);
        }
        if let Some(address) = &spec.bind {
            let mut listeners = self
                .hub
                .listeners
                .lock()
                .map_err(|_| TransportError::Unavailable("listener table poisoned"))?;
            if listeners.contains_key(address) {
                return Err(TransportError::AddressInUse(address.clone()));
            }
            listeners.insert(address.clone(), self.inbox_tx.clone());
        }
        // Frames addressed to a previous incarnation of this host.
        while self.inbox.try_recv().is_ok() {}
        self.bound.clone_from(&spec.bind);
        self.peer_limit = spec.peer_limit;
        self.channel_count = spec.channel_count;
        self.live = true;
        Ok(())
    }

    fn connect(&mut self, address: &str) -> TransportResult<PeerId> {
        self.ensure_live()?;
        let server = self
            .hub
            .listeners
            .lock()
            .map_err(|_| TransportError::Unavailable("listener table poisoned"))?
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(address.to_owned()))?;

        let peer = self.allocate_peer();
        let hello = self.envelope(Frame::Hello {
            reply: self.inbox_tx.clone(),
            token: peer.raw(),
        });
        server
            .send(hello)
            .map_err(|_| TransportError::Unreachable(address.to_owned()))?;
        self.links.insert(
            peer,
            Link {
                endpoint: None,
                tx: server,
                state: PeerState::Connecting,
            },
        );
        Ok(peer)
    }

    fn destroy_host(&mut self) {
        if !self.live {
            return;
        }
        for link in std::mem::take(&mut self.links).into_values() {
            let _ = link.tx.send(self.envelope(Frame::Bye {
                reason: DISCONNECT_NORMAL,
            }));
        }
        self.by_endpoint.clear();
        self.local_events.clear();
        if let Some(address) = self.bound.take() {
            if let Ok(mut listeners) = self.hub.listeners.lock() {
                listeners.remove(&address);
            }
        }
        self.live = false;
        trace!(endpoint = self.endpoint, "loopback host destroyed");
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn service(&mut self, timeout: Duration) -> TransportResult<Option<TransportEvent>> {
        self.ensure_live()?;
        if let Some(event) = self.local_events.pop_front() {
            return Ok(Some(event));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let envelope = if timeout.is_zero() {
                self.inbox.try_recv().ok()
            } else {
                self.inbox.recv_deadline(deadline).ok()
            };
            let Some(envelope) = envelope else {
                return Ok(None);
            };
            if let Some(event) = self.handle(envelope) {
                return Ok(Some(event));
            }
        }
    }

    fn send(&mut self, peer: PeerId, channel: Channel, packet: Packet) -> TransportResult<()> {
        self.ensure_live()?;
        if usize::from(channel.id()) >= self.channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                count: self.channel_count,
            });
        }
        let len = packet.len() as u64;
        self.deliver(peer, Frame::Data { channel, packet })?;
        self.counters.bytes_sent += len;
        self.counters.packets_sent += 1;
        Ok(())
    }

    fn broadcast(&mut self, channel: Channel, packet: Packet) -> TransportResult<()> {
        self.ensure_live()?;
        let peers: Vec<_> = self.connected_peers().collect();
        for peer in peers {
            self.send(peer, channel, packet.clone())?;
        }
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId, reason: u32) -> TransportResult<()> {
        self.ensure_live()?;
        let link = self.drop_link(peer).ok_or(TransportError::UnknownPeer(peer))?;
        // The remote may not have answered yet; it still knows us by endpoint.
        let _ = link.tx.send(self.envelope(Frame::Bye { reason }));
        self.local_events
            .push_back(TransportEvent::Disconnect { peer, reason });
        Ok(())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.connected_peers().collect()
    }

    fn flush(&mut self) {}

    fn stats(&self) -> HostStats {
        let peers: Vec<_> = self
            .links
            .iter()
            .map(|(peer, link)| PeerStats {
                id: peer.raw(),
                state: link.state,
                round_trip_ms: 0,
                packets_lost: 0,
            })
            .collect();
        HostStats {
            live: self.live,
            bytes_sent: self.counters.bytes_sent,
            bytes_received: self.counters.bytes_received,
            packets_sent: self.counters.packets_sent,
            packets_received: self.counters.packets_received,
            peer_count: self.connected_peers().count(),
            peers,
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.destroy_host();
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("endpoint", &self.endpoint)
            .field("bound", &self.bound)
            .field("live", &self.live)
            .field("peers", &self.links.len())
            .finish_non_exhaustive()
    }
}
