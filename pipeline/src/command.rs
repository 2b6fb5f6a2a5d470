//! Outbound actions executed by the transport stage.

use std::time::Duration;

use wire::{Channel, Packet, PeerId};

use crate::config::HostConfig;

/// What the transport stage should do with a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    #[default]
    StartHost,
    StopHost,
    Send,
    BroadcastAll,
    BroadcastOthers,
}

/// One outbound action. Commands are pooled; fields not used by a kind keep
/// their reset values.
#[derive(Debug, Default)]
pub struct Command {
    pub kind: CommandKind,
    pub host: String,
    pub port: u16,
    pub peer_limit: usize,
    pub channel_count: usize,
    pub poll_interval: Duration,
    pub target: Option<PeerId>,
    pub source: Option<PeerId>,
    pub channel: Channel,
    pub packet: Option<Packet>,
}

impl Command {
    /// Clears every field. Releases the packet if one is still attached.
    pub fn reset(&mut self) {
        self.kind = CommandKind::default();
        self.host.clear();
        self.port = 0;
        self.peer_limit = 0;
        self.channel_count = 0;
        self.poll_interval = Duration::ZERO;
        self.target = None;
        self.source = None;
        self.channel = Channel::default();
        self.packet = None;
    }

    pub(crate) fn set_start_host(&mut self, config: &HostConfig) {
        self.kind = CommandKind::StartHost;
        self.host.clear();
        self.host.push_str(&config.host);
        self.port = config.port;
        self.peer_limit = config.peer_limit;
        self.channel_count = config.channel_count;
        self.poll_interval = config.poll_interval();
    }

    pub(crate) fn set_stop_host(&mut self) {
        self.kind = CommandKind::StopHost;
    }

    pub(crate) fn set_send(&mut self, target: PeerId, channel: Channel, packet: Packet) {
        self.kind = CommandKind::Send;
        self.target = Some(target);
        self.channel = channel;
        self.packet = Some(packet);
    }

    pub(crate) fn set_broadcast_all(&mut self, channel: Channel, packet: Packet) {
        self.kind = CommandKind::BroadcastAll;
        self.channel = channel;
        self.packet = Some(packet);
    }

    pub(crate) fn set_broadcast_others(&mut self, source: PeerId, channel: Channel, packet: Packet) {
        self.kind = CommandKind::BroadcastOthers;
        self.source = Some(source);
        self.channel = channel;
        self.packet = Some(packet);
    }

    /// `host:port` of a `StartHost` command.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hands the packet off, leaving `None` behind.
    pub fn take_packet(&mut self) -> Option<Packet> {
        self.packet.take()
    }
}
