//! Client behaviour: mirror remote entities and publish our own position.

use std::collections::VecDeque;

use codec::{Vec3, WorldBounds};
use tracing::{debug, info, trace, warn};
use wire::{Channel, EntityMessage, Limits, Packet, PeerId, WireError};

use crate::directory::EntityDirectory;
use crate::entity::NetworkedEntity;
use crate::error::PipelineResult;
use crate::events::{EventHandler, Outbox};

/// Default number of received messages kept in the journal.
pub const DEFAULT_JOURNAL_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientLogic {
    server: Option<PeerId>,
    local: Option<NetworkedEntity>,
    remotes: EntityDirectory,
    journal: VecDeque<(Channel, EntityMessage)>,
    journal_limit: usize,
    bounds: WorldBounds,
    limits: Limits,
}

impl Default for ClientLogic {
    fn default() -> Self {
        Self::new(WorldBounds::default(), Limits::default())
    }
}

impl ClientLogic {
    #[must_use]
    pub fn new(bounds: WorldBounds, limits: Limits) -> Self {
        Self {
            server: None,
            local: None,
            remotes: EntityDirectory::new(),
            journal: VecDeque::new(),
            journal_limit: DEFAULT_JOURNAL_LIMIT,
            bounds,
            limits,
        }
    }

    /// Keeps at most `limit` messages in the journal, dropping the oldest.
    #[must_use]
    pub fn with_journal_limit(mut self, limit: usize) -> Self {
        self.journal_limit = limit;
        self
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.server.is_some()
    }

    /// Our id as assigned by the server, known after its first control spawn.
    #[must_use]
    pub fn local_id(&self) -> Option<PeerId> {
        self.local.as_ref().map(NetworkedEntity::id)
    }

    #[must_use]
    pub const fn local(&self) -> Option<&NetworkedEntity> {
        self.local.as_ref()
    }

    #[must_use]
    pub const fn remotes(&self) -> &EntityDirectory {
        &self.remotes
    }

    /// Received messages, oldest first.
    pub fn journal(&self) -> impl Iterator<Item = &(Channel, EntityMessage)> + '_ {
        self.journal.iter()
    }

    pub fn take_journal(&mut self) -> Vec<(Channel, EntityMessage)> {
        self.journal.drain(..).collect()
    }

    /// Moves our entity and sends a position update while it is dirty.
    ///
    /// A change whose send failed stays dirty and goes out on the next call,
    /// even if the transform is the same. Returns `false` without sending
    /// while the server has not yet told us who we are.
    pub fn send_position(&mut self, position: Vec3, heading: f32, outbox: &Outbox<'_>) -> PipelineResult<bool> {
        let (Some(server), Some(local)) = (self.server, self.local.as_mut()) else {
            return Ok(false);
        };
        local.set_transform(position, heading);
        if !local.is_dirty() {
            return Ok(false);
        }
        let packet = local.update_message().to_packet(&self.bounds, &self.limits)?;
        outbox.send(server, Channel::STATE, packet)?;
        local.reset_dirty();
        Ok(true)
    }

    fn record(&mut self, channel: Channel, message: EntityMessage) {
        if self.journal_limit == 0 {
            return;
        }
        if self.journal.len() == self.journal_limit {
            self.journal.pop_front();
        }
        self.journal.push_back((channel, message));
    }

    fn apply(&mut self, channel: Channel, message: &EntityMessage) -> PipelineResult<()> {
        let id = message.id();
        match message {
            EntityMessage::Spawn { .. } if self.local.is_none() && channel == Channel::CONTROL => {
                let mut local = NetworkedEntity::new(id)?;
                local.apply(message);
                local.reset_dirty();
                info!(%id, "assigned local id");
                self.local = Some(local);
            }
            EntityMessage::Spawn { .. } | EntityMessage::PositionUpdate { .. } => {
                if Some(id) == self.local_id() {
                    return Ok(());
                }
                if !self.remotes.contains(id) {
                    self.remotes.insert(NetworkedEntity::new(id)?);
                }
                if let Some(remote) = self.remotes.get_mut(id) {
                    remote.apply(message);
                    remote.reset_dirty();
                }
            }
            EntityMessage::Destroy { .. } => {
                if self.remotes.remove(id).is_none() {
                    debug!(%id, "destroy for unknown entity");
                }
            }
        }
        Ok(())
    }
}

impl EventHandler for ClientLogic {
    fn on_connect(&mut self, peer: PeerId, _outbox: &Outbox<'_>) -> PipelineResult<()> {
        info!(server = %peer, "connected");
        self.server = Some(peer);
        Ok(())
    }

    fn on_disconnect(&mut self, peer: PeerId, _outbox: &Outbox<'_>) -> PipelineResult<()> {
        if self.server != Some(peer) {
            return Ok(());
        }
        info!(server = %peer, "disconnected");
        self.server = None;
        self.local = None;
        self.remotes = EntityDirectory::new();
        Ok(())
    }

    fn on_receive(
        &mut self,
        peer: PeerId,
        channel: Channel,
        packet: Packet,
        _outbox: &Outbox<'_>,
    ) -> PipelineResult<()> {
        let message = match EntityMessage::decode(packet.data(), &self.bounds, &self.limits) {
            Ok(message) => message,
            Err(WireError::UnknownOpCode { opcode }) => {
                trace!(%peer, opcode, "unknown opcode");
                return Ok(());
            }
            Err(err) => {
                warn!(%peer, %err, "malformed packet");
                return Ok(());
            }
        };
        self.apply(channel, &message)?;
        self.record(channel, message);
        Ok(())
    }
}
