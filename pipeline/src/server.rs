//! Authoritative server behaviour.
//!
//! On connect the new peer gets its own spawn and one spawn per existing
//! entity on [`Channel::CONTROL`], and everybody else learns about it on
//! [`Channel::STATE`]. Position updates are forwarded unchanged to every
//! other peer after the sender's header id has been checked.

use codec::WorldBounds;
use tracing::{debug, error, info, trace, warn};
use wire::{decode_header, validate_sender, Channel, EntityMessage, Limits, OpCode, Packet, PeerId, WireError};

use crate::directory::EntityDirectory;
use crate::entity::NetworkedEntity;
use crate::error::PipelineResult;
use crate::events::{EventHandler, Outbox};

#[derive(Debug, Clone, Default)]
pub struct ServerLogic {
    directory: EntityDirectory,
    bounds: WorldBounds,
    limits: Limits,
    protocol_violations: u64,
}

impl ServerLogic {
    #[must_use]
    pub fn new(bounds: WorldBounds, limits: Limits) -> Self {
        Self {
            directory: EntityDirectory::new(),
            bounds,
            limits,
            protocol_violations: 0,
        }
    }

    #[must_use]
    pub const fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// Packets dropped because their header named another peer.
    #[must_use]
    pub const fn protocol_violations(&self) -> u64 {
        self.protocol_violations
    }

    fn packet(&self, message: &EntityMessage) -> PipelineResult<Packet> {
        Ok(message.to_packet(&self.bounds, &self.limits)?)
    }
}

impl EventHandler for ServerLogic {
    fn on_connect(&mut self, peer: PeerId, outbox: &Outbox<'_>) -> PipelineResult<()> {
        let entity = NetworkedEntity::new(peer)?;
        let spawn = self.packet(&entity.spawn_message())?;
        let backfill = self
            .directory
            .iter()
            .map(|existing| self.packet(&existing.spawn_message()))
            .collect::<PipelineResult<Vec<_>>>()?;

        // The peer stays registered even if every send below is refused.
        info!(%peer, backfill = backfill.len(), "peer connected");
        self.directory.insert(entity);

        if let Err(err) = outbox.send(peer, Channel::CONTROL, spawn.clone()) {
            warn!(%peer, %err, "failed to acknowledge spawn");
        }
        for packet in backfill {
            if let Err(err) = outbox.send(peer, Channel::CONTROL, packet) {
                warn!(%peer, %err, "failed to send backfill");
            }
        }
        if let Err(err) = outbox.broadcast_others(peer, Channel::STATE, spawn) {
            warn!(%peer, %err, "failed to broadcast spawn");
        }
        Ok(())
    }

    fn on_disconnect(&mut self, peer: PeerId, outbox: &Outbox<'_>) -> PipelineResult<()> {
        let Some(entity) = self.directory.remove(peer) else {
            debug!(%peer, "disconnect for unknown peer");
            return Ok(());
        };
        info!(%peer, remaining = self.directory.len(), "peer disconnected");
        if !self.directory.is_empty() {
            let destroy = self.packet(&entity.destroy_message())?;
            if let Err(err) = outbox.broadcast_all(Channel::STATE, destroy) {
                warn!(%peer, %err, "failed to broadcast destroy");
            }
        }
        Ok(())
    }

    fn on_receive(
        &mut self,
        peer: PeerId,
        channel: Channel,
        packet: Packet,
        outbox: &Outbox<'_>,
    ) -> PipelineResult<()> {
        let header = match decode_header(packet.data()) {
            Ok(header) => header,
            Err(WireError::UnknownOpCode { opcode }) => {
                trace!(%peer, opcode, "unknown opcode");
                return Ok(());
            }
            Err(err) => {
                warn!(%peer, %err, "malformed packet");
                return Ok(());
            }
        };
        if let Err(err) = validate_sender(&header, peer) {
            self.protocol_violations += 1;
            error!(%peer, %err, "protocol violation, dropping packet");
            return Ok(());
        }

        match header.opcode {
            OpCode::PositionUpdate => {
                let message = match EntityMessage::decode(packet.data(), &self.bounds, &self.limits) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%peer, %err, "malformed position update");
                        return Ok(());
                    }
                };
                if let Some(entity) = self.directory.get_mut(peer) {
                    entity.apply(&message);
                    entity.reset_dirty();
                }
                outbox.broadcast_others(peer, Channel::STATE, packet)
            }
            OpCode::Spawn | OpCode::Destroy => {
                trace!(%peer, %channel, opcode = ?header.opcode, "ignoring client lifecycle message");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandKind};
    use crate::config::Backpressure;
    use crate::pool::{CommandPool, PooledCommand};
    use crate::spsc::{channel, Consumer, Producer};
    use codec::Vec3;

    struct Harness {
        pool: CommandPool,
        tx: Producer<PooledCommand>,
        rx: Consumer<PooledCommand>,
        logic: ServerLogic,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = channel("command", 64).unwrap();
            Self {
                pool: CommandPool::new(64),
                tx,
                rx,
                logic: ServerLogic::default(),
            }
        }

        fn connect(&mut self, peer: u32) {
            let outbox = Outbox::new(&self.pool, &self.tx, Backpressure::Reject);
            self.logic.on_connect(PeerId::new(peer), &outbox).unwrap();
        }

        fn disconnect(&mut self, peer: u32) {
            let outbox = Outbox::new(&self.pool, &self.tx, Backpressure::Reject);
            self.logic.on_disconnect(PeerId::new(peer), &outbox).unwrap();
        }

        fn receive(&mut self, peer: u32, message: &EntityMessage) {
            let packet = message
                .to_packet(&WorldBounds::default(), &Limits::default())
                .unwrap();
            let outbox = Outbox::new(&self.pool, &self.tx, Backpressure::Reject);
            self.logic
                .on_receive(PeerId::new(peer), Channel::STATE, packet, &outbox)
                .unwrap();
        }

        fn commands(&self) -> Vec<PooledCommand> {
            self.rx.drain().collect()
        }
    }

    fn decode(command: &Command) -> EntityMessage {
        let packet = command.packet.as_ref().unwrap();
        EntityMessage::decode(packet.data(), &WorldBounds::default(), &Limits::default()).unwrap()
    }

    fn update(id: u32, x: f32) -> EntityMessage {
        EntityMessage::PositionUpdate {
            id: PeerId::new(id),
            position: Vec3::new(x, 0.0, 0.0),
            heading: 90.0,
        }
    }

    #[test]
    fn first_peer_gets_ack_only() {
        let mut h = Harness::new();
        h.connect(1);
        let commands = h.commands();
        assert_eq!(commands.len(), 2);

        assert_eq!(commands[0].kind, CommandKind::Send);
        assert_eq!(commands[0].target, Some(PeerId::new(1)));
        assert_eq!(commands[0].channel, Channel::CONTROL);
        assert!(matches!(decode(&commands[0]), EntityMessage::Spawn { id, .. } if id == PeerId::new(1)));

        assert_eq!(commands[1].kind, CommandKind::BroadcastOthers);
        assert_eq!(commands[1].source, Some(PeerId::new(1)));
        assert_eq!(commands[1].channel, Channel::STATE);
        assert!(h.logic.directory().contains(PeerId::new(1)));
    }

    #[test]
    fn second_peer_is_backfilled() {
        let mut h = Harness::new();
        h.connect(1);
        h.commands();
        h.connect(2);
        let commands = h.commands();
        assert_eq!(commands.len(), 3);
        let backfill = decode(&commands[1]);
        assert_eq!(commands[1].target, Some(PeerId::new(2)));
        assert_eq!(commands[1].channel, Channel::CONTROL);
        assert!(matches!(backfill, EntityMessage::Spawn { id, .. } if id == PeerId::new(1)));
        assert_eq!(h.logic.directory().len(), 2);
    }

    #[test]
    fn position_update_is_forwarded_to_others() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.commands();

        h.receive(1, &update(1, 1.0));
        let commands = h.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, CommandKind::BroadcastOthers);
        assert_eq!(commands[0].source, Some(PeerId::new(1)));
        let stored = h.logic.directory().get(PeerId::new(1)).unwrap();
        assert!((stored.position().x - 1.0).abs() <= 0.05);
        assert_eq!(stored.heading(), 90.0);
    }

    #[test]
    fn mismatched_header_is_dropped() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.commands();

        h.receive(1, &update(2, 3.0));
        assert!(h.commands().is_empty());
        assert_eq!(h.logic.protocol_violations(), 1);
        assert_eq!(h.logic.directory().get(PeerId::new(2)).unwrap().position(), Vec3::ZERO);
        assert!(h.logic.directory().contains(PeerId::new(1)));
    }

    #[test]
    fn unknown_opcode_is_dropped_silently() {
        let mut h = Harness::new();
        h.connect(1);
        h.commands();
        let outbox = Outbox::new(&h.pool, &h.tx, Backpressure::Reject);
        h.logic
            .on_receive(PeerId::new(1), Channel::STATE, Packet::unreliable(vec![1, 77]), &outbox)
            .unwrap();
        assert!(h.commands().is_empty());
        assert_eq!(h.logic.protocol_violations(), 0);
    }

    #[test]
    fn disconnect_broadcasts_destroy_when_others_remain() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.commands();

        h.disconnect(1);
        let commands = h.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, CommandKind::BroadcastAll);
        assert_eq!(decode(&commands[0]), EntityMessage::Destroy { id: PeerId::new(1) });

        h.disconnect(2);
        assert!(h.commands().is_empty());
        assert!(h.logic.directory().is_empty());
    }

    #[test]
    fn full_queue_still_registers_peer() {
        let (tx, rx) = channel("command", 1).unwrap();
        let pool = CommandPool::new(4);
        let mut logic = ServerLogic::default();
        tx.try_enqueue(pool.stop_host()).unwrap();

        let outbox = Outbox::new(&pool, &tx, Backpressure::Reject);
        logic.on_connect(PeerId::new(1), &outbox).unwrap();
        assert!(logic.directory().contains(PeerId::new(1)));
        assert_eq!(rx.len(), 1);

        let spin = Outbox::new(&pool, &tx, Backpressure::Spin { attempts: 3 });
        logic.on_connect(PeerId::new(2), &spin).unwrap();
        assert_eq!(logic.directory().len(), 2);

        // Its updates pass sender validation once it is registered.
        drop(rx.try_dequeue());
        let packet = update(2, 1.0)
            .to_packet(&WorldBounds::default(), &Limits::default())
            .unwrap();
        logic.on_receive(PeerId::new(2), Channel::STATE, packet, &outbox).unwrap();
        assert_eq!(logic.protocol_violations(), 0);
        assert_eq!(rx.try_dequeue().unwrap().kind, CommandKind::BroadcastOthers);
        assert!((logic.directory().get(PeerId::new(2)).unwrap().position().x - 1.0).abs() <= 0.05);
    }

    #[test]
    fn full_queue_still_removes_peer() {
        let (tx, rx) = channel("command", 1).unwrap();
        let pool = CommandPool::new(4);
        let mut logic = ServerLogic::default();
        let outbox = Outbox::new(&pool, &tx, Backpressure::Reject);
        logic.on_connect(PeerId::new(1), &outbox).unwrap();
        logic.on_connect(PeerId::new(2), &outbox).unwrap();
        assert!(tx.is_full());

        logic.on_disconnect(PeerId::new(1), &outbox).unwrap();
        assert!(!logic.directory().contains(PeerId::new(1)));
        assert_eq!(logic.directory().len(), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn repeated_disconnect_is_noop() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.disconnect(1);
        h.commands();
        h.disconnect(1);
        assert!(h.commands().is_empty());
        assert_eq!(h.logic.directory().len(), 1);
    }
}
