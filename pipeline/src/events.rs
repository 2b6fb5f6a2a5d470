//! Presentation-side event handling.

use tracing::warn;
use wire::{Channel, Packet, PeerId};

use crate::config::{Backpressure, HostConfig};
use crate::error::PipelineResult;
use crate::pool::{CommandPool, PooledCommand};
use crate::spsc::Producer;

/// Receives transport events on the presentation thread.
///
/// A `Timeout` is delivered as [`on_disconnect`](Self::on_disconnect). The
/// packet handed to [`on_receive`](Self::on_receive) is released when the
/// handler drops it, whether or not it was processed.
pub trait EventHandler {
    fn on_connect(&mut self, peer: PeerId, outbox: &Outbox<'_>) -> PipelineResult<()>;

    fn on_disconnect(&mut self, peer: PeerId, outbox: &Outbox<'_>) -> PipelineResult<()>;

    fn on_receive(
        &mut self,
        peer: PeerId,
        channel: Channel,
        packet: Packet,
        outbox: &Outbox<'_>,
    ) -> PipelineResult<()>;
}

/// Where event handlers put outbound commands.
///
/// Borrowed from the pipeline for the duration of one poll; handlers never
/// reach the command queue any other way.
#[derive(Debug, Clone, Copy)]
pub struct Outbox<'a> {
    pool: &'a CommandPool,
    commands: &'a Producer<PooledCommand>,
    policy: Backpressure,
}

impl<'a> Outbox<'a> {
    pub(crate) const fn new(
        pool: &'a CommandPool,
        commands: &'a Producer<PooledCommand>,
        policy: Backpressure,
    ) -> Self {
        Self {
            pool,
            commands,
            policy,
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &'a CommandPool {
        self.pool
    }

    /// Enqueues a command under the configured backpressure policy.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueFull`](crate::PipelineError::QueueFull)
    /// or [`PipelineError::Disconnected`](crate::PipelineError::Disconnected);
    /// the rejected command goes back to the pool.
    pub fn submit(&self, command: PooledCommand) -> PipelineResult<()> {
        self.commands.enqueue(command, self.policy).map_err(|err| {
            let err = err.into_pipeline_error(self.commands.name());
            warn!(%err, "dropping command");
            err
        })
    }

    pub fn start_host(&self, config: &HostConfig) -> PipelineResult<()> {
        self.submit(self.pool.start_host(config))
    }

    pub fn stop_host(&self) -> PipelineResult<()> {
        self.submit(self.pool.stop_host())
    }

    pub fn send(&self, target: PeerId, channel: Channel, packet: Packet) -> PipelineResult<()> {
        self.submit(self.pool.send(target, channel, packet))
    }

    pub fn broadcast_all(&self, channel: Channel, packet: Packet) -> PipelineResult<()> {
        self.submit(self.pool.broadcast_all(channel, packet))
    }

    pub fn broadcast_others(&self, source: PeerId, channel: Channel, packet: Packet) -> PipelineResult<()> {
        self.submit(self.pool.broadcast_others(source, channel, packet))
    }
}
