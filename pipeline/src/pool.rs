//! Reuse pool for [`Command`] objects.
//!
//! The free list is a lock-free [`SegQueue`], so any thread may take commands
//! from the pool. A taken command is wrapped in a [`PooledCommand`] guard; when
//! the guard drops, the command's packet is released and the command goes
//! back on the free list. A command therefore returns to the pool exactly
//! once, on every path.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use wire::{Channel, Packet, PeerId};

use crate::command::Command;
use crate::config::HostConfig;

struct PoolInner {
    free: SegQueue<Command>,
    created: AtomicUsize,
    retain: usize,
}

impl PoolInner {
    fn put(&self, mut command: Command) {
        command.reset();
        if self.free.len() < self.retain {
            self.free.push(command);
        }
    }
}

/// Shared handle to a command pool. Cloning shares the same free list.
#[derive(Clone)]
pub struct CommandPool {
    inner: Arc<PoolInner>,
}

impl CommandPool {
    /// Creates an empty pool that keeps at most `retain` idle commands.
    #[must_use]
    pub fn new(retain: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: SegQueue::new(),
                created: AtomicUsize::new(0),
                retain,
            }),
        }
    }

    /// Takes a reset command from the pool, allocating when the pool is empty.
    #[must_use]
    pub fn get(&self) -> PooledCommand {
        let command = self.inner.free.pop().unwrap_or_else(|| {
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            Command::default()
        });
        PooledCommand {
            command,
            pool: Arc::clone(&self.inner),
        }
    }

    #[must_use]
    pub fn start_host(&self, config: &HostConfig) -> PooledCommand {
        let mut command = self.get();
        command.set_start_host(config);
        command
    }

    #[must_use]
    pub fn stop_host(&self) -> PooledCommand {
        let mut command = self.get();
        command.set_stop_host();
        command
    }

    #[must_use]
    pub fn send(&self, target: PeerId, channel: Channel, packet: Packet) -> PooledCommand {
        let mut command = self.get();
        command.set_send(target, channel, packet);
        command
    }

    #[must_use]
    pub fn broadcast_all(&self, channel: Channel, packet: Packet) -> PooledCommand {
        let mut command = self.get();
        command.set_broadcast_all(channel, packet);
        command
    }

    #[must_use]
    pub fn broadcast_others(&self, source: PeerId, channel: Channel, packet: Packet) -> PooledCommand {
        let mut command = self.get();
        command.set_broadcast_others(source, channel, packet);
        command
    }

    /// Number of commands ever allocated by this pool.
    #[must_use]
    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// Number of commands waiting for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.free.len()
    }
}

impl Default for CommandPool {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPool")
            .field("created", &self.created())
            .field("idle", &self.idle())
            .field("retain", &self.inner.retain)
            .finish()
    }
}

/// A command on loan from a [`CommandPool`].
pub struct PooledCommand {
    command: Command,
    pool: Arc<PoolInner>,
}

impl Deref for PooledCommand {
    type Target = Command;

    fn deref(&self) -> &Command {
        &self.command
    }
}

impl DerefMut for PooledCommand {
    fn deref_mut(&mut self) -> &mut Command {
        &mut self.command
    }
}

impl Drop for PooledCommand {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.command));
    }
}

impl fmt::Debug for PooledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.command.fmt(f)
    }
}
