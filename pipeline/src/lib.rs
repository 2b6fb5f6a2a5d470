//! Three-stage networking pipeline.
//!
//! ```text
//!  presentation thread          coordination thread          transport thread
//! ┌───────────────────┐  command  ┌──────────────┐  function  ┌──────────────────┐
//! │ NetworkSystem     │ ────────▶ │              │ ─────────▶ │ CommandHandler   │
//! │  submit / Outbox  │           │ relay, never │            │ Transport        │
//! │  poll_events      │ ◀──────── │ blocks       │ ◀───────── │  service(poll)   │
//! └───────────────────┘   logic   └──────────────┘  transport └──────────────────┘
//!                         event                      event
//! ```
//!
//! Each arrow is a bounded single-producer/single-consumer queue. The
//! presentation thread owns the [`NetworkSystem`] and the
//! [`EntityDirectory`]; the transport thread owns the [`Transport`] from
//! thread start to thread exit. Commands come from a shared [`CommandPool`]
//! and go back to it when the transport thread is done with them.
//!
//! [`ServerLogic`] and [`ClientLogic`] are ready-made [`EventHandler`]s that
//! replicate entity positions using the `wire` protocol.

mod client;
mod command;
mod config;
mod directory;
mod entity;
mod error;
mod events;
mod handler;
mod pool;
mod server;
pub mod spsc;
mod system;
pub mod transport;
mod worker;

pub use client::{ClientLogic, DEFAULT_JOURNAL_LIMIT};
pub use command::{Command, CommandKind};
pub use config::{Backpressure, HostConfig, PipelineConfig};
pub use directory::EntityDirectory;
pub use entity::NetworkedEntity;
pub use error::{PipelineError, PipelineResult};
pub use events::{EventHandler, Outbox};
pub use handler::{ClientCommands, CommandHandler, Role, ServerCommands};
pub use pool::{CommandPool, PooledCommand};
pub use server::ServerLogic;
pub use system::{Lifecycle, NetworkSystem};
pub use transport::{
    HostStats, LoopbackNetwork, StatsCell, Transport, TransportError, TransportEvent, TransportFactory,
    TransportResult,
};
