//! Transport actions for each command kind.
//!
//! A server and a client host react differently to the same commands. The
//! difference lives behind [`CommandHandler`]; the transport thread picks one
//! implementation from the [`Role`] it was started with.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use wire::PeerId;

use crate::command::{Command, CommandKind};
use crate::transport::{HostSpec, Transport, TransportError, TransportResult, DISCONNECT_NORMAL};

/// Which side of the connection this pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Server,
    Client,
}

/// Executes commands against a live transport.
///
/// Handlers may take the command's packet; whatever is left is released when
/// the command returns to its pool.
pub trait CommandHandler: Send {
    fn handle_start(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()>;

    fn handle_stop(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()>;

    fn handle_send(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()>;

    fn handle_broadcast_all(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()>;

    fn handle_broadcast_others(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()>;
}

/// Listens on the command's address and fans traffic out to every peer.
#[derive(Debug, Default)]
pub struct ServerCommands;

impl CommandHandler for ServerCommands {
    fn handle_start(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        let address = command.address();
        transport.create_host(&HostSpec {
            bind: Some(address.clone()),
            peer_limit: command.peer_limit,
            channel_count: command.channel_count,
        })?;
        info!(%address, peer_limit = command.peer_limit, "server host started");
        Ok(())
    }

    fn handle_stop(&mut self, transport: &mut dyn Transport, _command: &mut Command) -> TransportResult<()> {
        for peer in transport.peers() {
            if let Err(err) = transport.disconnect(peer, DISCONNECT_NORMAL) {
                warn!(%peer, %err, "failed to disconnect peer");
            }
        }
        transport.flush();
        transport.destroy_host();
        info!("server host stopped");
        Ok(())
    }

    fn handle_send(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        let (Some(target), Some(packet)) = (command.target, command.take_packet()) else {
            return Ok(());
        };
        transport.send(target, command.channel, packet)
    }

    fn handle_broadcast_all(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        match command.take_packet() {
            Some(packet) => transport.broadcast(command.channel, packet),
            None => Ok(()),
        }
    }

    fn handle_broadcast_others(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        let Some(packet) = command.take_packet() else {
            return Ok(());
        };
        for peer in transport.peers() {
            if Some(peer) == command.source {
                continue;
            }
            if let Err(err) = transport.send(peer, command.channel, packet.clone()) {
                warn!(%peer, %err, "broadcast to peer failed");
            }
        }
        Ok(())
    }
}

/// Connects to the command's address and talks only to that server.
#[derive(Debug, Default)]
pub struct ClientCommands {
    server: Option<PeerId>,
}

impl ClientCommands {
    /// Peer id of the server, once a connection was started.
    #[must_use]
    pub const fn server(&self) -> Option<PeerId> {
        self.server
    }
}

impl CommandHandler for ClientCommands {
    fn handle_start(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        transport.create_host(&HostSpec {
            bind: None,
            peer_limit: command.peer_limit,
            channel_count: command.channel_count,
        })?;
        let address = command.address();
        match transport.connect(&address) {
            Ok(peer) => {
                self.server = Some(peer);
                info!(%address, "client connecting");
                Ok(())
            }
            Err(err) => {
                transport.destroy_host();
                Err(err)
            }
        }
    }

    fn handle_stop(&mut self, transport: &mut dyn Transport, _command: &mut Command) -> TransportResult<()> {
        if let Some(server) = self.server.take() {
            // The server may already have gone away.
            if let Err(err) = transport.disconnect(server, DISCONNECT_NORMAL) {
                debug!(%err, "server link already closed");
            }
        }
        transport.flush();
        transport.destroy_host();
        info!("client host stopped");
        Ok(())
    }

    fn handle_send(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        let server = self.server.ok_or(TransportError::NotLive)?;
        match command.take_packet() {
            Some(packet) => transport.send(server, command.channel, packet),
            None => Ok(()),
        }
    }

    fn handle_broadcast_all(&mut self, transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        match command.take_packet() {
            Some(packet) => transport.broadcast(command.channel, packet),
            None => Ok(()),
        }
    }

    fn handle_broadcast_others(&mut self, _transport: &mut dyn Transport, command: &mut Command) -> TransportResult<()> {
        warn!(channel = %command.channel, "client hosts cannot broadcast to other peers; dropping packet");
        command.take_packet();
        Ok(())
    }
}

/// The handler chosen for a role.
#[derive(Debug)]
pub(crate) enum Strategy {
    Server(ServerCommands),
    Client(ClientCommands),
}

impl Strategy {
    pub(crate) fn new(role: Role) -> Self {
        match role {
            Role::Server => Self::Server(ServerCommands),
            Role::Client => Self::Client(ClientCommands::default()),
        }
    }

    fn handler(&mut self) -> &mut dyn CommandHandler {
        match self {
            Self::Server(handler) => handler,
            Self::Client(handler) => handler,
        }
    }

    /// Runs one command. Failures are logged, never propagated: the transport
    /// thread keeps serving whatever else is queued.
    pub(crate) fn execute(&mut self, transport: &mut dyn Transport, command: &mut Command) {
        let kind = command.kind;
        if kind != CommandKind::StartHost && !transport.is_live() {
            debug!(?kind, "host is not live; dropping command");
            return;
        }
        let handler = self.handler();
        let result = match kind {
            CommandKind::StartHost => handler.handle_start(transport, command),
            CommandKind::StopHost => handler.handle_stop(transport, command),
            CommandKind::Send => handler.handle_send(transport, command),
            CommandKind::BroadcastAll => handler.handle_broadcast_all(transport, command),
            CommandKind::BroadcastOthers => handler.handle_broadcast_others(transport, command),
        };
        if let Err(err) = result {
            if kind == CommandKind::StartHost {
                error!(address = %command.address(), %err, "failed to create host");
            } else {
                warn!(?kind, %err, "command failed");
            }
        }
    }
}
