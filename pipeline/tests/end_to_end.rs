//! A server and two clients replicating positions over the loopback transport,
//! each with its own pipeline threads.

use std::thread;
use std::time::{Duration, Instant};

use codec::Vec3;
use pipeline::{
    ClientLogic, EventHandler, HostConfig, LoopbackNetwork, NetworkSystem, PipelineConfig, Role,
    ServerLogic,
};
use wire::{Channel, EntityMessage, Limits, PeerId};

const TIMEOUT: Duration = Duration::from_secs(10);
const ADDRESS: &str = "127.0.0.1:9900";

struct Node<H> {
    system: NetworkSystem,
    logic: H,
}

impl<H: EventHandler> Node<H> {
    fn start(network: &LoopbackNetwork, role: Role, host: &HostConfig, logic: H) -> Self {
        let mut system = NetworkSystem::new(PipelineConfig::for_testing()).unwrap();
        system.start(role, network.factory()).unwrap();
        system.start_host(host).unwrap();
        Self { system, logic }
    }

    fn poll(&mut self) {
        self.system.poll_events(&mut self.logic);
    }
}

struct World {
    network: LoopbackNetwork,
    server: Node<ServerLogic>,
    clients: Vec<Node<ClientLogic>>,
}

impl World {
    fn new() -> Self {
        let network = LoopbackNetwork::new();
        let server = Node::start(
            &network,
            Role::Server,
            &HostConfig::default(),
            ServerLogic::default(),
        );
        let mut world = Self {
            network,
            server,
            clients: Vec::new(),
        };
        world.settle("server to listen", |w| w.network.is_listening(ADDRESS));
        world
    }

    fn connect_client(&mut self) -> usize {
        let client = Node::start(
            &self.network,
            Role::Client,
            &HostConfig::client("127.0.0.1", 9900),
            ClientLogic::default(),
        );
        self.clients.push(client);
        let index = self.clients.len() - 1;
        self.settle("client to learn its id", |w| w.clients[index].logic.local_id().is_some());
        index
    }

    fn client(&self, index: usize) -> &ClientLogic {
        &self.clients[index].logic
    }

    fn id(&self, index: usize) -> PeerId {
        self.client(index).local_id().unwrap()
    }

    fn poll(&mut self) {
        self.server.poll();
        for client in &mut self.clients {
            client.poll();
        }
    }

    fn settle(&mut self, what: &str, done: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            self.poll();
            if done(self) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Keeps polling for a while so that anything in flight is delivered.
    fn drain_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.poll();
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn control_messages(client: &ClientLogic) -> Vec<EntityMessage> {
    client
        .journal()
        .filter(|(channel, _)| *channel == Channel::CONTROL)
        .map(|(_, message)| *message)
        .collect()
}

fn position_updates(client: &ClientLogic) -> usize {
    client
        .journal()
        .filter(|(_, message)| matches!(message, EntityMessage::PositionUpdate { .. }))
        .count()
}

#[test]
fn two_clients_replicate_through_server() {
    let mut world = World::new();

    // Peer A: registered, acknowledged, nothing to backfill.
    let a = world.connect_client();
    let a_id = world.id(a);
    world.settle("server to register A", |w| w.server.logic.directory().len() == 1);
    assert!(world.server.logic.directory().contains(a_id));
    assert_eq!(control_messages(world.client(a)).len(), 1);

    // Peer B: backfilled with A, and A hears about B on the state channel.
    let b = world.connect_client();
    let b_id = world.id(b);
    world.settle("B to see A and A to see B", |w| {
        w.server.logic.directory().len() == 2
            && w.client(b).remotes().contains(a_id)
            && w.client(a).remotes().contains(b_id)
    });
    let b_control = control_messages(world.client(b));
    assert_eq!(b_control.len(), 2);
    assert!(matches!(b_control[1], EntityMessage::Spawn { id, .. } if id == a_id));
    assert!(world
        .client(a)
        .journal()
        .any(|(channel, m)| *channel == Channel::STATE
            && matches!(m, EntityMessage::Spawn { id, .. } if *id == b_id)));

    // A moves; the server stores it and only B hears about it.
    {
        let node = &mut world.clients[a];
        let outbox = node.system.outbox().unwrap();
        assert!(node
            .logic
            .send_position(Vec3::new(1.0, 0.0, 0.0), 90.0, &outbox)
            .unwrap());
    }
    world.settle("B to see A move", |w| {
        w.client(b)
            .remotes()
            .get(a_id)
            .is_some_and(|e| (e.position().x - 1.0).abs() <= 0.05 && e.heading() == 90.0)
    });
    let stored = world.server.logic.directory().get(a_id).unwrap();
    assert!((stored.position().x - 1.0).abs() <= 0.05);
    assert_eq!(stored.heading(), 90.0);
    world.drain_for(Duration::from_millis(30));
    assert_eq!(position_updates(world.client(a)), 0);
    assert_eq!(position_updates(world.client(b)), 1);

    // A leaves; B remains, so B is told to destroy A.
    world.clients[a].system.shutdown().unwrap();
    world.settle("server to drop A and B to destroy it", |w| {
        w.server.logic.directory().len() == 1 && !w.client(b).remotes().contains(a_id)
    });
    assert!(world.server.logic.directory().contains(b_id));
    assert!(world
        .client(b)
        .journal()
        .any(|(_, m)| *m == EntityMessage::Destroy { id: a_id }));

    // Two acks, one backfill, one spawn broadcast, one forward, one destroy.
    world.settle("server stats to catch up", |w| w.server.system.stats().packets_sent >= 6);
    let stats = world.server.system.stats();
    assert!(stats.live);
    assert!(stats.packets_received >= 1);
    assert_eq!(stats.peer_count, 1);
}

#[test]
fn forged_header_is_dropped_by_server() {
    let mut world = World::new();
    let a = world.connect_client();
    let b = world.connect_client();
    let a_id = world.id(a);
    let b_id = world.id(b);
    world.settle("both clients registered", |w| w.server.logic.directory().len() == 2);

    // A claims to be B.
    let forged = EntityMessage::PositionUpdate {
        id: b_id,
        position: Vec3::new(4.0, 0.0, 0.0),
        heading: 0.0,
    }
    .to_packet(&codec::WorldBounds::default(), &Limits::default())
    .unwrap();
    {
        let node = &world.clients[a];
        let outbox = node.system.outbox().unwrap();
        outbox.send(PeerId::new(0), Channel::STATE, forged).unwrap();
    }
    world.settle("server to flag the violation", |w| {
        w.server.logic.protocol_violations() == 1
    });
    world.drain_for(Duration::from_millis(30));

    assert_eq!(world.server.logic.directory().get(b_id).unwrap().position(), Vec3::ZERO);
    assert_eq!(world.server.logic.directory().get(a_id).unwrap().position(), Vec3::ZERO);
    assert_eq!(position_updates(world.client(b)), 0);
    assert_eq!(world.server.logic.directory().len(), 2);
}

#[test]
fn server_shutdown_disconnects_clients() {
    let mut world = World::new();
    let a = world.connect_client();
    world.server.system.shutdown().unwrap();
    assert!(!world.network.is_listening(ADDRESS));
    world.settle("client to notice", |w| !w.client(a).is_connected());
    assert_eq!(world.client(a).local_id(), None);
}
