use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use codec::{Vec3, WorldBounds};
use pipeline::{
    ClientLogic, EventHandler, HostConfig, HostStats, LoopbackNetwork, NetworkSystem,
    PipelineConfig, Role, ServerLogic,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wire::{EntityMessage, Limits, PeerId};

#[derive(Parser)]
#[command(
    name = "tether-demo",
    version,
    about = "Runs a loopback server with several clients and reports what was replicated"
)]
struct Cli {
    /// Number of connected clients.
    #[arg(long, default_value_t = 2)]
    clients: usize,
    /// Number of position updates sent by the first client.
    #[arg(long, default_value_t = 10)]
    moves: u32,
    /// JSON file with `pipeline`, `host` and `world` sections.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Give up when a step takes longer than this.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    pipeline: PipelineConfig,
    host: HostConfig,
    world: WorldBounds,
}

#[derive(Debug, Serialize)]
struct ClientSummary {
    id: u32,
    remotes_seen: usize,
    position_updates: usize,
    messages: usize,
}

#[derive(Debug, Serialize)]
struct Summary {
    clients: usize,
    moves: u32,
    peak_entities: usize,
    final_entities: usize,
    protocol_violations: u64,
    elapsed_ms: u128,
    per_client: Vec<ClientSummary>,
    server: HostStats,
}

struct Node<H> {
    system: NetworkSystem,
    logic: H,
}

impl<H: EventHandler> Node<H> {
    fn start(
        network: &LoopbackNetwork,
        config: &DemoConfig,
        role: Role,
        host: &HostConfig,
        logic: H,
    ) -> Result<Self> {
        let mut system =
            NetworkSystem::new(config.pipeline.clone()).context("create pipeline")?;
        system
            .start(role, network.factory())
            .with_context(|| format!("start {role:?} pipeline"))?;
        system.start_host(host).context("queue host start")?;
        Ok(Self { system, logic })
    }

    fn poll(&mut self) {
        self.system.poll_events(&mut self.logic);
    }
}

struct Scenario {
    network: LoopbackNetwork,
    server: Node<ServerLogic>,
    clients: Vec<Node<ClientLogic>>,
    timeout: Duration,
    peak_entities: usize,
}

impl Scenario {
    fn poll(&mut self) {
        self.server.poll();
        for client in &mut self.clients {
            client.poll();
        }
        self.peak_entities = self.peak_entities.max(self.server.logic.directory().len());
    }

    fn wait_for(&mut self, what: &str, done: impl Fn(&Self) -> bool) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.poll();
            if done(self) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for {what}");
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.clients == 0 {
        bail!("--clients must be at least 1");
    }
    let config = match &cli.config {
        Some(path) => read_config(path)?,
        None => DemoConfig::default(),
    };
    config.pipeline.validate().context("invalid pipeline config")?;

    let started = Instant::now();
    let summary = run(&cli, &config)?;
    let summary = Summary {
        elapsed_ms: started.elapsed().as_millis(),
        ..summary
    };

    eprintln!("{}", summary.server);
    let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    match &cli.out {
        Some(path) => fs::write(path, contents).with_context(|| format!("write {}", path.display()))?,
        None => println!("{contents}"),
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<DemoConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn run(cli: &Cli, config: &DemoConfig) -> Result<Summary> {
    let network = LoopbackNetwork::new();
    let address = config.host.address();
    let limits = Limits::default();

    let server = Node::start(
        &network,
        config,
        Role::Server,
        &config.host,
        ServerLogic::new(config.world, limits.clone()),
    )?;
    let mut scenario = Scenario {
        network,
        server,
        clients: Vec::with_capacity(cli.clients),
        timeout: Duration::from_millis(cli.timeout_ms),
        peak_entities: 0,
    };
    scenario.wait_for("server to listen", |s| s.network.is_listening(&address))?;
    info!(%address, clients = cli.clients, "server listening");

    let client_host = HostConfig {
        peer_limit: 1,
        ..config.host.clone()
    };
    for _ in 0..cli.clients {
        let client = Node::start(
            &scenario.network,
            config,
            Role::Client,
            &client_host,
            ClientLogic::new(config.world, limits.clone()),
        )?;
        scenario.clients.push(client);
    }
    let expected = cli.clients;
    scenario.wait_for("every client to be replicated everywhere", |s| {
        s.server.logic.directory().len() == expected
            && s.clients
                .iter()
                .all(|c| c.logic.local_id().is_some() && c.logic.remotes().len() == expected - 1)
    })?;
    info!(entities = expected, "all clients replicated");

    let mover = scenario.clients[0]
        .logic
        .local_id()
        .context("first client has no id")?;
    let mut target = Vec3::ZERO;
    for step in 1..=cli.moves {
        target = walk(&config.world, step);
        let node = &mut scenario.clients[0];
        let outbox = node.system.outbox().context("client pipeline stopped")?;
        node.logic
            .send_position(target, step as f32 * 10.0 % 360.0, &outbox)
            .context("send position")?;
        scenario.poll();
    }
    if cli.moves > 0 {
        let world = &config.world;
        let tolerance = world.x.precision().max(world.y.precision()).max(world.z.precision());
        scenario.wait_for("the last move to reach every client", |s| {
            s.clients[1..].iter().all(|c| {
                c.logic
                    .remotes()
                    .get(mover)
                    .is_some_and(|e| e.position().max_axis_distance(target) <= tolerance)
            })
        })?;
    }

    let per_client = scenario
        .clients
        .iter()
        .map(|c| summarize(&c.logic))
        .collect();

    scenario.clients[0]
        .system
        .shutdown()
        .context("stop first client")?;
    scenario.wait_for("the server to drop the first client", |s| {
        s.server.logic.directory().len() == expected - 1
            && s.clients[1..].iter().all(|c| !c.logic.remotes().contains(mover))
    })?;
    info!(peer = %mover, "first client removed everywhere");

    scenario.poll();
    Ok(Summary {
        clients: cli.clients,
        moves: cli.moves,
        peak_entities: scenario.peak_entities,
        final_entities: scenario.server.logic.directory().len(),
        protocol_violations: scenario.server.logic.protocol_violations(),
        elapsed_ms: 0,
        per_client,
        server: scenario.server.system.stats(),
    })
}

/// Position for move `step`: the corners of a square halfway to the edges.
fn walk(world: &WorldBounds, step: u32) -> Vec3 {
    let corner = |range: &codec::BoundedRange, high: bool| {
        let center = (range.min() + range.max()) * 0.5;
        let reach = (range.max() - range.min()) * 0.25;
        if high {
            center + reach
        } else {
            center - reach
        }
    };
    let (east, north) = match step % 4 {
        0 => (true, true),
        1 => (false, true),
        2 => (false, false),
        _ => (true, false),
    };
    Vec3::new(corner(&world.x, east), 0.0, corner(&world.z, north))
}

fn summarize(logic: &ClientLogic) -> ClientSummary {
    let position_updates = logic
        .journal()
        .filter(|(_, m)| matches!(m, EntityMessage::PositionUpdate { .. }))
        .count();
    ClientSummary {
        id: logic.local_id().map_or(0, PeerId::raw),
        remotes_seen: logic.remotes().len(),
        position_updates,
        messages: logic.journal().count(),
    }
}
