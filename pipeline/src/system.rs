//! The pipeline owner: spawns the workers, owns the presentation-side queue
//! ends and shuts everything down in order.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{HostConfig, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventHandler, Outbox};
use crate::handler::{Role, Strategy};
use crate::pool::{CommandPool, PooledCommand};
use crate::spsc::{channel, Consumer, Producer};
use crate::transport::{HostStats, StatsCell, TransportEvent, TransportFactory};
use crate::worker::{Coordination, TransportStage, Worker};

/// How long shutdown waits for room to queue the final `StopHost`.
const STOP_HOST_TIMEOUT: Duration = Duration::from_secs(1);

/// Where a [`NetworkSystem`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Stages {
    commands: Producer<PooledCommand>,
    logic_events: Consumer<TransportEvent>,
    coordination: Worker,
    transport: Worker,
    host_started: bool,
}

/// Three-stage networking pipeline.
///
/// The thread that owns this value is the presentation stage: it submits
/// commands and calls [`poll_events`](Self::poll_events) once per frame.
pub struct NetworkSystem {
    config: PipelineConfig,
    state: Lifecycle,
    pool: CommandPool,
    stats: Arc<StatsCell>,
    stages: Option<Stages>,
}

impl NetworkSystem {
    /// Creates a stopped system.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCapacity`] for an unusable queue size.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            pool: CommandPool::new(config.pool_retain),
            config,
            state: Lifecycle::Stopped,
            stats: Arc::new(StatsCell::new()),
            stages: None,
        })
    }

    /// Spawns the coordination and transport threads. The transport is built
    /// by `factory` on the transport thread and lives there until shutdown.
    pub fn start(&mut self, role: Role, factory: TransportFactory) -> PipelineResult<()> {
        self.expect_state(Lifecycle::Stopped)?;
        self.state = Lifecycle::Starting;
        match self.spawn_stages(role, factory) {
            Ok(stages) => {
                self.stages = Some(stages);
                self.state = Lifecycle::Running;
                info!(?role, capacity = self.config.queue_capacity, "pipeline running");
                Ok(())
            }
            Err(err) => {
                self.state = Lifecycle::Stopped;
                Err(err)
            }
        }
    }

    fn spawn_stages(&self, role: Role, factory: TransportFactory) -> PipelineResult<Stages> {
        let capacity = self.config.queue_capacity;
        let idle_wait = self.config.idle_wait();
        let (commands, command_rx) = channel("command", capacity)?;
        let (function_tx, functions) = channel("function", capacity)?;
        let (event_tx, transport_events) = channel("transport event", capacity)?;
        let (logic_tx, logic_events) = channel("logic event", capacity)?;

        let transport_stage = TransportStage {
            factory,
            strategy: Strategy::new(role),
            functions,
            events: event_tx,
            stats: Arc::clone(&self.stats),
            idle_wait,
        };
        let transport = Worker::spawn("transport", move |active| transport_stage.run(active))?;

        let coordination_stage = Coordination {
            commands: command_rx,
            functions: function_tx,
            transport_events,
            logic_events: logic_tx,
            idle_wait,
        };
        // Dropping `transport` on failure stops and joins it.
        let coordination = Worker::spawn("coordination", move |active| coordination_stage.run(active))?;

        Ok(Stages {
            commands,
            logic_events,
            coordination,
            transport,
            host_started: false,
        })
    }

    /// Queues a `StartHost` built from `config`.
    pub fn start_host(&mut self, config: &HostConfig) -> PipelineResult<()> {
        let command = self.pool.start_host(config);
        self.submit(command)?;
        if let Some(stages) = self.stages.as_mut() {
            stages.host_started = true;
        }
        Ok(())
    }

    /// Queues a `StopHost`.
    pub fn stop_host(&mut self) -> PipelineResult<()> {
        let command = self.pool.stop_host();
        self.submit(command)?;
        if let Some(stages) = self.stages.as_mut() {
            stages.host_started = false;
        }
        Ok(())
    }

    /// Queues a command under the configured backpressure policy.
    pub fn submit(&self, command: PooledCommand) -> PipelineResult<()> {
        self.outbox()?.submit(command)
    }

    /// Command sink for code running on the presentation thread.
    pub fn outbox(&self) -> PipelineResult<Outbox<'_>> {
        let stages = self.running()?;
        Ok(Outbox::new(&self.pool, &stages.commands, self.config.backpressure))
    }

    /// Dispatches the events queued so far to `handler`. Returns how many were
    /// handled. Events arriving during the call wait for the next one.
    ///
    /// A failing handler is logged and does not stop the remaining events.
    pub fn poll_events<H>(&self, handler: &mut H) -> usize
    where
        H: EventHandler + ?Sized,
    {
        let Some(stages) = self.stages.as_ref().filter(|_| self.state == Lifecycle::Running) else {
            return 0;
        };
        let outbox = Outbox::new(&self.pool, &stages.commands, self.config.backpressure);
        let budget = stages.logic_events.len();
        let mut handled = 0;
        while handled < budget {
            let Some(event) = stages.logic_events.try_dequeue() else {
                break;
            };
            handled += 1;
            let peer = event.peer();
            let result = match event {
                TransportEvent::Connect { peer } => handler.on_connect(peer, &outbox),
                TransportEvent::Disconnect { peer, reason } => {
                    info!(%peer, reason, "peer disconnected");
                    handler.on_disconnect(peer, &outbox)
                }
                TransportEvent::Timeout { peer } => {
                    info!(%peer, "peer timed out");
                    handler.on_disconnect(peer, &outbox)
                }
                TransportEvent::Receive {
                    peer,
                    channel,
                    packet,
                } => handler.on_receive(peer, channel, packet, &outbox),
            };
            if let Err(err) = result {
                warn!(%peer, %err, "event handler failed");
            }
        }
        handled
    }

    /// Latest counters published by the transport thread.
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.stats.snapshot()
    }

    #[must_use]
    pub const fn state(&self) -> Lifecycle {
        self.state
    }

    #[must_use]
    pub const fn pool(&self) -> &CommandPool {
        &self.pool
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stops the host if it was started, then stops and joins both workers.
    ///
    /// Returns the first error seen; every step runs regardless.
    pub fn shutdown(&mut self) -> PipelineResult<()> {
        let Some(stages) = self.stages.take() else {
            self.state = Lifecycle::Stopped;
            return Ok(());
        };
        self.state = Lifecycle::Stopping;

        let mut result = Ok(());
        if stages.host_started {
            if let Err(err) = stages
                .commands
                .enqueue_timeout(self.pool.stop_host(), STOP_HOST_TIMEOUT)
            {
                result = Err(err.into_pipeline_error(stages.commands.name()));
            }
        }
        let Stages {
            commands,
            logic_events,
            coordination,
            transport,
            ..
        } = stages;
        // Coordination first, so it hands anything still queued to transport.
        let coordination = coordination.join();
        let transport = transport.join();
        drop(commands);
        drop(logic_events);

        self.state = Lifecycle::Stopped;
        info!("pipeline stopped");
        result.and(coordination).and(transport)
    }

    fn running(&self) -> PipelineResult<&Stages> {
        match (&self.stages, self.state) {
            (Some(stages), Lifecycle::Running) => Ok(stages),
            _ => Err(PipelineError::InvalidState {
                actual: self.state,
                expected: Lifecycle::Running,
            }),
        }
    }

    fn expect_state(&self, expected: Lifecycle) -> PipelineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                actual: self.state,
                expected,
            })
        }
    }
}

impl Drop for NetworkSystem {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(%err, "pipeline shutdown failed");
        }
    }
}

impl std::fmt::Debug for NetworkSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSystem")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
