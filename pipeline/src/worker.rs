//! Coordination and transport threads.
//!
//! Neither loop ever blocks on a full downstream queue. Each keeps at most
//! one item it could not hand off and retries it on the next pass, so a slow
//! presentation thread can stall only itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{never, Receiver};
use crossbeam::select;
use tracing::{debug, error, warn};

use crate::command::CommandKind;
use crate::error::{PipelineError, PipelineResult};
use crate::handler::Strategy;
use crate::pool::PooledCommand;
use crate::spsc::{Consumer, Producer};
use crate::transport::{StatsCell, Transport, TransportEvent, TransportFactory};

/// How long the coordination thread keeps trying to hand remaining commands
/// to the transport thread once it has been told to stop.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// A named thread with a cooperative stop flag.
pub(crate) struct Worker {
    name: &'static str,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> PipelineResult<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name(format!("tether-{name}"))
            .spawn(move || {
                debug!(thread = name, "worker started");
                body(&flag);
                debug!(thread = name, "worker exited");
            })
            .map_err(|err| PipelineError::Spawn {
                thread: name,
                reason: err.to_string(),
            })?;
        Ok(Self {
            name,
            active,
            handle: Some(handle),
        })
    }

    /// Lowers the stop flag. The thread notices at the top of its next pass.
    pub(crate) fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Stops the thread and waits for it.
    pub(crate) fn join(mut self) -> PipelineResult<()> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::ThreadPanicked { thread: self.name }),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(thread = self.name, "worker panicked");
            }
        }
    }
}

/// Relays commands downstream and events upstream, unchanged.
pub(crate) struct Coordination {
    pub(crate) commands: Consumer<PooledCommand>,
    pub(crate) functions: Producer<PooledCommand>,
    pub(crate) transport_events: Consumer<TransportEvent>,
    pub(crate) logic_events: Producer<TransportEvent>,
    pub(crate) idle_wait: Duration,
}

impl Coordination {
    pub(crate) fn run(self, active: &AtomicBool) {
        let closed_commands: Receiver<PooledCommand> = never();
        let closed_events: Receiver<TransportEvent> = never();
        let mut commands_open = true;
        let mut events_open = true;
        let mut pending_command: Option<PooledCommand> = None;
        let mut pending_event: Option<TransportEvent> = None;

        while active.load(Ordering::Acquire) {
            if let Some(command) = pending_command.take() {
                pending_command = self.functions.try_enqueue(command).err();
            }
            if let Some(event) = pending_event.take() {
                pending_event = self.logic_events.try_enqueue(event).err();
            }

            // A stage with an item still waiting takes nothing new.
            let commands = if commands_open && pending_command.is_none() {
                self.commands.receiver()
            } else {
                &closed_commands
            };
            let events = if events_open && pending_event.is_none() {
                self.transport_events.receiver()
            } else {
                &closed_events
            };

            select! {
                recv(commands) -> command => match command {
                    Ok(command) => pending_command = self.functions.try_enqueue(command).err(),
                    Err(_) => commands_open = false,
                },
                recv(events) -> event => match event {
                    Ok(event) => pending_event = self.logic_events.try_enqueue(event).err(),
                    Err(_) => events_open = false,
                },
                default(self.idle_wait) => {}
            }
        }

        // The transport thread is still running; give it what was asked for.
        let remaining = pending_command.into_iter().chain(self.commands.drain());
        for command in remaining {
            let kind = command.kind;
            if let Err(err) = self.functions.enqueue_timeout(command, SHUTDOWN_GRACE) {
                warn!(?kind, %err, queue = self.functions.name(), "dropping command during shutdown");
            }
        }
        let dropped = usize::from(pending_event.is_some()) + self.transport_events.drain().count();
        if dropped > 0 {
            debug!(dropped, "discarded undelivered transport events");
        }
    }
}

/// Owns the transport for the thread's lifetime and tears it down on every
/// exit path, including unwinding.
struct Session(Box<dyn Transport>);

impl Drop for Session {
    fn drop(&mut self) {
        self.0.destroy_host();
    }
}

/// Executes commands and polls the transport.
pub(crate) struct TransportStage {
    pub(crate) factory: TransportFactory,
    pub(crate) strategy: Strategy,
    pub(crate) functions: Consumer<PooledCommand>,
    pub(crate) events: Producer<TransportEvent>,
    pub(crate) stats: Arc<StatsCell>,
    pub(crate) idle_wait: Duration,
}

impl TransportStage {
    pub(crate) fn run(self, active: &AtomicBool) {
        let Self {
            factory,
            mut strategy,
            functions,
            events,
            stats,
            idle_wait,
        } = self;
        let mut session = Session(factory());
        let mut poll_interval = Duration::ZERO;
        let mut pending: Option<TransportEvent> = None;

        while active.load(Ordering::Acquire) {
            if let Some(event) = pending.take() {
                pending = events.try_enqueue(event).err();
            }

            let mut busy = false;
            while let Some(command) = functions.try_dequeue() {
                execute(&mut strategy, &mut session, &mut poll_interval, command);
                busy = true;
            }

            if pending.is_none() && session.0.is_live() {
                match session.0.service(poll_interval) {
                    Ok(Some(event)) => {
                        pending = events.try_enqueue(event).err();
                        busy = true;
                    }
                    Ok(None) => {}
                    Err(err) => warn!(%err, "transport service failed"),
                }
                stats.publish(session.0.stats());
            }

            // Idle with nothing to poll for: wait for work instead of spinning.
            let polled_with_wait = !poll_interval.is_zero() && session.0.is_live();
            if !busy && (pending.is_some() || !polled_with_wait) {
                if let Some(command) = functions.dequeue_timeout(idle_wait) {
                    execute(&mut strategy, &mut session, &mut poll_interval, command);
                }
            }
        }

        while let Some(command) = functions.try_dequeue() {
            execute(&mut strategy, &mut session, &mut poll_interval, command);
        }
        session.0.destroy_host();
        stats.publish(session.0.stats());
    }
}

fn execute(
    strategy: &mut Strategy,
    session: &mut Session,
    poll_interval: &mut Duration,
    mut command: PooledCommand,
) {
    if command.kind == CommandKind::StartHost {
        *poll_interval = command.poll_interval;
    }
    strategy.execute(session.0.as_mut(), &mut command);
    // `command` drops here: its packet is released and it returns to the pool.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spsc::channel;
    use std::time::Instant;

    #[test]
    fn worker_runs_until_stopped() {
        let (tx, rx) = channel("ticks", 64).unwrap();
        let worker = Worker::spawn("ticker", move |active| {
            let mut ticks = 0u32;
            while active.load(Ordering::Acquire) {
                ticks += 1;
                thread::sleep(Duration::from_millis(1));
            }
            let _ = tx.try_enqueue(ticks);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(10));
        worker.join().unwrap();
        assert!(rx.try_dequeue().unwrap() > 0);
    }

    #[test]
    fn panicking_worker_reports_on_join() {
        let worker = Worker::spawn("doomed", |_| panic!("boom")).unwrap();
        assert_eq!(
            worker.join(),
            Err(PipelineError::ThreadPanicked { thread: "doomed" })
        );
    }

    #[test]
    fn dropping_a_panicked_worker_does_not_propagate() {
        let (tx, rx) = channel("done", 1).unwrap();
        let worker = Worker::spawn("doomed", move |_| {
            let _ = tx.try_enqueue(());
            panic!("boom");
        })
        .unwrap();
        assert_eq!(rx.dequeue_timeout(Duration::from_secs(5)), Some(()));
        drop(worker);
    }

    #[test]
    fn coordination_relays_in_order() {
        let (command_tx, commands) = channel("command", 8).unwrap();
        let (functions, function_rx) = channel("function", 8).unwrap();
        let (event_tx, transport_events) = channel("transport event", 8).unwrap();
        let (logic_events, logic_rx) = channel("logic event", 8).unwrap();
        let stage = Coordination {
            commands,
            functions,
            transport_events,
            logic_events,
            idle_wait: Duration::from_millis(1),
        };
        let worker = Worker::spawn("coordination", move |active| stage.run(active)).unwrap();

        let pool = crate::pool::CommandPool::new(8);
        command_tx.try_enqueue(pool.stop_host()).unwrap();
        command_tx.try_enqueue(pool.get()).unwrap();
        let peer = wire::PeerId::new(3);
        event_tx.try_enqueue(TransportEvent::Connect { peer }).unwrap();
        event_tx.try_enqueue(TransportEvent::Timeout { peer }).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut kinds = Vec::new();
        let mut events = Vec::new();
        while (kinds.len() < 2 || events.len() < 2) && Instant::now() < deadline {
            if let Some(command) = function_rx.dequeue_timeout(Duration::from_millis(5)) {
                kinds.push(command.kind);
            }
            if let Some(event) = logic_rx.dequeue_timeout(Duration::from_millis(5)) {
                events.push(event);
            }
        }
        worker.join().unwrap();
        assert_eq!(kinds, vec![CommandKind::StopHost, CommandKind::StartHost]);
        assert_eq!(
            events,
            vec![TransportEvent::Connect { peer }, TransportEvent::Timeout { peer }]
        );
    }

    #[test]
    fn coordination_holds_events_when_presentation_is_slow() {
        let (_command_tx, commands) = channel::<PooledCommand>("command", 2).unwrap();
        let (functions, _function_rx) = channel("function", 2).unwrap();
        let (event_tx, transport_events) = channel("transport event", 2).unwrap();
        let (logic_events, logic_rx) = channel("logic event", 1).unwrap();
        let stage = Coordination {
            commands,
            functions,
            transport_events,
            logic_events,
            idle_wait: Duration::from_millis(1),
        };
        let worker = Worker::spawn("coordination", move |active| stage.run(active)).unwrap();

        for raw in 0..3 {
            let peer = wire::PeerId::new(raw);
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut event = TransportEvent::Connect { peer };
            while let Err(back) = event_tx.try_enqueue(event) {
                assert!(Instant::now() < deadline);
                event = back;
                thread::sleep(Duration::from_millis(1));
            }
        }

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.len() < 3 && Instant::now() < deadline {
            if let Some(event) = logic_rx.dequeue_timeout(Duration::from_millis(5)) {
                seen.push(event.peer().raw());
            }
        }
        worker.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
