//! Bounded single-producer/single-consumer queues.
//!
//! [`channel`] returns a [`Producer`] and a [`Consumer`]. Neither half is
//! `Clone`, so each end stays with the one thread it was moved into for the
//! lifetime of the queue. Within one queue items come out in the order they
//! went in.

use std::fmt;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::config::Backpressure;
use crate::error::{PipelineError, PipelineResult};

/// Creates a queue named `name` holding at most `capacity` items.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidCapacity`] unless `capacity` is a nonzero
/// power of two.
pub fn channel<T>(name: &'static str, capacity: usize) -> PipelineResult<(Producer<T>, Consumer<T>)> {
    if !capacity.is_power_of_two() {
        return Err(PipelineError::InvalidCapacity { capacity });
    }
    let (tx, rx) = bounded(capacity);
    Ok((Producer { name, tx }, Consumer { name, rx }))
}

/// Why an enqueue failed. The rejected item is handed back.
#[derive(PartialEq, Eq)]
pub enum QueueError<T> {
    Full(T),
    Disconnected(T),
}

impl<T> QueueError<T> {
    /// Recovers the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Disconnected(item) => item,
        }
    }

    /// Converts into a pipeline error, dropping the item.
    pub fn into_pipeline_error(self, queue: &'static str) -> PipelineError {
        match self {
            Self::Full(_) => PipelineError::QueueFull { queue },
            Self::Disconnected(_) => PipelineError::Disconnected { queue },
        }
    }
}

impl<T> fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Disconnected(_) => f.write_str("Disconnected(..)"),
        }
    }
}

impl<T> fmt::Display for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "queue is full"),
            Self::Disconnected(_) => write!(f, "queue is disconnected"),
        }
    }
}

impl<T> std::error::Error for QueueError<T> {}

/// Writing half of a bounded queue.
pub struct Producer<T> {
    name: &'static str,
    tx: Sender<T>,
}

impl<T> Producer<T> {
    /// Enqueues without waiting. Hands the item back if the queue is full or
    /// the consumer is gone.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(TrySendError::into_inner)
    }

    /// Enqueues according to `policy`.
    pub fn enqueue(&self, item: T, policy: Backpressure) -> Result<(), QueueError<T>> {
        match policy {
            Backpressure::Reject => self.try_send(item),
            Backpressure::Spin { attempts } => {
                let mut item = item;
                for _ in 0..attempts.max(1) {
                    match self.try_send(item) {
                        Err(QueueError::Full(back)) => {
                            item = back;
                            thread::yield_now();
                        }
                        other => return other,
                    }
                }
                Err(QueueError::Full(item))
            }
            Backpressure::Block => self
                .tx
                .send(item)
                .map_err(|err| QueueError::Disconnected(err.into_inner())),
        }
    }

    /// Waits at most `timeout` for room.
    pub fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<(), QueueError<T>> {
        self.tx.send_timeout(item, timeout).map_err(|err| {
            if err.is_timeout() {
                QueueError::Full(err.into_inner())
            } else {
                QueueError::Disconnected(err.into_inner())
            }
        })
    }

    fn try_send(&self, item: T) -> Result<(), QueueError<T>> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => QueueError::Full(item),
            TrySendError::Disconnected(item) => QueueError::Disconnected(item),
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("len", &self.tx.len())
            .finish()
    }
}

/// Reading half of a bounded queue.
pub struct Consumer<T> {
    name: &'static str,
    rx: Receiver<T>,
}

impl<T> Consumer<T> {
    /// Dequeues without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Waits at most `timeout` for an item. Returns `None` on timeout and when
    /// the producer is gone and the queue is empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Iterates over the items currently queued without waiting.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) const fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("len", &self.rx.len())
            .finish()
    }
}
