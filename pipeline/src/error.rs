//! Error types for the pipeline.

use codec::CodecError;
use thiserror::Error;
use wire::WireError;

use crate::system::Lifecycle;
use crate::transport::TransportError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the coordinator and the presentation-side logic.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Queue capacity is zero or not a power of two.
    #[error("queue capacity {capacity} is not a nonzero power of two")]
    InvalidCapacity { capacity: usize },

    /// Operation needs a different lifecycle state.
    #[error("pipeline is {actual:?}, expected {expected:?}")]
    InvalidState {
        actual: Lifecycle,
        expected: Lifecycle,
    },

    /// A bounded queue refused an item under the configured backpressure policy.
    #[error("{queue} queue is full")]
    QueueFull { queue: &'static str },

    /// The consumer side of a queue is gone.
    #[error("{queue} queue is disconnected")]
    Disconnected { queue: &'static str },

    /// A worker thread could not be spawned.
    #[error("failed to spawn {thread} thread: {reason}")]
    Spawn {
        thread: &'static str,
        reason: String,
    },

    /// A worker thread panicked before it could be joined.
    #[error("{thread} thread panicked")]
    ThreadPanicked { thread: &'static str },

    /// Message encoding or decoding failed.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Synchronized state could not be built or packed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A transport call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
