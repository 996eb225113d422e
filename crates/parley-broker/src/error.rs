//! Error types for the broker boundary.

use parley_types::QueueId;

/// Errors that can occur talking to the event broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not allocate a live-update queue.
    #[error("could not allocate a live-update channel")]
    Unavailable,

    /// The queue id is not registered with the broker.
    #[error("unknown queue: {queue_id}")]
    UnknownQueue {
        /// The queue that was requested.
        queue_id: QueueId,
    },
}
