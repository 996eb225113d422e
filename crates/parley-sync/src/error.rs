//! Error types for the synchronization engine.
//!
//! Three failure families per the engine's contract: user-visible
//! recoverable errors (bad filter parameters, no queue available),
//! storage-read failures propagated from the store boundary, and checked
//! misuse of the raw/final snapshot representations. The broker-restart
//! condition is deliberately NOT here: it is a control-flow signal
//! ([`crate::apply::BatchOutcome::Restart`]) fully contained by the
//! driver, never an error the caller sees.

use parley_broker::BrokerError;
use parley_store::StoreError;

/// Errors that can occur building, updating, or registering a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The session's section filter was malformed. User-visible and
    /// recoverable: fix the request and retry.
    #[error("invalid section filter: {message}")]
    InvalidFilter {
        /// What was wrong with the filter.
        message: String,
    },

    /// The broker could not provide a live-update queue. User-visible;
    /// the client should try again.
    #[error("live-update channel unavailable: {source}")]
    Broker {
        /// The underlying broker error.
        #[from]
        source: BrokerError,
    },

    /// A read from authoritative storage failed.
    #[error("storage read failed: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// The broker kept restarting; the bootstrap retry bound was
    /// exhausted.
    #[error("broker restarted {attempts} times during registration")]
    RestartLoop {
        /// How many bootstrap attempts were made.
        attempts: u32,
    },

    /// The snapshot was already finalized: its raw fast-update forms are
    /// gone, so further event application or a second finalization would
    /// silently corrupt it. Checked here instead.
    #[error("snapshot already finalized")]
    AlreadyFinalized,

    /// The snapshot has not been finalized yet, so it has no client-ready
    /// wire shape.
    #[error("snapshot not yet finalized")]
    NotFinalized,

    /// A section payload could not be serialized for the wire.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
