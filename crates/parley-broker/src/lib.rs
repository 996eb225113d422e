//! Event-queue broker boundary for the Parley synchronization engine.
//!
//! The broker is the external collaborator that durably buffers change
//! events per actor and later delivers them live. The engine consumes
//! exactly two operations on it, expressed by [`EventBroker`]:
//! register a new queue ("start buffering for me, now") and drain
//! everything buffered so far (non-blocking).
//!
//! [`MemoryBroker`] is the in-memory implementation used by tests; it
//! adds publish and restart-injection hooks so suites can reproduce the
//! bootstrap races the driver has to survive.
//!
//! # Modules
//!
//! - [`memory`] -- The in-memory broker
//! - [`error`] -- [`BrokerError`]

pub mod error;
pub mod memory;

pub use error::BrokerError;
pub use memory::MemoryBroker;

use parley_types::{Event, QueueId, RealmId, RequestOptions, UserId};

/// The two broker operations the synchronization engine consumes.
#[allow(async_fn_in_trait)]
pub trait EventBroker {
    /// Register a new live event queue for the actor.
    ///
    /// From the moment this returns, every event scoped to the actor is
    /// durably buffered on the returned queue. The session's request
    /// options are baked in so later live deliveries are shaped the way
    /// this session expects.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] if the broker cannot allocate
    /// a queue; the driver surfaces that as a user-visible "try again".
    async fn register_queue(
        &self,
        actor: UserId,
        realm: RealmId,
        options: RequestOptions,
    ) -> Result<QueueId, BrokerError>;

    /// Drain everything buffered on the queue right now, in delivery
    /// order. Non-blocking: returns immediately with whatever is
    /// available, possibly nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownQueue`] if the queue id was never
    /// registered (or was dropped by a broker restart).
    async fn drain_queued(&self, queue_id: QueueId) -> Result<Vec<Event>, BrokerError>;
}
