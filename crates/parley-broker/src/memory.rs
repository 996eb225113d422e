//! In-memory event broker.
//!
//! Buffers events per registered queue under a [`tokio::sync::RwLock`].
//! Beyond the [`EventBroker`] contract it offers the hooks test suites
//! need: publishing events to every queue of a realm (the upstream
//! write path), publishing to a single queue, injecting a restart
//! marker, and simulating allocation failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use parley_types::{Event, EventData, EventId, QueueId, RealmId, RequestOptions, UserId};

use crate::BrokerError;
use crate::EventBroker;

/// One registered queue and its buffered events.
#[derive(Debug)]
struct QueueState {
    actor: UserId,
    realm: RealmId,
    /// Options the queue was registered with. The contract fixes event
    /// shaping at registration time; this implementation buffers raw
    /// events and leaves the shaping to the applier, so the field is
    /// held for the contract but never consulted on delivery.
    #[allow(dead_code)]
    options: RequestOptions,
    buffered: Vec<Event>,
    next_event_id: i64,
}

/// The in-memory [`EventBroker`] implementation.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    queues: RwLock<BTreeMap<QueueId, QueueState>>,
    unavailable: AtomicBool,
}

impl MemoryBroker {
    /// Create a broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent [`EventBroker::register_queue`] call fail
    /// (or succeed again) until toggled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Publish an event to every queue registered for the realm,
    /// optionally restricted to one actor's queues.
    pub async fn publish(&self, realm: RealmId, actor: Option<UserId>, data: EventData) {
        let mut queues = self.queues.write().await;
        for queue in queues.values_mut() {
            if queue.realm == realm && actor.is_none_or(|a| a == queue.actor) {
                push_event(queue, data.clone());
            }
        }
    }

    /// Publish an event to a single queue.
    pub async fn publish_to(&self, queue_id: QueueId, data: EventData) -> Result<(), BrokerError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or(BrokerError::UnknownQueue { queue_id })?;
        push_event(queue, data);
        Ok(())
    }

    /// Inject a restart marker into every queue, as the real broker does
    /// when it comes back up with possibly-stale buffer positions.
    pub async fn signal_restart(&self) {
        let mut queues = self.queues.write().await;
        for queue in queues.values_mut() {
            push_event(queue, EventData::Restart);
        }
        tracing::warn!(queues = queues.len(), "broker restart signaled");
    }

    /// Number of currently registered queues.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }
}

/// Append an event to a queue, assigning the next delivery-order id.
fn push_event(queue: &mut QueueState, data: EventData) {
    let id = EventId::new(queue.next_event_id);
    queue.next_event_id = queue.next_event_id.saturating_add(1);
    queue.buffered.push(Event { id, data });
}

impl EventBroker for MemoryBroker {
    async fn register_queue(
        &self,
        actor: UserId,
        realm: RealmId,
        options: RequestOptions,
    ) -> Result<QueueId, BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable);
        }
        let queue_id = QueueId::new();
        let mut queues = self.queues.write().await;
        queues.insert(
            queue_id,
            QueueState {
                actor,
                realm,
                options,
                buffered: Vec::new(),
                next_event_id: 0,
            },
        );
        tracing::debug!(%queue_id, %actor, %realm, "registered event queue");
        Ok(queue_id)
    }

    async fn drain_queued(&self, queue_id: QueueId) -> Result<Vec<Event>, BrokerError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or(BrokerError::UnknownQueue { queue_id })?;
        let drained = std::mem::take(&mut queue.buffered);
        tracing::debug!(%queue_id, count = drained.len(), "drained queue");
        Ok(drained)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const REALM: RealmId = RealmId(1);
    const ACTOR: UserId = UserId(7);

    #[tokio::test]
    async fn drain_is_non_blocking_and_ordered() {
        let broker = MemoryBroker::new();
        let queue_id = broker
            .register_queue(ACTOR, REALM, RequestOptions::default())
            .await
            .unwrap();

        assert!(broker.drain_queued(queue_id).await.unwrap().is_empty());

        broker
            .publish(REALM, None, EventData::TypingStarted { sender_id: ACTOR })
            .await;
        broker
            .publish(REALM, None, EventData::TypingStopped { sender_id: ACTOR })
            .await;

        let drained = broker.drain_queued(queue_id).await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained.first().unwrap().id, EventId::new(0));
        assert_eq!(drained.last().unwrap().id, EventId::new(1));

        // A second drain returns nothing: the buffer was consumed.
        assert!(broker.drain_queued(queue_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_only_reach_matching_realm_and_actor() {
        let broker = MemoryBroker::new();
        let mine = broker
            .register_queue(ACTOR, REALM, RequestOptions::default())
            .await
            .unwrap();
        let other = broker
            .register_queue(UserId(8), RealmId(2), RequestOptions::default())
            .await
            .unwrap();

        broker
            .publish(REALM, Some(ACTOR), EventData::TypingStarted { sender_id: ACTOR })
            .await;

        assert_eq!(broker.drain_queued(mine).await.unwrap().len(), 1);
        assert!(broker.drain_queued(other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_broker_refuses_registration() {
        let broker = MemoryBroker::new();
        broker.set_unavailable(true);
        let result = broker
            .register_queue(ACTOR, REALM, RequestOptions::default())
            .await;
        assert!(matches!(result, Err(BrokerError::Unavailable)));
    }

    #[tokio::test]
    async fn restart_marker_lands_in_every_queue() {
        let broker = MemoryBroker::new();
        let queue_id = broker
            .register_queue(ACTOR, REALM, RequestOptions::default())
            .await
            .unwrap();
        broker.signal_restart().await;
        let drained = broker.drain_queued(queue_id).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained.first().unwrap().data, EventData::Restart);
    }
}
