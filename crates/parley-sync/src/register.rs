//! The registration/reconciliation driver.
//!
//! This is the engine's public entry point. It sequences the queue
//! registration, the snapshot build, the drain-and-apply reconciliation,
//! and the finalization into one bootstrap, so a client receives a
//! snapshot guaranteed consistent with the first live event its queue
//! will deliver.
//!
//! The queue is registered BEFORE the snapshot is built: a gap the other
//! way would lose events. The price is an overlap window in which a
//! mutation can be captured both in the snapshot and in the queue;
//! application is overwrite/set-based precisely so that replaying such
//! an event is harmless.

use std::collections::BTreeSet;

use parley_broker::EventBroker;
use parley_store::StateReader;
use parley_types::{
    Actor, EventId, QueueId, RealmId, RequestOptions, SectionFilter, SectionKey,
};
use tracing::{info, warn};

use crate::apply::{BatchOutcome, apply_events};
use crate::build::build_snapshot;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::finalize::finalize_snapshot;
use crate::snapshot::Snapshot;

/// What a session supplies when registering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    /// The session's fixed options.
    pub options: RequestOptions,
    /// Which sections the session wants.
    pub filter: SectionFilter,
}

impl RegisterRequest {
    /// Validate the request at the driver boundary.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidFilter`] for a filter selecting no
    /// sections at all.
    pub fn validate(&self) -> Result<(), SyncError> {
        if let SectionFilter::Only(keys) = &self.filter
            && keys.is_empty()
        {
            return Err(SyncError::InvalidFilter {
                message: "no sections selected".to_owned(),
            });
        }
        Ok(())
    }
}

/// Parse wire section names into a validated filter.
///
/// `None` means "everything"; an explicit list is checked name by name.
///
/// # Errors
///
/// Returns [`SyncError::InvalidFilter`] for an unknown section name or
/// an empty list.
pub fn parse_section_filter(names: Option<&[String]>) -> Result<SectionFilter, SyncError> {
    let Some(names) = names else {
        return Ok(SectionFilter::All);
    };
    let mut keys = BTreeSet::new();
    for name in names {
        let key = SectionKey::parse(name).ok_or_else(|| SyncError::InvalidFilter {
            message: format!("unknown section: {name}"),
        })?;
        keys.insert(key);
    }
    if keys.is_empty() {
        return Err(SyncError::InvalidFilter {
            message: "no sections selected".to_owned(),
        });
    }
    Ok(SectionFilter::Only(keys))
}

/// What a successful registration hands back to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// The live event queue, `None` for spectators (who never get one).
    pub queue_id: Option<QueueId>,
    /// The finalized snapshot, ready for [`Snapshot::to_wire`].
    pub snapshot: Snapshot,
    /// The id of the last event already folded into the snapshot; the
    /// client resumes live delivery after this. [`EventId::NONE`] when
    /// nothing was applied.
    pub last_event_id: EventId,
}

/// Register a session: bootstrap a consistent snapshot plus (for
/// authenticated actors) a live event queue.
///
/// A broker restart during the bootstrap invalidates the attempt; the
/// driver discards everything and retries from queue registration, up to
/// the configured bound.
///
/// # Errors
///
/// Returns [`SyncError::InvalidFilter`] for a malformed request,
/// [`SyncError::Broker`] when no queue can be allocated (user-visible
/// "try again"), [`SyncError::RestartLoop`] when the retry bound is
/// exhausted, or [`SyncError::Store`] on a storage read failure.
pub async fn register<S: StateReader, B: EventBroker>(
    store: &S,
    broker: &B,
    actor: &Actor,
    realm: RealmId,
    request: RegisterRequest,
    config: &SyncConfig,
) -> Result<Registration, SyncError> {
    request.validate()?;

    let Actor::User(profile) = actor else {
        // Spectators get a one-shot snapshot with the privacy-sensitive
        // options force-disabled, and no queue.
        let options = request.options.for_spectator();
        let mut snapshot = build_snapshot(store, actor, realm, options, &request.filter).await?;
        finalize_snapshot(&mut snapshot, options)?;
        info!(%realm, "registered spectator session");
        return Ok(Registration {
            queue_id: None,
            snapshot,
            last_event_id: EventId::NONE,
        });
    };

    let options = request.options;
    let max_attempts = config.registration.max_restart_attempts;
    for attempt in 1..=max_attempts {
        let queue_id = broker.register_queue(profile.user_id, realm, options).await?;
        let mut snapshot = build_snapshot(store, actor, realm, options, &request.filter).await?;
        let queued = broker.drain_queued(queue_id).await?;
        match apply_events(&mut snapshot, &queued, options, &request.filter, store).await? {
            BatchOutcome::Restart => {
                warn!(%queue_id, attempt, "broker restart during bootstrap, re-registering");
            }
            BatchOutcome::Completed { last_event_id } => {
                finalize_snapshot(&mut snapshot, options)?;
                info!(
                    %realm,
                    user_id = %profile.user_id,
                    %queue_id,
                    %last_event_id,
                    "registered session"
                );
                return Ok(Registration {
                    queue_id: Some(queue_id),
                    snapshot,
                    last_event_id,
                });
            }
        }
    }
    Err(SyncError::RestartLoop {
        attempts: max_attempts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_section_name_is_user_visible() {
        let names = vec!["streams".to_owned(), "message_bodies".to_owned()];
        let result = parse_section_filter(Some(&names));
        assert!(matches!(result, Err(SyncError::InvalidFilter { .. })));
    }

    #[test]
    fn absent_names_select_everything() {
        assert_eq!(parse_section_filter(None).unwrap(), SectionFilter::All);
    }

    #[test]
    fn empty_filter_is_rejected() {
        let request = RegisterRequest {
            options: RequestOptions::default(),
            filter: SectionFilter::Only(BTreeSet::new()),
        };
        assert!(matches!(
            request.validate(),
            Err(SyncError::InvalidFilter { .. })
        ));
    }
}
