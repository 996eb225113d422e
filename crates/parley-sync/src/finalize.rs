//! The finalizer: raw forms to client-ready forms.
//!
//! Pure consolidation, no I/O. Runs exactly once per snapshot, after the
//! last event batch: the raw unread index collapses into its aggregated
//! summary, the roster splits into active and inactive lists, and the
//! recent-conversations map flattens into its sorted list. The raw forms
//! are consumed in place, which is what makes a second finalization (or
//! a later event application) a checked error.

use std::collections::BTreeMap;

use parley_types::{
    MessageId, MessageRecipient, RecentDmEntry, RequestOptions, StreamId, UnreadDmBucket,
    UnreadMessageInfo, UnreadStreamBucket, UnreadSummary, UserId, canonical_dm_key,
};
use tracing::debug;

use crate::error::SyncError;
use crate::snapshot::{RecentDmState, RosterState, Snapshot, UnreadState};

/// Consolidate a snapshot's raw sections into their wire shapes.
///
/// Applies the session's compatibility shaping (the legacy flat
/// notification fields) and marks the snapshot finalized.
///
/// # Errors
///
/// Returns [`SyncError::AlreadyFinalized`] on a second call.
pub fn finalize_snapshot(
    snapshot: &mut Snapshot,
    options: RequestOptions,
) -> Result<(), SyncError> {
    if snapshot.is_finalized() {
        return Err(SyncError::AlreadyFinalized);
    }

    if let Some(UnreadState::Raw(raw)) = &snapshot.unread {
        snapshot.unread = Some(UnreadState::Aggregated(aggregate_unread(
            raw,
            snapshot.owner,
        )));
    }

    if let Some(RosterState::Raw(raw)) = &snapshot.roster {
        let mut active = Vec::new();
        let mut non_active = Vec::new();
        // BTreeMap iteration gives the sorted-by-id order directly.
        for entry in raw.values() {
            if entry.is_active {
                active.push(entry.clone());
            } else {
                non_active.push(entry.clone());
            }
        }
        snapshot.roster = Some(RosterState::Split { active, non_active });
    }

    if let Some(RecentDmState::Raw(raw)) = &snapshot.recent_dms {
        let mut entries: Vec<RecentDmEntry> = raw
            .iter()
            .map(|(user_ids, &max_message_id)| RecentDmEntry {
                user_ids: user_ids.clone(),
                max_message_id,
            })
            .collect();
        entries.sort_by(|a, b| b.max_message_id.cmp(&a.max_message_id));
        snapshot.recent_dms = Some(RecentDmState::Sorted(entries));
    }

    if options.legacy_subscription_flags
        && let Some(sections) = &mut snapshot.subscriptions
    {
        for entry in &mut sections.subscribed {
            entry.desktop_notifications = Some(entry.notification_settings.desktop);
            entry.audible_notifications = Some(entry.notification_settings.audible);
            entry.push_notifications = Some(entry.notification_settings.push);
        }
    }

    snapshot.finalized = true;
    debug!(realm = %snapshot.realm, owner = ?snapshot.owner, "finalized snapshot");
    Ok(())
}

/// Collapse the per-message unread index into the per-conversation
/// summary the client renders from.
fn aggregate_unread(
    raw: &BTreeMap<MessageId, UnreadMessageInfo>,
    owner: Option<UserId>,
) -> UnreadSummary {
    let mut dm_buckets: BTreeMap<Vec<UserId>, Vec<MessageId>> = BTreeMap::new();
    let mut stream_buckets: BTreeMap<(StreamId, String), Vec<MessageId>> = BTreeMap::new();
    let mut mentions = Vec::new();

    // Ascending id order within each bucket falls out of the raw map's
    // key order.
    for (&message_id, info) in raw {
        match &info.recipient {
            MessageRecipient::Direct { user_ids } => {
                if let Some(me) = owner {
                    dm_buckets
                        .entry(canonical_dm_key(user_ids, me))
                        .or_default()
                        .push(message_id);
                }
            }
            MessageRecipient::Stream { stream_id, topic } => {
                stream_buckets
                    .entry((*stream_id, topic.clone()))
                    .or_default()
                    .push(message_id);
            }
        }
        if info.mentioned {
            mentions.push(message_id);
        }
    }

    UnreadSummary {
        count: u64::try_from(raw.len()).unwrap_or(u64::MAX),
        dms: dm_buckets
            .into_iter()
            .map(|(user_ids, message_ids)| UnreadDmBucket {
                user_ids,
                message_ids,
            })
            .collect(),
        streams: stream_buckets
            .into_iter()
            .map(|((stream_id, topic), unread_message_ids)| UnreadStreamBucket {
                stream_id,
                topic,
                unread_message_ids,
            })
            .collect(),
        mentions,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use chrono::Utc;
    use parley_types::{AvatarSource, RealmId, Role, UserEntry};

    use super::*;

    const REALM: RealmId = RealmId(1);
    const ME: UserId = UserId(5);

    fn user(id: i64, is_active: bool) -> UserEntry {
        UserEntry {
            user_id: UserId::new(id),
            full_name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            avatar_source: AvatarSource::Upload,
            avatar_url: None,
            role: Role::Member,
            is_bot: false,
            is_active,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn unread_aggregation_buckets_and_counts() {
        let other = UserId::new(2);
        let mut raw = BTreeMap::new();
        raw.insert(
            MessageId::new(1),
            UnreadMessageInfo {
                recipient: MessageRecipient::Direct {
                    user_ids: vec![ME, other],
                },
                mentioned: false,
            },
        );
        raw.insert(
            MessageId::new(3),
            UnreadMessageInfo {
                recipient: MessageRecipient::Direct {
                    user_ids: vec![other, ME],
                },
                mentioned: true,
            },
        );
        raw.insert(
            MessageId::new(2),
            UnreadMessageInfo {
                recipient: MessageRecipient::Stream {
                    stream_id: StreamId::new(7),
                    topic: "general".to_owned(),
                },
                mentioned: false,
            },
        );

        let summary = aggregate_unread(&raw, Some(ME));
        assert_eq!(summary.count, 3);
        // Both DMs land in the same canonical conversation, ascending.
        assert_eq!(summary.dms.len(), 1);
        assert_eq!(summary.dms.first().unwrap().user_ids, vec![other]);
        assert_eq!(
            summary.dms.first().unwrap().message_ids,
            vec![MessageId::new(1), MessageId::new(3)]
        );
        assert_eq!(summary.streams.len(), 1);
        assert_eq!(summary.mentions, vec![MessageId::new(3)]);
    }

    #[test]
    fn roster_splits_by_activation() {
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        snapshot.roster = Some(RosterState::Raw(
            [
                (UserId::new(1), user(1, true)),
                (UserId::new(2), user(2, false)),
                (UserId::new(3), user(3, true)),
            ]
            .into_iter()
            .collect(),
        ));

        finalize_snapshot(&mut snapshot, RequestOptions::default()).unwrap();

        let Some(RosterState::Split { active, non_active }) = &snapshot.roster else {
            panic!("roster not split");
        };
        assert_eq!(
            active.iter().map(|e| e.user_id).collect::<Vec<_>>(),
            vec![UserId::new(1), UserId::new(3)]
        );
        assert_eq!(non_active.len(), 1);
    }

    #[test]
    fn recent_dms_sort_descending() {
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        snapshot.recent_dms = Some(RecentDmState::Raw(
            [
                (vec![UserId::new(2)], MessageId::new(4)),
                (vec![UserId::new(3)], MessageId::new(9)),
            ]
            .into_iter()
            .collect(),
        ));

        finalize_snapshot(&mut snapshot, RequestOptions::default()).unwrap();

        let Some(RecentDmState::Sorted(entries)) = &snapshot.recent_dms else {
            panic!("recent DMs not sorted");
        };
        assert_eq!(
            entries.iter().map(|e| e.max_message_id).collect::<Vec<_>>(),
            vec![MessageId::new(9), MessageId::new(4)]
        );
    }

    #[test]
    fn finalizing_twice_is_rejected() {
        let mut snapshot = Snapshot::new(REALM, None);
        finalize_snapshot(&mut snapshot, RequestOptions::default()).unwrap();
        assert!(matches!(
            finalize_snapshot(&mut snapshot, RequestOptions::default()),
            Err(SyncError::AlreadyFinalized)
        ));
    }
}
