//! The event applier: incremental reconciliation of a snapshot.
//!
//! Every variant of the closed event taxonomy is matched exhaustively;
//! adding an event type without deciding what it does to a snapshot is a
//! compile error. Application is idempotent for the set-semantics
//! variants and overwrite-based for the rest, so re-delivery during the
//! registration overlap window cannot corrupt state.
//!
//! A few variants perform a narrow storage read: deleting the current
//! maximum message id forces a recompute, deleting a direct message
//! refetches the recent-conversations index, and gaining administrative
//! rights refetches the bot catalog (the event does not carry enough to
//! update any of these locally). Everything else is pure snapshot
//! mutation.

use parley_store::StateReader;
use parley_types::{
    Event, EventData, EventId, MessageFlag, MessageRecipient, RequestOptions, Role, SectionFilter,
    StreamProperty, SubscriptionProperty, UnreadMessageInfo, UserPresence, canonical_dm_key,
};
use tracing::{debug, warn};

use crate::build::never_subscribed_entry;
use crate::error::SyncError;
use crate::snapshot::{
    RecentDmState, RosterState, Snapshot, UnreadState, apply_plan_type_derivations,
    compute_capabilities, normalize_avatar,
};

/// How a batch of queued events ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every event was consumed.
    Completed {
        /// The id of the last consumed event; the session resumes live
        /// delivery after this point. [`EventId::NONE`] when the batch
        /// was empty.
        last_event_id: EventId,
    },
    /// A restart marker was hit. The snapshot and its queue must be
    /// discarded and registration started over; nothing after the marker
    /// was consumed.
    Restart,
}

/// Apply a drained batch of events in delivery order.
///
/// Events aimed at sections outside the session's filter are consumed
/// without effect. The restart marker is honored before filtering, so a
/// narrow filter can never hide it.
///
/// # Errors
///
/// Returns [`SyncError::AlreadyFinalized`] if the snapshot's raw forms
/// are gone, or [`SyncError::Store`] if a narrow recompute read fails.
pub async fn apply_events<S: StateReader>(
    snapshot: &mut Snapshot,
    events: &[Event],
    options: RequestOptions,
    filter: &SectionFilter,
    store: &S,
) -> Result<BatchOutcome, SyncError> {
    let mut last_event_id = EventId::NONE;
    for event in events {
        if event.data == EventData::Restart {
            warn!(event_id = %event.id, "restart marker in batch, aborting");
            return Ok(BatchOutcome::Restart);
        }
        if event.data.section().is_some_and(|key| !filter.includes(key)) {
            last_event_id = event.id;
            continue;
        }
        apply_event(snapshot, &event.data, options, store).await?;
        last_event_id = event.id;
    }
    debug!(count = events.len(), %last_event_id, "applied event batch");
    Ok(BatchOutcome::Completed { last_event_id })
}

/// Apply one event to a snapshot still in raw form.
///
/// Events touching a section the snapshot does not hold are dropped
/// silently; section routing for batch filtering is the caller's job.
///
/// # Errors
///
/// Returns [`SyncError::AlreadyFinalized`] after finalization, or
/// [`SyncError::Store`] if a narrow recompute read fails.
#[allow(clippy::too_many_lines)]
pub async fn apply_event<S: StateReader>(
    snapshot: &mut Snapshot,
    event: &EventData,
    options: RequestOptions,
    store: &S,
) -> Result<(), SyncError> {
    if snapshot.is_finalized() {
        return Err(SyncError::AlreadyFinalized);
    }
    match event {
        EventData::MessageSent {
            message_id,
            sender_id,
            recipient,
        } => {
            let message_id = *message_id;
            if let Some(max) = &mut snapshot.max_message_id
                && message_id > *max
            {
                *max = message_id;
            }
            if let MessageRecipient::Stream { stream_id, .. } = recipient {
                if let Some(streams) = &mut snapshot.streams
                    && let Some(entry) = streams.iter_mut().find(|s| s.stream_id == *stream_id)
                    && entry.first_message_id.is_none()
                {
                    entry.first_message_id = Some(message_id);
                }
                if let Some(sections) = &mut snapshot.subscriptions
                    && let Some(entry) = sections.entry_mut(*stream_id)
                    && entry.first_message_id.is_none()
                {
                    entry.first_message_id = Some(message_id);
                }
            }
            if let Some(me) = snapshot.owner {
                if let MessageRecipient::Direct { user_ids } = recipient
                    && user_ids.contains(&me)
                    && let Some(RecentDmState::Raw(conversations)) = &mut snapshot.recent_dms
                {
                    let entry = conversations
                        .entry(canonical_dm_key(user_ids, me))
                        .or_insert(message_id);
                    if message_id > *entry {
                        *entry = message_id;
                    }
                }
                // Mirror the write path: the message lands unread for
                // every recipient except its sender.
                let receives = *sender_id != me
                    && match recipient {
                        MessageRecipient::Direct { user_ids } => user_ids.contains(&me),
                        MessageRecipient::Stream { stream_id, .. } => snapshot
                            .subscriptions
                            .as_ref()
                            .is_some_and(|sections| {
                                sections
                                    .subscribed
                                    .iter()
                                    .any(|entry| entry.stream_id == *stream_id)
                            }),
                    };
                if receives
                    && let Some(UnreadState::Raw(unread)) = &mut snapshot.unread
                {
                    unread.insert(
                        message_id,
                        UnreadMessageInfo {
                            recipient: recipient.clone(),
                            mentioned: false,
                        },
                    );
                }
            }
        }
        EventData::MessageDeleted {
            message_id,
            recipient,
        } => {
            let message_id = *message_id;
            if let Some(UnreadState::Raw(unread)) = &mut snapshot.unread {
                unread.remove(&message_id);
            }
            if let Some(starred) = &mut snapshot.starred_messages {
                starred.remove(&message_id);
            }
            // Losing the maximum cannot be repaired locally: the next
            // highest visible id is not in the snapshot.
            if snapshot.max_message_id == Some(message_id) {
                snapshot.max_message_id =
                    Some(store.max_message_id(snapshot.realm, snapshot.owner).await?);
            }
            if let MessageRecipient::Direct { .. } = recipient
                && let Some(me) = snapshot.owner
                && matches!(snapshot.recent_dms, Some(RecentDmState::Raw(_)))
            {
                snapshot.recent_dms = Some(RecentDmState::Raw(
                    store.recent_private_conversations(snapshot.realm, me).await?,
                ));
            }
        }
        EventData::MessageFlagsAdded { flag, messages } => match flag {
            MessageFlag::Read => {
                if let Some(UnreadState::Raw(unread)) = &mut snapshot.unread {
                    for id in messages {
                        unread.remove(id);
                    }
                }
            }
            MessageFlag::Starred => {
                if let Some(starred) = &mut snapshot.starred_messages {
                    starred.extend(messages.iter().copied());
                }
            }
        },
        EventData::MessageFlagsRemoved {
            flag,
            messages,
            message_info,
        } => match flag {
            MessageFlag::Read => {
                if let Some(UnreadState::Raw(unread)) = &mut snapshot.unread {
                    for id in messages {
                        if let Some(info) = message_info.get(id) {
                            unread.insert(*id, info.clone());
                        }
                    }
                }
            }
            MessageFlag::Starred => {
                if let Some(starred) = &mut snapshot.starred_messages {
                    for id in messages {
                        starred.remove(id);
                    }
                }
            }
        },
        EventData::SubscriptionAdded { subscriptions } => {
            if let Some(sections) = &mut snapshot.subscriptions {
                for entry in subscriptions {
                    let mut entry = entry.clone();
                    if !options.include_subscribers {
                        entry.subscribers = None;
                    }
                    sections.remove_everywhere(entry.stream_id);
                    sections.subscribed.push(entry);
                }
                sections.subscribed.sort_by_key(|entry| entry.stream_id);
            }
        }
        EventData::SubscriptionRemoved { stream_ids } => {
            let owner = snapshot.owner;
            if let Some(sections) = &mut snapshot.subscriptions {
                for &stream_id in stream_ids {
                    if let Some(position) = sections
                        .subscribed
                        .iter()
                        .position(|entry| entry.stream_id == stream_id)
                    {
                        let mut entry = sections.subscribed.remove(position);
                        if let Some(subscribers) = &mut entry.subscribers {
                            subscribers.retain(|&id| Some(id) != owner);
                        }
                        sections.unsubscribed.push(entry);
                    }
                }
                sections.unsubscribed.sort_by_key(|entry| entry.stream_id);
            }
        }
        EventData::SubscriptionUpdated {
            stream_id,
            property,
        } => {
            if let Some(sections) = &mut snapshot.subscriptions
                && let Some(entry) = sections.entry_mut(*stream_id)
            {
                match property {
                    SubscriptionProperty::Color(color) => entry.color.clone_from(color),
                    SubscriptionProperty::IsMuted(value) => entry.is_muted = *value,
                    SubscriptionProperty::PinToTop(value) => entry.pin_to_top = *value,
                    SubscriptionProperty::EmailNotifications(value) => {
                        entry.notification_settings.email = *value;
                    }
                    SubscriptionProperty::PushNotifications(value) => {
                        entry.notification_settings.push = *value;
                    }
                    SubscriptionProperty::AudibleNotifications(value) => {
                        entry.notification_settings.audible = *value;
                    }
                    SubscriptionProperty::DesktopNotifications(value) => {
                        entry.notification_settings.desktop = *value;
                    }
                }
            }
        }
        EventData::SubscriptionPeerAdded {
            stream_ids,
            user_ids,
        } => {
            if options.include_subscribers
                && let Some(sections) = &mut snapshot.subscriptions
            {
                for &stream_id in stream_ids {
                    if let Some(entry) = sections.entry_mut(stream_id)
                        && let Some(subscribers) = &mut entry.subscribers
                    {
                        for &user_id in user_ids {
                            if !subscribers.contains(&user_id) {
                                subscribers.push(user_id);
                            }
                        }
                        subscribers.sort_unstable();
                    }
                }
            }
        }
        EventData::SubscriptionPeerRemoved {
            stream_ids,
            user_ids,
        } => {
            if options.include_subscribers
                && let Some(sections) = &mut snapshot.subscriptions
            {
                for &stream_id in stream_ids {
                    if let Some(entry) = sections.entry_mut(stream_id)
                        && let Some(subscribers) = &mut entry.subscribers
                    {
                        subscribers.retain(|id| !user_ids.contains(id));
                    }
                }
            }
        }
        EventData::StreamCreated { streams } => {
            for stream in streams {
                if let Some(list) = &mut snapshot.streams
                    && !list.iter().any(|entry| entry.stream_id == stream.stream_id)
                {
                    list.push(stream.clone());
                    list.sort_by_key(|entry| entry.stream_id);
                }
                // A brand-new stream has no subscribers and no traffic
                // history yet.
                if let Some(sections) = &mut snapshot.subscriptions
                    && !sections.contains(stream.stream_id)
                {
                    let subscribers = options.include_subscribers.then(Vec::new);
                    sections
                        .never_subscribed
                        .push(never_subscribed_entry(stream, None, subscribers));
                    sections.never_subscribed.sort_by_key(|entry| entry.stream_id);
                }
            }
        }
        EventData::StreamDeleted { stream_ids } => {
            for &stream_id in stream_ids {
                if let Some(list) = &mut snapshot.streams {
                    list.retain(|entry| entry.stream_id != stream_id);
                }
                if let Some(sections) = &mut snapshot.subscriptions {
                    sections.remove_everywhere(stream_id);
                }
            }
        }
        EventData::StreamUpdated {
            stream_id,
            property,
        } => {
            if let Some(list) = &mut snapshot.streams
                && let Some(entry) = list.iter_mut().find(|entry| entry.stream_id == *stream_id)
            {
                match property {
                    StreamProperty::Name(name) => entry.name.clone_from(name),
                    StreamProperty::Description(description) => {
                        entry.description.clone_from(description);
                    }
                    StreamProperty::InviteOnly(value) => entry.invite_only = *value,
                    StreamProperty::MessageRetentionDays(days) => {
                        entry.message_retention_days = *days;
                    }
                }
            }
            // Stream facts are duplicated onto subscription entries and
            // must change in lockstep.
            if let Some(sections) = &mut snapshot.subscriptions
                && let Some(entry) = sections.entry_mut(*stream_id)
            {
                match property {
                    StreamProperty::Name(name) => entry.name.clone_from(name),
                    StreamProperty::Description(description) => {
                        entry.description.clone_from(description);
                    }
                    StreamProperty::InviteOnly(value) => entry.invite_only = *value,
                    StreamProperty::MessageRetentionDays(_) => {}
                }
            }
        }
        EventData::RealmUserAdded { person } => {
            if let Some(RosterState::Raw(roster)) = &mut snapshot.roster {
                let mut entry = person.clone();
                normalize_avatar(&mut entry, options);
                roster.insert(entry.user_id, entry);
            }
        }
        EventData::RealmUserRemoved { user_id } => {
            if let Some(RosterState::Raw(roster)) = &mut snapshot.roster {
                roster.remove(user_id);
            }
        }
        EventData::RealmUserUpdated { person } => {
            let was_admin = snapshot.owner_role.is_some_and(Role::is_admin);
            if let Some(RosterState::Raw(roster)) = &mut snapshot.roster
                && let Some(entry) = roster.get_mut(&person.user_id)
            {
                if let Some(full_name) = &person.full_name {
                    entry.full_name.clone_from(full_name);
                }
                if let Some(email) = &person.email {
                    entry.email.clone_from(email);
                }
                if let Some(avatar_url) = &person.avatar_url {
                    entry.avatar_url = Some(avatar_url.clone());
                }
                if let Some(role) = person.role {
                    entry.role = role;
                }
                if let Some(is_active) = person.is_active {
                    entry.is_active = is_active;
                }
                // The patched URL is subject to the same avatar privacy
                // rule a fresh build applies.
                normalize_avatar(entry, options);
            }
            // A role change on the session's own account cascades into
            // the derived sections.
            if snapshot.owner == Some(person.user_id)
                && let Some(new_role) = person.role
            {
                snapshot.owner_role = Some(new_role);
                if snapshot.capabilities.is_some() {
                    snapshot.capabilities = Some(compute_capabilities(
                        Some(new_role),
                        snapshot.realm_settings.as_ref(),
                    ));
                }
                if snapshot.realm_bots.is_some() {
                    let now_admin = new_role.is_admin();
                    if now_admin && !was_admin {
                        snapshot.realm_bots = Some(store.bots(snapshot.realm).await?);
                    } else if !now_admin && was_admin {
                        snapshot.realm_bots = Some(Vec::new());
                    }
                }
            }
        }
        EventData::RealmSettingUpdated { property, value } => {
            if let Some(settings) = &mut snapshot.realm_settings {
                settings.insert(property.clone(), value.clone());
                if property == "plan_type" {
                    apply_plan_type_derivations(settings);
                }
            }
            // Policy settings feed the capability booleans.
            if snapshot.capabilities.is_some() {
                snapshot.capabilities = Some(compute_capabilities(
                    snapshot.owner_role,
                    snapshot.realm_settings.as_ref(),
                ));
            }
        }
        EventData::RealmBotAdded { bot } => {
            if snapshot.owner_role.is_some_and(Role::is_admin)
                && let Some(bots) = &mut snapshot.realm_bots
            {
                bots.retain(|entry| entry.user_id != bot.user_id);
                bots.push(bot.clone());
                bots.sort_by_key(|entry| entry.user_id);
            }
        }
        EventData::RealmBotRemoved { user_id } => {
            if let Some(bots) = &mut snapshot.realm_bots {
                bots.retain(|entry| entry.user_id != *user_id);
            }
        }
        EventData::UserGroupAdded { group } => {
            if let Some(groups) = &mut snapshot.user_groups {
                groups.retain(|entry| entry.group_id != group.group_id);
                groups.push(group.clone());
                groups.sort_by_key(|entry| entry.group_id);
            }
        }
        EventData::UserGroupRemoved { group_id } => {
            if let Some(groups) = &mut snapshot.user_groups {
                groups.retain(|entry| entry.group_id != *group_id);
            }
        }
        EventData::UserGroupUpdated {
            group_id,
            name,
            description,
        } => {
            if let Some(groups) = &mut snapshot.user_groups
                && let Some(group) = groups.iter_mut().find(|entry| entry.group_id == *group_id)
            {
                if let Some(name) = name {
                    group.name.clone_from(name);
                }
                if let Some(description) = description {
                    group.description.clone_from(description);
                }
            }
        }
        EventData::UserGroupMembersAdded { group_id, user_ids } => {
            if let Some(groups) = &mut snapshot.user_groups
                && let Some(group) = groups.iter_mut().find(|entry| entry.group_id == *group_id)
            {
                group.members.extend(user_ids.iter().copied());
            }
        }
        EventData::UserGroupMembersRemoved { group_id, user_ids } => {
            if let Some(groups) = &mut snapshot.user_groups
                && let Some(group) = groups.iter_mut().find(|entry| entry.group_id == *group_id)
            {
                for user_id in user_ids {
                    group.members.remove(user_id);
                }
            }
        }
        EventData::CustomProfileFieldsUpdated { fields } => {
            if snapshot.custom_profile_fields.is_some() {
                snapshot.custom_profile_fields = Some(fields.clone());
            }
        }
        EventData::PresenceUpdated {
            user_id,
            client,
            presence,
        } => {
            if snapshot.owner.is_some()
                && let Some(map) = &mut snapshot.presence
            {
                if options.slim_presence {
                    // Latest report wins, same rule the builder's
                    // aggregation uses, so updates converge with a
                    // fresh build.
                    match map.get_mut(user_id) {
                        Some(UserPresence::Aggregated(current)) => {
                            if presence.timestamp >= current.timestamp {
                                *current = presence.clone();
                            }
                        }
                        _ => {
                            map.insert(*user_id, UserPresence::Aggregated(presence.clone()));
                        }
                    }
                } else {
                    match map.get_mut(user_id) {
                        Some(UserPresence::ByClient(clients)) => {
                            clients.insert(client.clone(), presence.clone());
                        }
                        _ => {
                            map.insert(
                                *user_id,
                                UserPresence::ByClient(
                                    [(client.clone(), presence.clone())].into_iter().collect(),
                                ),
                            );
                        }
                    }
                }
            }
        }
        EventData::DraftAdded { draft } | EventData::DraftUpdated { draft } => {
            if let Some(drafts) = &mut snapshot.drafts {
                drafts.retain(|entry| entry.id != draft.id);
                drafts.push(draft.clone());
                drafts.sort_by_key(|entry| entry.id);
            }
        }
        EventData::DraftRemoved { draft_id } => {
            if let Some(drafts) = &mut snapshot.drafts {
                drafts.retain(|entry| entry.id != *draft_id);
            }
        }
        EventData::AlertWordsUpdated { alert_words } => {
            if snapshot.alert_words.is_some() {
                snapshot.alert_words = Some(alert_words.clone());
            }
        }
        EventData::MutedTopicsUpdated { muted_topics } => {
            if snapshot.muted_topics.is_some() {
                snapshot.muted_topics = Some(muted_topics.clone());
            }
        }
        EventData::MutedUsersUpdated { muted_users } => {
            if snapshot.muted_users.is_some() {
                snapshot.muted_users = Some(muted_users.clone());
            }
        }
        // Message decorations and ephemera are not materialized in
        // snapshots; these exist for live delivery only.
        EventData::ReactionAdded { .. }
        | EventData::ReactionRemoved { .. }
        | EventData::SubmessageAdded { .. }
        | EventData::TypingStarted { .. }
        | EventData::TypingStopped { .. }
        | EventData::AttachmentUpdated { .. }
        | EventData::Restart => {}
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use parley_store::MemoryStore;
    use parley_types::{
        AvatarSource, MessageId, RealmId, StreamId, SubscriptionEntry, SubscriptionNotifications,
        UserEntry, UserId, UserPatch,
    };

    use super::*;

    const REALM: RealmId = RealmId(1);
    const ME: UserId = UserId(5);

    fn entry(stream_id: i64) -> SubscriptionEntry {
        SubscriptionEntry {
            stream_id: StreamId::new(stream_id),
            name: format!("stream-{stream_id}"),
            description: String::new(),
            invite_only: false,
            color: "#c2c2c2".to_owned(),
            is_muted: false,
            pin_to_top: false,
            first_message_id: None,
            stream_weekly_traffic: None,
            subscribers: Some(vec![ME]),
            notification_settings: SubscriptionNotifications::default(),
            desktop_notifications: None,
            audible_notifications: None,
            push_notifications: None,
        }
    }

    fn snapshot_with_subscriptions() -> Snapshot {
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        snapshot.subscriptions = Some(crate::snapshot::SubscriptionSections::default());
        snapshot
    }

    #[tokio::test]
    async fn subscription_add_then_remove_keeps_one_home() {
        let store = MemoryStore::new();
        let mut snapshot = snapshot_with_subscriptions();
        let options = RequestOptions::default();

        apply_event(
            &mut snapshot,
            &EventData::SubscriptionAdded {
                subscriptions: vec![entry(1)],
            },
            options,
            &store,
        )
        .await
        .unwrap();
        let sections = snapshot.subscriptions.as_ref().unwrap();
        assert_eq!(sections.subscribed.len(), 1);

        apply_event(
            &mut snapshot,
            &EventData::SubscriptionRemoved {
                stream_ids: vec![StreamId::new(1)],
            },
            options,
            &store,
        )
        .await
        .unwrap();
        let sections = snapshot.subscriptions.as_ref().unwrap();
        assert!(sections.subscribed.is_empty());
        assert_eq!(sections.unsubscribed.len(), 1);
        // Leaving removed the actor from the entry's subscriber list.
        assert_eq!(
            sections.unsubscribed.first().unwrap().subscribers,
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn peer_events_are_noops_without_subscriber_data() {
        let store = MemoryStore::new();
        let mut snapshot = snapshot_with_subscriptions();
        let mut no_subscribers = entry(1);
        no_subscribers.subscribers = None;
        snapshot
            .subscriptions
            .as_mut()
            .unwrap()
            .subscribed
            .push(no_subscribers);
        let options = RequestOptions {
            include_subscribers: false,
            ..RequestOptions::default()
        };

        apply_event(
            &mut snapshot,
            &EventData::SubscriptionPeerAdded {
                stream_ids: vec![StreamId::new(1)],
                user_ids: vec![UserId::new(9)],
            },
            options,
            &store,
        )
        .await
        .unwrap();

        let sections = snapshot.subscriptions.as_ref().unwrap();
        assert_eq!(sections.subscribed.first().unwrap().subscribers, None);
    }

    #[tokio::test]
    async fn stream_rename_propagates_to_subscription_entries() {
        let store = MemoryStore::new();
        let mut snapshot = snapshot_with_subscriptions();
        snapshot.subscriptions.as_mut().unwrap().subscribed.push(entry(1));

        apply_event(
            &mut snapshot,
            &EventData::StreamUpdated {
                stream_id: StreamId::new(1),
                property: StreamProperty::Name("renamed".to_owned()),
            },
            RequestOptions::default(),
            &store,
        )
        .await
        .unwrap();

        let sections = snapshot.subscriptions.as_ref().unwrap();
        assert_eq!(sections.subscribed.first().unwrap().name, "renamed");
    }

    #[tokio::test]
    async fn read_flag_round_trip_restores_unread_info() {
        let store = MemoryStore::new();
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        let info = UnreadMessageInfo {
            recipient: MessageRecipient::Direct {
                user_ids: vec![ME, UserId::new(2)],
            },
            mentioned: false,
        };
        let id = MessageId::new(10);
        snapshot.unread = Some(UnreadState::Raw(
            [(id, info.clone())].into_iter().collect(),
        ));
        let options = RequestOptions::default();

        apply_event(
            &mut snapshot,
            &EventData::MessageFlagsAdded {
                flag: MessageFlag::Read,
                messages: vec![id],
            },
            options,
            &store,
        )
        .await
        .unwrap();
        assert_eq!(snapshot.unread, Some(UnreadState::Raw(BTreeMap::new())));

        apply_event(
            &mut snapshot,
            &EventData::MessageFlagsRemoved {
                flag: MessageFlag::Read,
                messages: vec![id],
                message_info: [(id, info.clone())].into_iter().collect(),
            },
            options,
            &store,
        )
        .await
        .unwrap();
        assert_eq!(
            snapshot.unread,
            Some(UnreadState::Raw([(id, info)].into_iter().collect()))
        );
    }

    #[tokio::test]
    async fn restart_aborts_batch_before_filtering() {
        let store = MemoryStore::new();
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        snapshot.max_message_id = Some(MessageId::NONE);
        // A filter selecting nothing at all still cannot hide a restart.
        let filter = SectionFilter::Only(std::collections::BTreeSet::new());
        let events = vec![
            Event {
                id: EventId::new(0),
                data: EventData::MessageSent {
                    message_id: MessageId::new(1),
                    sender_id: UserId::new(2),
                    recipient: MessageRecipient::Direct {
                        user_ids: vec![ME, UserId::new(2)],
                    },
                },
            },
            Event {
                id: EventId::new(1),
                data: EventData::Restart,
            },
        ];

        let outcome = apply_events(
            &mut snapshot,
            &events,
            RequestOptions::default(),
            &filter,
            &store,
        )
        .await
        .unwrap();
        assert_eq!(outcome, BatchOutcome::Restart);
        // The filtered message event was consumed without effect.
        assert_eq!(snapshot.max_message_id, Some(MessageId::NONE));
    }

    #[tokio::test]
    async fn avatar_patch_respects_client_gravatar() {
        let store = MemoryStore::new();
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        let entry = UserEntry {
            user_id: ME,
            full_name: "Me".to_owned(),
            email: "me@example.com".to_owned(),
            avatar_source: AvatarSource::Gravatar,
            avatar_url: None,
            role: Role::Member,
            is_bot: false,
            is_active: true,
            date_joined: chrono::Utc::now(),
        };
        snapshot.roster = Some(RosterState::Raw([(ME, entry)].into_iter().collect()));
        let options = RequestOptions {
            client_gravatar: true,
            ..RequestOptions::default()
        };

        apply_event(
            &mut snapshot,
            &EventData::RealmUserUpdated {
                person: UserPatch {
                    user_id: ME,
                    full_name: None,
                    email: None,
                    avatar_url: Some("/avatars/5-v2.png".to_owned()),
                    role: None,
                    is_active: None,
                },
            },
            options,
            &store,
        )
        .await
        .unwrap();

        // The session computes gravatars client-side; the patched URL
        // must be dropped exactly as a fresh build would drop it.
        let Some(RosterState::Raw(roster)) = &snapshot.roster else {
            panic!("roster not raw");
        };
        assert_eq!(roster.get(&ME).unwrap().avatar_url, None);
    }

    #[tokio::test]
    async fn apply_after_finalize_is_rejected() {
        let store = MemoryStore::new();
        let mut snapshot = Snapshot::new(REALM, Some(ME));
        snapshot.finalized = true;
        let result = apply_event(
            &mut snapshot,
            &EventData::TypingStarted { sender_id: ME },
            RequestOptions::default(),
            &store,
        )
        .await;
        assert!(matches!(result, Err(SyncError::AlreadyFinalized)));
    }
}
