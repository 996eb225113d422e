//! The snapshot builder.
//!
//! Iterates the fixed section catalog in a stable order and produces
//! exactly the sections the session's filter selected, reading
//! authoritative storage through [`StateReader`]. Re-invocable at any
//! time: every call yields a fresh, independent snapshot.
//!
//! Anonymous (spectator) sessions degrade rather than fail: personal
//! sections come back empty, and the privacy-sensitive options are
//! assumed to have been force-disabled centrally by the driver before
//! this function runs.

use std::collections::{BTreeMap, BTreeSet};

use parley_store::StateReader;
use parley_types::{
    Actor, RealmId, RequestOptions, Role, SectionFilter, SectionKey, StreamEntry, StreamId,
    SubscriptionEntry, SubscriptionNotifications, UserId, UserPresence,
};
use tracing::debug;

use crate::error::SyncError;
use crate::snapshot::{
    RecentDmState, RosterState, Snapshot, SubscriptionSections, UnreadState,
    apply_plan_type_derivations, compute_capabilities, latest_presence, normalize_avatar,
};

/// Display color assigned to subscription entries the actor has no
/// personal settings for (the never-subscribed list).
pub(crate) const DEFAULT_STREAM_COLOR: &str = "#c2c2c2";

/// Build an entry for a stream the actor was never subscribed to.
pub(crate) fn never_subscribed_entry(
    stream: &StreamEntry,
    traffic: Option<u32>,
    subscribers: Option<Vec<UserId>>,
) -> SubscriptionEntry {
    SubscriptionEntry {
        stream_id: stream.stream_id,
        name: stream.name.clone(),
        description: stream.description.clone(),
        invite_only: stream.invite_only,
        color: DEFAULT_STREAM_COLOR.to_owned(),
        is_muted: false,
        pin_to_top: false,
        first_message_id: stream.first_message_id,
        stream_weekly_traffic: traffic,
        subscribers,
        notification_settings: SubscriptionNotifications::default(),
        desktop_notifications: None,
        audible_notifications: None,
        push_notifications: None,
    }
}

/// Build a complete snapshot for the actor covering the filtered sections.
///
/// Read-only against authoritative storage; never touches the broker.
///
/// # Errors
///
/// Returns [`SyncError::Store`] if a storage read fails. Spectator
/// degradation is not an error: personal section producers return empty
/// payloads for anonymous actors.
pub async fn build_snapshot<S: StateReader>(
    store: &S,
    actor: &Actor,
    realm: RealmId,
    options: RequestOptions,
    filter: &SectionFilter,
) -> Result<Snapshot, SyncError> {
    let owner = actor.user_id();
    let mut snapshot = Snapshot::new(realm, owner);

    // The roster is fetched once and shared between the roster section,
    // the bots gate, and the capability derivation, all of which need the
    // actor's CURRENT role (the session profile may be stale by the time
    // a rebuild runs).
    let needs_roster = filter.includes(SectionKey::RealmUsers)
        || (owner.is_some()
            && (filter.includes(SectionKey::RealmBots)
                || filter.includes(SectionKey::Capabilities)));
    let users = if needs_roster {
        Some(store.users(realm).await?)
    } else {
        None
    };
    let effective_role: Option<Role> = owner
        .and_then(|me| {
            users
                .as_ref()
                .and_then(|list| list.iter().find(|entry| entry.user_id == me))
                .map(|entry| entry.role)
        })
        .or_else(|| actor.role());
    snapshot.owner_role = effective_role;

    let needs_settings =
        filter.includes(SectionKey::RealmSettings) || filter.includes(SectionKey::Capabilities);
    let settings = if needs_settings {
        let mut map = store.realm_settings(realm).await?;
        apply_plan_type_derivations(&mut map);
        Some(map)
    } else {
        None
    };

    for key in SectionKey::ALL {
        if !filter.includes(key) {
            continue;
        }
        match key {
            SectionKey::MaxMessageId => {
                snapshot.max_message_id = Some(store.max_message_id(realm, owner).await?);
            }
            SectionKey::RealmSettings => {
                snapshot.realm_settings.clone_from(&settings);
            }
            SectionKey::RealmUsers => {
                let mut roster = BTreeMap::new();
                if let Some(list) = &users {
                    for entry in list {
                        let mut entry = entry.clone();
                        normalize_avatar(&mut entry, options);
                        roster.insert(entry.user_id, entry);
                    }
                }
                snapshot.roster = Some(RosterState::Raw(roster));
            }
            SectionKey::RealmBots => {
                // Bots are administrator-only; everyone else holds the
                // section empty so a later role change can repopulate it.
                let bots = if effective_role.is_some_and(Role::is_admin) {
                    store.bots(realm).await?
                } else {
                    Vec::new()
                };
                snapshot.realm_bots = Some(bots);
            }
            SectionKey::Streams => {
                if options.include_streams {
                    snapshot.streams = Some(store.streams(realm, owner).await?);
                }
            }
            SectionKey::Subscriptions => {
                snapshot.subscriptions =
                    Some(build_subscriptions(store, realm, owner, options).await?);
            }
            SectionKey::UserGroups => {
                snapshot.user_groups = Some(store.user_groups(realm).await?);
            }
            SectionKey::CustomProfileFields => {
                snapshot.custom_profile_fields = Some(store.custom_profile_fields(realm).await?);
            }
            SectionKey::Presence => {
                let mut shaped = BTreeMap::new();
                if owner.is_some() {
                    for (user_id, clients) in store.presence(realm).await? {
                        if options.slim_presence {
                            if let Some(aggregated) = latest_presence(&clients) {
                                shaped.insert(user_id, UserPresence::Aggregated(aggregated));
                            }
                        } else if !clients.is_empty() {
                            shaped.insert(user_id, UserPresence::ByClient(clients));
                        }
                    }
                }
                snapshot.presence = Some(shaped);
            }
            SectionKey::Drafts => {
                snapshot.drafts = Some(match owner {
                    Some(me) => store.drafts(realm, me).await?,
                    None => Vec::new(),
                });
            }
            SectionKey::UnreadMessages => {
                let raw = match owner {
                    Some(me) => store.unread_messages(realm, me).await?,
                    None => BTreeMap::new(),
                };
                snapshot.unread = Some(UnreadState::Raw(raw));
            }
            SectionKey::StarredMessages => {
                snapshot.starred_messages = Some(match owner {
                    Some(me) => store.starred_messages(realm, me).await?,
                    None => BTreeSet::new(),
                });
            }
            SectionKey::AlertWords => {
                snapshot.alert_words = Some(match owner {
                    Some(me) => store.alert_words(realm, me).await?,
                    None => Vec::new(),
                });
            }
            SectionKey::MutedTopics => {
                snapshot.muted_topics = Some(match owner {
                    Some(me) => store.muted_topics(realm, me).await?,
                    None => Vec::new(),
                });
            }
            SectionKey::MutedUsers => {
                snapshot.muted_users = Some(match owner {
                    Some(me) => store.muted_users(realm, me).await?,
                    None => Vec::new(),
                });
            }
            SectionKey::RecentPrivateConversations => {
                let raw = match owner {
                    Some(me) => store.recent_private_conversations(realm, me).await?,
                    None => BTreeMap::new(),
                };
                snapshot.recent_dms = Some(RecentDmState::Raw(raw));
            }
            SectionKey::Capabilities => {
                snapshot.capabilities =
                    Some(compute_capabilities(effective_role, settings.as_ref()));
            }
        }
    }

    debug!(%realm, owner = ?owner, "built snapshot");
    Ok(snapshot)
}

/// Produce the three subscription lists.
///
/// The subscribed and unsubscribed lists come from storage; the
/// never-subscribed list is derived as "visible streams with no entry in
/// either". Subscriber lists are injected only when the session opted in.
async fn build_subscriptions<S: StateReader>(
    store: &S,
    realm: RealmId,
    owner: Option<UserId>,
    options: RequestOptions,
) -> Result<SubscriptionSections, SyncError> {
    let mut sections = SubscriptionSections::default();
    let mut known: BTreeSet<StreamId> = BTreeSet::new();

    if let Some(me) = owner {
        let sets = store.subscriptions(realm, me).await?;
        sections.subscribed = sets.subscribed;
        sections.unsubscribed = sets.unsubscribed;
        for entry in sections.subscribed.iter().chain(&sections.unsubscribed) {
            known.insert(entry.stream_id);
        }
    }

    let visible = store.streams(realm, owner).await?;
    let traffic = store.stream_traffic(realm).await?;
    let subscriber_sets = if options.include_subscribers {
        Some(store.stream_subscribers(realm).await?)
    } else {
        None
    };

    for stream in &visible {
        if known.contains(&stream.stream_id) {
            continue;
        }
        let subscribers = subscriber_sets.as_ref().map(|sets| {
            sets.get(&stream.stream_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        });
        sections.never_subscribed.push(never_subscribed_entry(
            stream,
            traffic.get(&stream.stream_id).copied(),
            subscribers,
        ));
    }

    if let Some(sets) = &subscriber_sets {
        for list in [&mut sections.subscribed, &mut sections.unsubscribed] {
            for entry in list {
                entry.subscribers = Some(
                    sets.get(&entry.stream_id)
                        .map(|set| set.iter().copied().collect())
                        .unwrap_or_default(),
                );
            }
        }
    }

    Ok(sections)
}
