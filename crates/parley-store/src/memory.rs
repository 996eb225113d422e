//! In-memory authoritative store.
//!
//! The production deployment backs authoritative state with a durable
//! multi-tenant database; that engine is out of scope here. This
//! implementation keeps everything under a [`tokio::sync::RwLock`] and
//! exists for tests, local runs, and as the reference for the
//! [`StateReader`] contract.
//!
//! Mutators double as a minimal write path: each one applies the change
//! and returns the [`EventData`] the real write path would emit for it,
//! so equivalence tests can feed the applier exactly what storage saw.
//! Mutations whose event shape depends on the receiving session (joining
//! a stream is `subscription_added` for the joiner but a peer event for
//! everyone else) take the observing session's user id.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::RwLock;

use parley_types::{
    BotEntry, ClientPresence, CustomProfileField, Draft, DraftId, EventData, GroupId, MessageId,
    MessageRecipient, MutedTopic, MutedUser, RealmId, StreamEntry, StreamId, StreamProperty,
    SubscriptionEntry, SubscriptionNotifications, UnreadMessageInfo, UserEntry, UserGroup, UserId,
    UserPatch, canonical_dm_key,
};

use crate::error::StoreError;
use crate::reader::{StateReader, SubscriptionSets};

/// Default display color assigned to new subscriptions.
const DEFAULT_STREAM_COLOR: &str = "#c2c2c2";

/// One stored message: the facts the engine's narrow recomputes need.
/// Bodies are never materialized in snapshots, so none are stored.
#[derive(Debug, Clone)]
struct StoredMessage {
    sender_id: UserId,
    recipient: MessageRecipient,
}

/// The personal fields of one subscription.
#[derive(Debug, Clone)]
struct PersonalSub {
    color: String,
    is_muted: bool,
    pin_to_top: bool,
    notifications: SubscriptionNotifications,
}

impl Default for PersonalSub {
    fn default() -> Self {
        Self {
            color: DEFAULT_STREAM_COLOR.to_owned(),
            is_muted: false,
            pin_to_top: false,
            notifications: SubscriptionNotifications::default(),
        }
    }
}

/// Per-user personal state.
#[derive(Debug, Clone, Default)]
struct PersonalState {
    subscriptions: BTreeMap<StreamId, PersonalSub>,
    unsubscribed: BTreeMap<StreamId, PersonalSub>,
    drafts: BTreeMap<DraftId, Draft>,
    unread: BTreeMap<MessageId, UnreadMessageInfo>,
    starred: BTreeSet<MessageId>,
    alert_words: Vec<String>,
    muted_topics: Vec<MutedTopic>,
    muted_users: Vec<MutedUser>,
}

/// Everything one realm stores.
#[derive(Debug, Clone, Default)]
struct RealmState {
    settings: BTreeMap<String, serde_json::Value>,
    users: BTreeMap<UserId, UserEntry>,
    bots: BTreeMap<UserId, BotEntry>,
    streams: BTreeMap<StreamId, StreamEntry>,
    subscribers: BTreeMap<StreamId, BTreeSet<UserId>>,
    traffic: BTreeMap<StreamId, u32>,
    groups: BTreeMap<GroupId, UserGroup>,
    custom_fields: Vec<CustomProfileField>,
    presence: BTreeMap<UserId, BTreeMap<String, ClientPresence>>,
    personal: BTreeMap<UserId, PersonalState>,
    messages: BTreeMap<MessageId, StoredMessage>,
    next_message_id: i64,
    next_stream_id: i64,
}

impl RealmState {
    /// Whether `user_id` can see the given message.
    fn message_visible(&self, message: &StoredMessage, user_id: Option<UserId>) -> bool {
        match (&message.recipient, user_id) {
            (MessageRecipient::Stream { stream_id, .. }, Some(user)) => self
                .streams
                .get(stream_id)
                .is_some_and(|stream| {
                    !stream.invite_only
                        || self
                            .subscribers
                            .get(stream_id)
                            .is_some_and(|subs| subs.contains(&user))
                }),
            (MessageRecipient::Stream { stream_id, .. }, None) => self
                .streams
                .get(stream_id)
                .is_some_and(|stream| !stream.invite_only),
            (MessageRecipient::Direct { user_ids }, Some(user)) => user_ids.contains(&user),
            (MessageRecipient::Direct { .. }, None) => false,
        }
    }
}

/// The in-memory [`StateReader`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    realms: RwLock<BTreeMap<RealmId, RealmState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a realm with the given settings.
    pub async fn create_realm(
        &self,
        realm: RealmId,
        settings: BTreeMap<String, serde_json::Value>,
    ) {
        let mut realms = self.realms.write().await;
        let state = realms.entry(realm).or_default();
        state.settings = settings;
        state.next_message_id = 1;
        state.next_stream_id = 1;
        tracing::debug!(%realm, "created realm");
    }

    /// Add a user to the realm's roster.
    pub async fn add_user(
        &self,
        realm: RealmId,
        entry: UserEntry,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state.personal.entry(entry.user_id).or_default();
        state.users.insert(entry.user_id, entry.clone());
        Ok(EventData::RealmUserAdded { person: entry })
    }

    /// Patch a roster entry field-by-field.
    pub async fn update_user(
        &self,
        realm: RealmId,
        patch: UserPatch,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let entry = state
            .users
            .get_mut(&patch.user_id)
            .ok_or(StoreError::UnknownUser {
                realm,
                user_id: patch.user_id,
            })?;
        if let Some(full_name) = &patch.full_name {
            entry.full_name.clone_from(full_name);
        }
        if let Some(email) = &patch.email {
            entry.email.clone_from(email);
        }
        if let Some(avatar_url) = &patch.avatar_url {
            entry.avatar_url = Some(avatar_url.clone());
        }
        if let Some(role) = patch.role {
            entry.role = role;
        }
        if let Some(is_active) = patch.is_active {
            entry.is_active = is_active;
        }
        Ok(EventData::RealmUserUpdated { person: patch })
    }

    /// Add a bot to the realm.
    pub async fn add_bot(&self, realm: RealmId, bot: BotEntry) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state.bots.insert(bot.user_id, bot.clone());
        Ok(EventData::RealmBotAdded { bot })
    }

    /// Change one realm-level setting.
    pub async fn set_realm_setting(
        &self,
        realm: RealmId,
        property: &str,
        value: serde_json::Value,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state.settings.insert(property.to_owned(), value.clone());
        Ok(EventData::RealmSettingUpdated {
            property: property.to_owned(),
            value,
        })
    }

    /// Create a stream with no subscribers.
    pub async fn create_stream(
        &self,
        realm: RealmId,
        name: &str,
        description: &str,
        invite_only: bool,
    ) -> Result<(StreamId, EventData), StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let stream_id = StreamId::new(state.next_stream_id);
        state.next_stream_id = state.next_stream_id.saturating_add(1);
        let entry = StreamEntry {
            stream_id,
            name: name.to_owned(),
            description: description.to_owned(),
            invite_only,
            first_message_id: None,
            message_retention_days: None,
            date_created: chrono::Utc::now(),
        };
        state.streams.insert(stream_id, entry.clone());
        state.subscribers.insert(stream_id, BTreeSet::new());
        tracing::debug!(%realm, %stream_id, name, "created stream");
        Ok((
            stream_id,
            EventData::StreamCreated {
                streams: vec![entry],
            },
        ))
    }

    /// Change one property of a stream.
    pub async fn update_stream(
        &self,
        realm: RealmId,
        stream_id: StreamId,
        property: StreamProperty,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        if let Some(entry) = state.streams.get_mut(&stream_id) {
            match &property {
                StreamProperty::Name(name) => entry.name.clone_from(name),
                StreamProperty::Description(description) => {
                    entry.description.clone_from(description);
                }
                StreamProperty::InviteOnly(invite_only) => entry.invite_only = *invite_only,
                StreamProperty::MessageRetentionDays(days) => {
                    entry.message_retention_days = *days;
                }
            }
        }
        Ok(EventData::StreamUpdated {
            stream_id,
            property,
        })
    }

    /// Subscribe a user to a stream.
    ///
    /// `viewer` is the session the returned event is scoped for: the
    /// joiner receives a full `subscription_added`, everyone else a
    /// peer event.
    pub async fn subscribe(
        &self,
        realm: RealmId,
        user_id: UserId,
        stream_id: StreamId,
        viewer: Option<UserId>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state
            .subscribers
            .entry(stream_id)
            .or_default()
            .insert(user_id);
        let personal = state.personal.entry(user_id).or_default();
        let sub = personal
            .unsubscribed
            .remove(&stream_id)
            .unwrap_or_default();
        personal.subscriptions.insert(stream_id, sub);

        if viewer == Some(user_id) {
            let stream = state
                .streams
                .get(&stream_id)
                .cloned()
                .ok_or(StoreError::Backend {
                    message: format!("subscribe to unknown stream {stream_id}"),
                })?;
            let subscribers: Vec<UserId> = state
                .subscribers
                .get(&stream_id)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default();
            let personal_sub = state
                .personal
                .get(&user_id)
                .and_then(|p| p.subscriptions.get(&stream_id).cloned())
                .unwrap_or_default();
            let traffic = state.traffic.get(&stream_id).copied();
            let entry = subscription_entry(&stream, &personal_sub, traffic, Some(subscribers));
            Ok(EventData::SubscriptionAdded {
                subscriptions: vec![entry],
            })
        } else {
            Ok(EventData::SubscriptionPeerAdded {
                stream_ids: vec![stream_id],
                user_ids: vec![user_id],
            })
        }
    }

    /// Unsubscribe a user from a stream. Event scoping as in
    /// [`Self::subscribe`].
    pub async fn unsubscribe(
        &self,
        realm: RealmId,
        user_id: UserId,
        stream_id: StreamId,
        viewer: Option<UserId>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        if let Some(subs) = state.subscribers.get_mut(&stream_id) {
            subs.remove(&user_id);
        }
        if let Some(personal) = state.personal.get_mut(&user_id)
            && let Some(sub) = personal.subscriptions.remove(&stream_id)
        {
            personal.unsubscribed.insert(stream_id, sub);
        }
        if viewer == Some(user_id) {
            Ok(EventData::SubscriptionRemoved {
                stream_ids: vec![stream_id],
            })
        } else {
            Ok(EventData::SubscriptionPeerRemoved {
                stream_ids: vec![stream_id],
                user_ids: vec![user_id],
            })
        }
    }

    /// Send a message, updating first-message bookkeeping and every
    /// recipient's unread index.
    pub async fn send_message(
        &self,
        realm: RealmId,
        sender_id: UserId,
        recipient: MessageRecipient,
    ) -> Result<(MessageId, EventData), StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let message_id = MessageId::new(state.next_message_id);
        state.next_message_id = state.next_message_id.saturating_add(1);

        let info = UnreadMessageInfo {
            recipient: recipient.clone(),
            mentioned: false,
        };
        match &recipient {
            MessageRecipient::Stream { stream_id, .. } => {
                if let Some(stream) = state.streams.get_mut(stream_id)
                    && stream.first_message_id.is_none()
                {
                    stream.first_message_id = Some(message_id);
                }
                let readers: Vec<UserId> = state
                    .subscribers
                    .get(stream_id)
                    .map(|subs| subs.iter().copied().collect())
                    .unwrap_or_default();
                for reader in readers {
                    if reader != sender_id {
                        state
                            .personal
                            .entry(reader)
                            .or_default()
                            .unread
                            .insert(message_id, info.clone());
                    }
                }
            }
            MessageRecipient::Direct { user_ids } => {
                for &reader in user_ids {
                    if reader != sender_id {
                        state
                            .personal
                            .entry(reader)
                            .or_default()
                            .unread
                            .insert(message_id, info.clone());
                    }
                }
            }
        }
        state.messages.insert(
            message_id,
            StoredMessage {
                sender_id,
                recipient: recipient.clone(),
            },
        );
        Ok((
            message_id,
            EventData::MessageSent {
                message_id,
                sender_id,
                recipient,
            },
        ))
    }

    /// Delete a message, removing it from every unread index and star set.
    pub async fn delete_message(
        &self,
        realm: RealmId,
        message_id: MessageId,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let stored = state
            .messages
            .remove(&message_id)
            .ok_or(StoreError::Backend {
                message: format!("delete of unknown message {message_id}"),
            })?;
        for personal in state.personal.values_mut() {
            personal.unread.remove(&message_id);
            personal.starred.remove(&message_id);
        }
        Ok(EventData::MessageDeleted {
            message_id,
            recipient: stored.recipient,
        })
    }

    /// Mark messages read for a user.
    pub async fn mark_read(
        &self,
        realm: RealmId,
        user_id: UserId,
        messages: Vec<MessageId>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let personal = state.personal.entry(user_id).or_default();
        for id in &messages {
            personal.unread.remove(id);
        }
        Ok(EventData::MessageFlagsAdded {
            flag: parley_types::MessageFlag::Read,
            messages,
        })
    }

    /// Star messages for a user.
    pub async fn star(
        &self,
        realm: RealmId,
        user_id: UserId,
        messages: Vec<MessageId>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        let personal = state.personal.entry(user_id).or_default();
        personal.starred.extend(messages.iter().copied());
        Ok(EventData::MessageFlagsAdded {
            flag: parley_types::MessageFlag::Starred,
            messages,
        })
    }

    /// Replace a user's alert words.
    pub async fn set_alert_words(
        &self,
        realm: RealmId,
        user_id: UserId,
        alert_words: Vec<String>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state
            .personal
            .entry(user_id)
            .or_default()
            .alert_words
            .clone_from(&alert_words);
        Ok(EventData::AlertWordsUpdated { alert_words })
    }

    /// Create a user group.
    pub async fn add_user_group(
        &self,
        realm: RealmId,
        group: UserGroup,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state.groups.insert(group.group_id, group.clone());
        Ok(EventData::UserGroupAdded { group })
    }

    /// Add members to a user group.
    pub async fn add_group_members(
        &self,
        realm: RealmId,
        group_id: GroupId,
        user_ids: Vec<UserId>,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.members.extend(user_ids.iter().copied());
        }
        Ok(EventData::UserGroupMembersAdded { group_id, user_ids })
    }

    /// Record presence for one of a user's clients.
    pub async fn update_presence(
        &self,
        realm: RealmId,
        user_id: UserId,
        client: &str,
        presence: ClientPresence,
    ) -> Result<EventData, StoreError> {
        let mut realms = self.realms.write().await;
        let state = realm_mut(&mut realms, realm)?;
        state
            .presence
            .entry(user_id)
            .or_default()
            .insert(client.to_owned(), presence.clone());
        Ok(EventData::PresenceUpdated {
            user_id,
            client: client.to_owned(),
            presence,
        })
    }
}

/// Look up a realm for mutation.
fn realm_mut(
    realms: &mut BTreeMap<RealmId, RealmState>,
    realm: RealmId,
) -> Result<&mut RealmState, StoreError> {
    realms
        .get_mut(&realm)
        .ok_or(StoreError::UnknownRealm { realm })
}

/// Build a subscription entry from its stream, personal, and traffic parts.
fn subscription_entry(
    stream: &StreamEntry,
    personal: &PersonalSub,
    traffic: Option<u32>,
    subscribers: Option<Vec<UserId>>,
) -> SubscriptionEntry {
    SubscriptionEntry {
        stream_id: stream.stream_id,
        name: stream.name.clone(),
        description: stream.description.clone(),
        invite_only: stream.invite_only,
        color: personal.color.clone(),
        is_muted: personal.is_muted,
        pin_to_top: personal.pin_to_top,
        first_message_id: stream.first_message_id,
        stream_weekly_traffic: traffic,
        subscribers,
        notification_settings: personal.notifications,
        desktop_notifications: None,
        audible_notifications: None,
        push_notifications: None,
    }
}

impl StateReader for MemoryStore {
    async fn max_message_id(
        &self,
        realm: RealmId,
        user_id: Option<UserId>,
    ) -> Result<MessageId, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        let max = state
            .messages
            .iter()
            .filter(|(_, message)| state.message_visible(message, user_id))
            .map(|(&id, _)| id)
            .max()
            .unwrap_or(MessageId::NONE);
        Ok(max)
    }

    async fn realm_settings(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.settings.clone())
    }

    async fn users(&self, realm: RealmId) -> Result<Vec<UserEntry>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.users.values().cloned().collect())
    }

    async fn bots(&self, realm: RealmId) -> Result<Vec<BotEntry>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.bots.values().cloned().collect())
    }

    async fn streams(
        &self,
        realm: RealmId,
        user_id: Option<UserId>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        let visible = state
            .streams
            .values()
            .filter(|stream| {
                !stream.invite_only
                    || user_id.is_some_and(|user| {
                        state
                            .subscribers
                            .get(&stream.stream_id)
                            .is_some_and(|subs| subs.contains(&user))
                    })
            })
            .cloned()
            .collect();
        Ok(visible)
    }

    async fn stream_subscribers(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<StreamId, BTreeSet<UserId>>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.subscribers.clone())
    }

    async fn stream_traffic(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<StreamId, u32>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.traffic.clone())
    }

    async fn subscriptions(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<SubscriptionSets, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        let Some(personal) = state.personal.get(&user_id) else {
            return Ok(SubscriptionSets::default());
        };
        let mut sets = SubscriptionSets::default();
        for (stream_id, sub) in &personal.subscriptions {
            if let Some(stream) = state.streams.get(stream_id) {
                let traffic = state.traffic.get(stream_id).copied();
                sets.subscribed
                    .push(subscription_entry(stream, sub, traffic, None));
            }
        }
        for (stream_id, sub) in &personal.unsubscribed {
            if let Some(stream) = state.streams.get(stream_id) {
                let traffic = state.traffic.get(stream_id).copied();
                sets.unsubscribed
                    .push(subscription_entry(stream, sub, traffic, None));
            }
        }
        Ok(sets)
    }

    async fn user_groups(&self, realm: RealmId) -> Result<Vec<UserGroup>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.groups.values().cloned().collect())
    }

    async fn custom_profile_fields(
        &self,
        realm: RealmId,
    ) -> Result<Vec<CustomProfileField>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.custom_fields.clone())
    }

    async fn presence(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<UserId, BTreeMap<String, ClientPresence>>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state.presence.clone())
    }

    async fn drafts(&self, realm: RealmId, user_id: UserId) -> Result<Vec<Draft>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.drafts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn unread_messages(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeMap<MessageId, UnreadMessageInfo>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.unread.clone())
            .unwrap_or_default())
    }

    async fn starred_messages(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeSet<MessageId>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.starred.clone())
            .unwrap_or_default())
    }

    async fn alert_words(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<Vec<String>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.alert_words.clone())
            .unwrap_or_default())
    }

    async fn muted_topics(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<Vec<MutedTopic>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.muted_topics.clone())
            .unwrap_or_default())
    }

    async fn muted_users(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<Vec<MutedUser>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        Ok(state
            .personal
            .get(&user_id)
            .map(|p| p.muted_users.clone())
            .unwrap_or_default())
    }

    async fn recent_private_conversations(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeMap<Vec<UserId>, MessageId>, StoreError> {
        let realms = self.realms.read().await;
        let state = realms.get(&realm).ok_or(StoreError::UnknownRealm { realm })?;
        let mut conversations: BTreeMap<Vec<UserId>, MessageId> = BTreeMap::new();
        for (&message_id, message) in &state.messages {
            if let MessageRecipient::Direct { user_ids } = &message.recipient
                && user_ids.contains(&user_id)
            {
                let key = canonical_dm_key(user_ids, user_id);
                let entry = conversations.entry(key).or_insert(message_id);
                if message_id > *entry {
                    *entry = message_id;
                }
            }
        }
        Ok(conversations)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use parley_types::{AvatarSource, Role};

    use super::*;

    fn user(id: i64, role: Role) -> UserEntry {
        UserEntry {
            user_id: UserId::new(id),
            full_name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            avatar_source: AvatarSource::Upload,
            avatar_url: Some(format!("/avatars/{id}.png")),
            role,
            is_bot: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    #[tokio::test]
    async fn send_message_tracks_first_message_and_unread() {
        let store = MemoryStore::new();
        let realm = RealmId::new(1);
        store.create_realm(realm, BTreeMap::new()).await;
        store.add_user(realm, user(1, Role::Member)).await.unwrap();
        store.add_user(realm, user(2, Role::Member)).await.unwrap();
        let (stream_id, _) = store
            .create_stream(realm, "general", "", false)
            .await
            .unwrap();
        store
            .subscribe(realm, UserId::new(1), stream_id, None)
            .await
            .unwrap();
        store
            .subscribe(realm, UserId::new(2), stream_id, None)
            .await
            .unwrap();

        let (message_id, _) = store
            .send_message(
                realm,
                UserId::new(1),
                MessageRecipient::Stream {
                    stream_id,
                    topic: "hello".to_owned(),
                },
            )
            .await
            .unwrap();

        let streams = store.streams(realm, Some(UserId::new(1))).await.unwrap();
        assert_eq!(
            streams.first().unwrap().first_message_id,
            Some(message_id)
        );
        // Unread for the other subscriber, not the sender.
        assert!(store
            .unread_messages(realm, UserId::new(2))
            .await
            .unwrap()
            .contains_key(&message_id));
        assert!(store
            .unread_messages(realm, UserId::new(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_message_clears_indexes() {
        let store = MemoryStore::new();
        let realm = RealmId::new(1);
        store.create_realm(realm, BTreeMap::new()).await;
        store.add_user(realm, user(1, Role::Member)).await.unwrap();
        store.add_user(realm, user(2, Role::Member)).await.unwrap();
        let (message_id, _) = store
            .send_message(
                realm,
                UserId::new(1),
                MessageRecipient::Direct {
                    user_ids: vec![UserId::new(1), UserId::new(2)],
                },
            )
            .await
            .unwrap();
        store
            .star(realm, UserId::new(2), vec![message_id])
            .await
            .unwrap();

        store.delete_message(realm, message_id).await.unwrap();

        assert_eq!(
            store
                .max_message_id(realm, Some(UserId::new(2)))
                .await
                .unwrap(),
            MessageId::NONE
        );
        assert!(store
            .starred_messages(realm, UserId::new(2))
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .recent_private_conversations(realm, UserId::new(2))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn invite_only_streams_hidden_from_spectators() {
        let store = MemoryStore::new();
        let realm = RealmId::new(1);
        store.create_realm(realm, BTreeMap::new()).await;
        store.add_user(realm, user(1, Role::Member)).await.unwrap();
        store
            .create_stream(realm, "public", "", false)
            .await
            .unwrap();
        let (private_id, _) = store
            .create_stream(realm, "private", "", true)
            .await
            .unwrap();
        store
            .subscribe(realm, UserId::new(1), private_id, None)
            .await
            .unwrap();

        let spectator_view = store.streams(realm, None).await.unwrap();
        assert_eq!(spectator_view.len(), 1);
        let member_view = store.streams(realm, Some(UserId::new(1))).await.unwrap();
        assert_eq!(member_view.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_event_shape_depends_on_viewer() {
        let store = MemoryStore::new();
        let realm = RealmId::new(1);
        store.create_realm(realm, BTreeMap::new()).await;
        store.add_user(realm, user(1, Role::Member)).await.unwrap();
        store.add_user(realm, user(2, Role::Member)).await.unwrap();
        let (stream_id, _) = store
            .create_stream(realm, "general", "", false)
            .await
            .unwrap();

        let own = store
            .subscribe(realm, UserId::new(1), stream_id, Some(UserId::new(1)))
            .await
            .unwrap();
        assert!(matches!(own, EventData::SubscriptionAdded { .. }));

        let peer = store
            .subscribe(realm, UserId::new(2), stream_id, Some(UserId::new(1)))
            .await
            .unwrap();
        assert!(matches!(peer, EventData::SubscriptionPeerAdded { .. }));
    }
}
