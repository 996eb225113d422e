//! The read-only accessor trait over authoritative storage.
//!
//! The synchronization engine never writes to authoritative storage; it
//! reads full sections at snapshot-build time and performs two narrow
//! recomputes during event application (current maximum message id and
//! current recent-conversation set, both needed after a deletion).
//!
//! Implementations are expected to return self-consistent data per call;
//! cross-call consistency is the driver's problem and is handled by the
//! queue-registration-before-build ordering.

use std::collections::{BTreeMap, BTreeSet};

use parley_types::{
    BotEntry, ClientPresence, CustomProfileField, Draft, MessageId, MutedTopic, MutedUser,
    RealmId, StreamEntry, StreamId, SubscriptionEntry, UnreadMessageInfo, UserEntry, UserGroup,
    UserId,
};

use crate::error::StoreError;

/// The actor's subscription state as stored: entries for streams they are
/// subscribed to and entries for streams they once were subscribed to.
///
/// The never-subscribed list is not stored; the snapshot builder derives
/// it from the visible-streams set.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSets {
    /// Streams the actor is currently subscribed to.
    pub subscribed: Vec<SubscriptionEntry>,
    /// Streams the actor was subscribed to and left.
    pub unsubscribed: Vec<SubscriptionEntry>,
}

/// Read accessors over authoritative storage, one per snapshot section
/// plus the narrow per-event recompute needs.
#[allow(async_fn_in_trait)]
pub trait StateReader {
    /// The highest message id visible to the given user, or
    /// [`MessageId::NONE`] if they can see no messages. `None` queries
    /// the realm-wide public maximum (the spectator view).
    async fn max_message_id(
        &self,
        realm: RealmId,
        user_id: Option<UserId>,
    ) -> Result<MessageId, StoreError>;

    /// All realm-level settings, keyed by bare property name.
    async fn realm_settings(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<String, serde_json::Value>, StoreError>;

    /// The full user roster, active and deactivated accounts included.
    async fn users(&self, realm: RealmId) -> Result<Vec<UserEntry>, StoreError>;

    /// All bots in the realm.
    async fn bots(&self, realm: RealmId) -> Result<Vec<BotEntry>, StoreError>;

    /// All streams visible to the given user (public streams plus private
    /// streams they are subscribed to). `None` is the spectator view:
    /// public streams only.
    async fn streams(
        &self,
        realm: RealmId,
        user_id: Option<UserId>,
    ) -> Result<Vec<StreamEntry>, StoreError>;

    /// Subscriber sets for every stream in the realm.
    async fn stream_subscribers(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<StreamId, BTreeSet<UserId>>, StoreError>;

    /// Average messages per week for streams old enough to have a figure.
    async fn stream_traffic(&self, realm: RealmId)
    -> Result<BTreeMap<StreamId, u32>, StoreError>;

    /// The user's stored subscription entries.
    async fn subscriptions(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<SubscriptionSets, StoreError>;

    /// All user groups in the realm.
    async fn user_groups(&self, realm: RealmId) -> Result<Vec<UserGroup>, StoreError>;

    /// The custom profile field catalog.
    async fn custom_profile_fields(
        &self,
        realm: RealmId,
    ) -> Result<Vec<CustomProfileField>, StoreError>;

    /// Raw per-client presence for every user with presence data.
    async fn presence(
        &self,
        realm: RealmId,
    ) -> Result<BTreeMap<UserId, BTreeMap<String, ClientPresence>>, StoreError>;

    /// The user's saved drafts.
    async fn drafts(&self, realm: RealmId, user_id: UserId) -> Result<Vec<Draft>, StoreError>;

    /// The user's unread-message index in raw form.
    async fn unread_messages(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeMap<MessageId, UnreadMessageInfo>, StoreError>;

    /// Ids of messages the user has starred.
    async fn starred_messages(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeSet<MessageId>, StoreError>;

    /// The user's alert words.
    async fn alert_words(&self, realm: RealmId, user_id: UserId)
    -> Result<Vec<String>, StoreError>;

    /// Topics the user has muted.
    async fn muted_topics(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<Vec<MutedTopic>, StoreError>;

    /// Users the user has muted.
    async fn muted_users(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<Vec<MutedUser>, StoreError>;

    /// The user's recent direct-message conversations in raw form:
    /// canonical participant list to highest message id seen.
    async fn recent_private_conversations(
        &self,
        realm: RealmId,
        user_id: UserId,
    ) -> Result<BTreeMap<Vec<UserId>, MessageId>, StoreError>;
}
