//! Core data structures: actors, snapshot section entries, and the
//! wire shapes the client receives.
//!
//! Entry types here appear both in freshly built snapshots and in event
//! payloads, so incremental application can insert them verbatim.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AvatarSource, PresenceStatus, Role};
use crate::ids::{CustomFieldId, DraftId, GroupId, MessageId, StreamId, UserId};

/// The viewer a snapshot and session are computed for.
///
/// Immutable for the duration of one synchronization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// An authenticated account.
    User(UserProfile),
    /// An anonymous viewer restricted to public data. Spectators get a
    /// snapshot only, never a live event queue.
    Spectator,
}

impl Actor {
    /// The account's user id, or `None` for a spectator.
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(profile) => Some(profile.user_id),
            Self::Spectator => None,
        }
    }

    /// The account's role, or `None` for a spectator.
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::User(profile) => Some(profile.role),
            Self::Spectator => None,
        }
    }
}

/// The identity facts a session needs about its authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserProfile {
    /// The account's user id.
    pub user_id: UserId,
    /// The account's realm role.
    pub role: Role,
    /// Whether the account is a bot.
    pub is_bot: bool,
}

/// One entry in the user roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserEntry {
    /// The user's id.
    pub user_id: UserId,
    /// Display name.
    pub full_name: String,
    /// Account email address.
    pub email: String,
    /// Where the avatar image comes from.
    pub avatar_source: AvatarSource,
    /// Server-computed avatar URL. Omitted when the session opted into
    /// client-side gravatar computation and the source is gravatar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Realm role.
    pub role: Role,
    /// Whether this account is a bot.
    pub is_bot: bool,
    /// Whether the account is active. Present in the raw roster form;
    /// stripped at finalization, where list membership implies it.
    pub is_active: bool,
    /// When the account was created.
    pub date_joined: DateTime<Utc>,
}

/// One entry in the administrator-only bots section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BotEntry {
    /// The bot's user id.
    pub user_id: UserId,
    /// Display name.
    pub full_name: String,
    /// The user who owns the bot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    /// Whether the bot account is active.
    pub is_active: bool,
}

/// One entry in the streams section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StreamEntry {
    /// The stream's id.
    pub stream_id: StreamId,
    /// The stream's name.
    pub name: String,
    /// The stream's description.
    pub description: String,
    /// Whether the stream is invite-only (private).
    pub invite_only: bool,
    /// The id of the first message sent to the stream, `None` while the
    /// stream has no messages yet. Backfilled by message-sent events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message_id: Option<MessageId>,
    /// Message retention period in days, `None` for the realm default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_retention_days: Option<u32>,
    /// When the stream was created.
    pub date_created: DateTime<Utc>,
}

/// Structured per-stream notification settings on a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubscriptionNotifications {
    /// Send email notifications for this stream.
    pub email: bool,
    /// Send mobile push notifications for this stream.
    pub push: bool,
    /// Play a sound for this stream.
    pub audible: bool,
    /// Show desktop notifications for this stream.
    pub desktop: bool,
}

/// One entry in the subscribed / unsubscribed / never-subscribed lists.
///
/// Entries in the unsubscribed and never-subscribed lists carry default
/// values for the personal fields (color, muting, notifications).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubscriptionEntry {
    /// The stream's id. Entries are keyed by this across all three lists.
    pub stream_id: StreamId,
    /// The stream's name. Kept in lockstep with the streams section on
    /// stream renames.
    pub name: String,
    /// The stream's description.
    pub description: String,
    /// Whether the stream is invite-only.
    pub invite_only: bool,
    /// The actor's display color for the stream.
    pub color: String,
    /// Whether the actor muted the stream.
    pub is_muted: bool,
    /// Whether the actor pinned the stream to the top of their list.
    pub pin_to_top: bool,
    /// The id of the first message in the stream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message_id: Option<MessageId>,
    /// Average messages per week, `None` for streams too new to have a
    /// meaningful figure.
    pub stream_weekly_traffic: Option<u32>,
    /// User ids subscribed to the stream. Present only when the session
    /// requested subscriber data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers: Option<Vec<UserId>>,
    /// Structured notification settings.
    pub notification_settings: SubscriptionNotifications,
    /// Legacy flat field synthesized at finalization for sessions that do
    /// not understand the structured form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desktop_notifications: Option<bool>,
    /// Legacy flat field, see `desktop_notifications`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audible_notifications: Option<bool>,
    /// Legacy flat field, see `desktop_notifications`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_notifications: Option<bool>,
}

/// The recipient of a message, as carried on message events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MessageRecipient {
    /// A stream message addressed to a topic.
    Stream {
        /// The destination stream.
        stream_id: StreamId,
        /// The destination topic within the stream.
        topic: String,
    },
    /// A direct message.
    Direct {
        /// All participants, sender included.
        user_ids: Vec<UserId>,
    },
}

/// One entry in the finalized recent-conversations list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RecentDmEntry {
    /// Canonical participant list: the other participants of the
    /// conversation, sorted ascending (the actor's own id appears only
    /// for a conversation with themself).
    pub user_ids: Vec<UserId>,
    /// The highest message id seen in the conversation.
    pub max_message_id: MessageId,
}

/// What the unread index knows about one unread message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnreadMessageInfo {
    /// Where the message was sent.
    pub recipient: MessageRecipient,
    /// Whether the message mentions the actor.
    pub mentioned: bool,
}

/// Per-conversation bucket of unread direct messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnreadDmBucket {
    /// Canonical participant list, as in [`RecentDmEntry`].
    pub user_ids: Vec<UserId>,
    /// Unread message ids, ascending.
    pub message_ids: Vec<MessageId>,
}

/// Per-topic bucket of unread stream messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnreadStreamBucket {
    /// The stream the messages were sent to.
    pub stream_id: StreamId,
    /// The topic the messages were sent to.
    pub topic: String,
    /// Unread message ids, ascending.
    pub unread_message_ids: Vec<MessageId>,
}

/// The aggregated, client-ready unread summary produced at finalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnreadSummary {
    /// Total number of unread messages.
    pub count: u64,
    /// Unread direct messages, bucketed per conversation and sorted by
    /// canonical participant list.
    pub dms: Vec<UnreadDmBucket>,
    /// Unread stream messages, bucketed per (stream, topic) and sorted
    /// by stream id then topic.
    pub streams: Vec<UnreadStreamBucket>,
    /// Ids of unread messages that mention the actor, ascending.
    pub mentions: Vec<MessageId>,
}

/// Presence as reported by one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ClientPresence {
    /// The reported status.
    pub status: PresenceStatus,
    /// When the client last reported.
    pub timestamp: DateTime<Utc>,
}

/// Presence for one user, in one of the two session-selectable shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum UserPresence {
    /// The compact shape: a single aggregated status across clients.
    Aggregated(ClientPresence),
    /// The full shape: status per client name.
    ByClient(BTreeMap<String, ClientPresence>),
}

/// A saved message draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Draft {
    /// The draft's id.
    pub id: DraftId,
    /// Where the draft would be sent.
    pub recipient: MessageRecipient,
    /// Draft body text.
    pub content: String,
    /// When the draft was last edited.
    pub timestamp: DateTime<Utc>,
}

/// A custom profile field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CustomProfileField {
    /// The field's id.
    pub id: CustomFieldId,
    /// Display name of the field.
    pub name: String,
    /// Hint text shown when editing the field.
    pub hint: String,
    /// Display ordering among fields, ascending.
    pub order: u32,
}

/// A user group and its membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserGroup {
    /// The group's id.
    pub group_id: GroupId,
    /// The group's name.
    pub name: String,
    /// The group's description.
    pub description: String,
    /// Member user ids.
    pub members: BTreeSet<UserId>,
}

/// A topic the actor has muted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MutedTopic {
    /// The stream containing the topic.
    pub stream_id: StreamId,
    /// The muted topic name.
    pub topic: String,
}

/// A user the actor has muted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MutedUser {
    /// The muted user's id.
    pub user_id: UserId,
    /// When the mute was applied.
    pub timestamp: DateTime<Utc>,
}

/// Capability booleans derived from the actor's role and realm policy.
///
/// Recomputed by the applier when the actor's own role changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[allow(clippy::struct_excessive_bools)]
pub struct CapabilityFlags {
    /// The actor is a realm administrator (or owner).
    pub is_admin: bool,
    /// The actor is the realm owner.
    pub is_owner: bool,
    /// The actor has moderation rights.
    pub is_moderator: bool,
    /// The actor is a guest.
    pub is_guest: bool,
    /// The actor may create streams.
    pub can_create_streams: bool,
    /// The actor may subscribe other users to streams.
    pub can_subscribe_other_users: bool,
    /// The actor may invite new users to the realm.
    pub can_invite_others_to_realm: bool,
}

/// Canonicalize a direct-message participant list for use as a
/// conversation key: the other participants sorted ascending, keeping
/// the actor's own id only for a conversation with themself.
pub fn canonical_dm_key(participants: &[UserId], actor: UserId) -> Vec<UserId> {
    let mut others: Vec<UserId> = participants
        .iter()
        .copied()
        .filter(|&id| id != actor)
        .collect();
    if others.is_empty() {
        // A message to yourself.
        others.push(actor);
    }
    others.sort_unstable();
    others.dedup();
    others
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_key_excludes_self_and_sorts() {
        let me = UserId::new(5);
        let key = canonical_dm_key(&[UserId::new(9), me, UserId::new(2)], me);
        assert_eq!(key, vec![UserId::new(2), UserId::new(9)]);
    }

    #[test]
    fn dm_key_self_conversation() {
        let me = UserId::new(5);
        assert_eq!(canonical_dm_key(&[me], me), vec![me]);
    }

    #[test]
    fn spectator_has_no_identity() {
        assert_eq!(Actor::Spectator.user_id(), None);
        assert_eq!(Actor::Spectator.role(), None);
    }
}
