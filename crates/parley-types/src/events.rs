//! The closed change-event taxonomy.
//!
//! Every mutation the write path can emit has exactly one variant here,
//! one per `(type, operation)` pair of the wire protocol. The applier
//! matches exhaustively, so taxonomy drift between event production and
//! event application is a compile error rather than a runtime assertion.
//!
//! Events are immutable and totally ordered per queue: the broker assigns
//! each delivered event an [`EventId`] in delivery order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::MessageFlag;
use crate::ids::{DraftId, EventId, GroupId, MessageId, StreamId, UserId};
use crate::sections::SectionKey;
use crate::structs::{
    BotEntry, ClientPresence, CustomProfileField, Draft, MessageRecipient, MutedTopic, MutedUser,
    StreamEntry, SubscriptionEntry, UnreadMessageInfo, UserEntry, UserGroup,
};

/// One ordered change event as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Delivery-order id assigned by the broker.
    pub id: EventId,
    /// The typed payload.
    #[serde(flatten)]
    pub data: EventData,
}

/// A single named property change on a subscription entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "property", content = "value", rename_all = "snake_case")]
pub enum SubscriptionProperty {
    /// Display color.
    Color(String),
    /// Stream muting.
    IsMuted(bool),
    /// Pin the stream to the top of the list.
    PinToTop(bool),
    /// Email notifications for the stream.
    EmailNotifications(bool),
    /// Push notifications for the stream.
    PushNotifications(bool),
    /// Audible notifications for the stream.
    AudibleNotifications(bool),
    /// Desktop notifications for the stream.
    DesktopNotifications(bool),
}

/// A single named property change on a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "property", content = "value", rename_all = "snake_case")]
pub enum StreamProperty {
    /// Rename the stream. Reflected in the streams section and all three
    /// subscription lists simultaneously.
    Name(String),
    /// Change the stream description.
    Description(String),
    /// Change the invite-only flag.
    InviteOnly(bool),
    /// Change the retention period (`None` restores the realm default).
    MessageRetentionDays(Option<u32>),
}

/// Field-by-field patch of a roster entry.
///
/// `None` fields are untouched. A role change on the session's own
/// account cascades into the derived capability section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserPatch {
    /// The user being patched.
    pub user_id: UserId,
    /// New display name, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// New email, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New avatar URL, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// New role, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<crate::enums::Role>,
    /// New activation state, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// The typed event payload, one variant per `(type, operation)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum EventData {
    /// A message was sent.
    MessageSent {
        /// The new message's id.
        message_id: MessageId,
        /// Who sent it.
        sender_id: UserId,
        /// Where it was sent.
        recipient: MessageRecipient,
    },
    /// A message was deleted.
    MessageDeleted {
        /// The deleted message's id.
        message_id: MessageId,
        /// Where the message had been sent.
        recipient: MessageRecipient,
    },
    /// A flag was added to a set of messages for the actor.
    MessageFlagsAdded {
        /// The flag that was set.
        flag: MessageFlag,
        /// The affected message ids.
        messages: Vec<MessageId>,
    },
    /// A flag was removed from a set of messages for the actor.
    MessageFlagsRemoved {
        /// The flag that was cleared.
        flag: MessageFlag,
        /// The affected message ids.
        messages: Vec<MessageId>,
        /// For the `Read` flag: what the unread index needs to know about
        /// each newly-unread message. Empty for other flags.
        message_info: BTreeMap<MessageId, UnreadMessageInfo>,
    },
    /// The actor was subscribed to one or more streams.
    SubscriptionAdded {
        /// Full entries for the new subscriptions.
        subscriptions: Vec<SubscriptionEntry>,
    },
    /// The actor was unsubscribed from one or more streams.
    SubscriptionRemoved {
        /// The affected stream ids.
        stream_ids: Vec<StreamId>,
    },
    /// One personal property changed on one of the actor's subscriptions.
    SubscriptionUpdated {
        /// The affected stream.
        stream_id: StreamId,
        /// The property change.
        property: SubscriptionProperty,
    },
    /// Other users joined a stream the session can observe.
    SubscriptionPeerAdded {
        /// The affected streams.
        stream_ids: Vec<StreamId>,
        /// The users who joined.
        user_ids: Vec<UserId>,
    },
    /// Other users left a stream the session can observe.
    SubscriptionPeerRemoved {
        /// The affected streams.
        stream_ids: Vec<StreamId>,
        /// The users who left.
        user_ids: Vec<UserId>,
    },
    /// New streams became visible to the actor.
    StreamCreated {
        /// Full entries for the new streams.
        streams: Vec<StreamEntry>,
    },
    /// Streams were deleted.
    StreamDeleted {
        /// The deleted stream ids.
        stream_ids: Vec<StreamId>,
    },
    /// One property changed on a stream.
    StreamUpdated {
        /// The affected stream.
        stream_id: StreamId,
        /// The property change.
        property: StreamProperty,
    },
    /// A user joined the realm.
    RealmUserAdded {
        /// The new roster entry.
        person: UserEntry,
    },
    /// A user left the realm.
    RealmUserRemoved {
        /// The removed user's id.
        user_id: UserId,
    },
    /// A roster entry changed.
    RealmUserUpdated {
        /// The field-by-field patch.
        person: UserPatch,
    },
    /// A realm-level setting changed.
    RealmSettingUpdated {
        /// The setting's name (wire key is `realm_` + this name).
        property: String,
        /// The new value.
        value: serde_json::Value,
    },
    /// A bot was added to the realm.
    RealmBotAdded {
        /// The new bot entry.
        bot: BotEntry,
    },
    /// A bot was removed from the realm.
    RealmBotRemoved {
        /// The removed bot's user id.
        user_id: UserId,
    },
    /// A user group was created.
    UserGroupAdded {
        /// The new group.
        group: UserGroup,
    },
    /// A user group was deleted.
    UserGroupRemoved {
        /// The deleted group's id.
        group_id: GroupId,
    },
    /// A user group's name or description changed.
    UserGroupUpdated {
        /// The affected group.
        group_id: GroupId,
        /// New name, if changed.
        name: Option<String>,
        /// New description, if changed.
        description: Option<String>,
    },
    /// Users were added to a user group.
    UserGroupMembersAdded {
        /// The affected group.
        group_id: GroupId,
        /// The users added.
        user_ids: Vec<UserId>,
    },
    /// Users were removed from a user group.
    UserGroupMembersRemoved {
        /// The affected group.
        group_id: GroupId,
        /// The users removed.
        user_ids: Vec<UserId>,
    },
    /// The custom profile field catalog was replaced.
    CustomProfileFieldsUpdated {
        /// The full new catalog.
        fields: Vec<CustomProfileField>,
    },
    /// A user's presence changed on one client.
    PresenceUpdated {
        /// The user whose presence changed.
        user_id: UserId,
        /// The reporting client's name.
        client: String,
        /// The new presence.
        presence: ClientPresence,
    },
    /// The actor saved a new draft.
    DraftAdded {
        /// The new draft.
        draft: Draft,
    },
    /// The actor edited a draft.
    DraftUpdated {
        /// The edited draft, replacing the entry with the same id.
        draft: Draft,
    },
    /// The actor deleted a draft.
    DraftRemoved {
        /// The deleted draft's id.
        draft_id: DraftId,
    },
    /// The actor's alert words were replaced.
    AlertWordsUpdated {
        /// The full new list.
        alert_words: Vec<String>,
    },
    /// The actor's muted topics were replaced.
    MutedTopicsUpdated {
        /// The full new list.
        muted_topics: Vec<MutedTopic>,
    },
    /// The actor's muted users were replaced.
    MutedUsersUpdated {
        /// The full new list.
        muted_users: Vec<MutedUser>,
    },
    /// A reaction was added to a message. Message bodies and their
    /// decorations are not materialized in the snapshot, so this is a
    /// deliberate no-op for the reconciler; it exists for live delivery.
    ReactionAdded {
        /// The affected message.
        message_id: MessageId,
    },
    /// A reaction was removed from a message. No-op, see [`Self::ReactionAdded`].
    ReactionRemoved {
        /// The affected message.
        message_id: MessageId,
    },
    /// A sub-message (widget payload) was attached. No-op, see
    /// [`Self::ReactionAdded`].
    SubmessageAdded {
        /// The affected message.
        message_id: MessageId,
    },
    /// A user started typing. No-op for the reconciler.
    TypingStarted {
        /// The typing user.
        sender_id: UserId,
    },
    /// A user stopped typing. No-op for the reconciler.
    TypingStopped {
        /// The typing user.
        sender_id: UserId,
    },
    /// An attachment's metadata changed. No-op for the reconciler.
    AttachmentUpdated {
        /// The affected attachment.
        attachment_id: i64,
    },
    /// The broker restarted. Never applied: aborts the batch and forces
    /// the driver to re-register from scratch.
    Restart,
}

impl EventData {
    /// The snapshot section this event type is routed to for batch
    /// filtering, or `None` for events with no materialized section
    /// (the deliberate no-ops and the restart marker), which always pass
    /// the filter.
    pub fn section(&self) -> Option<SectionKey> {
        match self {
            Self::MessageSent { .. } | Self::MessageDeleted { .. } => {
                Some(SectionKey::MaxMessageId)
            }
            Self::MessageFlagsAdded { flag, .. } | Self::MessageFlagsRemoved { flag, .. } => {
                match flag {
                    MessageFlag::Read => Some(SectionKey::UnreadMessages),
                    MessageFlag::Starred => Some(SectionKey::StarredMessages),
                }
            }
            Self::SubscriptionAdded { .. }
            | Self::SubscriptionRemoved { .. }
            | Self::SubscriptionUpdated { .. }
            | Self::SubscriptionPeerAdded { .. }
            | Self::SubscriptionPeerRemoved { .. } => Some(SectionKey::Subscriptions),
            Self::StreamCreated { .. } | Self::StreamDeleted { .. } | Self::StreamUpdated { .. } => {
                Some(SectionKey::Streams)
            }
            Self::RealmUserAdded { .. }
            | Self::RealmUserRemoved { .. }
            | Self::RealmUserUpdated { .. } => Some(SectionKey::RealmUsers),
            Self::RealmSettingUpdated { .. } => Some(SectionKey::RealmSettings),
            Self::RealmBotAdded { .. } | Self::RealmBotRemoved { .. } => {
                Some(SectionKey::RealmBots)
            }
            Self::UserGroupAdded { .. }
            | Self::UserGroupRemoved { .. }
            | Self::UserGroupUpdated { .. }
            | Self::UserGroupMembersAdded { .. }
            | Self::UserGroupMembersRemoved { .. } => Some(SectionKey::UserGroups),
            Self::CustomProfileFieldsUpdated { .. } => Some(SectionKey::CustomProfileFields),
            Self::PresenceUpdated { .. } => Some(SectionKey::Presence),
            Self::DraftAdded { .. } | Self::DraftUpdated { .. } | Self::DraftRemoved { .. } => {
                Some(SectionKey::Drafts)
            }
            Self::AlertWordsUpdated { .. } => Some(SectionKey::AlertWords),
            Self::MutedTopicsUpdated { .. } => Some(SectionKey::MutedTopics),
            Self::MutedUsersUpdated { .. } => Some(SectionKey::MutedUsers),
            Self::ReactionAdded { .. }
            | Self::ReactionRemoved { .. }
            | Self::SubmessageAdded { .. }
            | Self::TypingStarted { .. }
            | Self::TypingStopped { .. }
            | Self::AttachmentUpdated { .. }
            | Self::Restart => None,
        }
    }

    /// The wire type name, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => "message_sent",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MessageFlagsAdded { .. } => "message_flags_added",
            Self::MessageFlagsRemoved { .. } => "message_flags_removed",
            Self::SubscriptionAdded { .. } => "subscription_added",
            Self::SubscriptionRemoved { .. } => "subscription_removed",
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::SubscriptionPeerAdded { .. } => "subscription_peer_added",
            Self::SubscriptionPeerRemoved { .. } => "subscription_peer_removed",
            Self::StreamCreated { .. } => "stream_created",
            Self::StreamDeleted { .. } => "stream_deleted",
            Self::StreamUpdated { .. } => "stream_updated",
            Self::RealmUserAdded { .. } => "realm_user_added",
            Self::RealmUserRemoved { .. } => "realm_user_removed",
            Self::RealmUserUpdated { .. } => "realm_user_updated",
            Self::RealmSettingUpdated { .. } => "realm_setting_updated",
            Self::RealmBotAdded { .. } => "realm_bot_added",
            Self::RealmBotRemoved { .. } => "realm_bot_removed",
            Self::UserGroupAdded { .. } => "user_group_added",
            Self::UserGroupRemoved { .. } => "user_group_removed",
            Self::UserGroupUpdated { .. } => "user_group_updated",
            Self::UserGroupMembersAdded { .. } => "user_group_members_added",
            Self::UserGroupMembersRemoved { .. } => "user_group_members_removed",
            Self::CustomProfileFieldsUpdated { .. } => "custom_profile_fields_updated",
            Self::PresenceUpdated { .. } => "presence_updated",
            Self::DraftAdded { .. } => "draft_added",
            Self::DraftUpdated { .. } => "draft_updated",
            Self::DraftRemoved { .. } => "draft_removed",
            Self::AlertWordsUpdated { .. } => "alert_words_updated",
            Self::MutedTopicsUpdated { .. } => "muted_topics_updated",
            Self::MutedUsersUpdated { .. } => "muted_users_updated",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
            Self::SubmessageAdded { .. } => "submessage_added",
            Self::TypingStarted { .. } => "typing_started",
            Self::TypingStopped { .. } => "typing_stopped",
            Self::AttachmentUpdated { .. } => "attachment_updated",
            Self::Restart => "restart",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flag_events_route_by_flag() {
        let read = EventData::MessageFlagsAdded {
            flag: MessageFlag::Read,
            messages: vec![MessageId::new(1)],
        };
        let starred = EventData::MessageFlagsAdded {
            flag: MessageFlag::Starred,
            messages: vec![MessageId::new(1)],
        };
        assert_eq!(read.section(), Some(SectionKey::UnreadMessages));
        assert_eq!(starred.section(), Some(SectionKey::StarredMessages));
    }

    #[test]
    fn restart_has_no_section() {
        assert_eq!(EventData::Restart.section(), None);
        assert_eq!(EventData::Restart.kind(), "restart");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event {
            id: EventId::new(3),
            data: EventData::RealmUserRemoved {
                user_id: UserId::new(8),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("id").unwrap(), 3);
        assert_eq!(json.get("type").unwrap(), "realm_user_removed");
        assert_eq!(json.get("user_id").unwrap(), 8);
    }
}
