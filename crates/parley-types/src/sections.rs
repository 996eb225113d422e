//! The snapshot section catalog.
//!
//! A snapshot is composed of named sections, each independently
//! producible and independently requestable by a session. [`SectionKey`]
//! is the closed catalog; the builder iterates it in declaration order
//! and the applier uses it to route events to sections.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One named section of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    /// The highest message id visible to the actor.
    MaxMessageId,
    /// Realm-level settings and policy flags (`realm_*` wire keys).
    RealmSettings,
    /// The user roster (active and deactivated accounts).
    RealmUsers,
    /// All bots in the realm; populated only for administrators.
    RealmBots,
    /// All streams visible to the actor.
    Streams,
    /// The actor's subscriptions, split into subscribed, unsubscribed,
    /// and never-subscribed lists.
    Subscriptions,
    /// User groups and their memberships.
    UserGroups,
    /// Custom profile field definitions.
    CustomProfileFields,
    /// Presence data for realm users.
    Presence,
    /// The actor's saved message drafts.
    Drafts,
    /// The actor's unread-message index.
    UnreadMessages,
    /// Message ids the actor has starred.
    StarredMessages,
    /// The actor's alert words.
    AlertWords,
    /// Topics the actor has muted.
    MutedTopics,
    /// Users the actor has muted.
    MutedUsers,
    /// The actor's most recent direct-message conversations.
    RecentPrivateConversations,
    /// Capability booleans derived from the actor's role and realm policy.
    Capabilities,
}

impl SectionKey {
    /// The full catalog, in the stable order the builder produces sections.
    pub const ALL: [Self; 17] = [
        Self::MaxMessageId,
        Self::RealmSettings,
        Self::RealmUsers,
        Self::RealmBots,
        Self::Streams,
        Self::Subscriptions,
        Self::UserGroups,
        Self::CustomProfileFields,
        Self::Presence,
        Self::Drafts,
        Self::UnreadMessages,
        Self::StarredMessages,
        Self::AlertWords,
        Self::MutedTopics,
        Self::MutedUsers,
        Self::RecentPrivateConversations,
        Self::Capabilities,
    ];

    /// The wire name of this section.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxMessageId => "max_message_id",
            Self::RealmSettings => "realm_settings",
            Self::RealmUsers => "realm_users",
            Self::RealmBots => "realm_bots",
            Self::Streams => "streams",
            Self::Subscriptions => "subscriptions",
            Self::UserGroups => "user_groups",
            Self::CustomProfileFields => "custom_profile_fields",
            Self::Presence => "presence",
            Self::Drafts => "drafts",
            Self::UnreadMessages => "unread_messages",
            Self::StarredMessages => "starred_messages",
            Self::AlertWords => "alert_words",
            Self::MutedTopics => "muted_topics",
            Self::MutedUsers => "muted_users",
            Self::RecentPrivateConversations => "recent_private_conversations",
            Self::Capabilities => "capabilities",
        }
    }

    /// Parse a wire name back into a section key.
    ///
    /// Returns `None` for unknown names; the driver surfaces that as a
    /// user-visible validation error rather than a panic.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_roundtrip() {
        for key in SectionKey::ALL {
            assert_eq!(SectionKey::parse(key.as_str()), Some(key));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(SectionKey::parse("message_bodies"), None);
    }
}
