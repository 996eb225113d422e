//! The snapshot aggregate: one owned, mutable value per session.
//!
//! A snapshot is a collection of optional sections; a section is present
//! exactly when the session's filter selected it. Three expensive
//! sections carry a typed raw/final sum: the raw arm is the shape the
//! applier can update in O(1) (keyed maps), the final arm is the shape
//! the client receives (sorted lists, aggregates). The raw arms exist
//! only until the finalizer runs; representing the duality as a sum type
//! makes "applied an event after finalizing" and "finalized twice"
//! checked errors instead of silent corruption.

use std::collections::{BTreeMap, BTreeSet};

use parley_types::{
    BotEntry, CapabilityFlags, ClientPresence, CustomProfileField, Draft, MessageId, MutedTopic,
    MutedUser, PlanType, RealmId, RecentDmEntry, RequestOptions, Role, StreamEntry, StreamId,
    SubscriptionEntry, UnreadMessageInfo, UnreadSummary, UserEntry, UserGroup, UserId,
    UserPresence,
};

use crate::error::SyncError;

/// The unread-message section in its two representations.
#[derive(Debug, Clone, PartialEq)]
pub enum UnreadState {
    /// Fast-update form: one entry per unread message, keyed by id.
    Raw(BTreeMap<MessageId, UnreadMessageInfo>),
    /// Client-ready form: aggregated per conversation.
    Aggregated(UnreadSummary),
}

/// The user-roster section in its two representations.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterState {
    /// Fast-update form: keyed by user id, activation state inline.
    Raw(BTreeMap<UserId, UserEntry>),
    /// Client-ready form: split into sorted active and inactive lists.
    Split {
        /// Active accounts, sorted by user id.
        active: Vec<UserEntry>,
        /// Deactivated accounts, sorted by user id.
        non_active: Vec<UserEntry>,
    },
}

/// The recent-conversations section in its two representations.
#[derive(Debug, Clone, PartialEq)]
pub enum RecentDmState {
    /// Fast-update form: canonical participant list to highest message id.
    Raw(BTreeMap<Vec<UserId>, MessageId>),
    /// Client-ready form: sorted by descending highest message id.
    Sorted(Vec<RecentDmEntry>),
}

/// The three parallel subscription lists.
///
/// Invariant: a stream id appears in at most one of the three lists at
/// any time; the applier's add/remove rules preserve this.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionSections {
    /// Streams the actor is subscribed to.
    pub subscribed: Vec<SubscriptionEntry>,
    /// Streams the actor left.
    pub unsubscribed: Vec<SubscriptionEntry>,
    /// Visible streams the actor was never subscribed to.
    pub never_subscribed: Vec<SubscriptionEntry>,
}

impl SubscriptionSections {
    /// Mutable access to all three lists.
    pub fn lists_mut(&mut self) -> [&mut Vec<SubscriptionEntry>; 3] {
        [
            &mut self.subscribed,
            &mut self.unsubscribed,
            &mut self.never_subscribed,
        ]
    }

    /// Whether any list holds an entry for the stream.
    pub fn contains(&self, stream_id: StreamId) -> bool {
        [&self.subscribed, &self.unsubscribed, &self.never_subscribed]
            .into_iter()
            .any(|list| list.iter().any(|entry| entry.stream_id == stream_id))
    }

    /// Remove the stream's entry from whichever list holds it.
    pub fn remove_everywhere(&mut self, stream_id: StreamId) -> Option<SubscriptionEntry> {
        for list in self.lists_mut() {
            if let Some(position) = list.iter().position(|entry| entry.stream_id == stream_id) {
                return Some(list.remove(position));
            }
        }
        None
    }

    /// Mutable reference to the stream's entry, wherever it lives.
    pub fn entry_mut(&mut self, stream_id: StreamId) -> Option<&mut SubscriptionEntry> {
        self.lists_mut()
            .into_iter()
            .find_map(|list| list.iter_mut().find(|entry| entry.stream_id == stream_id))
    }
}

/// The full synchronized state payload held for one session.
///
/// Exclusively owned by the registration driver for the duration of the
/// bootstrap; handed out for transmission only after finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The realm this snapshot was computed within.
    pub realm: RealmId,
    /// The account the snapshot was computed for, `None` for a spectator.
    pub owner: Option<UserId>,
    /// The owner's effective realm role when the snapshot was built,
    /// kept current by role-change events. `None` for a spectator.
    ///
    /// Held on the snapshot itself so role-gated sections (bots,
    /// capabilities) reconcile correctly even when the session's filter
    /// excluded the roster.
    pub owner_role: Option<Role>,
    /// Highest visible message id.
    pub max_message_id: Option<MessageId>,
    /// Realm settings keyed by bare property name, including the derived
    /// `not_limited` and `upload_quota_mib` entries.
    pub realm_settings: Option<BTreeMap<String, serde_json::Value>>,
    /// The user roster.
    pub roster: Option<RosterState>,
    /// All bots; empty unless the actor has administrative rights.
    pub realm_bots: Option<Vec<BotEntry>>,
    /// Visible streams.
    pub streams: Option<Vec<StreamEntry>>,
    /// The three subscription lists.
    pub subscriptions: Option<SubscriptionSections>,
    /// User groups.
    pub user_groups: Option<Vec<UserGroup>>,
    /// Custom profile field catalog.
    pub custom_profile_fields: Option<Vec<CustomProfileField>>,
    /// Presence, already shaped per the session's presence option.
    pub presence: Option<BTreeMap<UserId, UserPresence>>,
    /// Saved drafts.
    pub drafts: Option<Vec<Draft>>,
    /// Unread-message index.
    pub unread: Option<UnreadState>,
    /// Starred message ids.
    pub starred_messages: Option<BTreeSet<MessageId>>,
    /// Alert words.
    pub alert_words: Option<Vec<String>>,
    /// Muted topics.
    pub muted_topics: Option<Vec<MutedTopic>>,
    /// Muted users.
    pub muted_users: Option<Vec<MutedUser>>,
    /// Recent direct-message conversations.
    pub recent_dms: Option<RecentDmState>,
    /// Derived capability booleans.
    pub capabilities: Option<CapabilityFlags>,
    pub(crate) finalized: bool,
}

impl Snapshot {
    /// Create an empty snapshot scoped to a realm and owner.
    pub const fn new(realm: RealmId, owner: Option<UserId>) -> Self {
        Self {
            realm,
            owner,
            owner_role: None,
            max_message_id: None,
            realm_settings: None,
            roster: None,
            realm_bots: None,
            streams: None,
            subscriptions: None,
            user_groups: None,
            custom_profile_fields: None,
            presence: None,
            drafts: None,
            unread: None,
            starred_messages: None,
            alert_words: None,
            muted_topics: None,
            muted_users: None,
            recent_dms: None,
            capabilities: None,
            finalized: false,
        }
    }

    /// Whether the finalizer has already run.
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Serialize the finalized snapshot into its wire mapping.
    ///
    /// Section keys follow the client protocol: realm settings flatten to
    /// one `realm_<property>` key each, capability booleans flatten to
    /// top-level keys, and the roster becomes `realm_users` plus
    /// `realm_non_active_users`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFinalized`] if the raw forms still exist.
    pub fn to_wire(&self) -> Result<serde_json::Map<String, serde_json::Value>, SyncError> {
        if !self.finalized {
            return Err(SyncError::NotFinalized);
        }
        let mut wire = serde_json::Map::new();
        if let Some(max_message_id) = self.max_message_id {
            wire.insert("max_message_id".to_owned(), serde_json::to_value(max_message_id)?);
        }
        if let Some(settings) = &self.realm_settings {
            for (property, value) in settings {
                wire.insert(format!("realm_{property}"), value.clone());
            }
        }
        if let Some(RosterState::Split { active, non_active }) = &self.roster {
            wire.insert("realm_users".to_owned(), serde_json::to_value(active)?);
            wire.insert(
                "realm_non_active_users".to_owned(),
                serde_json::to_value(non_active)?,
            );
        }
        if let Some(bots) = &self.realm_bots {
            wire.insert("realm_bots".to_owned(), serde_json::to_value(bots)?);
        }
        if let Some(streams) = &self.streams {
            wire.insert("streams".to_owned(), serde_json::to_value(streams)?);
        }
        if let Some(sections) = &self.subscriptions {
            wire.insert(
                "subscriptions".to_owned(),
                serde_json::to_value(&sections.subscribed)?,
            );
            wire.insert(
                "unsubscribed".to_owned(),
                serde_json::to_value(&sections.unsubscribed)?,
            );
            wire.insert(
                "never_subscribed".to_owned(),
                serde_json::to_value(&sections.never_subscribed)?,
            );
        }
        if let Some(groups) = &self.user_groups {
            wire.insert("user_groups".to_owned(), serde_json::to_value(groups)?);
        }
        if let Some(fields) = &self.custom_profile_fields {
            wire.insert(
                "custom_profile_fields".to_owned(),
                serde_json::to_value(fields)?,
            );
        }
        if let Some(presence) = &self.presence {
            wire.insert("presence".to_owned(), serde_json::to_value(presence)?);
        }
        if let Some(drafts) = &self.drafts {
            wire.insert("drafts".to_owned(), serde_json::to_value(drafts)?);
        }
        if let Some(UnreadState::Aggregated(summary)) = &self.unread {
            wire.insert("unread_msgs".to_owned(), serde_json::to_value(summary)?);
        }
        if let Some(starred) = &self.starred_messages {
            wire.insert("starred_messages".to_owned(), serde_json::to_value(starred)?);
        }
        if let Some(words) = &self.alert_words {
            wire.insert("alert_words".to_owned(), serde_json::to_value(words)?);
        }
        if let Some(topics) = &self.muted_topics {
            wire.insert("muted_topics".to_owned(), serde_json::to_value(topics)?);
        }
        if let Some(users) = &self.muted_users {
            wire.insert("muted_users".to_owned(), serde_json::to_value(users)?);
        }
        if let Some(RecentDmState::Sorted(entries)) = &self.recent_dms {
            wire.insert(
                "recent_private_conversations".to_owned(),
                serde_json::to_value(entries)?,
            );
        }
        if let Some(capabilities) = self.capabilities {
            if let serde_json::Value::Object(flags) = serde_json::to_value(capabilities)? {
                wire.extend(flags);
            }
        }
        Ok(wire)
    }
}

/// Derive the capability booleans from a role and the realm's policy
/// settings. A spectator (no role) gets none.
pub(crate) fn compute_capabilities(
    role: Option<Role>,
    settings: Option<&BTreeMap<String, serde_json::Value>>,
) -> CapabilityFlags {
    let Some(role) = role else {
        return CapabilityFlags::default();
    };
    let admins_only = |key: &str| {
        settings
            .and_then(|map| map.get(key))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    };
    let is_admin = role.is_admin();
    CapabilityFlags {
        is_admin,
        is_owner: matches!(role, Role::Owner),
        is_moderator: role.is_moderator(),
        is_guest: role.is_guest(),
        can_create_streams: !role.is_guest() && (is_admin || !admins_only("create_streams_admins_only")),
        can_subscribe_other_users: !role.is_guest()
            && (is_admin || !admins_only("subscribe_others_admins_only")),
        can_invite_others_to_realm: !role.is_guest()
            && (is_admin || !admins_only("invite_by_admins_only")),
    }
}

/// Recompute the settings entries derived from the plan tier: the
/// `not_limited` boolean and the upload quota.
pub(crate) fn apply_plan_type_derivations(settings: &mut BTreeMap<String, serde_json::Value>) {
    let Some(plan) = settings
        .get("plan_type")
        .cloned()
        .and_then(|value| serde_json::from_value::<PlanType>(value).ok())
    else {
        return;
    };
    settings.insert(
        "not_limited".to_owned(),
        serde_json::Value::Bool(plan.is_not_limited()),
    );
    settings.insert(
        "upload_quota_mib".to_owned(),
        plan.upload_quota_mib()
            .map_or(serde_json::Value::Null, |quota| {
                serde_json::Value::Number(quota.into())
            }),
    );
}

/// Apply the session's avatar privacy option to a roster entry: when the
/// session computes gravatars client-side, the server-provided URL is
/// dropped for gravatar-sourced avatars.
pub(crate) fn normalize_avatar(entry: &mut UserEntry, options: RequestOptions) {
    if options.client_gravatar && entry.avatar_source == parley_types::AvatarSource::Gravatar {
        entry.avatar_url = None;
    }
}

/// The aggregated presence for a user: the most recently reported
/// client's presence. The applier uses the same latest-report-wins rule
/// so incremental updates converge with a fresh build.
pub(crate) fn latest_presence(
    clients: &BTreeMap<String, ClientPresence>,
) -> Option<ClientPresence> {
    let mut latest: Option<&ClientPresence> = None;
    for presence in clients.values() {
        if latest.is_none_or(|current| presence.timestamp >= current.timestamp) {
            latest = Some(presence);
        }
    }
    latest.cloned()
}
