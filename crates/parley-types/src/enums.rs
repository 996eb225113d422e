//! Enumeration types shared across the synchronization engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The role of a user account within its realm.
///
/// Roles are ordered by privilege: owners outrank administrators, who
/// outrank moderators, and so on. Several snapshot sections and derived
/// capability booleans are gated on role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Realm owner: full control, including billing and deactivation.
    Owner,
    /// Realm administrator: full management rights.
    Administrator,
    /// Moderator: elevated rights for content moderation.
    Moderator,
    /// Ordinary member.
    Member,
    /// Guest: restricted visibility, no invitation rights.
    Guest,
}

impl Role {
    /// Whether this role carries administrative rights (owner or admin).
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }

    /// Whether this role is a guest.
    pub const fn is_guest(self) -> bool {
        matches!(self, Self::Guest)
    }

    /// Whether this role carries moderation rights (moderator or above).
    pub const fn is_moderator(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator | Self::Moderator)
    }
}

/// Where a user's avatar image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum AvatarSource {
    /// Computed from the user's email via the gravatar scheme. Sessions
    /// that opt into privacy-preserving avatars compute the URL
    /// client-side, so the server omits it.
    Gravatar,
    /// Uploaded directly to the realm; the URL is always server-provided.
    Upload,
}

/// A per-message flag an actor can set or clear.
///
/// Flag changes arrive as events and drive the unread index and the
/// starred-message section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MessageFlag {
    /// The actor has read the message.
    Read,
    /// The actor has starred the message.
    Starred,
}

/// A user's presence status as reported by one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Actively using a client.
    Active,
    /// Client connected but idle.
    Idle,
    /// No client connected.
    Offline,
}

/// The billing plan tier of a realm.
///
/// Plan changes arrive as ordinary realm-setting events but additionally
/// recompute the derived `realm_not_limited` boolean and the upload quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Self-hosted installation; no limits apply.
    SelfHosted,
    /// Free hosted plan with feature and storage limits.
    Limited,
    /// Paid hosted plan.
    Standard,
    /// Sponsored hosted plan with standard features at no cost.
    StandardFree,
}

impl PlanType {
    /// Whether this plan tier is free of feature limits.
    pub const fn is_not_limited(self) -> bool {
        !matches!(self, Self::Limited)
    }

    /// The per-realm upload quota in mebibytes, `None` for unlimited.
    pub const fn upload_quota_mib(self) -> Option<u32> {
        match self {
            Self::SelfHosted => None,
            Self::Limited => Some(5 * 1024),
            Self::Standard | Self::StandardFree => Some(50 * 1024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_privilege_helpers() {
        assert!(Role::Owner.is_admin());
        assert!(Role::Administrator.is_admin());
        assert!(!Role::Moderator.is_admin());
        assert!(Role::Moderator.is_moderator());
        assert!(Role::Guest.is_guest());
        assert!(!Role::Member.is_guest());
    }

    #[test]
    fn plan_type_limits() {
        assert!(!PlanType::Limited.is_not_limited());
        assert!(PlanType::Standard.is_not_limited());
        assert_eq!(PlanType::SelfHosted.upload_quota_mib(), None);
        assert_eq!(PlanType::Limited.upload_quota_mib(), Some(5120));
    }
}
