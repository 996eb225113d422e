//! Type-safe identifier wrappers.
//!
//! Entity identifiers in Parley are ordered integers assigned by the
//! authoritative store (message ids in particular must be totally ordered,
//! since "highest message id seen" drives the unread and recent-conversation
//! bookkeeping). Wrapping them in newtypes prevents accidental mixing of
//! identifier kinds at compile time.
//!
//! Event-queue identifiers are the exception: queues are ephemeral,
//! allocated per session, and use UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around `i64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw store-assigned identifier.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Return the inner integer value.
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an organization (realm). The tenant boundary:
    /// every snapshot and session is scoped to exactly one.
    RealmId
}

define_id! {
    /// Unique identifier for a user account within a realm.
    UserId
}

define_id! {
    /// Unique identifier for a stream (named message channel).
    StreamId
}

define_id! {
    /// Unique identifier for a message. Totally ordered; higher means newer.
    MessageId
}

define_id! {
    /// Unique identifier for a user group.
    GroupId
}

define_id! {
    /// Unique identifier for a saved message draft.
    DraftId
}

define_id! {
    /// Unique identifier for a custom profile field definition.
    CustomFieldId
}

define_id! {
    /// Unique identifier for a change event, assigned by the broker in
    /// delivery order for a given queue.
    EventId
}

impl EventId {
    /// Sentinel meaning "no event has been applied yet". Returned as the
    /// resumption point when a session's drained batch was empty.
    pub const NONE: Self = Self(-1);
}

impl MessageId {
    /// Sentinel meaning "the actor can see no messages at all".
    pub const NONE: Self = Self(-1);
}

/// Identifier for a live event queue allocated by the broker.
///
/// Queues are per-session and ephemeral, so these use UUID v7
/// (time-ordered) rather than store-assigned integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct QueueId(pub Uuid);

impl QueueId {
    /// Allocate a fresh queue identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for QueueId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_ordered() {
        assert!(MessageId::new(41) < MessageId::new(42));
        assert!(MessageId::NONE < MessageId::new(0));
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = UserId::new(7);
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "7");
        let restored: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn queue_ids_are_distinct() {
        assert_ne!(QueueId::new(), QueueId::new());
    }
}
