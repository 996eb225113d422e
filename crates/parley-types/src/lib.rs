//! Shared type definitions for the Parley synchronization engine.
//!
//! This crate is the single source of truth for the types that cross the
//! engine's boundaries: typed identifiers, snapshot section entries, and
//! the closed change-event taxonomy. Types defined here flow downstream
//! to `TypeScript` via `ts-rs` for the web client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers
//! - [`enums`] -- Enumeration types (roles, flags, presence, plan tiers)
//! - [`sections`] -- The snapshot section catalog
//! - [`options`] -- Per-session request options and the section filter
//! - [`structs`] -- Section entry structs and wire shapes
//! - [`events`] -- The closed change-event taxonomy

pub mod enums;
pub mod events;
pub mod ids;
pub mod options;
pub mod sections;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AvatarSource, MessageFlag, PlanType, PresenceStatus, Role};
pub use events::{Event, EventData, StreamProperty, SubscriptionProperty, UserPatch};
pub use ids::{
    CustomFieldId, DraftId, EventId, GroupId, MessageId, QueueId, RealmId, StreamId, UserId,
};
pub use options::{RequestOptions, SectionFilter};
pub use sections::SectionKey;
pub use structs::{
    Actor, BotEntry, CapabilityFlags, ClientPresence, CustomProfileField, Draft, MessageRecipient,
    MutedTopic, MutedUser, RecentDmEntry, StreamEntry, SubscriptionEntry,
    SubscriptionNotifications, UnreadDmBucket, UnreadMessageInfo, UnreadStreamBucket,
    UnreadSummary, UserEntry, UserGroup, UserPresence, UserProfile, canonical_dm_key,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. Importing them here triggers generation.
        // The actual files are written to the `bindings/` directory
        // relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::RealmId::export_all();
        let _ = crate::ids::UserId::export_all();
        let _ = crate::ids::StreamId::export_all();
        let _ = crate::ids::MessageId::export_all();
        let _ = crate::ids::GroupId::export_all();
        let _ = crate::ids::DraftId::export_all();
        let _ = crate::ids::CustomFieldId::export_all();
        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::QueueId::export_all();

        // Enums
        let _ = crate::enums::Role::export_all();
        let _ = crate::enums::AvatarSource::export_all();
        let _ = crate::enums::MessageFlag::export_all();
        let _ = crate::enums::PresenceStatus::export_all();
        let _ = crate::enums::PlanType::export_all();
        let _ = crate::sections::SectionKey::export_all();
        let _ = crate::options::RequestOptions::export_all();
        let _ = crate::options::SectionFilter::export_all();

        // Structs
        let _ = crate::structs::Actor::export_all();
        let _ = crate::structs::UserProfile::export_all();
        let _ = crate::structs::UserEntry::export_all();
        let _ = crate::structs::BotEntry::export_all();
        let _ = crate::structs::StreamEntry::export_all();
        let _ = crate::structs::SubscriptionEntry::export_all();
        let _ = crate::structs::SubscriptionNotifications::export_all();
        let _ = crate::structs::MessageRecipient::export_all();
        let _ = crate::structs::RecentDmEntry::export_all();
        let _ = crate::structs::UnreadMessageInfo::export_all();
        let _ = crate::structs::UnreadDmBucket::export_all();
        let _ = crate::structs::UnreadStreamBucket::export_all();
        let _ = crate::structs::UnreadSummary::export_all();
        let _ = crate::structs::ClientPresence::export_all();
        let _ = crate::structs::UserPresence::export_all();
        let _ = crate::structs::Draft::export_all();
        let _ = crate::structs::CustomProfileField::export_all();
        let _ = crate::structs::UserGroup::export_all();
        let _ = crate::structs::MutedTopic::export_all();
        let _ = crate::structs::MutedUser::export_all();
        let _ = crate::structs::CapabilityFlags::export_all();

        // Events
        let _ = crate::events::Event::export_all();
        let _ = crate::events::EventData::export_all();
        let _ = crate::events::SubscriptionProperty::export_all();
        let _ = crate::events::StreamProperty::export_all();
        let _ = crate::events::UserPatch::export_all();
    }
}
