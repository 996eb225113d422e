//! Per-session request options and the section filter.
//!
//! Both are supplied once at registration and held constant for the
//! session: the snapshot builder, the event applier, and the broker (which
//! bakes the options into the queue so later live deliveries are shaped
//! identically) all see the same values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::sections::SectionKey;

/// The fixed set of named options a session supplies at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[allow(clippy::struct_excessive_bools)]
pub struct RequestOptions {
    /// Privacy-preserving avatars: omit server-computed URLs for
    /// gravatar-sourced avatars so the client computes them locally.
    pub client_gravatar: bool,
    /// Include per-stream subscriber lists in subscription entries.
    pub include_subscribers: bool,
    /// Include the stream catalog sections at all.
    pub include_streams: bool,
    /// Use the compact aggregated presence shape instead of per-client.
    pub slim_presence: bool,
    /// The session predates structured notification settings; synthesize
    /// the legacy flat fields at finalization.
    pub legacy_subscription_flags: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            client_gravatar: false,
            include_subscribers: true,
            include_streams: true,
            slim_presence: false,
            legacy_subscription_flags: false,
        }
    }
}

impl RequestOptions {
    /// The centrally-enforced spectator restrictions: anonymous sessions
    /// never get privacy-mode avatars, subscriber lists, or the stream
    /// catalog, regardless of what was requested. Applied once by the
    /// driver before any section producer runs, so the restriction is
    /// auditable in one place.
    #[must_use]
    pub const fn for_spectator(mut self) -> Self {
        self.client_gravatar = false;
        self.include_subscribers = false;
        self.include_streams = false;
        self
    }
}

/// Which snapshot sections a session is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SectionFilter {
    /// Every section in the catalog.
    All,
    /// Only the named sections; events aimed at other sections are
    /// silently dropped.
    Only(BTreeSet<SectionKey>),
}

impl SectionFilter {
    /// Whether the given section is selected.
    pub fn includes(&self, key: SectionKey) -> bool {
        match self {
            Self::All => true,
            Self::Only(keys) => keys.contains(&key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectator_restrictions_override_requests() {
        let options = RequestOptions {
            client_gravatar: true,
            include_subscribers: true,
            include_streams: true,
            slim_presence: true,
            legacy_subscription_flags: false,
        }
        .for_spectator();
        assert!(!options.client_gravatar);
        assert!(!options.include_subscribers);
        assert!(!options.include_streams);
        // Unrelated options survive.
        assert!(options.slim_presence);
    }

    #[test]
    fn filter_membership() {
        let only = SectionFilter::Only([SectionKey::Presence].into_iter().collect());
        assert!(only.includes(SectionKey::Presence));
        assert!(!only.includes(SectionKey::Streams));
        assert!(SectionFilter::All.includes(SectionKey::Streams));
    }
}
