//! The Parley state-synchronization engine.
//!
//! Bootstraps a client session against a live realm: build a snapshot of
//! everything the session asked for, reconcile it with the events that
//! raced the build, consolidate it into its client-ready shape, and hand
//! back the queue the session resumes live delivery from.
//!
//! The pipeline is four stages with one owner each:
//!
//! 1. [`build::build_snapshot`] -- read authoritative storage into a raw
//!    snapshot, section by section.
//! 2. [`apply::apply_events`] -- fold queued change events into the raw
//!    snapshot, idempotently.
//! 3. [`finalize::finalize_snapshot`] -- collapse raw forms into the
//!    wire shapes, exactly once.
//! 4. [`register::register`] -- the driver sequencing 1-3 around queue
//!    registration, with restart recovery.
//!
//! # Modules
//!
//! - [`snapshot`] -- The [`Snapshot`] aggregate and its raw/final sums
//! - [`build`] -- The snapshot builder
//! - [`apply`] -- The event applier
//! - [`finalize`] -- The finalizer
//! - [`register`] -- The registration driver
//! - [`config`] -- [`SyncConfig`] loading
//! - [`error`] -- [`SyncError`]

pub mod apply;
pub mod build;
pub mod config;
pub mod error;
pub mod finalize;
pub mod register;
pub mod snapshot;

pub use apply::{BatchOutcome, apply_event, apply_events};
pub use build::build_snapshot;
pub use config::{ConfigError, SyncConfig};
pub use error::SyncError;
pub use finalize::finalize_snapshot;
pub use register::{RegisterRequest, Registration, parse_section_filter, register};
pub use snapshot::{RecentDmState, RosterState, Snapshot, SubscriptionSections, UnreadState};
