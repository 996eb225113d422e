//! Error types for the authoritative-storage boundary.

use parley_types::{RealmId, UserId};

/// Errors that can occur reading from authoritative storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested realm does not exist.
    #[error("unknown realm: {realm}")]
    UnknownRealm {
        /// The realm that was requested.
        realm: RealmId,
    },

    /// The requested user does not exist in the realm.
    #[error("unknown user {user_id} in realm {realm}")]
    UnknownUser {
        /// The realm that was queried.
        realm: RealmId,
        /// The user that was requested.
        user_id: UserId,
    },

    /// The storage backend failed.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}
