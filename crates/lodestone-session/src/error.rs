//! Error types for the session layer.

use crate::UserId;

/// Errors reported by an [`IdentityProvider`](crate::IdentityProvider).
///
/// The expiration worker uses [`is_transient`](Self::is_transient) to
/// decide between retrying an item and dropping it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The provider could not be reached or is overloaded.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("identity provider timed out")]
    Timeout,

    /// The provider has no record of this identity.
    #[error("unknown identity {0}")]
    UnknownIdentity(UserId),

    /// The provider understood the request and refused it.
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
}

impl IdentityError {
    /// `true` when retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Errors that can occur during session management.
///
/// There is deliberately no "session not found" variant for queries:
/// absence is a valid state reported through `bool`/`Option` returns.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A write needed a live session and the user has none.
    #[error("no active game session for {0}")]
    NoActiveSession(UserId),

    /// Mirroring session state into the identity provider failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}
