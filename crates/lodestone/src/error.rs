//! Unified error type for the Lodestone session layer.

use lodestone_gate::GateError;
use lodestone_session::{IdentityError, SessionError};

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LodestoneError {
    /// Session state or data store failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Identity provider failure outside a session operation.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A request was refused or failed inside the gate chain.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The configuration couldn't be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
