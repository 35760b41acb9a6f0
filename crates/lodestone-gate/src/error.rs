use serde::{Deserialize, Serialize};

use crate::CollaboratorError;

/// One failed field check from [`GameRequest::validate`](crate::GameRequest::validate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    /// Creates an error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Why the gate chain refused (or failed) a request.
///
/// Every gate returns its own variant and never recovers from a later
/// gate's failure. Mapping these to transport status codes is the
/// endpoint layer's job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// No identity, or the identity provider doesn't know it.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request needs a live game session and there isn't one.
    #[error("an active game session is required")]
    SessionRequired,

    /// Authenticated, but not allowed (level, role, policy, ownership).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request needs a selected character and there isn't one.
    #[error("a selected character is required")]
    CharacterRequired,

    /// The request body failed validation. Carries every field error.
    #[error("validation failed ({} field errors)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    /// The caller cancelled before the handler or commit ran.
    #[error("request cancelled")]
    Cancelled,

    /// Anything that isn't a policy decision: collaborator outages,
    /// handler bugs. Logged once by the outermost gate.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl GateError {
    /// `true` for the expected, policy-driven refusals.
    pub fn is_policy_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_)
                | Self::SessionRequired
                | Self::Forbidden(_)
                | Self::CharacterRequired
                | Self::ValidationFailed(_)
        )
    }
}

impl From<CollaboratorError> for GateError {
    fn from(err: CollaboratorError) -> Self {
        Self::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_policy_failure_classification() {
        assert!(GateError::Unauthorized("x".into()).is_policy_failure());
        assert!(GateError::SessionRequired.is_policy_failure());
        assert!(GateError::Forbidden("x".into()).is_policy_failure());
        assert!(GateError::CharacterRequired.is_policy_failure());
        assert!(GateError::ValidationFailed(vec![]).is_policy_failure());
        assert!(!GateError::Cancelled.is_policy_failure());
        assert!(!GateError::Unexpected("boom".into()).is_policy_failure());
    }

    #[test]
    fn test_collaborator_error_becomes_unexpected() {
        let err: GateError = CollaboratorError::new("profile store offline").into();
        assert_eq!(err, GateError::Unexpected("profile store offline".into()));
    }

    #[test]
    fn test_validation_failed_display_counts_fields() {
        let err = GateError::ValidationFailed(vec![
            FieldError::new("name", "required"),
            FieldError::new("slot", "out of range"),
        ]);
        assert_eq!(err.to_string(), "validation failed (2 field errors)");
    }
}
