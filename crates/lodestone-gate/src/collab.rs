//! Collaborators the gates consult but don't own.
//!
//! Account and character persistence live elsewhere in the backend. The
//! gate chain only needs three narrow views of them: an account's
//! profile (for level checks), a character's profile (for level and
//! ownership checks), and a unit of work to flush after the handler.
//!
//! The in-memory implementations below back the tests and the demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use lodestone_session::{AccountId, CharacterId, UserId};
use serde::{Deserialize, Serialize};

/// Failure inside a collaborator. Always surfaces as
/// [`GateError::Unexpected`](crate::GateError::Unexpected).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    /// Creates an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub account_id: AccountId,
    pub level: u32,
    pub account_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub id: CharacterId,
    pub account_id: AccountId,
    pub level: u32,
}

/// Looks up the account profile of the caller.
#[async_trait]
pub trait AccountProfiles: Send + Sync + 'static {
    async fn get_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<AccountProfile>, CollaboratorError>;
}

/// Looks up characters by id.
#[async_trait]
pub trait CharacterDirectory: Send + Sync + 'static {
    async fn get_character(
        &self,
        id: CharacterId,
    ) -> Result<Option<CharacterProfile>, CollaboratorError>;
}

/// Flushes the writes a handler made.
#[async_trait]
pub trait UnitOfWork: Send + Sync + 'static {
    async fn commit(&self) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Account profiles keyed by user.
#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: Mutex<HashMap<UserId, AccountProfile>>,
}

impl InMemoryProfiles {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the profile for `user_id`, replacing any previous one.
    pub fn insert(&self, user_id: impl Into<UserId>, profile: AccountProfile) {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.into(), profile);
    }
}

#[async_trait]
impl AccountProfiles for InMemoryProfiles {
    async fn get_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<AccountProfile>, CollaboratorError> {
        Ok(self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCharacters {
    characters: Mutex<HashMap<CharacterId, CharacterProfile>>,
}

impl InMemoryCharacters {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the character, keyed by its id.
    pub fn insert(&self, profile: CharacterProfile) {
        self.characters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id, profile);
    }
}

#[async_trait]
impl CharacterDirectory for InMemoryCharacters {
    async fn get_character(
        &self,
        id: CharacterId,
    ) -> Result<Option<CharacterProfile>, CollaboratorError> {
        Ok(self
            .characters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

/// A unit of work that only counts commits. Can be told to fail.
#[derive(Default)]
pub struct CountingUnitOfWork {
    commits: AtomicUsize,
    failing: AtomicBool,
}

impl CountingUnitOfWork {
    /// Creates a unit of work that commits successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes subsequent commits fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitOfWork for CountingUnitOfWork {
    async fn commit(&self) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("commit failed"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
