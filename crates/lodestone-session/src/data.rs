//! Per-session key/value data (selected character and friends).

use crate::{CharacterId, SessionCache, SessionData, SessionError, UserId};

/// Reads and rewrites the data bag attached to a user's game session.
///
/// The bag lives inside the session's own cache entry, so it expires with
/// the session and can't be written without one. Every write replaces the
/// whole bag and slides the session TTL, the same as a refresh.
#[derive(Clone)]
pub struct SessionDataStore {
    cache: SessionCache,
}

impl SessionDataStore {
    /// Creates a store over the shared session cache.
    pub fn new(cache: SessionCache) -> Self {
        Self { cache }
    }

    /// The data bag of the user's live session.
    pub fn get_data(&self, user_id: &UserId) -> Option<SessionData> {
        self.cache.get(user_id).map(|entry| entry.data)
    }

    /// The data bag of the user's session, live or expired but not yet
    /// swept. For callers that explicitly admit expired sessions.
    pub fn peek_data(&self, user_id: &UserId) -> Option<SessionData> {
        self.cache.peek(user_id).map(|lookup| lookup.into_inner().data)
    }

    /// Replaces the whole bag.
    ///
    /// There is no partial update: callers read, modify, and write back.
    /// Two writers racing on one user are last-write-wins.
    ///
    /// # Errors
    /// [`SessionError::NoActiveSession`] if the user has no live session.
    pub fn update_data(&self, user_id: &UserId, data: SessionData) -> Result<(), SessionError> {
        self.cache
            .update(user_id, move |entry| entry.data = data)
            .ok_or_else(|| SessionError::NoActiveSession(user_id.clone()))?;
        tracing::debug!(%user_id, "session data updated");
        Ok(())
    }

    /// The selected character of the user's live session.
    pub fn selected_character(&self, user_id: &UserId) -> Option<CharacterId> {
        self.get_data(user_id)?.selected_character_id()
    }

    /// Stores `character_id` as the selected character.
    pub fn select_character(
        &self,
        user_id: &UserId,
        character_id: CharacterId,
    ) -> Result<(), SessionError> {
        let mut data = self
            .get_data(user_id)
            .ok_or_else(|| SessionError::NoActiveSession(user_id.clone()))?;
        data.set_selected_character(character_id);
        self.update_data(user_id, data)?;
        tracing::info!(%user_id, %character_id, "character selected");
        Ok(())
    }

    /// Forgets the selected character, keeping the rest of the bag.
    pub fn clear_character(&self, user_id: &UserId) -> Result<(), SessionError> {
        let mut data = self
            .get_data(user_id)
            .ok_or_else(|| SessionError::NoActiveSession(user_id.clone()))?;
        data.clear_selected_character();
        self.update_data(user_id, data)
    }
}
