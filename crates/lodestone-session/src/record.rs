//! Session types: what the cache stores per user and what callers get back.
//!
//! A game session is one cache entry per [`UserId`]. The entry holds the
//! account the user logged into plus the session's data bag, so the two
//! expire together: a selected character can never outlive the session it
//! was selected in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::{AccountId, CharacterId, UserId};

/// Data bag key holding the selected character id.
pub const SELECTED_CHARACTER_KEY: &str = "SelectedCharacterId";

// ---------------------------------------------------------------------------
// SessionData
// ---------------------------------------------------------------------------

/// Small per-session key/value bag of opaque JSON values.
///
/// Writers replace the whole bag; there is no partial update and no
/// version token, so concurrent writers for one user are last-write-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(HashMap<String, Value>);

impl SessionData {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from a JSON object. Returns `None` for any other JSON
    /// value.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }

    /// Borrows the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of keys in the bag.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the bag holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The selected character, if one is stored.
    ///
    /// Accepts both JSON numbers and numeric strings.
    pub fn selected_character_id(&self) -> Option<CharacterId> {
        match self.0.get(SELECTED_CHARACTER_KEY)? {
            Value::Number(n) => n.as_u64().map(CharacterId),
            Value::String(s) => s.parse().ok().map(CharacterId),
            _ => None,
        }
    }

    /// Stores `id` under [`SELECTED_CHARACTER_KEY`] as a JSON number.
    pub fn set_selected_character(&mut self, id: CharacterId) {
        self.0
            .insert(SELECTED_CHARACTER_KEY.to_string(), Value::from(id.0));
    }

    /// Removes the selected character, keeping every other key.
    pub fn clear_selected_character(&mut self) {
        self.0.remove(SELECTED_CHARACTER_KEY);
    }
}

impl FromIterator<(String, Value)> for SessionData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<HashMap<String, Value>> for SessionData {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// SessionEntry
// ---------------------------------------------------------------------------

/// The value stored in the session cache for one user.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub(crate) account_id: AccountId,
    pub(crate) created_at: Instant,
    pub(crate) data: SessionData,
}

impl SessionEntry {
    pub(crate) fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            created_at: Instant::now(),
            data: SessionData::new(),
        }
    }

    /// The account this session is logged into.
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// The session's data bag.
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub(crate) fn to_record(&self, user_id: &UserId, expires_at: Instant) -> SessionRecord {
        SessionRecord {
            user_id: user_id.clone(),
            account_id: self.account_id,
            created_at: self.created_at,
            expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRecord / SessionStatus
// ---------------------------------------------------------------------------

/// A snapshot of one user's game session.
///
/// `expires_at` is taken from the cache deadline at the time of the read;
/// it only ever moves forward while the session is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// What the session layer knows about a user right now.
///
/// ```text
///   None ──set──→ Active ──(deadline passes)──→ Expired ──(sweep)──→ None
///                   ↑  │
///                   └──┘ refresh
/// ```
///
/// `Expired` is only observable between the deadline and the next cache
/// sweep. Most callers should treat it exactly like `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session record exists.
    None,
    /// The session is within its TTL.
    Active(SessionRecord),
    /// The TTL elapsed but the record hasn't been evicted yet.
    Expired(SessionRecord),
}

impl SessionStatus {
    /// Returns `true` only for [`SessionStatus::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The record for `Active` and `Expired`.
    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            Self::Active(r) | Self::Expired(r) => Some(r),
            Self::None => None,
        }
    }
}
