//! Declarative per-request policy.
//!
//! Each request type states what it needs once, as an associated const:
//!
//! ```rust
//! use lodestone_gate::{CharacterPolicy, RequestPolicy, SessionPolicy};
//!
//! const EQUIP_ITEM: RequestPolicy = RequestPolicy::new()
//!     .with_session(SessionPolicy::new())
//!     .with_character(CharacterPolicy::new().min_level(10));
//! ```
//!
//! The gate chain reads the policy; gates whose section is absent pass
//! straight through.

/// "Requires a game session" and its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionPolicy {
    /// Accept a session whose TTL elapsed but which hasn't been swept yet.
    /// Such a session is not refreshed.
    pub allow_expired: bool,
    /// Minimum account level, checked against the account profile.
    pub min_account_level: Option<u32>,
}

impl SessionPolicy {
    /// Requires a live session.
    pub const fn new() -> Self {
        Self {
            allow_expired: false,
            min_account_level: None,
        }
    }

    /// Also admits an expired, not yet swept session.
    pub const fn allow_expired(mut self) -> Self {
        self.allow_expired = true;
        self
    }

    /// Requires the account profile to be at least `level`.
    pub const fn min_account_level(mut self, level: u32) -> Self {
        self.min_account_level = Some(level);
        self
    }
}

/// "Requires a selected character" and its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacterPolicy {
    /// Let the request through with no character selected.
    pub allow_unselected: bool,
    /// Minimum level of the selected character.
    pub min_character_level: Option<u32>,
}

impl CharacterPolicy {
    /// Requires a selected character.
    pub const fn new() -> Self {
        Self {
            allow_unselected: false,
            min_character_level: None,
        }
    }

    /// Lets requests through with no character selected.
    pub const fn allow_unselected(mut self) -> Self {
        self.allow_unselected = true;
        self
    }

    /// Requires the selected character to be at least `level`.
    pub const fn min_level(mut self, level: u32) -> Self {
        self.min_character_level = Some(level);
        self
    }
}

/// Everything a request type declares about who may run it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub session: Option<SessionPolicy>,
    pub character: Option<CharacterPolicy>,
    /// Every listed role is required.
    pub roles: &'static [&'static str],
    /// A named policy evaluated by the identity provider.
    pub policy: Option<&'static str>,
}

impl RequestPolicy {
    /// Authentication only.
    pub const PUBLIC: RequestPolicy = RequestPolicy::new();

    /// Only authentication; same as [`RequestPolicy::PUBLIC`].
    pub const fn new() -> Self {
        Self {
            session: None,
            character: None,
            roles: &[],
            policy: None,
        }
    }

    /// Adds a session requirement.
    pub const fn with_session(mut self, session: SessionPolicy) -> Self {
        self.session = Some(session);
        self
    }

    /// Adds a character requirement.
    pub const fn with_character(mut self, character: CharacterPolicy) -> Self {
        self.character = Some(character);
        self
    }

    /// Requires every role in `roles`.
    pub const fn with_roles(mut self, roles: &'static [&'static str]) -> Self {
        self.roles = roles;
        self
    }

    /// Requires the named authorization policy.
    pub const fn with_policy(mut self, policy: &'static str) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new()
    }
}
