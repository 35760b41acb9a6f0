//! Game session management for Lodestone.
//!
//! This crate answers one question for the rest of the backend: *is this
//! identity currently logged into a game account, and which character has
//! it selected?*
//!
//! 1. **Session tracking**: [`SessionManager`] creates, refreshes,
//!    revokes, and queries game sessions stored in a [`SessionCache`].
//! 2. **Session data**: [`SessionDataStore`] reads and rewrites the small
//!    per-session key/value bag (selected character, ...).
//! 3. **Expiration cleanup**: when the cache sweeps an expired session,
//!    its eviction listener pushes an [`ExpirationQueueItem`] onto the
//!    [`ExpirationQueue`]; the [`ExpirationWorker`] drains that queue in
//!    batches and removes the durable claim through the
//!    [`IdentityProvider`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Gate chain (above)   ← checks sessions before running request handlers
//!     ↕
//! Session layer (this crate)  ← session state, data bag, cleanup worker
//!     ↕
//! TTL cache (below)    ← sliding expiration + eviction listener
//! ```

mod data;
mod error;
mod identity;
mod ids;
mod manager;
mod queue;
mod record;
mod worker;

pub use data::SessionDataStore;
pub use error::{IdentityError, SessionError};
pub use identity::{ACCOUNT_ID_CLAIM, IdentityProvider, InMemoryIdentity};
pub use ids::{AccountId, CharacterId, UserId};
pub use manager::{SessionCache, SessionManager, session_cache};
pub use queue::{ExpirationQueue, ExpirationQueueItem};
pub use record::{
    SELECTED_CHARACTER_KEY, SessionData, SessionEntry, SessionRecord,
    SessionStatus,
};
pub use worker::{DrainReport, ExpirationWorker, StatsSnapshot, WorkerConfig, WorkerStats};
