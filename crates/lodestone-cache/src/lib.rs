//! Sliding-expiration TTL cache for Lodestone.
//!
//! The session layer keeps all of its ephemeral state in a [`TtlCache`]:
//! one entry per user, each with its own time-to-live that slides forward
//! whenever the entry is touched.
//!
//! # Expiry vs. eviction
//!
//! An entry whose deadline has passed is *expired* but still physically
//! present until the next [`TtlCache::sweep`]. Readers can tell the two
//! apart through [`TtlCache::peek`]; [`TtlCache::get`] only ever returns
//! live values. Sweeping is what *evicts* expired entries and fires the
//! [`EvictionListener`] with [`EvictionReason::Expired`].
//!
//! # Time
//!
//! Deadlines use `tokio::time::Instant`, so tests can freeze and advance
//! the clock with `tokio::time::pause()` / `tokio::time::advance()`.
//!
//! ```text
//! insert ──→ [Live] ──touch──→ [Live]
//!               │
//!               ▼ (deadline passes)
//!           [Expired] ──sweep──→ listener(Expired) ──→ gone
//! ```

mod cache;
mod config;

pub use cache::{EvictionListener, EvictionReason, Lookup, TtlCache};
pub use config::{CacheConfig, MAX_TTL};
