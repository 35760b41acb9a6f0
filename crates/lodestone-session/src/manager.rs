//! The session manager: tracks which users are logged into a game account.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Starting a session when a user completes login to an account
//! - Sliding the session's TTL forward while it's being used
//! - Revoking sessions on logout
//! - Mirroring the session into a durable claim, and restoring from it
//!
//! # Concurrency note
//!
//! `SessionManager` holds no lock of its own. Every state change is a
//! single atomic operation on the [`SessionCache`], so concurrent
//! refresh/read/revoke calls for one user never interleave inside an
//! operation. In particular `refresh_session` is one `touch`, not a
//! read followed by a re-insert: once `revoke_session` has removed the
//! entry, no in-flight refresh can bring it back.

use std::sync::Arc;
use std::time::Duration;

use lodestone_cache::{CacheConfig, EvictionReason, Lookup, TtlCache};

use crate::{
    ACCOUNT_ID_CLAIM, AccountId, ExpirationQueue, ExpirationQueueItem,
    IdentityProvider, SessionEntry, SessionError, SessionRecord,
    SessionStatus, UserId,
};

/// The process-wide cache holding one [`SessionEntry`] per user.
pub type SessionCache = TtlCache<UserId, SessionEntry>;

/// Builds the session cache with its eviction listener wired to `queue`.
///
/// The listener runs synchronously inside whatever evicted the entry, so
/// all it does is push an [`ExpirationQueueItem`] for entries that
/// *expired*. Explicit removals (`revoke_session`) clean up inline, and
/// replacements (re-login) rewrite the claim themselves, so neither is
/// enqueued.
pub fn session_cache(config: CacheConfig, queue: Arc<ExpirationQueue>) -> SessionCache {
    TtlCache::with_listener(
        config,
        move |user_id: &UserId, entry: &SessionEntry, reason| {
            if reason == EvictionReason::Expired {
                tracing::debug!(%user_id, "game session expired, queueing cleanup");
                queue.push(ExpirationQueueItem::new(
                    user_id.clone(),
                    entry.account_id,
                    reason,
                ));
            }
        },
    )
}

/// Owns "is this user logged into the game" state.
///
/// ## Lifecycle
///
/// ```text
/// set_session() ──→ [Active] ──refresh_session()──→ [Active]
///                      │   │
///                      │   └──(TTL elapses)──→ [Expired] ──sweep──→ queue ──→ worker cleanup
///                      ▼
///               revoke_session() ──→ [None] (claim removed inline)
/// ```
pub struct SessionManager {
    cache: SessionCache,
    identity: Arc<dyn IdentityProvider>,
}

impl SessionManager {
    /// Creates a manager over an existing session cache.
    pub fn new(cache: SessionCache, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { cache, identity }
    }

    /// The cache this manager writes to.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// TTL used when `set_session` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.cache.config().default_ttl
    }

    /// Returns `true` if the user has a live game session.
    ///
    /// A pure cache lookup: never blocks, never touches the TTL.
    pub fn has_active_session(&self, user_id: &UserId) -> bool {
        self.cache.contains_live(user_id)
    }

    /// Returns the live session, if any.
    pub fn get_session(&self, user_id: &UserId) -> Option<SessionRecord> {
        match self.status(user_id) {
            SessionStatus::Active(record) => Some(record),
            _ => None,
        }
    }

    /// Reports `Active`, `Expired` (deadline passed, not yet swept), or
    /// `None`.
    pub fn status(&self, user_id: &UserId) -> SessionStatus {
        match self.cache.peek(user_id) {
            None => SessionStatus::None,
            Some(lookup) => {
                let record = lookup.value().to_record(user_id, lookup.deadline());
                match lookup {
                    Lookup::Live { .. } => SessionStatus::Active(record),
                    Lookup::Expired { .. } => SessionStatus::Expired(record),
                }
            }
        }
    }

    /// Starts (or restarts) a game session for `user_id` on `account_id`.
    ///
    /// `ttl` defaults to the cache's default TTL and is capped at
    /// [`MAX_TTL`](lodestone_cache::MAX_TTL).
    ///
    /// Overwriting an existing session is intentional: logging in again
    /// replaces the old session and starts with an empty data bag. After
    /// the cache write, the account is mirrored into the durable
    /// [`ACCOUNT_ID_CLAIM`].
    ///
    /// # Errors
    /// [`SessionError::Identity`] if the claim could not be written. The
    /// session itself is live at that point; only the durable mirror is
    /// missing.
    pub async fn set_session(
        &self,
        user_id: &UserId,
        account_id: AccountId,
        ttl: Option<Duration>,
    ) -> Result<SessionRecord, SessionError> {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        let entry = SessionEntry::new(account_id);
        let expires_at = self.cache.insert(user_id.clone(), entry.clone(), ttl);
        let record = entry.to_record(user_id, expires_at);

        tracing::info!(
            %user_id,
            %account_id,
            ttl_secs = ttl.as_secs(),
            "game session started"
        );

        self.mirror_claim(user_id, account_id).await?;
        Ok(record)
    }

    /// Slides the session's TTL forward (renew-on-use).
    ///
    /// Advisory: returns `false` and does nothing if the user has no live
    /// session. It never creates or resurrects one.
    pub fn refresh_session(&self, user_id: &UserId) -> bool {
        match self.cache.touch(user_id) {
            Some(_) => {
                tracing::trace!(%user_id, "game session refreshed");
                true
            }
            None => false,
        }
    }

    /// Time left before the session expires, if it is live.
    pub fn remaining_ttl(&self, user_id: &UserId) -> Option<Duration> {
        self.cache.remaining_ttl(user_id)
    }

    /// Ends the session immediately and removes the durable claim.
    ///
    /// Unlike natural expiry, nothing is enqueued: the caller is already in
    /// an async context, so cleanup happens inline. Returns `true` if a
    /// session (live or expired) was removed. Revoking twice is harmless.
    ///
    /// # Errors
    /// [`SessionError::Identity`] if the claim could not be removed. The
    /// cache entry is gone either way.
    pub async fn revoke_session(&self, user_id: &UserId) -> Result<bool, SessionError> {
        let removed = self.cache.remove(user_id).is_some();
        self.identity.remove_claim(user_id, ACCOUNT_ID_CLAIM).await?;

        if removed {
            tracing::info!(%user_id, "game session revoked");
        } else {
            tracing::debug!(%user_id, "revoke requested with no session");
        }
        Ok(removed)
    }

    /// Recreates a session from the durable claim after a restart.
    ///
    /// The cache doesn't survive a process restart but the claim does. If
    /// the user has no live session and holds a parseable
    /// [`ACCOUNT_ID_CLAIM`], a session with the default TTL is started
    /// from it. Returns `true` if a session was restored. A session started
    /// concurrently is never overwritten.
    pub async fn restore_from_claim(&self, user_id: &UserId) -> Result<bool, SessionError> {
        if self.has_active_session(user_id) {
            return Ok(false);
        }

        let Some(value) = self
            .identity
            .get_claim_value(user_id, ACCOUNT_ID_CLAIM)
            .await?
        else {
            return Ok(false);
        };

        let Some(account_id) = AccountId::from_claim(&value) else {
            tracing::warn!(%user_id, claim = %value, "unparseable account claim, not restoring");
            return Ok(false);
        };

        // A login may have landed while the claim was being read; it wins.
        let restored = self.cache.insert_unless_live(
            user_id.clone(),
            SessionEntry::new(account_id),
            self.default_ttl(),
        );
        if restored.is_none() {
            tracing::debug!(%user_id, "session started during restore, keeping it");
            return Ok(false);
        }
        tracing::info!(%user_id, %account_id, "game session restored from claim");
        Ok(true)
    }

    /// Writes the account claim, replacing a stale value.
    async fn mirror_claim(
        &self,
        user_id: &UserId,
        account_id: AccountId,
    ) -> Result<(), SessionError> {
        let wanted = account_id.claim_value();
        let current = self
            .identity
            .get_claim_value(user_id, ACCOUNT_ID_CLAIM)
            .await?;

        match current {
            Some(v) if v == wanted => return Ok(()),
            Some(_) => {
                self.identity.remove_claim(user_id, ACCOUNT_ID_CLAIM).await?;
            }
            None => {}
        }

        self.identity
            .add_claim(user_id, ACCOUNT_ID_CLAIM, &wanted)
            .await?;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.
    //!
    //! Every test runs on a paused Tokio clock, so `time::advance` moves
    //! session deadlines deterministically without real sleeping.

    use super::*;
    use crate::{IdentityError, InMemoryIdentity};
    use tokio::time;

    // -- Helpers ----------------------------------------------------------

    struct Fixture {
        manager: SessionManager,
        identity: Arc<InMemoryIdentity>,
        queue: Arc<ExpirationQueue>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(ExpirationQueue::new());
        let identity = Arc::new(InMemoryIdentity::new());
        let cache = session_cache(
            CacheConfig {
                default_ttl: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(1),
            },
            Arc::clone(&queue),
        );
        let manager = SessionManager::new(cache, identity.clone());
        Fixture {
            manager,
            identity,
            queue,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    // =====================================================================
    // set_session()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_set_session_new_user_is_active() {
        let f = fixture();

        let record = f
            .manager
            .set_session(&uid("u1"), AccountId(42), Some(secs(30)))
            .await
            .expect("should succeed");

        assert!(f.manager.has_active_session(&uid("u1")));
        assert_eq!(record.account_id, AccountId(42));
        assert_eq!(record.expires_at - record.created_at, secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_session_writes_account_claim() {
        let f = fixture();

        f.manager.set_session(&uid("u1"), AccountId(42), None).await.unwrap();

        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).as_deref(), Some("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_session_without_ttl_uses_default() {
        let f = fixture();

        f.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();

        assert_eq!(f.manager.remaining_ttl(&uid("u1")), Some(secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_session_relogin_overwrites_account_and_claim() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();

        f.manager.set_session(&uid("u1"), AccountId(2), None).await.unwrap();

        let session = f.manager.get_session(&uid("u1")).unwrap();
        assert_eq!(session.account_id, AccountId(2));
        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).as_deref(), Some("2"));
        // Replacement is not expiry: nothing queued for cleanup.
        assert!(f.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_session_claim_failure_keeps_session() {
        let f = fixture();
        f.identity.fail_next(IdentityError::Timeout);

        let result = f.manager.set_session(&uid("u1"), AccountId(1), None).await;

        assert!(matches!(result, Err(SessionError::Identity(IdentityError::Timeout))));
        assert!(f.manager.has_active_session(&uid("u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_session_huge_ttl_is_capped() {
        let f = fixture();

        let record = f
            .manager
            .set_session(&uid("u1"), AccountId(1), Some(Duration::MAX))
            .await
            .unwrap();

        assert_eq!(record.expires_at, record.created_at + lodestone_cache::MAX_TTL);
        time::advance(secs(3600)).await;
        assert!(f.manager.refresh_session(&uid("u1")));
    }

    // =====================================================================
    // has_active_session() / status()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_has_active_session_unknown_user_returns_false() {
        let f = fixture();
        assert!(!f.manager.has_active_session(&uid("nobody")));
        assert_eq!(f.manager.status(&uid("nobody")), SessionStatus::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_deadline_before_sweep_is_expired() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), Some(secs(30))).await.unwrap();

        time::advance(secs(31)).await;

        assert!(!f.manager.has_active_session(&uid("u1")));
        assert!(matches!(f.manager.status(&uid("u1")), SessionStatus::Expired(_)));
        assert!(f.manager.get_session(&uid("u1")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_sweep_is_none_and_cleanup_queued() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(42), Some(secs(30))).await.unwrap();

        time::advance(secs(31)).await;
        f.manager.cache().sweep();

        assert_eq!(f.manager.status(&uid("u1")), SessionStatus::None);
        assert_eq!(f.queue.len(), 1);
    }

    // =====================================================================
    // refresh_session()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_refresh_session_no_session_is_noop() {
        let f = fixture();

        assert!(!f.manager.refresh_session(&uid("u1")));
        assert!(!f.manager.has_active_session(&uid("u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_session_expired_session_does_not_resurrect() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), Some(secs(10))).await.unwrap();
        time::advance(secs(10)).await;

        assert!(!f.manager.refresh_session(&uid("u1")));
        assert!(!f.manager.has_active_session(&uid("u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_session_at_half_ttl_keeps_session_alive() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), Some(secs(30))).await.unwrap();

        for _ in 0..20 {
            time::advance(secs(15)).await;
            assert!(f.manager.remaining_ttl(&uid("u1")).is_some_and(|t| t > Duration::ZERO));
            assert!(f.manager.refresh_session(&uid("u1")));
        }

        assert!(f.manager.has_active_session(&uid("u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_session_never_moves_expiry_backwards() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), Some(secs(30))).await.unwrap();
        let before = f.manager.get_session(&uid("u1")).unwrap().expires_at;

        time::advance(secs(5)).await;
        f.manager.refresh_session(&uid("u1"));

        let after = f.manager.get_session(&uid("u1")).unwrap().expires_at;
        assert!(after >= before);
        assert_eq!(after - before, secs(5));
    }

    // =====================================================================
    // remaining_ttl()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_remaining_ttl_counts_down() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), Some(secs(30))).await.unwrap();

        time::advance(secs(12)).await;

        assert_eq!(f.manager.remaining_ttl(&uid("u1")), Some(secs(18)));
        assert_eq!(f.manager.remaining_ttl(&uid("u2")), None);
    }

    // =====================================================================
    // revoke_session()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_revoke_session_removes_session_and_claim_inline() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(42), None).await.unwrap();

        let removed = f.manager.revoke_session(&uid("u1")).await.unwrap();

        assert!(removed);
        assert!(!f.manager.has_active_session(&uid("u1")));
        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
        assert!(f.queue.is_empty(), "revoke must not enqueue cleanup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_session_twice_is_harmless() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(42), None).await.unwrap();

        assert!(f.manager.revoke_session(&uid("u1")).await.unwrap());
        assert!(!f.manager.revoke_session(&uid("u1")).await.unwrap());
    }

    // =====================================================================
    // restore_from_claim()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_claim_recreates_session() {
        let f = fixture();
        f.identity
            .add_claim(&uid("u1"), ACCOUNT_ID_CLAIM, "77")
            .await
            .unwrap();

        let restored = f.manager.restore_from_claim(&uid("u1")).await.unwrap();

        assert!(restored);
        assert_eq!(f.manager.get_session(&uid("u1")).unwrap().account_id, AccountId(77));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_claim_without_claim_returns_false() {
        let f = fixture();
        assert!(!f.manager.restore_from_claim(&uid("u1")).await.unwrap());
        assert!(!f.manager.has_active_session(&uid("u1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_claim_with_live_session_is_noop() {
        let f = fixture();
        f.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();

        assert!(!f.manager.restore_from_claim(&uid("u1")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_claim_garbage_value_returns_false() {
        let f = fixture();
        f.identity
            .add_claim(&uid("u1"), ACCOUNT_ID_CLAIM, "not-a-number")
            .await
            .unwrap();

        assert!(!f.manager.restore_from_claim(&uid("u1")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_claim_keeps_login_that_lands_during_claim_read() {
        let f = fixture();
        let data = crate::SessionDataStore::new(f.manager.cache().clone());
        let user = uid("u1");
        f.identity
            .add_claim(&user, ACCOUNT_ID_CLAIM, "1")
            .await
            .unwrap();
        f.identity.set_latency(secs(1));

        let (restored, ()) = tokio::join!(f.manager.restore_from_claim(&user), async {
            f.manager.set_session(&user, AccountId(2), None).await.unwrap();
            data.select_character(&user, crate::CharacterId(7)).unwrap();
        });

        assert!(!restored.unwrap());
        assert_eq!(f.manager.get_session(&user).unwrap().account_id, AccountId(2));
        assert_eq!(data.selected_character(&user), Some(crate::CharacterId(7)));
        assert_eq!(f.identity.claim(&user, ACCOUNT_ID_CLAIM).as_deref(), Some("2"));
    }
}
