//! Background cleanup of expired sessions.
//!
//! The cache's eviction listener only enqueues. This worker does the slow
//! part: it wakes on a fixed poll interval, takes the queue's drain lock,
//! dequeues a batch, and removes each user's durable account claim
//! through the [`IdentityProvider`].
//!
//! Polling (instead of reacting per item) decouples eviction time, which
//! is bursty and happens on hot paths, from cleanup time, which is I/O
//! bound and should be throttled.
//!
//! # Failure handling
//!
//! - Transient provider errors ([`IdentityError::is_transient`]) put the
//!   item back with `retry_count + 1` and an exponential backoff
//!   (`backoff_base * 2^(n-1)`, capped at `backoff_max`, plus jitter).
//! - After `max_retries` transient failures the item is dead-lettered:
//!   logged at `error` under the `lodestone::dead_letter` target and
//!   dropped.
//! - Structural errors are logged and dropped immediately.
//!
//! Cleanup of a single item is never cancelled halfway; it either
//! completes or is retried whole. It is also idempotent, since the same
//! user can be queued twice after a rapid login/expire/login/expire.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    ACCOUNT_ID_CLAIM, ExpirationQueue, ExpirationQueueItem, IdentityError,
    IdentityProvider, SessionCache,
};

/// Pause between shutdown drain rounds that settled nothing.
const IDLE_PAUSE: Duration = Duration::from_millis(100);

/// Stand-in deadline for a shutdown grace too large to add to `now`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the [`ExpirationWorker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often the worker checks the queue. Default: 5 seconds.
    pub poll_interval: Duration,
    /// Maximum items dequeued per drain cycle. Default: 50.
    pub batch_size: usize,
    /// Transient failures tolerated before an item is dead-lettered.
    /// Default: 8.
    pub max_retries: u32,
    /// Backoff after the first transient failure. Default: 1 second.
    pub backoff_base: Duration,
    /// Upper bound on the backoff. Default: 5 minutes.
    pub backoff_max: Duration,
    /// Random jitter (0 to max ms) added to each backoff so a burst of
    /// failures doesn't retry in lockstep. Default: 250 ms.
    pub backoff_jitter_ms: u64,
    /// Time allowed for the final drain on shutdown. Default: 10 seconds.
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            max_retries: 8,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5 * 60),
            backoff_jitter_ms: 250,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`ExpirationWorker::new`]. Rules:
    /// - `poll_interval` at least 1 ms (`tokio::time::interval` panics on 0).
    /// - `batch_size` at least 1.
    /// - `backoff_max` forced ≥ `backoff_base`.
    pub fn validated(mut self) -> Self {
        if self.poll_interval < Duration::from_millis(1) {
            warn!("poll_interval below 1ms, clamping");
            self.poll_interval = Duration::from_millis(1);
        }
        if self.batch_size == 0 {
            warn!("batch_size of 0 would never drain, using 1");
            self.batch_size = 1;
        }
        if self.backoff_max < self.backoff_base {
            self.backoff_max = self.backoff_base;
        }
        self
    }

    /// Backoff before attempt number `retry_count + 1`, without jitter.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max)
    }
}

// ---------------------------------------------------------------------------
// Reports and stats
// ---------------------------------------------------------------------------

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Claims removed (or already absent).
    pub cleaned: u64,
    /// Items skipped because the user logged in again before cleanup.
    pub superseded: u64,
    /// Items put back after a transient failure.
    pub retried: u64,
    /// Items dropped after a structural failure.
    pub dropped: u64,
    /// Items dropped after exhausting their retries.
    pub dead_lettered: u64,
    /// Items put back untouched: backoff not elapsed, or the shutdown
    /// deadline passed before they were started.
    pub deferred: u64,
}

impl DrainReport {
    /// Items that left the queue for good in this cycle.
    pub fn settled(&self) -> u64 {
        self.cleaned + self.superseded + self.dropped + self.dead_lettered
    }
}

/// Running totals across all drain cycles.
#[derive(Debug, Default)]
pub struct WorkerStats {
    cycles: AtomicU64,
    cleaned: AtomicU64,
    superseded: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    dead_lettered: AtomicU64,
}

impl WorkerStats {
    fn record(&self, report: &DrainReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.cleaned.fetch_add(report.cleaned, Ordering::Relaxed);
        self.superseded.fetch_add(report.superseded, Ordering::Relaxed);
        self.retried.fetch_add(report.retried, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped, Ordering::Relaxed);
        self.dead_lettered
            .fetch_add(report.dead_lettered, Ordering::Relaxed);
    }

    /// A point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            cleaned: self.cleaned.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub cleaned: u64,
    pub superseded: u64,
    pub retried: u64,
    pub dropped: u64,
    pub dead_lettered: u64,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum Cleanup {
    Cleaned,
    Superseded,
}

/// Drains the [`ExpirationQueue`] and removes account claims.
pub struct ExpirationWorker {
    queue: Arc<ExpirationQueue>,
    identity: Arc<dyn IdentityProvider>,
    cache: SessionCache,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl ExpirationWorker {
    /// Creates a worker. `cache` is consulted to skip users who have
    /// logged in again since their old session expired.
    pub fn new(
        queue: Arc<ExpirationQueue>,
        identity: Arc<dyn IdentityProvider>,
        cache: SessionCache,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            identity,
            cache,
            config: config.validated(),
            stats: WorkerStats::default(),
        }
    }

    /// The validated configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Running totals across every drain cycle.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Runs the poll loop until `shutdown` flips to `true` (or its sender
    /// is dropped), then performs a final drain and returns its report.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> DrainReport {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "expiration worker started"
        );

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.queue.is_empty() {
                        continue;
                    }
                    self.drain_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let report = self.final_drain().await;
        info!(
            cleaned = report.cleaned,
            left = self.queue.len(),
            "expiration worker stopped"
        );
        report
    }

    /// Runs one drain cycle: lock, dequeue up to `batch_size`, clean up.
    ///
    /// Waits if another cycle holds the drain lock.
    pub async fn drain_once(&self) -> DrainReport {
        self.drain(None).await
    }

    /// Best-effort drain within `shutdown_grace`, ignoring backoff.
    ///
    /// The deadline is checked between items, never during one: an item
    /// already handed to the provider is finished, and the rest of its
    /// batch goes back on the queue untouched. Items still queued when the
    /// grace period ends are abandoned; the durable claims they refer to
    /// stay behind.
    pub async fn final_drain(&self) -> DrainReport {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.config.shutdown_grace)
            .unwrap_or(now + FAR_FUTURE);
        let mut total = DrainReport::default();

        while !self.queue.is_empty() && Instant::now() < deadline {
            let report = self.drain(Some(deadline)).await;
            merge(&mut total, &report);
            if report.settled() == 0 {
                // Only retries this round; don't spin on a provider
                // that's down.
                let left = deadline.saturating_duration_since(Instant::now());
                time::sleep(IDLE_PAUSE.min(left)).await;
            }
        }

        if !self.queue.is_empty() {
            warn!(
                left = self.queue.len(),
                "shutdown grace elapsed with cleanup still queued"
            );
        }
        total
    }

    /// One drain cycle. With a `stop_at`, backoff is ignored and no new
    /// item is started once that instant has passed.
    async fn drain(&self, stop_at: Option<Instant>) -> DrainReport {
        let mut drain = self.queue.lock().await;
        let batch = drain.take(self.config.batch_size);
        let mut report = DrainReport::default();
        if batch.is_empty() {
            return report;
        }

        let now = Instant::now();
        let mut requeue = Vec::new();

        let mut items = batch.into_iter();
        while let Some(mut item) = items.next() {
            if stop_at.is_some_and(|t| Instant::now() >= t) {
                let unstarted = 1 + items.len();
                report.deferred += unstarted as u64;
                requeue.push(item);
                requeue.extend(items.by_ref());
                break;
            }
            if stop_at.is_none() && item.not_before > now {
                report.deferred += 1;
                requeue.push(item);
                continue;
            }

            match self.cleanup(&item).await {
                Ok(Cleanup::Cleaned) => report.cleaned += 1,
                Ok(Cleanup::Superseded) => report.superseded += 1,
                Err(e) if e.is_transient() => {
                    item.retry_count += 1;
                    if item.retry_count > self.config.max_retries {
                        error!(
                            target: "lodestone::dead_letter",
                            user_id = %item.user_id,
                            account_id = %item.account_id,
                            retries = item.retry_count - 1,
                            error = %e,
                            "session cleanup exhausted retries"
                        );
                        report.dead_lettered += 1;
                    } else {
                        let backoff = self.backoff(item.retry_count);
                        item.not_before = Instant::now() + backoff;
                        debug!(
                            user_id = %item.user_id,
                            retry = item.retry_count,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "session cleanup failed, will retry"
                        );
                        report.retried += 1;
                        requeue.push(item);
                    }
                }
                Err(e) => {
                    warn!(
                        user_id = %item.user_id,
                        error = %e,
                        "session cleanup failed permanently, dropping"
                    );
                    report.dropped += 1;
                }
            }
        }

        for item in requeue {
            self.queue.push(item);
        }
        drop(drain);

        self.stats.record(&report);
        debug!(
            cleaned = report.cleaned,
            superseded = report.superseded,
            retried = report.retried,
            dropped = report.dropped,
            dead_lettered = report.dead_lettered,
            deferred = report.deferred,
            "expiration drain cycle finished"
        );
        report
    }

    async fn cleanup(&self, item: &ExpirationQueueItem) -> Result<Cleanup, IdentityError> {
        // The user logged in again after this session expired; the claim
        // now belongs to the new session.
        if self.cache.contains_live(&item.user_id) {
            return Ok(Cleanup::Superseded);
        }

        let removed = self
            .identity
            .remove_claim(&item.user_id, ACCOUNT_ID_CLAIM)
            .await?;
        if removed {
            info!(user_id = %item.user_id, account_id = %item.account_id, "expired session cleaned up");
        } else {
            debug!(user_id = %item.user_id, "expired session had no claim left");
        }
        Ok(Cleanup::Cleaned)
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        let base = self.config.backoff_for(retry_count);
        if self.config.backoff_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=self.config.backoff_jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

fn merge(total: &mut DrainReport, report: &DrainReport) {
    total.cleaned += report.cleaned;
    total.superseded += report.superseded;
    total.retried += report.retried;
    total.dropped += report.dropped;
    total.dead_lettered += report.dead_lettered;
    total.deferred += report.deferred;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.max_retries, 8);
    }

    #[test]
    fn test_validated_fixes_zero_values() {
        let cfg = WorkerConfig {
            poll_interval: Duration::ZERO,
            batch_size: 0,
            backoff_base: Duration::from_secs(10),
            backoff_max: Duration::from_secs(1),
            ..WorkerConfig::default()
        }
        .validated();

        assert_eq!(cfg.poll_interval, Duration::from_millis(1));
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.backoff_max, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: WorkerConfig = serde_json::from_str(r#"{ "max_retries": 2 }"#).unwrap();

        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_for_doubles_and_caps() {
        let cfg = WorkerConfig {
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            ..WorkerConfig::default()
        };

        assert_eq!(cfg.backoff_for(1), Duration::from_secs(1));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(2));
        assert_eq!(cfg.backoff_for(3), Duration::from_secs(4));
        assert_eq!(cfg.backoff_for(4), Duration::from_secs(8));
        assert_eq!(cfg.backoff_for(5), Duration::from_secs(10));
        assert_eq!(cfg.backoff_for(60), Duration::from_secs(10));
    }

    #[test]
    fn test_drain_report_settled_excludes_retries() {
        let report = DrainReport {
            cleaned: 2,
            superseded: 1,
            retried: 5,
            dropped: 1,
            dead_lettered: 1,
            deferred: 3,
        };
        assert_eq!(report.settled(), 5);
    }

    // -- Drain cycles -----------------------------------------------------

    use lodestone_cache::CacheConfig;

    use crate::{AccountId, InMemoryIdentity, SessionManager, UserId, session_cache};

    struct Fixture {
        manager: SessionManager,
        identity: Arc<InMemoryIdentity>,
        queue: Arc<ExpirationQueue>,
        worker: Arc<ExpirationWorker>,
    }

    fn fixture(config: WorkerConfig) -> Fixture {
        let queue = Arc::new(ExpirationQueue::new());
        let identity = Arc::new(InMemoryIdentity::new());
        let cache = session_cache(
            CacheConfig {
                default_ttl: Duration::from_secs(30),
                sweep_interval: Duration::from_secs(1),
            },
            Arc::clone(&queue),
        );
        let manager = SessionManager::new(cache.clone(), identity.clone());
        let worker = Arc::new(ExpirationWorker::new(
            Arc::clone(&queue),
            identity.clone(),
            cache,
            config,
        ));
        Fixture {
            manager,
            identity,
            queue,
            worker,
        }
    }

    fn no_jitter() -> WorkerConfig {
        WorkerConfig {
            backoff_jitter_ms: 0,
            ..WorkerConfig::default()
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    /// Starts a session for `user` and lets it expire and get swept.
    async fn expire(f: &Fixture, user: &str) {
        f.manager
            .set_session(&uid(user), AccountId(42), None)
            .await
            .unwrap();
        time::advance(Duration::from_secs(31)).await;
        f.manager.cache().sweep();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_removes_expired_claim() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        assert_eq!(f.queue.len(), 1);

        let report = f.worker.drain_once().await;

        assert_eq!(report.cleaned, 1);
        assert!(f.queue.is_empty());
        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_missing_claim_counts_as_cleaned() {
        let f = fixture(no_jitter());
        f.queue.push(ExpirationQueueItem::new(
            uid("ghost"),
            AccountId(1),
            lodestone_cache::EvictionReason::Expired,
        ));

        let report = f.worker.drain_once().await;

        assert_eq!(report.cleaned, 1);
        assert_eq!(f.identity.remove_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_duplicate_items_are_idempotent() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        f.queue.push(ExpirationQueueItem::new(
            uid("u1"),
            AccountId(42),
            lodestone_cache::EvictionReason::Expired,
        ));

        let report = f.worker.drain_once().await;

        assert_eq!(report.cleaned, 2);
        assert_eq!(report.settled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_respects_batch_size() {
        let f = fixture(WorkerConfig {
            batch_size: 2,
            ..no_jitter()
        });
        for i in 0..5 {
            f.manager
                .set_session(&uid(&format!("u{i}")), AccountId(i), None)
                .await
                .unwrap();
        }
        time::advance(Duration::from_secs(31)).await;
        f.manager.cache().sweep();

        let report = f.worker.drain_once().await;

        assert_eq!(report.cleaned, 2);
        assert_eq!(f.queue.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_transient_failure_retries_after_backoff() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        f.identity.fail_next(IdentityError::Unavailable("db down".into()));

        let first = f.worker.drain_once().await;
        assert_eq!(first.retried, 1);
        assert_eq!(f.queue.len(), 1);
        assert!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).is_some());

        // Backoff (1s) hasn't elapsed: the item is put back untouched.
        let second = f.worker.drain_once().await;
        assert_eq!(second.deferred, 1);
        assert_eq!(f.identity.remove_calls(), 1);

        time::advance(Duration::from_secs(1)).await;
        let third = f.worker.drain_once().await;
        assert_eq!(third.cleaned, 1);
        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_exhausted_retries_dead_letters() {
        let f = fixture(WorkerConfig {
            max_retries: 2,
            ..no_jitter()
        });
        expire(&f, "u1").await;
        for _ in 0..3 {
            f.identity.fail_next(IdentityError::Timeout);
        }

        assert_eq!(f.worker.drain_once().await.retried, 1);
        time::advance(Duration::from_secs(1)).await;
        assert_eq!(f.worker.drain_once().await.retried, 1);
        time::advance(Duration::from_secs(2)).await;
        let last = f.worker.drain_once().await;

        assert_eq!(last.dead_lettered, 1);
        assert!(f.queue.is_empty());
        assert_eq!(f.worker.stats().snapshot().dead_lettered, 1);
        assert_eq!(f.worker.stats().snapshot().retried, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_structural_failure_drops_item() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        f.identity
            .fail_next(IdentityError::Rejected("claim store is read-only".into()));

        let report = f.worker.drain_once().await;

        assert_eq!(report.dropped, 1);
        assert!(f.queue.is_empty());
        assert!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_relogin_before_cleanup_is_superseded() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        f.manager
            .set_session(&uid("u1"), AccountId(7), None)
            .await
            .unwrap();

        let report = f.worker.drain_once().await;

        assert_eq!(report.superseded, 1);
        assert_eq!(f.identity.remove_calls(), 0);
        assert_eq!(
            f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).as_deref(),
            Some("7")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_drain_ignores_backoff() {
        let f = fixture(no_jitter());
        expire(&f, "u1").await;
        f.identity.fail_next(IdentityError::Timeout);
        assert_eq!(f.worker.drain_once().await.retried, 1);

        let report = f.worker.final_drain().await;

        assert_eq!(report.cleaned, 1);
        assert!(f.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_drain_slow_provider_finishes_started_items_and_keeps_the_rest() {
        let f = fixture(WorkerConfig {
            shutdown_grace: Duration::from_secs(10),
            ..no_jitter()
        });
        for i in 0..5 {
            f.manager
                .set_session(&uid(&format!("u{i}")), AccountId(i), None)
                .await
                .unwrap();
        }
        time::advance(Duration::from_secs(31)).await;
        f.manager.cache().sweep();
        assert_eq!(f.queue.len(), 5);
        f.identity.set_latency(Duration::from_secs(4));

        let report = f.worker.final_drain().await;

        // Items start at 0s, 4s and 8s; the fourth would start past the
        // 10s grace and goes back on the queue with the fifth.
        let claims_left = (0..5)
            .filter(|i| {
                f.identity
                    .claim(&uid(&format!("u{i}")), ACCOUNT_ID_CLAIM)
                    .is_some()
            })
            .count();
        assert_eq!(report.cleaned, 3);
        assert_eq!(report.deferred, 2);
        assert_eq!(f.queue.len(), 2);
        assert_eq!(f.queue.len(), claims_left);
        assert_eq!(f.worker.stats().snapshot().cleaned, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cleans_up_within_poll_interval_and_stops() {
        let f = fixture(no_jitter());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&f.worker).run(shutdown_rx));

        expire(&f, "u1").await;
        time::sleep(Duration::from_secs(6)).await;

        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
        assert!(f.worker.stats().snapshot().cycles >= 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_remaining_items_on_shutdown() {
        let f = fixture(WorkerConfig {
            poll_interval: Duration::from_secs(3600),
            ..no_jitter()
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&f.worker).run(shutdown_rx));
        // Let the immediate first tick pass on an empty queue.
        tokio::task::yield_now().await;

        expire(&f, "u1").await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(f.queue.is_empty());
        assert_eq!(f.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
    }
}
