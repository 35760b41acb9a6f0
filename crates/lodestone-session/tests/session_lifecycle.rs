//! Integration tests for the session layer: cache, manager, data store,
//! and expiration worker wired together the way a server wires them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use lodestone_cache::CacheConfig;
use lodestone_session::{
    ACCOUNT_ID_CLAIM, AccountId, CharacterId, ExpirationQueue, ExpirationWorker,
    IdentityError, InMemoryIdentity, SessionDataStore, SessionManager, SessionStatus,
    UserId, WorkerConfig, session_cache,
};
use tokio::sync::watch;
use tokio::time;

// =========================================================================
// Helper
// =========================================================================

struct Layer {
    manager: Arc<SessionManager>,
    data: SessionDataStore,
    identity: Arc<InMemoryIdentity>,
    queue: Arc<ExpirationQueue>,
    worker: Arc<ExpirationWorker>,
}

fn layer(default_ttl: Duration) -> Layer {
    let queue = Arc::new(ExpirationQueue::new());
    let identity = Arc::new(InMemoryIdentity::new());
    let cache = session_cache(
        CacheConfig {
            default_ttl,
            sweep_interval: Duration::from_secs(1),
        },
        Arc::clone(&queue),
    );
    let worker = Arc::new(ExpirationWorker::new(
        Arc::clone(&queue),
        identity.clone(),
        cache.clone(),
        WorkerConfig {
            backoff_jitter_ms: 0,
            ..WorkerConfig::default()
        },
    ));
    Layer {
        manager: Arc::new(SessionManager::new(cache.clone(), identity.clone())),
        data: SessionDataStore::new(cache),
        identity,
        queue,
        worker,
    }
}

fn uid(s: &str) -> UserId {
    UserId::from(s)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// =========================================================================
// Expiry end to end
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_expired_session_claim_is_removed_within_one_poll_interval() {
    let l = layer(secs(60));
    let sweeper = l.manager.cache().spawn_sweeper();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&l.worker).run(shutdown_rx));

    l.manager
        .set_session(&uid("u1"), AccountId(42), Some(secs(30)))
        .await
        .unwrap();
    assert_eq!(
        l.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).as_deref(),
        Some("42")
    );

    // Deadline + one sweep tick + one poll interval.
    time::sleep(secs(31)).await;
    assert!(!l.manager.has_active_session(&uid("u1")));
    time::sleep(secs(6)).await;

    assert_eq!(l.manager.status(&uid("u1")), SessionStatus::None);
    assert_eq!(l.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
    assert!(l.queue.is_empty());

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_refreshing_every_half_ttl_keeps_session_alive() {
    let l = layer(secs(60));
    l.manager
        .set_session(&uid("u1"), AccountId(1), Some(secs(30)))
        .await
        .unwrap();

    for _ in 0..10 {
        time::advance(secs(15)).await;
        assert!(l.manager.refresh_session(&uid("u1")));
    }
    l.manager.cache().sweep();

    assert!(l.manager.has_active_session(&uid("u1")));
    assert!(l.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_relogin_after_expiry_keeps_new_claim() {
    let l = layer(secs(30));
    l.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();
    time::advance(secs(31)).await;
    l.manager.cache().sweep();

    l.manager.set_session(&uid("u1"), AccountId(2), None).await.unwrap();
    let report = l.worker.drain_once().await;

    assert_eq!(report.superseded, 1);
    assert_eq!(
        l.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM).as_deref(),
        Some("2")
    );
}

#[tokio::test(start_paused = true)]
async fn test_provider_outage_is_retried_until_it_recovers() {
    let l = layer(secs(30));
    l.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();
    time::advance(secs(31)).await;
    l.manager.cache().sweep();
    l.identity.fail_next(IdentityError::Unavailable("connection refused".into()));
    l.identity.fail_next(IdentityError::Timeout);

    assert_eq!(l.worker.drain_once().await.retried, 1);
    time::advance(secs(1)).await;
    assert_eq!(l.worker.drain_once().await.retried, 1);
    time::advance(secs(2)).await;
    assert_eq!(l.worker.drain_once().await.cleaned, 1);

    assert_eq!(l.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
    assert_eq!(l.identity.remove_calls(), 3);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_refresh_and_revoke_never_resurrects() {
    let l = layer(secs(60));
    l.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();

    let refreshes = (0..2).map(|_| {
        let manager = Arc::clone(&l.manager);
        tokio::spawn(async move { manager.refresh_session(&uid("u1")) })
    });
    let revoke = {
        let manager = Arc::clone(&l.manager);
        tokio::spawn(async move { manager.revoke_session(&uid("u1")).await })
    };

    join_all(refreshes).await;
    assert!(revoke.await.unwrap().unwrap());

    assert!(!l.manager.has_active_session(&uid("u1")));
    assert!(!l.manager.refresh_session(&uid("u1")));
    assert_eq!(l.identity.claim(&uid("u1"), ACCOUNT_ID_CLAIM), None);
}

#[tokio::test(start_paused = true)]
async fn test_many_users_expire_and_are_cleaned_in_batches() {
    let l = layer(secs(30));
    let logins = (0..120).map(|i| {
        let manager = Arc::clone(&l.manager);
        async move {
            manager
                .set_session(&uid(&format!("user-{i}")), AccountId(i), None)
                .await
        }
    });
    for result in join_all(logins).await {
        result.unwrap();
    }

    time::advance(secs(31)).await;
    assert_eq!(l.manager.cache().sweep(), 120);
    assert_eq!(l.queue.len(), 120);

    let mut cycles = 0;
    while !l.queue.is_empty() {
        l.worker.drain_once().await;
        cycles += 1;
    }

    assert_eq!(cycles, 3);
    assert_eq!(l.worker.stats().snapshot().cleaned, 120);
}

// =========================================================================
// Session data
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_selected_character_follows_session_lifetime() {
    let l = layer(secs(60));
    l.manager.set_session(&uid("u1"), AccountId(1), None).await.unwrap();

    l.data.select_character(&uid("u1"), CharacterId(7)).unwrap();
    assert_eq!(l.data.selected_character(&uid("u1")), Some(CharacterId(7)));

    l.manager.revoke_session(&uid("u1")).await.unwrap();
    assert_eq!(l.data.selected_character(&uid("u1")), None);
    assert!(l.data.select_character(&uid("u1"), CharacterId(7)).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restore_from_claim_recovers_session_after_restart() {
    let l = layer(secs(60));
    l.manager.set_session(&uid("u1"), AccountId(9), None).await.unwrap();

    // A fresh cache stands in for a restarted process; the claim survived.
    let restarted = SessionManager::new(
        session_cache(CacheConfig::default(), Arc::new(ExpirationQueue::new())),
        l.identity.clone(),
    );
    assert!(!restarted.has_active_session(&uid("u1")));

    assert!(restarted.restore_from_claim(&uid("u1")).await.unwrap());
    let session = restarted.get_session(&uid("u1")).unwrap();
    assert_eq!(session.account_id, AccountId(9));
}
