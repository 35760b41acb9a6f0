//! `SessionLayer` builder and lifecycle.
//!
//! This ties the pieces together: one expiration queue, one session
//! cache whose eviction listener feeds that queue, the manager and data
//! store over the cache, and the worker draining the queue. Everything
//! is created once and shared through `Arc`s; nothing is global.

use std::sync::Arc;

use lodestone_cache::CacheConfig;
use lodestone_gate::{AccountProfiles, CharacterDirectory, GateChain, UnitOfWork};
use lodestone_session::{
    DrainReport, ExpirationQueue, ExpirationWorker, IdentityProvider, SessionCache,
    SessionDataStore, SessionManager, WorkerConfig, session_cache,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::LodestoneError;

/// All tunables of the session layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LodestoneConfig {
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

impl LodestoneConfig {
    /// Parses a JSON config. Missing sections and fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, LodestoneError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builder for a [`SessionLayer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use lodestone::{SessionLayer, session::InMemoryIdentity};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut layer = SessionLayer::builder().build(Arc::new(InMemoryIdentity::new()));
/// layer.start();
/// // ... serve requests ...
/// layer.shutdown().await.unwrap();
/// # }
/// ```
pub struct SessionLayerBuilder {
    config: LodestoneConfig,
}

impl SessionLayerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: LodestoneConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: LodestoneConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the session cache configuration.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Sets the expiration worker configuration.
    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.config.worker = config;
        self
    }

    /// Wires the layer around `identity`. Nothing runs until
    /// [`SessionLayer::start`].
    pub fn build(self, identity: Arc<dyn IdentityProvider>) -> SessionLayer {
        let queue = Arc::new(ExpirationQueue::new());
        let cache = session_cache(self.config.cache, Arc::clone(&queue));
        let manager = Arc::new(SessionManager::new(cache.clone(), Arc::clone(&identity)));
        let data = SessionDataStore::new(cache.clone());
        let worker = Arc::new(ExpirationWorker::new(
            Arc::clone(&queue),
            Arc::clone(&identity),
            cache.clone(),
            self.config.worker,
        ));

        SessionLayer {
            queue,
            cache,
            manager,
            data,
            identity,
            worker,
            running: None,
        }
    }
}

impl Default for SessionLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Background tasks of a started layer.
///
/// Dropping it stops the sweeper and tells the worker to finish; the
/// worker's final drain then runs detached.
struct Running {
    sweeper: JoinHandle<()>,
    worker: Option<JoinHandle<DrainReport>>,
    shutdown: watch::Sender<bool>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.sweeper.abort();
        self.shutdown.send_replace(true);
    }
}

/// The assembled session layer.
pub struct SessionLayer {
    queue: Arc<ExpirationQueue>,
    cache: SessionCache,
    manager: Arc<SessionManager>,
    data: SessionDataStore,
    identity: Arc<dyn IdentityProvider>,
    worker: Arc<ExpirationWorker>,
    running: Option<Running>,
}

impl SessionLayer {
    /// Creates a new builder.
    pub fn builder() -> SessionLayerBuilder {
        SessionLayerBuilder::new()
    }

    /// The session manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// The session data store.
    pub fn data(&self) -> &SessionDataStore {
        &self.data
    }

    /// The expiration queue fed by the cache's eviction listener.
    pub fn queue(&self) -> &Arc<ExpirationQueue> {
        &self.queue
    }

    /// The expiration worker.
    pub fn worker(&self) -> &Arc<ExpirationWorker> {
        &self.worker
    }

    /// The identity provider the layer was built with.
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Builds a gate chain over this layer's session state.
    pub fn gate_chain(
        &self,
        profiles: Arc<dyn AccountProfiles>,
        characters: Arc<dyn CharacterDirectory>,
        unit_of_work: Arc<dyn UnitOfWork>,
    ) -> GateChain {
        GateChain::new(
            Arc::clone(&self.manager),
            self.data.clone(),
            Arc::clone(&self.identity),
            profiles,
            characters,
            unit_of_work,
        )
    }

    /// Returns `true` between [`start`](Self::start) and shutdown.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the cache sweeper and the expiration worker.
    ///
    /// Must be called from within a Tokio runtime. Calling it twice is a
    /// no-op.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = self.cache.spawn_sweeper();
        let worker = tokio::spawn(Arc::clone(&self.worker).run(shutdown_rx));
        self.running = Some(Running {
            sweeper,
            worker: Some(worker),
            shutdown,
        });
        tracing::info!("session layer started");
    }

    /// Stops the sweeper, queues anything already expired, and waits for
    /// the worker's final drain.
    ///
    /// Cleanup still queued after the worker's shutdown grace period is
    /// abandoned.
    ///
    /// # Errors
    /// [`LodestoneError::Task`] if the worker task panicked.
    pub async fn shutdown(mut self) -> Result<DrainReport, LodestoneError> {
        let swept = self.cache.sweep();

        let report = match self.running.take() {
            Some(mut running) => {
                let worker = running.worker.take();
                // Drop aborts the sweeper and signals the worker.
                drop(running);
                match worker {
                    Some(handle) => handle.await?,
                    None => DrainReport::default(),
                }
            }
            None => self.worker.final_drain().await,
        };

        tracing::info!(
            swept,
            cleaned = report.cleaned,
            left = self.queue.len(),
            "session layer stopped"
        );
        Ok(report)
    }
}
