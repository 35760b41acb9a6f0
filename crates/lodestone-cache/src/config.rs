//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest TTL or sweep interval the cache accepts.
const MIN_DURATION: Duration = Duration::from_millis(1);

/// Longest TTL the cache stores. Longer TTLs are capped to it.
///
/// 100 years.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Configuration for a [`TtlCache`](crate::TtlCache).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied by [`TtlCache::insert_default`](crate::TtlCache::insert_default).
    ///
    /// Default: 30 minutes.
    pub default_ttl: Duration,

    /// How often the background sweeper evicts expired entries.
    ///
    /// Default: 1 second.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl CacheConfig {
    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// A zero TTL would make every entry born expired, and a zero sweep
    /// interval would panic inside `tokio::time::interval`. Both are raised
    /// to one millisecond. A TTL above [`MAX_TTL`] is lowered to it.
    pub fn validated(mut self) -> Self {
        if self.default_ttl < MIN_DURATION {
            tracing::warn!("default_ttl below 1ms, clamping");
            self.default_ttl = MIN_DURATION;
        }
        if self.default_ttl > MAX_TTL {
            tracing::warn!("default_ttl above 100 years, clamping");
            self.default_ttl = MAX_TTL;
        }
        if self.sweep_interval < MIN_DURATION {
            tracing::warn!("sweep_interval below 1ms, clamping");
            self.sweep_interval = MIN_DURATION;
        }
        self
    }
}
