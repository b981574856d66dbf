use std::{env, time::Duration};

use userdir_core::cache::USERS_CACHE_NAME;

use crate::cache::CacheConfig;

/// Directory configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL of the all-users cache in seconds (default: 20)
    pub users_cache_ttl_seconds: u64,
    /// Sweep tick for expired cache entries in milliseconds (default: 1,000)
    pub cache_sweep_interval_ms: u64,
    /// Events each watcher may have queued before new ones are dropped (default: 64)
    pub watch_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `USERS_CACHE_TTL_SECONDS` - All-users cache TTL in seconds (default: 20)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Cache sweep tick in milliseconds (default: 1,000)
    /// - `WATCH_QUEUE_CAPACITY` - Per-watcher queue bound (default: 64)
    pub fn from_env() -> Self {
        Self {
            users_cache_ttl_seconds: env::var("USERS_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            cache_sweep_interval_ms: env::var("CACHE_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000),
            watch_queue_capacity: env::var("WATCH_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
        }
    }

    /// Get the all-users cache TTL as a Duration.
    pub fn users_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.users_cache_ttl_seconds)
    }

    /// Get the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    /// Watcher queue bound, never below one.
    pub fn watch_queue_capacity(&self) -> usize {
        self.watch_queue_capacity.max(1)
    }

    /// Settings for the all-users cache.
    pub fn users_cache_config(&self) -> CacheConfig {
        CacheConfig::new(USERS_CACHE_NAME, self.users_cache_ttl())
            .with_sweep_interval(self.sweep_interval())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            users_cache_ttl_seconds: 30,
            cache_sweep_interval_ms: 250,
            watch_queue_capacity: 0,
        }
    }

    #[test]
    fn test_duration_conversions() {
        let config = config();

        assert_eq!(config.users_cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_watch_queue_capacity_has_floor() {
        assert_eq!(config().watch_queue_capacity(), 1);
    }

    #[test]
    fn test_users_cache_config() {
        let cache = config().users_cache_config();

        assert_eq!(cache.name, "users");
        assert_eq!(cache.ttl, Duration::from_secs(30));
        assert_eq!(cache.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        env::remove_var("USERS_CACHE_TTL_SECONDS");
        env::remove_var("CACHE_SWEEP_INTERVAL_MS");
        env::remove_var("WATCH_QUEUE_CAPACITY");

        let config = Config::from_env();

        assert_eq!(config.users_cache_ttl_seconds, 20);
        assert_eq!(config.cache_sweep_interval_ms, 1_000);
        assert_eq!(config.watch_queue_capacity, 64);
    }
}
