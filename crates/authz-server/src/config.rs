//! Server configuration, loaded from the environment at startup the same
//! way the rest of this workspace builds its `ServerConfig::from_env`: one
//! env var per field, sensible defaults, `AUTHZ_`-prefixed names.

use std::time::Duration;

use authz_core::config::CacheConfig;

/// Bootstrap configuration for the `authz-server` binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub log_level: String,
    pub cache: CacheConfig,
    pub jwks_refresh_interval: Duration,
    pub authz_data_file: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}

impl ServerConfig {
    /// Build configuration from environment variables, falling back to the
    /// defaults listed in the callable-surface table (§6):
    /// `cache_enabled=false`, `cache_ttl=5m`, `jwks_refresh_interval=1h`,
    /// `authz_data_file=<embedded>`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("AUTHZ_BIND_ADDRESS", "0.0.0.0:8080"),
            log_level: env_or("AUTHZ_LOG_LEVEL", "info"),
            cache: CacheConfig {
                enabled: env_bool("AUTHZ_CACHE_ENABLED", false),
                ttl: env_secs("AUTHZ_CACHE_TTL_SECONDS", 5 * 60),
            },
            jwks_refresh_interval: env_secs("AUTHZ_JWKS_REFRESH_INTERVAL_SECONDS", 60 * 60),
            authz_data_file: env_or("AUTHZ_DATA_FILE", ":memory:"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = ServerConfig::from_env();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.jwks_refresh_interval, Duration::from_secs(3600));
    }
}
