//! Engine configuration.
//!
//! [`EngineConfig`] is loaded from `config/config.toml` (an `[engine]`
//! table) with `GANTRY__`-prefixed environment variables as a fallback, so
//! deployments can tune batch sizes and cache behavior without code changes.

use crate::cache::{default_invalidation_patterns, CacheSettings};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Chunk size for batch operations when the caller does not pass one.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// Rows fetched per cursor round trip while streaming.
    #[serde(default = "default_stream_fetch_size")]
    pub stream_fetch_size: usize,
    /// Per-statement timeout in milliseconds; absent means no timeout.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Whether the read-through cache fronts `find_by_id`.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Delay between a mutating operation and shard invalidation.
    #[serde(default)]
    pub invalidation_delay_ms: u64,
    /// Operation-name patterns that invalidate the shard.
    #[serde(default = "default_invalidation_patterns")]
    pub invalidate_on: Vec<String>,
}

fn default_batch_size() -> usize {
    500
}

fn default_stream_fetch_size() -> usize {
    200
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            stream_fetch_size: default_stream_fetch_size(),
            statement_timeout_ms: None,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_cache_capacity(),
            invalidation_delay_ms: 0,
            invalidate_on: default_invalidation_patterns(),
        }
    }
}

impl EngineConfig {
    /// Load the engine configuration from `config/config.toml`, falling
    /// back to environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("GANTRY").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("GANTRY").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<EngineConfig>("engine") {
            Ok(config) => Ok(config),
            // A missing [engine] table means defaults, not a failure.
            Err(ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(err) => Err(ConfigError::Message(format!(
                "Engine configuration could not be loaded from file or environment: {err}"
            ))),
        }
    }

    /// The statement timeout as a `Duration`, when configured.
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Cache settings in the shape the cache layer takes.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            capacity: self.cache.capacity,
            invalidation_delay: Duration::from_millis(self.cache.invalidation_delay_ms),
            invalidate_on: self.cache.invalidate_on.clone(),
        }
    }
}
