//! Indexer configuration.

use index_pipeline::RetryConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("cannot read targets catalog {path}: {source}")]
    ReadCatalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed targets catalog: {0}")]
    ParseCatalog(#[from] serde_json::Error),

    #[error("invalid targets catalog: {0}")]
    InvalidCatalog(String),

    #[error("unknown version id {0}")]
    UnknownVersion(i64),

    #[error("unknown target id {0}")]
    UnknownTarget(i64),
}

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint of the chain proxy.
    pub chain_proxy_url: String,
    /// Postgres connection string. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    /// Targets/versions catalog (JSON).
    pub targets_file: PathBuf,
    /// First height indexed when the store is empty.
    pub first_block_height: u64,
    /// Forward index batch size; 0 means up to the chain head.
    pub default_batch_size: u64,
    pub request_timeout: Duration,
    /// Max entries held by the per-run height metadata cache.
    pub meta_cache_capacity: usize,
    /// Retry policy for fetchers, sequencers and persistors.
    pub retry: RetryConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain_proxy_url: "http://127.0.0.1:9944".to_string(),
            database_url: None,
            targets_file: PathBuf::from("config/targets.json"),
            first_block_height: 1,
            default_batch_size: 0,
            request_timeout: Duration::from_secs(30),
            meta_cache_capacity: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl IndexerConfig {
    /// Load `.env` (if present) and read `INDEXER_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables keep their defaults, except
    /// the chain proxy URL which is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let chain_proxy_url = lookup("INDEXER_CHAIN_PROXY_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar("INDEXER_CHAIN_PROXY_URL"))?;
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let targets_file = lookup("INDEXER_TARGETS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.targets_file);

        let first_block_height =
            parse_or(&lookup, "INDEXER_FIRST_BLOCK_HEIGHT", defaults.first_block_height)?;
        let default_batch_size =
            parse_or(&lookup, "INDEXER_BATCH_SIZE", defaults.default_batch_size)?;
        let timeout_secs = parse_or(
            &lookup,
            "INDEXER_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;
        let meta_cache_capacity = parse_or(
            &lookup,
            "INDEXER_META_CACHE_CAPACITY",
            defaults.meta_cache_capacity,
        )?;
        let max_attempts = parse_or(
            &lookup,
            "INDEXER_TASK_MAX_ATTEMPTS",
            defaults.retry.max_attempts,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidVar {
                name: "INDEXER_TASK_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            chain_proxy_url,
            database_url,
            targets_file,
            first_block_height,
            default_batch_size,
            request_timeout: Duration::from_secs(timeout_secs),
            meta_cache_capacity,
            retry: RetryConfig {
                max_attempts,
                ..defaults.retry
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
    }
}
