//! Typed configuration for the extraction pipeline, layered the way the
//! teacher's `codegraph-core::config` layers `ServerConfig`/`SurrealDbConfig`:
//! a `Default`-able struct per concern, loaded through the `config` crate
//! with environment overrides, credentials behind `secrecy`.

use schemars::JsonSchema;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{CodeGraphError, Result};

/// Default exclude set (spec.md §6.7): dependency directories, build
/// outputs, coverage artifacts, declaration-only files, test infrastructure.
pub fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/node_modules/**".into(),
        "**/dist/**".into(),
        "**/build/**".into(),
        "**/out/**".into(),
        "**/coverage/**".into(),
        "**/.git/**".into(),
        "**/*.d.ts".into(),
        "**/__tests__/**".into(),
        "**/__mocks__/**".into(),
        "**/*.test.ts".into(),
        "**/*.spec.ts".into(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkingConfig {
    #[serde(default = "ChunkingConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// N workers = min(CPUs - 1, max_workers), clamped to [1, 16].
    #[serde(default = "ChunkingConfig::default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "ChunkingConfig::default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    /// Ready-queue bound, expressed as a multiple of worker count.
    #[serde(default = "ChunkingConfig::default_backpressure_multiplier")]
    pub backpressure_multiplier: usize,
}

impl ChunkingConfig {
    fn default_chunk_size() -> usize {
        100
    }
    fn default_max_workers() -> usize {
        8
    }
    fn default_worker_timeout_secs() -> u64 {
        30 * 60
    }
    fn default_backpressure_multiplier() -> usize {
        2
    }

    pub fn resolved_worker_count(&self) -> usize {
        let cpus = num_cpus_or(4);
        (cpus.saturating_sub(1)).clamp(1, self.max_workers.max(1)).clamp(1, 16)
    }
}

fn num_cpus_or(default: usize) -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(default)
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            chunk_size: Self::default_chunk_size(),
            max_workers: Self::default_max_workers(),
            worker_timeout_secs: Self::default_worker_timeout_secs(),
            backpressure_multiplier: Self::default_backpressure_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "RetryConfig::default_base_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "RetryConfig::default_cap_ms")]
    pub cap_backoff_ms: u64,
    #[serde(default = "RetryConfig::default_max_retries")]
    pub max_retries: u32,
}

impl RetryConfig {
    fn default_base_ms() -> u64 {
        1000
    }
    fn default_cap_ms() -> u64 {
        30_000
    }
    fn default_max_retries() -> u32 {
        3
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_backoff_ms: Self::default_base_ms(),
            cap_backoff_ms: Self::default_cap_ms(),
            max_retries: Self::default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WatcherConfig {
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "WatcherConfig::default_ring_buffer_cap")]
    pub ring_buffer_cap: usize,
    #[serde(default = "WatcherConfig::default_max_watchers")]
    pub max_watchers: usize,
    #[serde(default = "WatcherConfig::default_shutdown_wait_secs")]
    pub shutdown_wait_secs: u64,
    #[serde(default = "WatcherConfig::default_sync_shutdown_wait_secs")]
    pub sync_shutdown_wait_secs: u64,
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 {
        1000
    }
    fn default_ring_buffer_cap() -> usize {
        1000
    }
    fn default_max_watchers() -> usize {
        10
    }
    fn default_shutdown_wait_secs() -> u64 {
        30
    }
    fn default_sync_shutdown_wait_secs() -> u64 {
        5
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            debounce_ms: Self::default_debounce_ms(),
            ring_buffer_cap: Self::default_ring_buffer_cap(),
            max_watchers: Self::default_max_watchers(),
            shutdown_wait_secs: Self::default_shutdown_wait_secs(),
            sync_shutdown_wait_secs: Self::default_sync_shutdown_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddingConfig {
    /// Character budget for embedding *input*; persisted node bodies are
    /// never truncated (spec.md §3.3 invariant 6).
    #[serde(default = "EmbeddingConfig::default_char_budget")]
    pub char_budget: usize,
    #[serde(default = "EmbeddingConfig::default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub enabled: bool,
}

impl EmbeddingConfig {
    fn default_char_budget() -> usize {
        30_000
    }
    fn default_dimension() -> usize {
        3072
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            char_budget: Self::default_char_budget(),
            dimension: Self::default_dimension(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Connection string, e.g. `ws://localhost:8000` or `mem://`.
    #[serde(default = "StoreConfig::default_connection")]
    pub connection: String,
    #[serde(default = "StoreConfig::default_namespace")]
    pub namespace: String,
    #[serde(default = "StoreConfig::default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    #[schemars(skip)]
    pub password: Option<SecretString>,
    #[serde(default = "StoreConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "StoreConfig::default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "StoreConfig::default_batch_size")]
    pub batch_size: usize,
}

impl StoreConfig {
    fn default_connection() -> String {
        "mem://".into()
    }
    fn default_namespace() -> String {
        "codegraph".into()
    }
    fn default_database() -> String {
        "graph".into()
    }
    fn default_connect_timeout_secs() -> u64 {
        10
    }
    fn default_query_timeout_secs() -> u64 {
        30
    }
    fn default_batch_size() -> usize {
        500
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            connection: Self::default_connection(),
            namespace: Self::default_namespace(),
            database: Self::default_database(),
            username: None,
            password: None,
            connect_timeout_secs: Self::default_connect_timeout_secs(),
            query_timeout_secs: Self::default_query_timeout_secs(),
            batch_size: Self::default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            chunking: ChunkingConfig::default(),
            retry: RetryConfig::default(),
            watcher: WatcherConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration layering a TOML file (if present) over defaults,
    /// then environment variables prefixed `CODEGRAPH_` (e.g.
    /// `CODEGRAPH_CHUNKING__CHUNK_SIZE=200`), matching the teacher's
    /// `config` crate layering in `config.rs`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("codegraph").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CODEGRAPH")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder
            .build()
            .map_err(|e| CodeGraphError::Configuration(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| CodeGraphError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.chunking.chunk_size, 100);
        assert_eq!(cfg.embedding.dimension, 3072);
        assert_eq!(cfg.watcher.debounce_ms, 1000);
        assert!(cfg.exclude_globs.iter().any(|g| g.contains("node_modules")));
    }

    #[test]
    fn resolved_worker_count_is_clamped() {
        let mut cfg = ChunkingConfig::default();
        cfg.max_workers = 1000;
        assert!(cfg.resolved_worker_count() <= 16);
        assert!(cfg.resolved_worker_count() >= 1);
    }
}
