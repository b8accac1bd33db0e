use thiserror::Error;

/// Error taxonomy (spec.md §7). Local recovery is limited to per-file parse
/// errors and per-resolution misses (tracked as counters, not errors);
/// everything else surfaces through this type.
#[derive(Error, Debug)]
pub enum CodeGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path escapes project root: {0}")]
    PathEscapesRoot(String),

    #[error("unknown project handle: {0}")]
    UnknownProject(String),

    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("chunk {index} failed: {message}")]
    ChunkFailed { index: usize, message: String },

    #[error("graph store error: {0}")]
    Graph(String),

    #[error("graph store transient error (retries exhausted): {0}")]
    StoreTransient(String),

    #[error("graph store logical error in batch {batch_index}: {message}")]
    StoreLogical { batch_index: usize, message: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CodeGraphError>;
