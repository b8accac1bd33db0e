//! Progress / lifecycle event schema (spec.md §6.2-§6.4). Shape-only DTOs —
//! the MCP/HTTP transport that carries them to a host is out of scope.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Discovery,
    Parsing,
    Importing,
    Resolving,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub project_path: String,
    pub mode: ParseMode,
    #[serde(default)]
    pub clear_existing: bool,
    #[serde(default = "default_true")]
    pub use_streaming: bool,
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub watch_after: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseJobStatus {
    pub job_id: String,
    pub phase: Phase,
    pub files_processed: usize,
    pub chunks_processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDetails {
    pub files_processed: Option<usize>,
    pub current_file: Option<String>,
    pub chunk_index: Option<usize>,
    pub total_chunks: Option<usize>,
    pub nodes: Option<usize>,
    pub edges: Option<usize>,
    pub elapsed_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: u64,
    pub total: u64,
    pub message: String,
    pub details: ProgressDetails,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: u64, total: u64, message: impl Into<String>) -> Self {
        ProgressEvent {
            phase,
            current,
            total,
            message: message.into(),
            details: ProgressDetails::default(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, elapsed_ms: u64) -> Self {
        let mut details = ProgressDetails::default();
        details.elapsed_ms = Some(elapsed_ms);
        ProgressEvent {
            phase: Phase::Failed,
            current: 0,
            total: 0,
            message: message.into(),
            details,
            error: Some("failed".into()),
        }
    }
}

/// A sink that receives progress events. Implemented by hosts (CLI/server);
/// the pipeline only depends on this trait.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A no-op sink, useful for tests and library callers that don't need
/// progress reporting.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    FileChangeDetected,
    IncrementalParseStarted,
    IncrementalParseCompleted,
    IncrementalParseFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub project_id: String,
    pub project_path: String,
    pub data: HashMap<String, String>,
    pub timestamp_ms: u64,
}
