//! End-to-end entry points (spec.md §6.2) for an external CLI or server to
//! call: a full/clearing parse (`run_parse`) and a single incremental
//! reparse (`run_incremental`). Everything else — job queueing, HTTP/MCP
//! transport, the watcher's own subscription lifecycle — is host plumbing
//! built on top of these two functions and `codegraph-watcher`.

pub mod incremental;
pub mod parse;

pub use incremental::run_incremental;
pub use parse::run_parse;

use std::path::Path;

use codegraph_core::{ParseJobStatus, ParseRequest, Phase, ProjectId};
use codegraph_watcher::WatcherBridge;

/// Subscribes `root` on `bridge` when `request.watch_after` was set and the
/// job it produced `status` for completed successfully (spec.md §6.2
/// `watchAfter`). A no-op otherwise — subscribing over a failed parse's
/// possibly-partial graph is left to the caller.
pub fn start_watch_if_requested(
    bridge: &WatcherBridge,
    request: &ParseRequest,
    status: &ParseJobStatus,
    root: &Path,
    project_id: ProjectId,
) -> codegraph_core::Result<()> {
    if !request.watch_after || status.phase != Phase::Complete {
        return Ok(());
    }
    bridge.subscribe(root, project_id)
}
