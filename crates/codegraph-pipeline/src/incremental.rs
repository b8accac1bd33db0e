//! `run_incremental`: a thin wrapper over the Incremental Engine for
//! callers that only have a `ProjectId`/root path, not a constructed
//! `IncrementalEngine`, in hand.

use std::path::Path;

use codegraph_core::{ProgressSink, ProjectId, Result};
use codegraph_incremental::{IncrementalEngine, IncrementalOutcome};

pub async fn run_incremental(
    engine: &IncrementalEngine,
    root: &Path,
    project_id: &ProjectId,
    progress: &dyn ProgressSink,
) -> Result<IncrementalOutcome> {
    engine.run(root, project_id, progress).await
}
