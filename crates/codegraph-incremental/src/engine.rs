//! The Incremental Engine (spec.md §4.10): save cross-unit edges, delete
//! the affected subgraph, reparse changed files, import, re-attach saved
//! edges, stamp tracking. At most one reparse runs per project at a time;
//! additional triggers queue on a per-project lock rather than erroring.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use codegraph_core::{Phase, ProgressEvent, ProgressSink, ProjectId, Result};
use codegraph_graph::{GraphImporter, ProjectStatus};
use codegraph_parser::coordinator::{self, merge_context_delta, CoordinatorConfig};
use codegraph_parser::enhance::apply_edge_enhancements;
use codegraph_parser::resolve::{resolve_deferred, ResolveStats, SymbolIndex};
use codegraph_parser::workspace::discover_packages;

use crate::detect::detect_changes;

#[derive(Debug, Default, Clone)]
pub struct IncrementalOutcome {
    pub files_reparsed: usize,
    pub files_deleted: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub cross_unit_edges_saved: usize,
    pub cross_unit_edges_recreated: usize,
    pub parse_errors: Vec<(String, String)>,
    pub resolve_stats: ResolveStats,
}

pub struct IncrementalEngine {
    importer: Arc<GraphImporter>,
    exclude_globs: Vec<String>,
    coordinator_config: CoordinatorConfig,
    locks: SyncMutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl IncrementalEngine {
    pub fn new(importer: Arc<GraphImporter>, exclude_globs: Vec<String>, coordinator_config: CoordinatorConfig) -> Self {
        IncrementalEngine {
            importer,
            exclude_globs,
            coordinator_config,
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn project_lock(&self, project_id: &ProjectId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(project_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Runs one incremental reparse of `root` for `project_id`. Concurrent
    /// callers for the same project block on the per-project lock until
    /// the in-flight reparse finishes (spec.md §4.10 "additional triggers
    /// queue").
    pub async fn run(
        &self,
        root: &Path,
        project_id: &ProjectId,
        progress: &dyn ProgressSink,
    ) -> Result<IncrementalOutcome> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.run_locked(root, project_id, progress).await
    }

    async fn run_locked(
        &self,
        root: &Path,
        project_id: &ProjectId,
        progress: &dyn ProgressSink,
    ) -> Result<IncrementalOutcome> {
        let started = Instant::now();
        progress.report(ProgressEvent::new(Phase::Discovery, 0, 0, "detecting changes"));

        let indexed = self.importer.indexed_source_units(project_id).await?;
        let changes = detect_changes(root, &self.exclude_globs, &indexed)?;

        if changes.is_empty() {
            progress.report(ProgressEvent::new(Phase::Complete, 1, 1, "no changes detected"));
            return Ok(IncrementalOutcome::default());
        }

        info!(
            project_id = %project_id,
            reparse = changes.to_reparse.len(),
            delete = changes.to_delete.len(),
            "incremental reparse starting"
        );

        let affected = changes.affected_paths();

        // Step 1: save cross-unit edges before anything is deleted.
        let saved = self.importer.save_cross_unit_edges(&affected, project_id).await?;

        // Step 2: DETACH-delete every node in F.
        self.importer.delete_subgraph(&affected, project_id).await?;

        let mut outcome = IncrementalOutcome {
            files_deleted: changes.to_delete.len(),
            cross_unit_edges_saved: saved.len(),
            ..Default::default()
        };

        if changes.to_reparse.is_empty() {
            self.finish(project_id, progress, started).await?;
            return Ok(outcome);
        }

        progress.report(ProgressEvent::new(
            Phase::Parsing,
            0,
            changes.to_reparse.len() as u64,
            "reparsing changed files",
        ));

        // Step 3: parse new content, grouped by package root so scoped-
        // package module-specifier resolution sees the right context.
        let packages = discover_packages(root);
        let mut package_roots: HashMap<String, PathBuf> = HashMap::new();
        for package in &packages {
            package_roots.insert(package.name.clone(), package.root.clone());
        }

        let mut by_package: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path_str in &changes.to_reparse {
            let path = PathBuf::from(path_str);
            let package = packages
                .iter()
                .filter(|p| path.starts_with(&p.root))
                .max_by_key(|p| p.root.as_os_str().len())
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "root".to_string());
            by_package.entry(package).or_default().push(path);
        }

        let mut new_nodes = Vec::new();
        let mut new_edges = Vec::new();
        let mut new_deferred = Vec::new();
        let mut new_symbols = Vec::new();
        let mut parse_errors = Vec::new();
        let mut shared_context: HashMap<String, String> = HashMap::new();

        for (package, files) in &by_package {
            let chunk_outcome =
                coordinator::run_chunked_parse(project_id, Some(package), files, &self.coordinator_config)?;
            for (index, message) in chunk_outcome.failed_chunks {
                warn!(package, chunk = index, error = message, "incremental reparse chunk failed");
                parse_errors.push((package.clone(), message));
            }
            new_nodes.extend(chunk_outcome.nodes);
            new_edges.extend(chunk_outcome.edges);
            new_deferred.extend(chunk_outcome.deferred);
            new_symbols.extend(chunk_outcome.symbols);
            merge_context_delta(&mut shared_context, chunk_outcome.context_delta);
        }

        // Existing-symbol index: surviving nodes (the deleted ones are
        // already gone from the store after step 2) plus the freshly
        // parsed set, so local references resolve across the boundary
        // immediately (spec.md §4.10 step 3).
        let mut existing_symbols = self.importer.project_symbols(project_id).await?;
        existing_symbols.extend(new_symbols.iter().cloned());

        let index = SymbolIndex::build(&existing_symbols, &package_roots);
        let mut resolve_stats = ResolveStats::default();
        let resolved_edges = resolve_deferred(&new_deferred, &index, &mut resolve_stats);
        new_edges.extend(resolved_edges);

        let synthesized = apply_edge_enhancements(&existing_symbols, &shared_context);
        new_edges.extend(synthesized.into_iter().map(|edge| edge.into_relationship()));

        // Step 4: import the reparsed nodes and edges.
        progress.report(ProgressEvent::new(
            Phase::Importing,
            0,
            new_nodes.len() as u64,
            "importing reparsed nodes",
        ));
        let files_reparsed = by_package.values().map(|files| files.len()).sum();
        let nodes_written = self.importer.write_node_batch(new_nodes, project_id, 0).await?;
        let edges_written = self.importer.write_edge_batch(new_edges, project_id, 0).await?;

        // Step 5: re-attach cross-unit edges saved in step 1. A dropped
        // edge (an endpoint that didn't survive) is a normal outcome.
        progress.report(ProgressEvent::new(
            Phase::Resolving,
            0,
            saved.len() as u64,
            "re-attaching cross-unit edges",
        ));
        let recreated = self.importer.recreate_cross_unit_edges(&saved, project_id).await?;

        outcome.files_reparsed = files_reparsed;
        outcome.nodes_written = nodes_written;
        outcome.edges_written = edges_written;
        outcome.cross_unit_edges_recreated = recreated;
        outcome.parse_errors = parse_errors;
        outcome.resolve_stats = resolve_stats;

        self.finish(project_id, progress, started).await?;
        Ok(outcome)
    }

    /// Step 6: stamp the Project node with new counts and `status=complete`.
    async fn finish(&self, project_id: &ProjectId, progress: &dyn ProgressSink, started: Instant) -> Result<()> {
        let (node_count, edge_count) = self.importer.project_counts(project_id).await?;
        self.importer
            .upsert_project_status(project_id, ProjectStatus::Complete, node_count, edge_count)
            .await?;
        progress.report(ProgressEvent::new(
            Phase::Complete,
            1,
            1,
            format!("incremental reparse complete in {}ms", started.elapsed().as_millis()),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{NullProgressSink, ProjectId, StoreConfig};
    use codegraph_graph::{NullEmbeddingClient, SurrealGraphStore};
    use std::fs;

    async fn engine_with_root() -> (IncrementalEngine, ProjectId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            connection: "mem://".to_string(),
            ..Default::default()
        };
        let store = SurrealGraphStore::connect(&config).await.unwrap();
        store.create_project_indexes().await.unwrap();
        let project_id = ProjectId::from_path(&dir.path().to_string_lossy());
        let importer = Arc::new(GraphImporter::new(
            Arc::new(store),
            Arc::new(NullEmbeddingClient),
            codegraph_core::RetryConfig::default(),
            30_000,
            false,
        ));
        let engine = IncrementalEngine::new(importer, codegraph_core::default_exclude_globs(), CoordinatorConfig::default());
        (engine, project_id, dir)
    }

    #[tokio::test]
    async fn first_run_imports_every_file() {
        let (engine, project_id, dir) = engine_with_root().await;
        fs::write(dir.path().join("a.ts"), "export class Widget {}").unwrap();

        let outcome = engine.run(dir.path(), &project_id, &NullProgressSink).await.unwrap();
        assert_eq!(outcome.files_reparsed, 1);
        assert!(outcome.nodes_written >= 1);
    }

    #[tokio::test]
    async fn second_run_with_no_changes_is_a_no_op() {
        let (engine, project_id, dir) = engine_with_root().await;
        fs::write(dir.path().join("a.ts"), "export class Widget {}").unwrap();

        engine.run(dir.path(), &project_id, &NullProgressSink).await.unwrap();
        let second = engine.run(dir.path(), &project_id, &NullProgressSink).await.unwrap();
        assert_eq!(second.files_reparsed, 0);
        assert_eq!(second.files_deleted, 0);
    }

    #[tokio::test]
    async fn deleting_a_file_removes_its_subgraph() {
        let (engine, project_id, dir) = engine_with_root().await;
        let path = dir.path().join("a.ts");
        fs::write(&path, "export class Widget {}").unwrap();
        engine.run(dir.path(), &project_id, &NullProgressSink).await.unwrap();

        fs::remove_file(&path).unwrap();
        let outcome = engine.run(dir.path(), &project_id, &NullProgressSink).await.unwrap();
        assert_eq!(outcome.files_deleted, 1);
    }
}
