//! `run_parse` (spec.md §6.2): the end-to-end full/clear parse entry point.
//! Wires the Workspace Parser's per-package loop directly (rather than
//! calling `codegraph_parser::parse_workspace` as one buffered step) so
//! each package's nodes/edges persist as soon as that package finishes
//! parsing when `request.use_streaming` is set, matching the request
//! schema's streaming-import flag. When it isn't set, every package's
//! output is buffered and written in one batch at the end instead.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::warn;

use codegraph_core::{ParseJobStatus, ParseRequest, Phase, ProgressDetails, ProgressEvent, ProgressSink, ProjectId};
use codegraph_graph::{GraphImporter, ProjectStatus};
use codegraph_parser::coordinator::{merge_context_delta, run_chunked_parse, CoordinatorConfig};
use codegraph_parser::file_collect::{collect_source_files, FileCollectionConfig};
use codegraph_parser::resolve::{resolve_deferred, ResolveStats, SymbolIndex};
use codegraph_parser::workspace::discover_packages;
use codegraph_parser::enhance::apply_edge_enhancements;

/// Runs a full (optionally clearing) parse of `request.project_path` and
/// returns the status shape spec.md §6.2 defines for the parse-job status
/// endpoint. `job_id` is supplied by the caller — job tracking/queueing
/// across async requests is server plumbing, out of scope here.
pub async fn run_parse(
    job_id: impl Into<String>,
    request: &ParseRequest,
    project_id: &ProjectId,
    importer: &GraphImporter,
    coordinator_config: &CoordinatorConfig,
    exclude_globs: &[String],
    progress: &dyn ProgressSink,
) -> ParseJobStatus {
    let job_id = job_id.into();
    let started = Instant::now();
    let root = Path::new(&request.project_path);

    let mut coordinator_config = coordinator_config.clone();
    if let Some(chunk_size) = request.chunk_size {
        coordinator_config.chunk_size = chunk_size;
    }

    progress.report(ProgressEvent::new(Phase::Discovery, 0, 0, "discovering workspace packages"));

    if request.clear_existing {
        if let Err(e) = importer.clear_project(project_id).await {
            return failed_status(job_id, &e, started);
        }
    }
    if let Err(e) = importer.create_project_indexes().await {
        return failed_status(job_id, &e, started);
    }

    let packages = discover_packages(root);
    let mut files_processed = 0usize;
    let mut chunks_processed = 0usize;
    let mut nodes_created = 0usize;
    let mut edges_created = 0usize;
    let mut all_symbols = Vec::new();
    let mut all_deferred = Vec::new();
    let mut package_roots = HashMap::new();
    let mut parse_errors = Vec::new();
    let mut buffered_nodes = Vec::new();
    let mut buffered_edges = Vec::new();
    let mut shared_context: HashMap<String, String> = HashMap::new();

    for package in &packages {
        package_roots.insert(package.name.clone(), package.root.clone());

        let collection_config = FileCollectionConfig {
            exclude_globs: exclude_globs.to_vec(),
        };
        let files = match collect_source_files(&package.root, &collection_config) {
            Ok(files) => files,
            Err(e) => return failed_status(job_id, &e, started),
        };
        if files.is_empty() {
            continue;
        }

        progress.report(progress_event(
            Phase::Parsing,
            files_processed as u64,
            files.len() as u64,
            format!("parsing package {}", package.name),
            &package.name,
        ));

        let outcome = match run_chunked_parse(project_id, Some(&package.name), &files, &coordinator_config) {
            Ok(outcome) => outcome,
            Err(e) => return failed_status(job_id, &e, started),
        };
        for (index, message) in outcome.failed_chunks {
            warn!(package = package.name, chunk = index, error = message, "chunk failed");
            parse_errors.push((package.name.clone(), message));
        }

        files_processed += files.len();
        chunks_processed += files.len().div_ceil(coordinator_config.chunk_size.max(1));
        all_symbols.extend(outcome.symbols.clone());
        all_deferred.extend(outcome.deferred);
        merge_context_delta(&mut shared_context, outcome.context_delta);

        if request.use_streaming {
            nodes_created += match importer.write_node_batch(outcome.nodes, project_id, chunks_processed).await {
                Ok(n) => n,
                Err(e) => return failed_status(job_id, &e, started),
            };
            edges_created += match importer.write_edge_batch(outcome.edges, project_id, chunks_processed).await {
                Ok(n) => n,
                Err(e) => return failed_status(job_id, &e, started),
            };
        } else {
            buffered_nodes.extend(outcome.nodes);
            buffered_edges.extend(outcome.edges);
        }
    }

    progress.report(ProgressEvent::new(
        Phase::Resolving,
        0,
        all_deferred.len() as u64,
        "resolving cross-file references",
    ));

    let index = SymbolIndex::build(&all_symbols, &package_roots);
    let mut resolve_stats = ResolveStats::default();
    let mut tail_edges = resolve_deferred(&all_deferred, &index, &mut resolve_stats);

    tail_edges.extend(
        apply_edge_enhancements(&all_symbols, &shared_context)
            .into_iter()
            .map(|edge| edge.into_relationship()),
    );

    if !request.use_streaming {
        nodes_created = match importer.write_node_batch(buffered_nodes, project_id, 0).await {
            Ok(n) => n,
            Err(e) => return failed_status(job_id, &e, started),
        };
        tail_edges.extend(buffered_edges);
    }

    progress.report(ProgressEvent::new(
        Phase::Importing,
        0,
        tail_edges.len() as u64,
        "importing resolved and synthesized edges",
    ));
    edges_created += match importer.write_edge_batch(tail_edges, project_id, chunks_processed + 1).await {
        Ok(n) => n,
        Err(e) => return failed_status(job_id, &e, started),
    };

    let (node_count, edge_count) = match importer.project_counts(project_id).await {
        Ok(counts) => counts,
        Err(e) => return failed_status(job_id, &e, started),
    };
    if let Err(e) = importer
        .upsert_project_status(project_id, ProjectStatus::Complete, node_count, edge_count)
        .await
    {
        return failed_status(job_id, &e, started);
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    progress.report(ProgressEvent::new(
        Phase::Complete,
        1,
        1,
        format!("parse complete in {elapsed_ms}ms"),
    ));

    let error = if parse_errors.is_empty() {
        None
    } else {
        Some(
            parse_errors
                .iter()
                .map(|(pkg, msg)| format!("{pkg}: {msg}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    };

    ParseJobStatus {
        job_id,
        phase: Phase::Complete,
        files_processed,
        chunks_processed,
        nodes_created,
        edges_created,
        elapsed_ms,
        error,
    }
}

fn progress_event(phase: Phase, current: u64, total: u64, message: String, package: &str) -> ProgressEvent {
    let mut event = ProgressEvent::new(phase, current, total, message);
    event.details = ProgressDetails {
        files_processed: Some(current as usize),
        current_file: Some(package.to_string()),
        ..Default::default()
    };
    event
}

fn failed_status(job_id: String, error: &impl std::fmt::Display, started: Instant) -> ParseJobStatus {
    ParseJobStatus {
        job_id,
        phase: Phase::Failed,
        files_processed: 0,
        chunks_processed: 0,
        nodes_created: 0,
        edges_created: 0,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{NullProgressSink, ParseMode, RetryConfig, StoreConfig};
    use codegraph_graph::{GraphImporter, NullEmbeddingClient, SurrealGraphStore};
    use std::fs;
    use std::sync::Arc;

    async fn importer_and_project() -> (GraphImporter, ProjectId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            connection: "mem://".to_string(),
            ..Default::default()
        };
        let store = SurrealGraphStore::connect(&config).await.unwrap();
        let project_id = ProjectId::from_path(&dir.path().to_string_lossy());
        let importer = GraphImporter::new(Arc::new(store), Arc::new(NullEmbeddingClient), RetryConfig::default(), 30_000, false);
        (importer, project_id, dir)
    }

    fn default_request(project_path: &str) -> ParseRequest {
        ParseRequest {
            project_path: project_path.to_string(),
            mode: ParseMode::Sync,
            clear_existing: false,
            use_streaming: true,
            chunk_size: None,
            watch_after: false,
        }
    }

    #[tokio::test]
    async fn buffered_and_streaming_parse_both_import_every_file() {
        let (importer, project_id, dir) = importer_and_project().await;
        fs::write(dir.path().join("a.ts"), "export class Widget {}").unwrap();
        fs::write(dir.path().join("b.ts"), "export class Gadget {}").unwrap();

        let mut request = default_request(&dir.path().to_string_lossy());
        request.use_streaming = false;
        let status = run_parse(
            "job-buffered",
            &request,
            &project_id,
            &importer,
            &CoordinatorConfig::default(),
            &codegraph_core::default_exclude_globs(),
            &NullProgressSink,
        )
        .await;

        assert_eq!(status.phase, Phase::Complete);
        assert_eq!(status.files_processed, 2);
        assert!(status.nodes_created >= 2);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn clear_existing_drops_the_prior_graph_before_reimporting() {
        let (importer, project_id, dir) = importer_and_project().await;
        fs::write(dir.path().join("a.ts"), "export class Widget {}").unwrap();

        let request = default_request(&dir.path().to_string_lossy());
        let first = run_parse(
            "job-1",
            &request,
            &project_id,
            &importer,
            &CoordinatorConfig::default(),
            &codegraph_core::default_exclude_globs(),
            &NullProgressSink,
        )
        .await;
        assert_eq!(first.phase, Phase::Complete);

        let mut second_request = request.clone();
        second_request.clear_existing = true;
        let second = run_parse(
            "job-2",
            &second_request,
            &project_id,
            &importer,
            &CoordinatorConfig::default(),
            &codegraph_core::default_exclude_globs(),
            &NullProgressSink,
        )
        .await;
        assert_eq!(second.phase, Phase::Complete);
        assert_eq!(second.files_processed, 1);
    }
}
