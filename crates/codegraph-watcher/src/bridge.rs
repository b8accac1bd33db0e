//! The Watcher Bridge (spec.md §4.12): subscribes a platform-native
//! recursive watcher per project, debounces bursts of events, and invokes
//! the Incremental Engine when the debounce timer expires. Grounded in the
//! teacher's `codegraph-parser::watcher::FileSystemWatcher` (`notify`
//! subscription, registry of tracked files, debounced batching), reworked
//! from its single-process polling loop into a per-project background task
//! that drives `codegraph_incremental::IncrementalEngine`.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use codegraph_core::{
    CodeGraphError, Phase, ProgressEvent, ProgressSink, ProjectId, Result, WatchEvent, WatchEventKind, WatcherConfig,
};
use codegraph_incremental::IncrementalEngine;
use codegraph_parser::languages::typescript::TypeScriptLanguage;

/// A sink that receives watcher lifecycle events (spec.md §6.4). Implemented
/// by hosts; the bridge only depends on this trait.
pub trait WatchEventSink: Send + Sync {
    fn report(&self, event: WatchEvent);
}

pub struct NullWatchEventSink;

impl WatchEventSink for NullWatchEventSink {
    fn report(&self, _event: WatchEvent) {}
}

struct RawEvent {
    path: PathBuf,
    kind: &'static str,
}

struct ProjectHandle {
    watcher: RecommendedWatcher,
    root: PathBuf,
    is_stopping: Arc<AtomicBool>,
    event_tx: UnboundedSender<RawEvent>,
    driver: JoinHandle<()>,
    in_flight_reparse: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
    sync_reparse: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

/// Owns every project subscription. Per-project state (the `notify`
/// watcher, the debounce driver task, the two reparse handles tracked for
/// graceful shutdown) lives in a `ProjectHandle` keyed by `ProjectId`.
pub struct WatcherBridge {
    engine: Arc<IncrementalEngine>,
    config: WatcherConfig,
    exclude_globs: Vec<String>,
    progress: Arc<dyn ProgressSink>,
    watch_sink: Arc<dyn WatchEventSink>,
    projects: SyncMutex<HashMap<ProjectId, ProjectHandle>>,
}

impl WatcherBridge {
    pub fn new(
        engine: Arc<IncrementalEngine>,
        config: WatcherConfig,
        exclude_globs: Vec<String>,
        progress: Arc<dyn ProgressSink>,
        watch_sink: Arc<dyn WatchEventSink>,
    ) -> Self {
        WatcherBridge {
            engine,
            config,
            exclude_globs,
            progress,
            watch_sink,
            projects: SyncMutex::new(HashMap::new()),
        }
    }

    /// Subscribes `root` under `project_id`. Errors if the project already
    /// has a subscription, or if doing so would exceed `max_watchers`
    /// (spec.md §4.12 "per project at most one subscription; at most K
    /// watchers overall").
    pub fn subscribe(&self, root: &Path, project_id: ProjectId) -> Result<()> {
        let mut projects = self.projects.lock();
        if projects.contains_key(&project_id) {
            return Err(CodeGraphError::Watcher(format!(
                "project {} already has a watch subscription",
                project_id.as_str()
            )));
        }
        if projects.len() >= self.config.max_watchers {
            return Err(CodeGraphError::Watcher(format!(
                "watcher limit reached ({} of {})",
                projects.len(),
                self.config.max_watchers
            )));
        }

        let exclude = build_globset(&self.exclude_globs)?;
        let (event_tx, event_rx) = unbounded_channel();

        let tx_for_callback = event_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let Some(kind) = classify(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if should_track(&path, &exclude) {
                        let _ = tx_for_callback.send(RawEvent { path, kind });
                    }
                }
            }
            Err(e) => warn!(error = %e, "file watcher error"),
        })
        .map_err(|e| CodeGraphError::Watcher(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| CodeGraphError::Watcher(format!("failed to watch {}: {e}", root.display())))?;

        let is_stopping = Arc::new(AtomicBool::new(false));
        let in_flight_reparse = Arc::new(AsyncMutex::new(None));
        let sync_reparse = Arc::new(AsyncMutex::new(None));

        self.progress.report(ProgressEvent::new(
            Phase::Discovery,
            0,
            0,
            format!("watch subscribed for {}", root.display()),
        ));

        // Startup "sync missed changes" reparse, covering drift while the
        // watcher was off (spec.md §4.12).
        let sync_handle = tokio::spawn(run_tracked_reparse(
            self.engine.clone(),
            root.to_path_buf(),
            project_id.clone(),
            self.progress.clone(),
            self.watch_sink.clone(),
        ));
        if let Ok(mut guard) = sync_reparse.try_lock() {
            *guard = Some(sync_handle);
        }

        let driver = tokio::spawn(run_driver(
            root.to_path_buf(),
            project_id.clone(),
            self.engine.clone(),
            self.config.clone(),
            self.progress.clone(),
            self.watch_sink.clone(),
            event_rx,
            is_stopping.clone(),
            in_flight_reparse.clone(),
        ));

        projects.insert(
            project_id,
            ProjectHandle {
                watcher,
                root: root.to_path_buf(),
                is_stopping,
                event_tx,
                driver,
                in_flight_reparse,
                sync_reparse,
            },
        );
        Ok(())
    }

    /// Unsubscribes `project_id`, following spec.md §4.12's shutdown
    /// sequence: set `isStopping`, cancel the timer, wait up to
    /// `shutdown_wait_secs` for an in-flight reparse, wait up to
    /// `sync_shutdown_wait_secs` for the startup sync reparse, then
    /// unsubscribe the watcher.
    pub async fn unsubscribe(&self, project_id: &ProjectId) -> Result<()> {
        let handle = {
            let mut projects = self.projects.lock();
            projects
                .remove(project_id)
                .ok_or_else(|| CodeGraphError::Watcher(format!("project {} has no watch subscription", project_id.as_str())))?
        };

        handle.is_stopping.store(true, Ordering::SeqCst);
        // Dropping the sender cancels the debounce wait: the driver's
        // `recv().await` resolves to `None` immediately.
        drop(handle.event_tx);
        let _ = handle.driver.await;

        if let Some(jh) = handle.in_flight_reparse.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(self.config.shutdown_wait_secs), jh)
                .await
                .is_err()
            {
                warn!(project_id = %project_id.as_str(), "in-flight reparse did not finish before shutdown timeout");
            }
        }
        if let Some(jh) = handle.sync_reparse.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(self.config.sync_shutdown_wait_secs), jh)
                .await
                .is_err()
            {
                warn!(project_id = %project_id.as_str(), "sync reparse did not finish before shutdown timeout");
            }
        }

        let mut watcher = handle.watcher;
        if let Err(e) = watcher.unwatch(&handle.root) {
            debug!(error = %e, "unwatch failed (watcher may already be gone)");
        }

        self.progress.report(ProgressEvent::new(
            Phase::Complete,
            1,
            1,
            format!("watch unsubscribed for {}", handle.root.display()),
        ));
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.projects.lock().len()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_driver(
    root: PathBuf,
    project_id: ProjectId,
    engine: Arc<IncrementalEngine>,
    config: WatcherConfig,
    progress: Arc<dyn ProgressSink>,
    watch_sink: Arc<dyn WatchEventSink>,
    mut event_rx: UnboundedReceiver<RawEvent>,
    is_stopping: Arc<AtomicBool>,
    in_flight_reparse: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
) {
    let mut ring: VecDeque<RawEvent> = VecDeque::new();
    let debounce = Duration::from_millis(config.debounce_ms);

    loop {
        if is_stopping.load(Ordering::SeqCst) {
            return;
        }

        let first = match event_rx.recv().await {
            Some(event) => event,
            None => return,
        };
        push_ring(&mut ring, first, config.ring_buffer_cap);

        loop {
            match tokio::time::timeout(debounce, event_rx.recv()).await {
                Ok(Some(event)) => push_ring(&mut ring, event, config.ring_buffer_cap),
                Ok(None) => {
                    is_stopping.store(true, Ordering::SeqCst);
                    break;
                }
                Err(_) => break,
            }
        }

        if ring.is_empty() {
            if is_stopping.load(Ordering::SeqCst) {
                return;
            }
            continue;
        }

        let mut data = HashMap::new();
        data.insert("count".to_string(), ring.len().to_string());
        if let Some(last) = ring.back() {
            data.insert("path".to_string(), last.path.to_string_lossy().to_string());
            data.insert("kind".to_string(), last.kind.to_string());
        }
        watch_sink.report(WatchEvent {
            kind: WatchEventKind::FileChangeDetected,
            project_id: project_id.as_str().to_string(),
            project_path: root.to_string_lossy().to_string(),
            data,
            timestamp_ms: now_ms(),
        });
        ring.clear();

        let mut guard = in_flight_reparse.lock().await;
        if guard.as_ref().is_some_and(|jh| !jh.is_finished()) {
            // Exactly one reparse may be in flight per project; skip and
            // let the next debounce cycle pick up further changes
            // (spec.md §4.12).
            continue;
        }

        let handle = tokio::spawn(run_tracked_reparse(
            engine.clone(),
            root.clone(),
            project_id.clone(),
            progress.clone(),
            watch_sink.clone(),
        ));
        *guard = Some(handle);
    }
}

async fn run_tracked_reparse(
    engine: Arc<IncrementalEngine>,
    root: PathBuf,
    project_id: ProjectId,
    progress: Arc<dyn ProgressSink>,
    watch_sink: Arc<dyn WatchEventSink>,
) {
    watch_sink.report(WatchEvent {
        kind: WatchEventKind::IncrementalParseStarted,
        project_id: project_id.as_str().to_string(),
        project_path: root.to_string_lossy().to_string(),
        data: HashMap::new(),
        timestamp_ms: now_ms(),
    });

    match engine.run(&root, &project_id, progress.as_ref()).await {
        Ok(outcome) => {
            let mut data = HashMap::new();
            data.insert("filesReparsed".to_string(), outcome.files_reparsed.to_string());
            data.insert("filesDeleted".to_string(), outcome.files_deleted.to_string());
            data.insert("nodesWritten".to_string(), outcome.nodes_written.to_string());
            data.insert("edgesWritten".to_string(), outcome.edges_written.to_string());
            watch_sink.report(WatchEvent {
                kind: WatchEventKind::IncrementalParseCompleted,
                project_id: project_id.as_str().to_string(),
                project_path: root.to_string_lossy().to_string(),
                data,
                timestamp_ms: now_ms(),
            });
        }
        Err(e) => {
            info!(project_id = %project_id.as_str(), error = %e, "incremental reparse failed");
            let mut data = HashMap::new();
            data.insert("error".to_string(), e.to_string());
            watch_sink.report(WatchEvent {
                kind: WatchEventKind::IncrementalParseFailed,
                project_id: project_id.as_str().to_string(),
                project_path: root.to_string_lossy().to_string(),
                data,
                timestamp_ms: now_ms(),
            });
        }
    }
}

fn push_ring(ring: &mut VecDeque<RawEvent>, event: RawEvent, cap: usize) {
    if ring.len() >= cap {
        let drop_count = ring.len() / 2;
        for _ in 0..drop_count {
            ring.pop_front();
        }
    }
    ring.push_back(event);
}

fn classify(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) => Some("add"),
        EventKind::Modify(_) => Some("change"),
        EventKind::Remove(_) => Some("unlink"),
        _ => None,
    }
}

fn should_track(path: &Path, exclude: &GlobSet) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !TypeScriptLanguage::owns_extension(ext) {
        return false;
    }
    !exclude.is_match(path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CodeGraphError::Configuration(format!("invalid glob {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CodeGraphError::Configuration(format!("glob set build failed: {e}")))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_ring_drops_oldest_half_on_overflow() {
        let mut ring = VecDeque::new();
        for i in 0..4 {
            push_ring(
                &mut ring,
                RawEvent {
                    path: PathBuf::from(format!("{i}.ts")),
                    kind: "change",
                },
                4,
            );
        }
        assert_eq!(ring.len(), 4);
        push_ring(
            &mut ring,
            RawEvent {
                path: PathBuf::from("4.ts"),
                kind: "change",
            },
            4,
        );
        // drop_count = 4 / 2 = 2, leaving [2, 3] then pushing 4.
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.front().unwrap().path, PathBuf::from("2.ts"));
    }

    #[test]
    fn classify_maps_known_event_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some("add"));
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some("unlink"));
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn should_track_filters_by_extension_and_exclude() {
        let exclude = build_globset(&["**/node_modules/**".to_string()]).unwrap();
        assert!(should_track(Path::new("/repo/src/a.ts"), &exclude));
        assert!(!should_track(Path::new("/repo/src/a.txt"), &exclude));
        assert!(!should_track(Path::new("/repo/node_modules/pkg/a.ts"), &exclude));
    }

    #[tokio::test]
    async fn subscribe_runs_startup_reparse_and_unsubscribe_tears_down_cleanly() {
        use codegraph_core::{NullProgressSink, RetryConfig, StoreConfig};
        use codegraph_graph::{GraphImporter, NullEmbeddingClient, SurrealGraphStore};
        use codegraph_parser::CoordinatorConfig;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export class Widget {}").unwrap();

        let store_config = StoreConfig {
            connection: "mem://".to_string(),
            ..Default::default()
        };
        let store = SurrealGraphStore::connect(&store_config).await.unwrap();
        store.create_project_indexes().await.unwrap();
        let project_id = ProjectId::from_path(&dir.path().to_string_lossy());
        let importer = Arc::new(GraphImporter::new(
            Arc::new(store),
            Arc::new(NullEmbeddingClient),
            RetryConfig::default(),
            30_000,
            false,
        ));
        let engine = Arc::new(IncrementalEngine::new(
            importer,
            codegraph_core::default_exclude_globs(),
            CoordinatorConfig::default(),
        ));

        let bridge = WatcherBridge::new(
            engine,
            WatcherConfig::default(),
            codegraph_core::default_exclude_globs(),
            Arc::new(NullProgressSink),
            Arc::new(NullWatchEventSink),
        );

        bridge.subscribe(dir.path(), project_id.clone()).unwrap();
        assert_eq!(bridge.subscription_count(), 1);
        assert!(bridge.subscribe(dir.path(), project_id.clone()).is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;

        bridge.unsubscribe(&project_id).await.unwrap();
        assert_eq!(bridge.subscription_count(), 0);
    }
}
