//! The Graph Importer (spec.md §4.8): batches nodes/edges into the graph
//! store, truncates embedding input, retries transient store errors with
//! exponential backoff and jitter, and reports batch-indexed failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use codegraph_core::{CodeGraphError, DeclarationNode, ProjectId, Relationship, Result, RetryConfig};

use crate::store::{CrossUnitEdgeRecord, GraphStore, NodeWrite, ProjectStatus};

/// The out-of-scope embedding service, specified only by interface
/// (spec.md §1). Any node lacking `skip_embedding()` has its truncated
/// source body run through this before the importer persists it.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// An embedding client that never embeds; used when embedding is disabled
/// (spec.md §8 "embeddings-disabled mode must be explicit").
pub struct NullEmbeddingClient;

#[async_trait]
impl EmbeddingClient for NullEmbeddingClient {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![Vec::new(); inputs.len()])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub embedded: usize,
    pub batches_failed: usize,
}

pub struct GraphImporter {
    store: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    retry: RetryConfig,
    char_budget: usize,
    embedding_enabled: bool,
}

impl GraphImporter {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        retry: RetryConfig,
        char_budget: usize,
        embedding_enabled: bool,
    ) -> Self {
        GraphImporter {
            store,
            embeddings,
            retry,
            char_budget,
            embedding_enabled,
        }
    }

    pub async fn clear_project(&self, project_id: &ProjectId) -> Result<()> {
        self.with_retry(0, || self.store.clear_project(project_id)).await
    }

    pub async fn create_project_indexes(&self) -> Result<()> {
        self.with_retry(0, || self.store.create_project_indexes()).await
    }

    /// Indexed `(path, mtime, size, contentHash)` tuples, the Change
    /// Detector's input (spec.md §4.9).
    pub async fn indexed_source_units(&self, project_id: &ProjectId) -> Result<Vec<codegraph_core::SourceUnit>> {
        self.with_retry(0, || self.store.indexed_source_units(project_id)).await
    }

    /// `writeNodeBatch`: computes embedding input for every node lacking
    /// `skipEmbedding`, batches to the embedding service, persists with
    /// embeddings attached.
    pub async fn write_node_batch(
        &self,
        nodes: Vec<DeclarationNode>,
        project_id: &ProjectId,
        batch_index: usize,
    ) -> Result<usize> {
        let mut inputs = Vec::new();
        let mut input_indices = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            if !node.skip_embedding() && self.embedding_enabled {
                inputs.push(self.embedding_input(node));
                input_indices.push(i);
            }
        }

        let embeddings = if inputs.is_empty() {
            Vec::new()
        } else {
            self.embeddings
                .embed_batch(&inputs)
                .await
                .map_err(|e| match e {
                    CodeGraphError::Embedding(msg) => CodeGraphError::Embedding(msg),
                    other => CodeGraphError::Embedding(other.to_string()),
                })?
        };

        let mut embedding_by_index = std::collections::HashMap::new();
        for (slot, idx) in input_indices.into_iter().enumerate() {
            if let Some(vector) = embeddings.get(slot) {
                embedding_by_index.insert(idx, vector.clone());
            }
        }

        let writes: Vec<NodeWrite> = nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| NodeWrite {
                embedding: embedding_by_index.remove(&i),
                node,
            })
            .collect();

        self.with_retry(batch_index, || self.store.write_node_batch(&writes, project_id))
            .await
    }

    pub async fn write_edge_batch(
        &self,
        edges: Vec<Relationship>,
        project_id: &ProjectId,
        batch_index: usize,
    ) -> Result<usize> {
        self.with_retry(batch_index, || self.store.write_edge_batch(&edges, project_id))
            .await
    }

    pub async fn save_cross_unit_edges(
        &self,
        paths: &[String],
        project_id: &ProjectId,
    ) -> Result<Vec<CrossUnitEdgeRecord>> {
        self.with_retry(0, || self.store.save_cross_unit_edges(paths, project_id))
            .await
    }

    pub async fn delete_subgraph(&self, paths: &[String], project_id: &ProjectId) -> Result<usize> {
        self.with_retry(0, || self.store.delete_subgraph(paths, project_id)).await
    }

    pub async fn recreate_cross_unit_edges(
        &self,
        records: &[CrossUnitEdgeRecord],
        project_id: &ProjectId,
    ) -> Result<usize> {
        self.with_retry(0, || self.store.recreate_cross_unit_edges(records, project_id))
            .await
    }

    pub async fn project_symbols(&self, project_id: &ProjectId) -> Result<Vec<codegraph_core::LightweightSymbol>> {
        self.with_retry(0, || self.store.project_symbols(project_id)).await
    }

    pub async fn project_counts(&self, project_id: &ProjectId) -> Result<(usize, usize)> {
        self.with_retry(0, || self.store.project_counts(project_id)).await
    }

    pub async fn upsert_project_status(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
        node_count: usize,
        edge_count: usize,
    ) -> Result<()> {
        self.with_retry(0, || {
            self.store
                .upsert_project_status(project_id, status, node_count, edge_count)
        })
        .await
    }

    /// Embedding input: source body truncated to `char_budget`, prefixed
    /// with the node's name and labels so short symbolic queries can hit
    /// it (spec.md §4.8).
    fn embedding_input(&self, node: &DeclarationNode) -> String {
        let prefix = format!("{} {}\n", node.primary_label, node.name);
        let body = node.source_body.as_deref().unwrap_or("");
        let remaining = self.char_budget.saturating_sub(prefix.chars().count());
        let truncated: String = body.chars().take(remaining).collect();
        format!("{}{}", prefix, truncated)
    }

    /// Retries transient store errors with exponential backoff and jitter
    /// (spec.md §5: base 1s, cap 30s, up to 3 retries). Logical errors
    /// (`StoreLogical`) and everything else fail fast.
    async fn with_retry<F, Fut, T>(&self, batch_index: usize, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(CodeGraphError::StoreTransient(msg)) if attempt < self.retry.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        batch_index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying transient store error: {}",
                        msg
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(CodeGraphError::StoreTransient(msg)) => {
                    return Err(CodeGraphError::StoreTransient(format!(
                        "batch {} exhausted retries: {}",
                        batch_index, msg
                    )));
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.base_backoff_ms;
        let cap = self.retry.cap_backoff_ms;
        let exp = base.saturating_mul(1u64 << attempt.min(20)).min(cap);
        let jitter = rand::rng().random_range(0..=exp.max(1));
        Duration::from_millis(jitter.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProjectStatus;
    use crate::surreal::SurrealGraphStore;
    use codegraph_core::{DeclarationKind, Location, StoreConfig};

    async fn test_importer() -> (GraphImporter, ProjectId) {
        let config = StoreConfig {
            connection: "mem://".to_string(),
            ..Default::default()
        };
        let store = SurrealGraphStore::connect(&config).await.expect("connect");
        store.create_project_indexes().await.expect("indexes");
        let project_id = ProjectId::from_path("/tmp/importer-test");
        let importer = GraphImporter::new(
            Arc::new(store),
            Arc::new(NullEmbeddingClient),
            RetryConfig::default(),
            30_000,
            true,
        );
        (importer, project_id)
    }

    #[tokio::test]
    async fn writes_a_single_node_batch() {
        let (importer, project_id) = test_importer().await;
        let location = Location {
            start_line: 1,
            start_column: 0,
            end_line: 1,
            end_column: 0,
        };
        let node = DeclarationNode::new(
            codegraph_core::node_id(&project_id, "File", "a.ts", "a.ts", None),
            project_id.clone(),
            DeclarationKind::File,
            "a.ts",
            "a.ts",
            location,
        );
        let written = importer
            .write_node_batch(vec![node], &project_id, 0)
            .await
            .expect("write");
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn upserts_project_status() {
        let (importer, project_id) = test_importer().await;
        importer
            .upsert_project_status(&project_id, ProjectStatus::Complete, 0, 0)
            .await
            .expect("status");
    }

    #[test]
    fn embedding_input_truncates_to_budget() {
        let body = "x".repeat(100);
        let node = DeclarationNode::new(
            codegraph_core::node_id(
                &ProjectId::from_path("/tmp"),
                "Function",
                "a.ts",
                "f",
                None,
            ),
            ProjectId::from_path("/tmp"),
            DeclarationKind::Function,
            "f",
            "a.ts",
            Location {
                start_line: 1,
                start_column: 0,
                end_line: 1,
                end_column: 0,
            },
        )
        .with_source_body(body);

        let importer = GraphImporter {
            store: Arc::new(NoopStore),
            embeddings: Arc::new(NullEmbeddingClient),
            retry: RetryConfig::default(),
            char_budget: 20,
            embedding_enabled: true,
        };
        let input = importer.embedding_input(&node);
        assert!(input.chars().count() <= 20);
    }

    struct NoopStore;

    #[async_trait]
    impl GraphStore for NoopStore {
        async fn clear_project(&self, _project_id: &ProjectId) -> Result<()> {
            Ok(())
        }
        async fn create_project_indexes(&self) -> Result<()> {
            Ok(())
        }
        async fn write_node_batch(&self, nodes: &[NodeWrite], _project_id: &ProjectId) -> Result<usize> {
            Ok(nodes.len())
        }
        async fn write_edge_batch(&self, edges: &[Relationship], _project_id: &ProjectId) -> Result<usize> {
            Ok(edges.len())
        }
        async fn save_cross_unit_edges(
            &self,
            _paths: &[String],
            _project_id: &ProjectId,
        ) -> Result<Vec<CrossUnitEdgeRecord>> {
            Ok(Vec::new())
        }
        async fn delete_subgraph(&self, _paths: &[String], _project_id: &ProjectId) -> Result<usize> {
            Ok(0)
        }
        async fn recreate_cross_unit_edges(
            &self,
            _records: &[CrossUnitEdgeRecord],
            _project_id: &ProjectId,
        ) -> Result<usize> {
            Ok(0)
        }
        async fn node_exists(&self, _id: &codegraph_core::Id, _project_id: &ProjectId) -> Result<bool> {
            Ok(true)
        }
        async fn indexed_source_units(&self, _project_id: &ProjectId) -> Result<Vec<codegraph_core::SourceUnit>> {
            Ok(Vec::new())
        }
        async fn project_symbols(&self, _project_id: &ProjectId) -> Result<Vec<codegraph_core::LightweightSymbol>> {
            Ok(Vec::new())
        }
        async fn project_counts(&self, _project_id: &ProjectId) -> Result<(usize, usize)> {
            Ok((0, 0))
        }
        async fn upsert_project_status(
            &self,
            _project_id: &ProjectId,
            _status: ProjectStatus,
            _node_count: usize,
            _edge_count: usize,
        ) -> Result<()> {
            Ok(())
        }
    }
}
