//! The `GraphStore` trait: the boundary to the out-of-scope graph-store
//! engine (spec.md §1). Generalized from the teacher's `codegraph-core::
//! traits::GraphStore` (`add_node`/`get_node`/`update_node`/`remove_node`/
//! `find_nodes_by_name`) to the batched operations the Graph Importer and
//! Incremental Engine actually need (spec.md §4.8/§4.10).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use codegraph_core::{
    DeclarationNode, Id, LightweightSymbol, ProjectId, Relationship, RelationshipKind, Result, SourceUnit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Parsing,
    Complete,
    Failed,
}

/// A saved cross-unit edge (spec.md §3.2 "saved out of band before
/// deletion and re-attached after re-parse by deterministic target ID").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossUnitEdgeRecord {
    pub source_id: Id,
    pub target_id: Id,
    pub core_kind: RelationshipKind,
    pub semantic_kind: Option<String>,
    pub weight: f32,
    pub confidence: f32,
    pub file_path: String,
    pub line: Option<u32>,
}

impl From<&Relationship> for CrossUnitEdgeRecord {
    fn from(edge: &Relationship) -> Self {
        CrossUnitEdgeRecord {
            source_id: edge.source_id.clone(),
            target_id: edge.target_id.clone(),
            core_kind: edge.core_kind,
            semantic_kind: edge.semantic_kind.clone(),
            weight: edge.weight.value(),
            confidence: edge.confidence.value(),
            file_path: edge.file_path.clone(),
            line: edge.line,
        }
    }
}

/// A node paired with its (already-computed) embedding, the unit
/// `write_node_batch` persists (spec.md §4.8: "persists nodes with
/// embeddings attached and the additional label *Embedded* on successful
/// embeds"). Embedding computation itself lives outside the store, against
/// the out-of-scope embedding service (see `GraphImporter`).
pub struct NodeWrite {
    pub node: DeclarationNode,
    pub embedding: Option<Vec<f32>>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// `clearProject(projectId)`: batched deletion of all nodes belonging
    /// to a project.
    async fn clear_project(&self, project_id: &ProjectId) -> Result<()>;

    /// `createProjectIndexes()`: idempotent index creation (per-label
    /// lookups, embedded-body vector index, normalized-hash index).
    async fn create_project_indexes(&self) -> Result<()>;

    /// Bulk node creation, returning the number of nodes written.
    async fn write_node_batch(&self, nodes: &[NodeWrite], project_id: &ProjectId) -> Result<usize>;

    /// Bulk edge creation; implementations reject any edge whose endpoints
    /// are not both present and both members of `project_id`.
    async fn write_edge_batch(&self, edges: &[Relationship], project_id: &ProjectId) -> Result<usize>;

    /// `saveCrossUnitEdges`: edges with exactly one endpoint inside `paths`.
    async fn save_cross_unit_edges(
        &self,
        paths: &[String],
        project_id: &ProjectId,
    ) -> Result<Vec<CrossUnitEdgeRecord>>;

    /// DETACH-delete every node whose `file_path ∈ paths`, along with every
    /// edge touching one of those nodes (spec.md §4.10 step 2). Returns the
    /// number of nodes deleted.
    async fn delete_subgraph(&self, paths: &[String], project_id: &ProjectId) -> Result<usize>;

    /// `recreateCrossUnitEdges`: idempotent re-attach by endpoint id. Returns
    /// the number of edges whose endpoints both still existed.
    async fn recreate_cross_unit_edges(
        &self,
        records: &[CrossUnitEdgeRecord],
        project_id: &ProjectId,
    ) -> Result<usize>;

    /// Existence check scoped to `project_id`: an id belonging to another
    /// project must not satisfy this, or edges could bridge projects.
    async fn node_exists(&self, id: &Id, project_id: &ProjectId) -> Result<bool>;

    /// Every indexed `(path, mtime, size, contentHash)` tuple for a project
    /// (spec.md §4.9 input to the Change Detector).
    async fn indexed_source_units(&self, project_id: &ProjectId) -> Result<Vec<SourceUnit>>;

    /// Every surviving node projected to a `LightweightSymbol`, the
    /// "existing-symbol index" an incremental reparse loads so local
    /// references can resolve across the reparsed/untouched boundary
    /// immediately (spec.md §4.10 step 3).
    async fn project_symbols(&self, project_id: &ProjectId) -> Result<Vec<LightweightSymbol>>;

    /// `(nodeCount, edgeCount)` for a project, used to stamp the Project
    /// node after an incremental update (spec.md §4.10 step 6).
    async fn project_counts(&self, project_id: &ProjectId) -> Result<(usize, usize)>;

    async fn upsert_project_status(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
        node_count: usize,
        edge_count: usize,
    ) -> Result<()>;
}
