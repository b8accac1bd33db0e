use crate::identity::{Id, ProjectId};
use crate::types::{DeclarationKind, Location, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single source file tracked by the pipeline (spec.md §3.1 `SourceUnit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: String,
    pub mtime_ms: u64,
    pub size_bytes: u64,
    pub content_hash: String,
    pub package: Option<String>,
    pub language: String,
}

/// A Declaration Node (spec.md §3.1). Concrete variants are distinguished by
/// `kind`; this is a tagged struct rather than an enum-of-structs so the
/// schema-driven extractor (spec.md §4.2) can build nodes generically from
/// table-declared property extractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationNode {
    pub id: Id,
    pub project_id: ProjectId,
    pub kind: DeclarationKind,
    pub name: String,
    pub file_path: String,
    pub primary_label: String,
    pub secondary_labels: Vec<String>,
    pub semantic_kind: Option<String>,
    pub location: Location,
    /// Raw source body, present for embedded kinds (classes, functions,
    /// methods, properties with initializers, etc.). Untruncated — the
    /// Graph Importer truncates only the embedding *input*, never what is
    /// persisted (spec.md §3.3 invariant 6).
    pub source_body: Option<String>,
    pub visibility: Visibility,
    pub is_exported: bool,
    pub normalized_hash: Option<String>,
    pub context: HashMap<String, String>,
}

impl DeclarationNode {
    pub fn new(
        id: Id,
        project_id: ProjectId,
        kind: DeclarationKind,
        name: impl Into<String>,
        file_path: impl Into<String>,
        location: Location,
    ) -> Self {
        let primary_label = kind.as_str().to_string();
        DeclarationNode {
            id,
            project_id,
            kind,
            name: name.into(),
            file_path: file_path.into(),
            primary_label,
            secondary_labels: Vec::new(),
            semantic_kind: None,
            location,
            source_body: None,
            visibility: Visibility::None,
            is_exported: false,
            normalized_hash: None,
            context: HashMap::new(),
        }
    }

    pub fn with_source_body(mut self, body: impl Into<String>) -> Self {
        self.source_body = Some(body.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_exported(mut self, is_exported: bool) -> Self {
        self.is_exported = is_exported;
        self
    }

    pub fn with_normalized_hash(mut self, hash: impl Into<String>) -> Self {
        self.normalized_hash = Some(hash.into());
        self
    }

    pub fn add_secondary_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.secondary_labels.contains(&label) {
            self.secondary_labels.push(label);
        }
    }

    pub fn set_semantic_kind(&mut self, semantic_kind: impl Into<String>) {
        self.semantic_kind = Some(semantic_kind.into());
    }

    pub fn context_insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn skip_embedding(&self) -> bool {
        self.kind.skip_embedding_by_default()
    }
}

/// Projection of a `DeclarationNode` used for cross-chunk/cross-file edge
/// detection without retaining AST memory (spec.md §3.1 Lightweight Symbol
/// Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightweightSymbol {
    pub id: Id,
    pub kind: DeclarationKind,
    pub name: String,
    pub file_path: String,
    pub context: HashMap<String, String>,
}

impl From<&DeclarationNode> for LightweightSymbol {
    fn from(node: &DeclarationNode) -> Self {
        LightweightSymbol {
            id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            file_path: node.file_path.clone(),
            context: node.context.clone(),
        }
    }
}
