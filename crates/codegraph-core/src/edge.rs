use crate::identity::Id;
use crate::types::{Confidence, DeclarationKind, EdgeOrigin, RelationshipKind, Weight};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A directional edge between two nodes (spec.md §3.1 `Relationship`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Id,
    pub source_id: Id,
    pub target_id: Id,
    pub core_kind: RelationshipKind,
    pub semantic_kind: Option<String>,
    pub origin: EdgeOrigin,
    pub confidence: Confidence,
    pub weight: Weight,
    pub file_path: String,
    pub line: Option<u32>,
    pub context: HashMap<String, String>,
}

impl Relationship {
    pub fn new(
        id: Id,
        source_id: Id,
        target_id: Id,
        core_kind: RelationshipKind,
        origin: EdgeOrigin,
        file_path: impl Into<String>,
    ) -> Self {
        let weight = core_kind.default_weight();
        Relationship {
            id,
            source_id,
            target_id,
            core_kind,
            semantic_kind: None,
            origin,
            confidence: Confidence::new(1.0),
            weight,
            file_path: file_path.into(),
            line: None,
            context: HashMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Confidence::new(confidence);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Weight::new(weight);
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_semantic_kind(mut self, semantic_kind: impl Into<String>) -> Self {
        self.semantic_kind = Some(semantic_kind.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// An unresolved edge emitted during parsing (spec.md §3.1 `Deferred
/// Reference`). Lives in memory only; removed once resolved.
#[derive(Debug, Clone)]
pub struct DeferredReference {
    pub source_id: Id,
    pub edge_kind: RelationshipKind,
    pub target_name: String,
    pub target_kind: DeclarationKind,
    pub target_file_path: Option<String>,
    pub source_file_path: String,
    pub line: Option<u32>,
    /// Present for `calls` references where the receiver's static type was
    /// determined syntactically, enabling a higher-confidence match.
    pub call_site_context: Option<String>,
}

impl DeferredReference {
    pub fn new(
        source_id: Id,
        edge_kind: RelationshipKind,
        target_name: impl Into<String>,
        target_kind: DeclarationKind,
        source_file_path: impl Into<String>,
    ) -> Self {
        DeferredReference {
            source_id,
            edge_kind,
            target_name: target_name.into(),
            target_kind,
            target_file_path: None,
            source_file_path: source_file_path.into(),
            line: None,
            call_site_context: None,
        }
    }

    pub fn with_target_file(mut self, path: impl Into<String>) -> Self {
        self.target_file_path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_call_site_context(mut self, ctx: impl Into<String>) -> Self {
        self.call_site_context = Some(ctx.into());
        self
    }
}
