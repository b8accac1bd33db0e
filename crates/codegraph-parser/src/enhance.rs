//! Framework Enhancements (spec.md §4.3): a priority-ordered stack of
//! detection patterns that relabel nodes with a framework-specific semantic
//! kind and synthesize additional edges over the merged symbol index.
//!
//! Declarative in the same sense as `schema` — a `const` table of
//! `Enhancement` descriptors evaluated by `apply_node_enhancements`/
//! `apply_edge_enhancements` rather than framework-specific code paths,
//! following the teacher's `LanguageRegistry` table-of-configs idiom.

use codegraph_core::{
    semantic_edge_id, DeclarationNode, EdgeOrigin, LightweightSymbol, Relationship, RelationshipKind,
};
use std::collections::HashMap;

/// What an enhancement looks for on a parsed node before it relabels it.
#[derive(Debug, Clone, Copy)]
pub enum DetectionPattern {
    /// Matches when any of the node's decorator names equal this value.
    DecoratorName(&'static str),
    /// Matches when the node's file path matches this suffix/substring.
    FilenameContains(&'static str),
    /// Matches when the class name ends with this suffix (e.g. `Controller`).
    NameSuffix(&'static str),
}

impl DetectionPattern {
    fn matches(&self, node: &DeclarationNode, decorators: &[String]) -> bool {
        match self {
            DetectionPattern::DecoratorName(name) => decorators.iter().any(|d| d == name),
            DetectionPattern::FilenameContains(frag) => node.file_path.contains(frag),
            DetectionPattern::NameSuffix(suffix) => node.name.ends_with(suffix),
        }
    }
}

/// A pairwise predicate used to synthesize a semantic edge between two
/// symbols once the whole project's symbol index is available.
pub type EdgeDetector =
    fn(&LightweightSymbol, &LightweightSymbol, &HashMap<String, String>) -> bool;

#[derive(Clone, Copy)]
pub struct EdgeEnhancement {
    pub semantic_kind: &'static str,
    pub core_kind: RelationshipKind,
    pub weight: f32,
    pub detector: EdgeDetector,
}

/// One stacked enhancement: priority order is the declaration order of
/// `ENHANCEMENTS` — the first matching pattern wins the semantic kind.
pub struct Enhancement {
    pub semantic_kind: &'static str,
    pub extra_labels: &'static [&'static str],
    pub patterns: &'static [DetectionPattern],
    pub edge_enhancements: &'static [EdgeEnhancement],
}

fn injects_via_constructor_param(
    source: &LightweightSymbol,
    target: &LightweightSymbol,
    _shared: &HashMap<String, String>,
) -> bool {
    source
        .context
        .get("constructor_param_types")
        .map(|types| types.split(',').any(|t| t.trim() == target.name))
        .unwrap_or(false)
}

const NEST_CONTROLLER: Enhancement = Enhancement {
    semantic_kind: "nest-controller",
    extra_labels: &["Controller"],
    patterns: &[DetectionPattern::DecoratorName("Controller")],
    edge_enhancements: &[EdgeEnhancement {
        semantic_kind: "injects",
        core_kind: RelationshipKind::Calls,
        weight: 0.70,
        detector: injects_via_constructor_param,
    }],
};

const NEST_SERVICE: Enhancement = Enhancement {
    semantic_kind: "nest-service",
    extra_labels: &["Injectable"],
    patterns: &[DetectionPattern::DecoratorName("Injectable")],
    edge_enhancements: &[],
};

const NEST_MODULE: Enhancement = Enhancement {
    semantic_kind: "nest-module",
    extra_labels: &["Module"],
    patterns: &[DetectionPattern::DecoratorName("Module")],
    edge_enhancements: &[],
};

const ANGULAR_COMPONENT: Enhancement = Enhancement {
    semantic_kind: "angular-component",
    extra_labels: &["Component"],
    patterns: &[DetectionPattern::DecoratorName("Component")],
    edge_enhancements: &[],
};

const REACT_COMPONENT: Enhancement = Enhancement {
    semantic_kind: "react-component",
    extra_labels: &["ReactComponent"],
    patterns: &[DetectionPattern::NameSuffix("Component")],
    edge_enhancements: &[],
};

const TEST_FILE: Enhancement = Enhancement {
    semantic_kind: "test-suite",
    extra_labels: &["Test"],
    patterns: &[
        DetectionPattern::FilenameContains(".test."),
        DetectionPattern::FilenameContains(".spec."),
    ],
    edge_enhancements: &[],
};

/// Priority-ordered enhancement stack. Earlier entries win ties.
pub const ENHANCEMENTS: &[Enhancement] = &[
    NEST_CONTROLLER,
    NEST_SERVICE,
    NEST_MODULE,
    ANGULAR_COMPONENT,
    REACT_COMPONENT,
    TEST_FILE,
];

/// Apply the highest-priority matching enhancement's semantic kind and
/// labels to `node`. `decorators` is the list of decorator names attached
/// to this declaration, already extracted by the File Parser.
pub fn apply_node_enhancement(node: &mut DeclarationNode, decorators: &[String]) {
    for enhancement in ENHANCEMENTS {
        if enhancement
            .patterns
            .iter()
            .any(|p| p.matches(node, decorators))
        {
            node.set_semantic_kind(enhancement.semantic_kind);
            for label in enhancement.extra_labels {
                node.add_secondary_label(*label);
            }
            return;
        }
    }
}

/// A synthesized edge produced by an edge enhancement; converted to a
/// `Relationship` by the caller once it has minted an id via
/// `codegraph_core::identity`.
pub struct SynthesizedEdge {
    pub source_id: codegraph_core::Id,
    pub target_id: codegraph_core::Id,
    pub core_kind: RelationshipKind,
    pub semantic_kind: &'static str,
    pub weight: f32,
}

impl SynthesizedEdge {
    /// Mints a deterministic edge id and converts to a persistable
    /// `Relationship` with `EdgeOrigin::Pattern` provenance. `SynthesizedEdge`
    /// carries no file path of its own (it spans two symbols, possibly in
    /// different files), so the relationship's `file_path` is left empty.
    pub fn into_relationship(self) -> Relationship {
        let id = semantic_edge_id(self.semantic_kind, &self.source_id, &self.target_id);
        Relationship::new(id, self.source_id, self.target_id, self.core_kind, EdgeOrigin::Pattern, String::new())
            .with_weight(self.weight)
            .with_semantic_kind(self.semantic_kind)
    }
}

/// Run every edge enhancement's detector pairwise over `symbols`
/// (spec.md §4.6 step 2: applied over the merged Lightweight Symbol
/// Records after all packages/chunks parse).
pub fn apply_edge_enhancements(
    symbols: &[LightweightSymbol],
    shared_context: &HashMap<String, String>,
) -> Vec<SynthesizedEdge> {
    let mut out = Vec::new();
    for enhancement in ENHANCEMENTS {
        for edge in enhancement.edge_enhancements {
            for source in symbols {
                for target in symbols {
                    if source.id == target.id {
                        continue;
                    }
                    if (edge.detector)(source, target, shared_context) {
                        out.push(SynthesizedEdge {
                            source_id: source.id.clone(),
                            target_id: target.id.clone(),
                            core_kind: edge.core_kind,
                            semantic_kind: edge.semantic_kind,
                            weight: edge.weight,
                        });
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{DeclarationKind, Location, ProjectId};

    fn sample_node(name: &str) -> DeclarationNode {
        let project = ProjectId::from_path("/p");
        let id = codegraph_core::node_id(&project, "Class", "a.ts", name, None);
        DeclarationNode::new(
            id,
            project,
            DeclarationKind::Class,
            name,
            "a.ts",
            Location {
                start_line: 1,
                start_column: 0,
                end_line: 1,
                end_column: 1,
            },
        )
    }

    #[test]
    fn controller_decorator_sets_semantic_kind() {
        let mut node = sample_node("WidgetController");
        apply_node_enhancement(&mut node, &["Controller".to_string()]);
        assert_eq!(node.semantic_kind.as_deref(), Some("nest-controller"));
        assert!(node.secondary_labels.contains(&"Controller".to_string()));
    }

    #[test]
    fn name_suffix_fallback_when_no_decorator() {
        let mut node = sample_node("WidgetComponent");
        apply_node_enhancement(&mut node, &[]);
        assert_eq!(node.semantic_kind.as_deref(), Some("react-component"));
    }

    #[test]
    fn first_matching_pattern_wins() {
        let mut node = sample_node("WidgetController");
        apply_node_enhancement(&mut node, &["Injectable".to_string()]);
        assert_eq!(node.semantic_kind.as_deref(), Some("nest-service"));
    }
}
