//! Closed-set type vocabulary for the code graph.
//!
//! Declarations and relationships are modeled as tagged variants over a
//! closed set of core kinds (spec.md §9): dispatch is data-driven, keyed by
//! `DeclarationKind`/`RelationshipKind`, rather than an inheritance tree.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DeclarationKind {
    File,
    Class,
    Interface,
    Enum,
    TypeAlias,
    Function,
    Method,
    Property,
    Constructor,
    Parameter,
    Variable,
    Import,
    Export,
    Decorator,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::File => "File",
            DeclarationKind::Class => "Class",
            DeclarationKind::Interface => "Interface",
            DeclarationKind::Enum => "Enum",
            DeclarationKind::TypeAlias => "TypeAlias",
            DeclarationKind::Function => "Function",
            DeclarationKind::Method => "Method",
            DeclarationKind::Property => "Property",
            DeclarationKind::Constructor => "Constructor",
            DeclarationKind::Parameter => "Parameter",
            DeclarationKind::Variable => "Variable",
            DeclarationKind::Import => "Import",
            DeclarationKind::Export => "Export",
            DeclarationKind::Decorator => "Decorator",
        }
    }

    /// Declaration kinds whose body text is embedded by default (spec.md §6.5,
    /// §4.8 `skipEmbedding`). File nodes and pure structural leaves are skipped.
    pub fn skip_embedding_by_default(&self) -> bool {
        matches!(
            self,
            DeclarationKind::File
                | DeclarationKind::Import
                | DeclarationKind::Export
                | DeclarationKind::Parameter
                | DeclarationKind::Decorator
        )
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    None,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    Contains,
    HasMember,
    HasParameter,
    DecoratedWith,
    Imports,
    Exports,
    Extends,
    Implements,
    TypedAs,
    Calls,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "contains",
            RelationshipKind::HasMember => "has-member",
            RelationshipKind::HasParameter => "has-parameter",
            RelationshipKind::DecoratedWith => "decorated-with",
            RelationshipKind::Imports => "imports",
            RelationshipKind::Exports => "exports",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::TypedAs => "typed-as",
            RelationshipKind::Calls => "calls",
        }
    }

    /// Default `relationshipWeight` per edge kind (spec.md §3.3 invariant 4):
    /// 0.30 for low-signal structural/decoration edges up to 0.85 for calls
    /// and inheritance.
    pub fn default_weight(&self) -> Weight {
        let v = match self {
            RelationshipKind::DecoratedWith => 0.30,
            RelationshipKind::HasParameter => 0.40,
            RelationshipKind::Contains => 0.50,
            RelationshipKind::HasMember => 0.55,
            RelationshipKind::TypedAs => 0.60,
            RelationshipKind::Exports => 0.60,
            RelationshipKind::Imports => 0.65,
            RelationshipKind::Implements => 0.80,
            RelationshipKind::Extends => 0.85,
            RelationshipKind::Calls => 0.85,
        };
        Weight::new(v)
    }

    pub fn is_containment(&self) -> bool {
        matches!(
            self,
            RelationshipKind::Contains
                | RelationshipKind::HasMember
                | RelationshipKind::HasParameter
        )
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeOrigin {
    Ast,
    Decorator,
    Pattern,
    Inference,
}

/// A value clamped to `[0, 1]` at construction. Backs both `Confidence` and
/// `relationshipWeight` (spec.md §3.1/§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitInterval(f32);

impl UnitInterval {
    pub fn new(value: f32) -> Self {
        UnitInterval(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

pub type Confidence = UnitInterval;
pub type Weight = UnitInterval;

impl Default for UnitInterval {
    fn default() -> Self {
        UnitInterval(1.0)
    }
}

/// Location within a source file (1-based line/column, end optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}
