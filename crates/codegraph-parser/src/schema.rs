//! The Core Schema (spec.md §4.2): a declarative, table-driven description
//! of how Tree-sitter node kinds map onto `DeclarationKind`s, which fields
//! enumerate their children, which properties to extract, and which
//! references to defer for cross-file resolution.
//!
//! This is evaluated at runtime by `extractor::Extractor` rather than baked
//! into a hand-written `match` per declaration kind, so that adding a new
//! child/reference rule does not require touching the traversal code —
//! mirroring the teacher's `LanguageRegistry` table-of-configs idiom
//! (`languages/language.rs`), generalized from "one table entry per
//! language" to "one table entry per declaration kind".

use codegraph_core::{DeclarationKind, RelationshipKind};

/// How many targets a reference extractor is expected to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A rule describing how to find and link children of a given Tree-sitter
/// node kind that should become child Declaration Nodes.
#[derive(Debug, Clone, Copy)]
pub struct ChildRule {
    /// The Tree-sitter field name (or, if `None`, "any named child") used
    /// to enumerate candidates on the parent node.
    pub field: Option<&'static str>,
    /// The Tree-sitter node kind a candidate must have to match this rule.
    pub ts_kind: &'static str,
    /// The declaration kind the matched child is parsed as.
    pub child_decl_kind: DeclarationKind,
    /// The edge kind connecting parent -> child.
    pub edge_kind: RelationshipKind,
}

/// A rule describing a deferred/resolved reference extracted from a node
/// (e.g. `extends`, `implements`, `imports`, `typed-as`, `calls`).
#[derive(Debug, Clone, Copy)]
pub struct ReferenceRule {
    pub edge_kind: RelationshipKind,
    /// Tree-sitter field/accessor name used to locate the reference's
    /// syntax (e.g. `"name"` on a `heritage_clause`, `"source"` on an
    /// `import_statement`).
    pub accessor: &'static str,
    pub cardinality: Cardinality,
    pub target_kind: DeclarationKind,
}

/// The schema entry for one Tree-sitter node kind.
#[derive(Debug, Clone, Copy)]
pub struct NodeSchema {
    pub ts_kind: &'static str,
    pub decl_kind: DeclarationKind,
    /// Field used to read the declaration's display name, when the grammar
    /// exposes one directly (`None` for synthetic/anonymous declarations,
    /// e.g. default-exported arrow functions).
    pub name_field: Option<&'static str>,
    pub children: &'static [ChildRule],
    pub references: &'static [ReferenceRule],
    pub index_properties: &'static [&'static str],
}

impl NodeSchema {
    pub fn skip_embedding(&self) -> bool {
        self.decl_kind.skip_embedding_by_default()
    }
}

macro_rules! child {
    ($field:expr, $ts_kind:expr, $decl:expr, $edge:expr) => {
        ChildRule {
            field: $field,
            ts_kind: $ts_kind,
            child_decl_kind: $decl,
            edge_kind: $edge,
        }
    };
}

macro_rules! reference {
    ($edge:expr, $accessor:expr, $card:expr, $target:expr) => {
        ReferenceRule {
            edge_kind: $edge,
            accessor: $accessor,
            cardinality: $card,
            target_kind: $target,
        }
    };
}

const CLASS_CHILDREN: &[ChildRule] = &[
    // Fields before methods: `extractor::ExtractionCtx` records each
    // property's declared type as it visits these, so a `this.field.m()`
    // call found while visiting a method below can look the type up.
    child!(
        None,
        "public_field_definition",
        DeclarationKind::Property,
        RelationshipKind::HasMember
    ),
    child!(
        None,
        "method_definition",
        DeclarationKind::Method,
        RelationshipKind::HasMember
    ),
];

const CLASS_REFERENCES: &[ReferenceRule] = &[
    reference!(
        RelationshipKind::Extends,
        "extends_clause",
        Cardinality::One,
        DeclarationKind::Class
    ),
    reference!(
        RelationshipKind::Implements,
        "implements_clause",
        Cardinality::Many,
        DeclarationKind::Interface
    ),
];

const INTERFACE_CHILDREN: &[ChildRule] = &[
    child!(
        None,
        "property_signature",
        DeclarationKind::Property,
        RelationshipKind::HasMember
    ),
    child!(
        None,
        "method_signature",
        DeclarationKind::Method,
        RelationshipKind::HasMember
    ),
];

const INTERFACE_REFERENCES: &[ReferenceRule] = &[reference!(
    RelationshipKind::Extends,
    "extends_clause",
    Cardinality::Many,
    DeclarationKind::Interface
)];

const FUNCTION_CHILDREN: &[ChildRule] = &[child!(
    Some("parameters"),
    "required_parameter",
    DeclarationKind::Parameter,
    RelationshipKind::HasParameter
)];

const METHOD_CHILDREN: &[ChildRule] = &[
    child!(
        Some("parameters"),
        "required_parameter",
        DeclarationKind::Parameter,
        RelationshipKind::HasParameter
    ),
    child!(
        Some("parameters"),
        "optional_parameter",
        DeclarationKind::Parameter,
        RelationshipKind::HasParameter
    ),
];

const FUNCTION_REFERENCES: &[ReferenceRule] = &[reference!(
    RelationshipKind::Calls,
    "body",
    Cardinality::Many,
    DeclarationKind::Function
)];

// Calls made from inside a method: a receiver-bearing call (`this.foo()`,
// `obj.bar()`) targets a `Method`; a bare `foo()` still targets a
// `Function` (`extractor::extract_calls` picks between the two per call
// site instead of using this constant directly).
const METHOD_REFERENCES: &[ReferenceRule] = &[reference!(
    RelationshipKind::Calls,
    "body",
    Cardinality::Many,
    DeclarationKind::Method
)];

const FILE_CHILDREN: &[ChildRule] = &[
    child!(
        None,
        "class_declaration",
        DeclarationKind::Class,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "abstract_class_declaration",
        DeclarationKind::Class,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "interface_declaration",
        DeclarationKind::Interface,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "enum_declaration",
        DeclarationKind::Enum,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "type_alias_declaration",
        DeclarationKind::TypeAlias,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "function_declaration",
        DeclarationKind::Function,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "lexical_declaration",
        DeclarationKind::Variable,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "import_statement",
        DeclarationKind::Import,
        RelationshipKind::Contains
    ),
    child!(
        None,
        "export_statement",
        DeclarationKind::Export,
        RelationshipKind::Contains
    ),
];

pub const CLASS_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "class_declaration",
    decl_kind: DeclarationKind::Class,
    name_field: Some("name"),
    children: CLASS_CHILDREN,
    references: CLASS_REFERENCES,
    index_properties: &["name", "file_path", "semantic_kind"],
};

pub const ABSTRACT_CLASS_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "abstract_class_declaration",
    ..CLASS_SCHEMA
};

pub const INTERFACE_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "interface_declaration",
    decl_kind: DeclarationKind::Interface,
    name_field: Some("name"),
    children: INTERFACE_CHILDREN,
    references: INTERFACE_REFERENCES,
    index_properties: &["name", "file_path"],
};

pub const ENUM_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "enum_declaration",
    decl_kind: DeclarationKind::Enum,
    name_field: Some("name"),
    children: &[],
    references: &[],
    index_properties: &["name", "file_path"],
};

pub const TYPE_ALIAS_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "type_alias_declaration",
    decl_kind: DeclarationKind::TypeAlias,
    name_field: Some("name"),
    children: &[],
    references: &[reference!(
        RelationshipKind::TypedAs,
        "value",
        Cardinality::Many,
        DeclarationKind::Interface
    )],
    index_properties: &["name", "file_path"],
};

pub const FUNCTION_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "function_declaration",
    decl_kind: DeclarationKind::Function,
    name_field: Some("name"),
    children: FUNCTION_CHILDREN,
    references: FUNCTION_REFERENCES,
    index_properties: &["name", "file_path", "normalized_hash"],
};

pub const METHOD_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "method_definition",
    decl_kind: DeclarationKind::Method,
    name_field: Some("name"),
    children: METHOD_CHILDREN,
    references: METHOD_REFERENCES,
    index_properties: &["name", "file_path", "normalized_hash"],
};

pub const PROPERTY_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "public_field_definition",
    decl_kind: DeclarationKind::Property,
    name_field: Some("name"),
    children: &[],
    references: &[reference!(
        RelationshipKind::TypedAs,
        "type",
        Cardinality::One,
        DeclarationKind::Class
    )],
    index_properties: &["name", "file_path"],
};

pub const VARIABLE_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "lexical_declaration",
    decl_kind: DeclarationKind::Variable,
    name_field: None, // read from nested variable_declarator
    children: &[],
    references: &[],
    index_properties: &["name", "file_path"],
};

pub const IMPORT_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "import_statement",
    decl_kind: DeclarationKind::Import,
    name_field: None, // derived from the module specifier string
    children: &[],
    references: &[reference!(
        RelationshipKind::Imports,
        "source",
        Cardinality::One,
        DeclarationKind::File
    )],
    index_properties: &["file_path"],
};

pub const EXPORT_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "export_statement",
    decl_kind: DeclarationKind::Export,
    name_field: None,
    children: &[],
    references: &[reference!(
        RelationshipKind::Exports,
        "declaration",
        Cardinality::Many,
        DeclarationKind::Function
    )],
    index_properties: &["file_path"],
};

pub const DECORATOR_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "decorator",
    decl_kind: DeclarationKind::Decorator,
    name_field: None, // derived from the call/identifier under the decorator
    children: &[],
    references: &[],
    index_properties: &["name"],
};

pub const PARAMETER_SCHEMA: NodeSchema = NodeSchema {
    ts_kind: "required_parameter",
    decl_kind: DeclarationKind::Parameter,
    name_field: Some("pattern"),
    children: &[],
    references: &[reference!(
        RelationshipKind::TypedAs,
        "type",
        Cardinality::One,
        DeclarationKind::Class
    )],
    index_properties: &["file_path"],
};

/// All node schemas, in traversal-priority order. `extractor::Extractor`
/// looks a Tree-sitter node's `.kind()` up in this table.
pub const NODE_SCHEMAS: &[NodeSchema] = &[
    CLASS_SCHEMA,
    ABSTRACT_CLASS_SCHEMA,
    INTERFACE_SCHEMA,
    ENUM_SCHEMA,
    TYPE_ALIAS_SCHEMA,
    FUNCTION_SCHEMA,
    METHOD_SCHEMA,
    PROPERTY_SCHEMA,
    VARIABLE_SCHEMA,
    IMPORT_SCHEMA,
    EXPORT_SCHEMA,
    DECORATOR_SCHEMA,
    PARAMETER_SCHEMA,
];

pub fn schema_for_ts_kind(ts_kind: &str) -> Option<&'static NodeSchema> {
    NODE_SCHEMAS.iter().find(|s| s.ts_kind == ts_kind)
}

pub fn file_children() -> &'static [ChildRule] {
    FILE_CHILDREN
}
