//! DDL schema for the SurrealDB-backed graph store, in the teacher's
//! `surrealdb_schema.rs` style: a declarative `TableSchema`/`FieldDefinition`
//! model rendered to idempotent `DEFINE ...` statements rather than a
//! hand-maintained migration file.

use codegraph_core::{CodeGraphError, Result};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub field_type: FieldType,
    pub optional: bool,
}

impl FieldDefinition {
    const fn new(name: &'static str, field_type: FieldType) -> Self {
        FieldDefinition {
            name,
            field_type,
            optional: false,
        }
    }

    const fn optional(name: &'static str, field_type: FieldType) -> Self {
        FieldDefinition {
            name,
            field_type,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Datetime,
    Object,
    ArrayString,
    Record(&'static str),
}

impl FieldType {
    fn to_surreal_type(self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::Datetime => "datetime".to_string(),
            FieldType::Object => "object".to_string(),
            FieldType::ArrayString => "array<string>".to_string(),
            FieldType::Record(table) => format!("record<{}>", table),
        }
    }
}

pub enum IndexDefinition {
    Standard {
        name: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
        unique: bool,
    },
    Vector {
        name: &'static str,
        table: &'static str,
        column: &'static str,
        dimension: usize,
    },
}

pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDefinition],
    pub indexes: &'static [IndexDefinition],
}

/// Embedding vectors are fixed at dimension 3072 (spec.md §6.5).
pub const EMBEDDING_DIMENSION: usize = 3072;

const NODE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition::new("id", FieldType::String),
    FieldDefinition::new("project_id", FieldType::String),
    FieldDefinition::new("kind", FieldType::String),
    FieldDefinition::new("name", FieldType::String),
    FieldDefinition::new("file_path", FieldType::String),
    FieldDefinition::new("primary_label", FieldType::String),
    FieldDefinition::new("secondary_labels", FieldType::ArrayString),
    FieldDefinition::optional("semantic_kind", FieldType::String),
    FieldDefinition::new("location", FieldType::Object),
    FieldDefinition::optional("source_body", FieldType::String),
    FieldDefinition::new("visibility", FieldType::String),
    FieldDefinition::new("is_exported", FieldType::Bool),
    FieldDefinition::optional("normalized_hash", FieldType::String),
    FieldDefinition::new("context", FieldType::Object),
    FieldDefinition::optional("embedding", FieldType::Object),
    FieldDefinition::new("created_at", FieldType::Datetime),
    FieldDefinition::new("updated_at", FieldType::Datetime),
];

const NODE_INDEXES: &[IndexDefinition] = &[
    IndexDefinition::Standard {
        name: "idx_nodes_id",
        table: "declaration_nodes",
        columns: &["id"],
        unique: true,
    },
    IndexDefinition::Standard {
        name: "idx_nodes_project",
        table: "declaration_nodes",
        columns: &["project_id"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_nodes_project_label",
        table: "declaration_nodes",
        columns: &["project_id", "primary_label"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_nodes_file",
        table: "declaration_nodes",
        columns: &["project_id", "file_path"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_nodes_normalized_hash",
        table: "declaration_nodes",
        columns: &["project_id", "normalized_hash"],
        unique: false,
    },
    IndexDefinition::Vector {
        name: "idx_nodes_embedding",
        table: "declaration_nodes",
        column: "embedding",
        dimension: EMBEDDING_DIMENSION,
    },
];

pub const NODES_TABLE: TableSchema = TableSchema {
    name: "declaration_nodes",
    fields: NODE_FIELDS,
    indexes: NODE_INDEXES,
};

const EDGE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition::new("id", FieldType::String),
    FieldDefinition::new("project_id", FieldType::String),
    FieldDefinition::new("source_id", FieldType::String),
    FieldDefinition::new("target_id", FieldType::String),
    FieldDefinition::new("core_kind", FieldType::String),
    FieldDefinition::optional("semantic_kind", FieldType::String),
    FieldDefinition::new("origin", FieldType::String),
    FieldDefinition::new("confidence", FieldType::Float),
    FieldDefinition::new("weight", FieldType::Float),
    FieldDefinition::new("file_path", FieldType::String),
    FieldDefinition::optional("line", FieldType::Int),
    FieldDefinition::new("context", FieldType::Object),
    FieldDefinition::new("created_at", FieldType::Datetime),
];

const EDGE_INDEXES: &[IndexDefinition] = &[
    IndexDefinition::Standard {
        name: "idx_edges_id",
        table: "relationships",
        columns: &["id"],
        unique: true,
    },
    IndexDefinition::Standard {
        name: "idx_edges_project",
        table: "relationships",
        columns: &["project_id"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_edges_source",
        table: "relationships",
        columns: &["source_id"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_edges_target",
        table: "relationships",
        columns: &["target_id"],
        unique: false,
    },
    IndexDefinition::Standard {
        name: "idx_edges_kind",
        table: "relationships",
        columns: &["project_id", "core_kind"],
        unique: false,
    },
];

pub const EDGES_TABLE: TableSchema = TableSchema {
    name: "relationships",
    fields: EDGE_FIELDS,
    indexes: EDGE_INDEXES,
};

const PROJECT_FIELDS: &[FieldDefinition] = &[
    FieldDefinition::new("id", FieldType::String),
    FieldDefinition::new("root_path", FieldType::String),
    FieldDefinition::new("status", FieldType::String),
    FieldDefinition::new("node_count", FieldType::Int),
    FieldDefinition::new("edge_count", FieldType::Int),
    FieldDefinition::new("updated_at", FieldType::Datetime),
];

pub const PROJECTS_TABLE: TableSchema = TableSchema {
    name: "projects",
    fields: PROJECT_FIELDS,
    indexes: &[IndexDefinition::Standard {
        name: "idx_projects_id",
        table: "projects",
        columns: &["id"],
        unique: true,
    }],
};

/// Session notes are out of scope for extraction but the spec still names
/// their vector index as part of `createProjectIndexes` (spec.md §4.8): the
/// graph store reserves the table so other collaborators can write to it.
const SESSION_NOTE_FIELDS: &[FieldDefinition] = &[
    FieldDefinition::new("id", FieldType::String),
    FieldDefinition::new("project_id", FieldType::String),
    FieldDefinition::new("body", FieldType::String),
    FieldDefinition::optional("embedding", FieldType::Object),
    FieldDefinition::new("created_at", FieldType::Datetime),
];

pub const SESSION_NOTES_TABLE: TableSchema = TableSchema {
    name: "session_notes",
    fields: SESSION_NOTE_FIELDS,
    indexes: &[IndexDefinition::Vector {
        name: "idx_session_notes_embedding",
        table: "session_notes",
        column: "embedding",
        dimension: EMBEDDING_DIMENSION,
    }],
};

pub const ALL_TABLES: &[TableSchema] = &[NODES_TABLE, EDGES_TABLE, PROJECTS_TABLE, SESSION_NOTES_TABLE];

/// Apply every table's DDL, idempotently (`DEFINE ... IF NOT EXISTS`).
/// Mirrors the teacher's `SchemaManager::apply_schemas`.
pub async fn apply_all(db: &Surreal<Any>) -> Result<()> {
    for table in ALL_TABLES {
        apply_table(db, table).await?;
    }
    Ok(())
}

async fn apply_table(db: &Surreal<Any>, schema: &TableSchema) -> Result<()> {
    info!(table = schema.name, "applying schema");

    let mut ddl = format!(
        "DEFINE TABLE IF NOT EXISTS {} SCHEMAFULL;",
        schema.name
    );

    for field in schema.fields {
        let ty = if field.optional {
            format!("option<{}>", field.field_type.to_surreal_type())
        } else {
            field.field_type.to_surreal_type()
        };
        ddl.push_str(&format!(
            "\nDEFINE FIELD IF NOT EXISTS {} ON TABLE {} TYPE {};",
            field.name, schema.name, ty
        ));
    }

    for index in schema.indexes {
        match index {
            IndexDefinition::Standard {
                name,
                table,
                columns,
                unique,
            } => {
                let cols = columns.join(", ");
                let unique = if *unique { " UNIQUE" } else { "" };
                ddl.push_str(&format!(
                    "\nDEFINE INDEX IF NOT EXISTS {} ON TABLE {} COLUMNS {}{};",
                    name, table, cols, unique
                ));
            }
            IndexDefinition::Vector {
                name,
                table,
                column,
                dimension,
            } => {
                ddl.push_str(&format!(
                    "\nDEFINE INDEX IF NOT EXISTS {} ON TABLE {} FIELDS {} MTREE DIMENSION {} DIST COSINE;",
                    name, table, column, dimension
                ));
            }
        }
    }

    db.query(&ddl)
        .await
        .map_err(|e| CodeGraphError::Graph(format!("schema DDL for {} failed: {}", schema.name, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_renders_surreal_types() {
        assert_eq!(FieldType::String.to_surreal_type(), "string");
        assert_eq!(FieldType::Record("declaration_nodes").to_surreal_type(), "record<declaration_nodes>");
    }

    #[test]
    fn all_tables_have_a_primary_index() {
        for table in ALL_TABLES {
            assert!(!table.indexes.is_empty(), "{} has no indexes", table.name);
        }
    }
}
