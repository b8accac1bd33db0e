pub mod importer;
pub mod schema;
pub mod store;
pub mod surreal;

pub use importer::{EmbeddingClient, GraphImporter, ImportStats, NullEmbeddingClient};
pub use store::{CrossUnitEdgeRecord, GraphStore, NodeWrite, ProjectStatus};
pub use surreal::SurrealGraphStore;
