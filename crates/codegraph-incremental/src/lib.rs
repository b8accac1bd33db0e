pub mod detect;
pub mod engine;

pub use detect::{detect_changes, ChangeSet};
pub use engine::{IncrementalEngine, IncrementalOutcome};
