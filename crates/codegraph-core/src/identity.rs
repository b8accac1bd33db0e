//! Deterministic identity for nodes and edges.
//!
//! Every producer in the pipeline mints ids through this module; no other
//! code may construct an `Id`. Two independent runs over the same inputs
//! must produce the same id — that determinism is what lets the
//! incremental engine delete-then-recreate subgraphs without losing
//! external references into the graph.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// A content-addressed identifier. Cheap to clone (`Arc<str>` backed).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(Arc<str>);

impl Id {
    fn from_string(s: String) -> Self {
        Id(Arc::from(s.into_boxed_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Id::from_string(s))
    }
}

/// A project handle, derived deterministically from the project's
/// canonical absolute path. Format: `proj_` + 12 hex characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Derive a project id from the project's canonical absolute path.
    pub fn from_path(canonical_path: &str) -> Self {
        let digest = Sha256::digest(canonical_path.as_bytes());
        let hex = hex_string(&digest);
        ProjectId(format!("proj_{}", &hex[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(&mut s, "{:02x}", b).unwrap();
    }
    s
}

fn truncated_hash(parts: &[&str]) -> String {
    let joined = parts.join("::");
    let digest = Sha256::digest(joined.as_bytes());
    hex_string(&digest)[..16].to_string()
}

/// `nodeId(projectId, coreKind, filePath, name, parentId?) -> Id`
///
/// `id` is the SHA-256 of `projectId :: coreKind :: filePath :: [parentId ::] name`,
/// truncated to 16 hex chars, prefixed `projectId:coreKind:`.
pub fn node_id(
    project_id: &ProjectId,
    core_kind: &str,
    file_path: &str,
    name: &str,
    parent_id: Option<&Id>,
) -> Id {
    let mut parts: Vec<&str> = vec![project_id.as_str(), core_kind, file_path];
    let parent_str;
    if let Some(p) = parent_id {
        parent_str = p.as_str().to_string();
        parts.push(&parent_str);
    }
    parts.push(name);
    let hash = truncated_hash(&parts);
    Id::from_string(format!("{}:{}:{}", project_id, core_kind, hash))
}

/// `coreEdgeId(kind, src, tgt) -> Id`
pub fn core_edge_id(kind: &str, src: &Id, tgt: &Id) -> Id {
    let hash = truncated_hash(&[kind, src.as_str(), tgt.as_str()]);
    Id::from_string(hash)
}

/// `callEdgeId(src, tgt, line) -> Id`
///
/// The line number participates in the hash so multiple call sites between
/// the same pair of nodes each get a distinct edge id.
pub fn call_edge_id(src: &Id, tgt: &Id, line: u32) -> Id {
    let line_str = line.to_string();
    let hash = truncated_hash(&["calls", src.as_str(), tgt.as_str(), &line_str]);
    Id::from_string(hash)
}

/// `semanticEdgeId(semanticKind, src, tgt) -> Id`
pub fn semantic_edge_id(semantic_kind: &str, src: &Id, tgt: &Id) -> Id {
    let hash = truncated_hash(&[semantic_kind, src.as_str(), tgt.as_str()]);
    Id::from_string(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_deterministic() {
        let project = ProjectId::from_path("/home/dev/project");
        let a = node_id(&project, "Class", "src/a.ts", "Widget", None);
        let b = node_id(&project, "Class", "src/a.ts", "Widget", None);
        assert_eq!(a, b);
    }

    #[test]
    fn node_id_distinguishes_parent() {
        let project = ProjectId::from_path("/home/dev/project");
        let root = node_id(&project, "Class", "src/a.ts", "Widget", None);
        let method_a = node_id(&project, "Method", "src/a.ts", "render", Some(&root));
        let other_root = node_id(&project, "Class", "src/a.ts", "Other", None);
        let method_b = node_id(&project, "Method", "src/a.ts", "render", Some(&other_root));
        assert_ne!(method_a, method_b);
    }

    #[test]
    fn node_id_has_expected_prefix() {
        let project = ProjectId::from_path("/home/dev/project");
        let id = node_id(&project, "Function", "src/util.ts", "helper", None);
        let prefix = format!("{}:Function:", project);
        assert!(id.as_str().starts_with(&prefix));
    }

    #[test]
    fn project_id_is_deterministic_and_prefixed() {
        let a = ProjectId::from_path("/home/dev/project");
        let b = ProjectId::from_path("/home/dev/project");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("proj_"));
        assert_eq!(a.as_str().len(), "proj_".len() + 12);
    }

    #[test]
    fn call_edge_id_distinguishes_line() {
        let project = ProjectId::from_path("/p");
        let src = node_id(&project, "Method", "a.ts", "foo", None);
        let tgt = node_id(&project, "Method", "b.ts", "bar", None);
        let e1 = call_edge_id(&src, &tgt, 10);
        let e2 = call_edge_id(&src, &tgt, 20);
        assert_ne!(e1, e2);
    }

    #[test]
    fn core_edge_id_is_deterministic() {
        let project = ProjectId::from_path("/p");
        let src = node_id(&project, "File", "a.ts", "a.ts", None);
        let tgt = node_id(&project, "Class", "a.ts", "Widget", Some(&src));
        let e1 = core_edge_id("contains", &src, &tgt);
        let e2 = core_edge_id("contains", &src, &tgt);
        assert_eq!(e1, e2);
    }
}
