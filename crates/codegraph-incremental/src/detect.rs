//! The Change Detector (spec.md §4.9): walks the current file tree and
//! classifies every file against the indexed `(path, mtime, size,
//! contentHash)` tuples read back from the graph store.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::warn;

use codegraph_core::{Result, SourceUnit};
use codegraph_parser::file_collect::{collect_source_files, FileCollectionConfig};

/// Files to reparse and files whose nodes should be deleted (spec.md §4.10
/// names this union `F`).
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub to_reparse: Vec<String>,
    pub to_delete: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.to_reparse.is_empty() && self.to_delete.is_empty()
    }

    /// `F = toDelete ∪ toReparse` (spec.md §4.10).
    pub fn affected_paths(&self) -> Vec<String> {
        let mut paths = self.to_reparse.clone();
        paths.extend(self.to_delete.iter().cloned());
        paths
    }
}

/// Walks `root` (honoring `exclude_globs` and the symlink-escape guard
/// `collect_source_files` already enforces), compares each file's current
/// `(mtime, size, contentHash)` against `indexed`, and classifies:
///
/// - **reparse**: present in the tree, not indexed, or any of the three differs.
/// - **delete**: present in the index, not in the tree.
/// - **skip**: all three match (omitted from the result entirely).
pub fn detect_changes(root: &Path, exclude_globs: &[String], indexed: &[SourceUnit]) -> Result<ChangeSet> {
    let collection_config = FileCollectionConfig {
        exclude_globs: exclude_globs.to_vec(),
    };
    let walked = collect_source_files(root, &collection_config)?;

    let indexed_by_path: HashMap<&str, &SourceUnit> =
        indexed.iter().map(|unit| (unit.path.as_str(), unit)).collect();

    let mut seen = HashSet::with_capacity(walked.len());
    let mut to_reparse = Vec::new();

    for file in &walked {
        let path_str = file.to_string_lossy().to_string();
        seen.insert(path_str.clone());

        match stat_current(file) {
            Ok((mtime_ms, size_bytes, content_hash)) => match indexed_by_path.get(path_str.as_str()) {
                None => to_reparse.push(path_str),
                Some(unit) => {
                    if unit.mtime_ms != mtime_ms || unit.size_bytes != size_bytes || unit.content_hash != content_hash
                    {
                        to_reparse.push(path_str);
                    }
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Not found during stat: treated as deletion on the next pass,
                // not here — the file already isn't in `walked`'s result.
            }
            Err(e) => {
                warn!(path = %path_str, error = %e, "stat failed; scheduling reparse (fail-safe)");
                to_reparse.push(path_str);
            }
        }
    }

    let to_delete = indexed
        .iter()
        .filter(|unit| !seen.contains(&unit.path))
        .map(|unit| unit.path.clone())
        .collect();

    Ok(ChangeSet { to_reparse, to_delete })
}

fn stat_current(path: &Path) -> io::Result<(u64, u64, String)> {
    let metadata = std::fs::metadata(path)?;
    let mtime_ms = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let bytes = std::fs::read(path)?;
    let size_bytes = bytes.len() as u64;
    let digest = Sha256::digest(&bytes);
    let content_hash = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok((mtime_ms, size_bytes, content_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unit(path: &str, mtime_ms: u64, size_bytes: u64, content_hash: &str) -> SourceUnit {
        SourceUnit {
            path: path.to_string(),
            mtime_ms,
            size_bytes,
            content_hash: content_hash.to_string(),
            package: None,
            language: "typescript".to_string(),
        }
    }

    #[test]
    fn new_file_is_reparse() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let changes = detect_changes(dir.path(), &[], &[]).unwrap();
        assert_eq!(changes.to_reparse.len(), 1);
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn unchanged_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        fs::write(&path, "export const a = 1;").unwrap();
        let (mtime_ms, size_bytes, content_hash) = stat_current(&path).unwrap();
        let indexed = vec![unit(&path.to_string_lossy(), mtime_ms, size_bytes, &content_hash)];

        let changes = detect_changes(dir.path(), &[], &indexed).unwrap();
        assert!(changes.to_reparse.is_empty());
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn changed_content_triggers_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        fs::write(&path, "export const a = 1;").unwrap();
        let indexed = vec![unit(&path.to_string_lossy(), 0, 0, "stale-hash")];

        let changes = detect_changes(dir.path(), &[], &indexed).unwrap();
        assert_eq!(changes.to_reparse.len(), 1);
    }

    #[test]
    fn removed_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let indexed = vec![unit(
            &dir.path().join("gone.ts").to_string_lossy(),
            0,
            0,
            "whatever",
        )];
        let changes = detect_changes(dir.path(), &[], &indexed).unwrap();
        assert_eq!(changes.to_delete.len(), 1);
        assert!(changes.to_reparse.is_empty());
    }
}
