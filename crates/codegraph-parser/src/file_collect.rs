//! File discovery, honoring exclude globs and symlink-escape guarding
//! (spec.md §4.6.1/§6.7). Grounded in the teacher's
//! `collect_source_files_with_config` (`file_collect.rs`): an `ignore`
//! walker plus a combined `globset` exclude set.

use codegraph_core::{CodeGraphError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::languages::typescript::FILE_EXTENSIONS;

#[derive(Debug, Clone)]
pub struct FileCollectionConfig {
    pub exclude_globs: Vec<String>,
}

/// Walk `root` for `.ts`/`.tsx` files, skipping anything matched by
/// `config.exclude_globs` and any symlink that resolves outside `root`
/// (spec.md invariant: the workspace parser never follows a symlink that
/// escapes the project root).
pub fn collect_source_files(root: &Path, config: &FileCollectionConfig) -> Result<Vec<PathBuf>> {
    info!(root = %root.display(), "collecting TypeScript source files");

    let exclude_set = build_globset(&config.exclude_globs)?;
    let canonical_root = root
        .canonicalize()
        .map_err(|e| CodeGraphError::InvalidPath(format!("{}: {e}", root.display())))?;

    let mut walker = WalkBuilder::new(root);
    walker.hidden(false).follow_links(true).standard_filters(false);

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error, skipping entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !FILE_EXTENSIONS.contains(&ext) {
            continue;
        }

        if exclude_set.is_match(path) {
            debug!(path = %path.display(), "excluded by glob");
            continue;
        }

        match path.canonicalize() {
            Ok(canonical) if canonical.starts_with(&canonical_root) => {
                files.push(path.to_path_buf());
            }
            Ok(canonical) => {
                warn!(
                    path = %path.display(),
                    resolved = %canonical.display(),
                    "skipping symlink escaping project root"
                );
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to canonicalize, skipping");
            }
        }
    }

    files.sort();
    info!(count = files.len(), "source file collection complete");
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| CodeGraphError::Configuration(format!("invalid glob {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CodeGraphError::Configuration(format!("glob set build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_ts_files_and_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/b.ts"), "export const b = 1;").unwrap();
        fs::write(dir.path().join("c.txt"), "not source").unwrap();

        let config = FileCollectionConfig {
            exclude_globs: codegraph_core::default_exclude_globs(),
        };
        let files = collect_source_files(dir.path(), &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.ts"));
    }
}
