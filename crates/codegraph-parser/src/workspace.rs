//! The Workspace Parser (spec.md §4.6): detects a monorepo layout, derives
//! one package root per workspace member, and orchestrates per-package
//! parsing followed by a workspace-wide resolution + enhancement pass.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use codegraph_core::{
    DeclarationNode, DeferredReference, LightweightSymbol, ProjectId, Relationship,
};
use tracing::{info, warn};

use crate::coordinator::{self, merge_context_delta, CoordinatorConfig, CoordinatorOutcome};
use crate::enhance::{apply_edge_enhancements, SynthesizedEdge};
use crate::file_collect::FileCollectionConfig;
use crate::resolve::{self, ResolveStats, SymbolIndex};

#[derive(Debug, Clone)]
pub struct PackageRoot {
    pub name: String,
    pub root: PathBuf,
}

/// Output of parsing the whole workspace: every package's nodes/edges
/// merged, cross-package references resolved, framework edge enhancements
/// applied over the union (spec.md §4.6 steps).
pub struct WorkspaceParseResult {
    pub nodes: Vec<DeclarationNode>,
    pub edges: Vec<Relationship>,
    pub resolve_stats: ResolveStats,
    pub parse_errors: Vec<(String, String)>,
    pub synthesized_edges: Vec<SynthesizedEdge>,
}

/// Discover workspace packages: a root `package.json` with a `workspaces`
/// array of directory globs means every matching subdirectory containing
/// its own `package.json` is a package root; otherwise the whole tree is
/// one package named by the root manifest (or the directory name).
pub fn discover_packages(root: &Path) -> Vec<PackageRoot> {
    let manifest_path = root.join("package.json");
    let manifest = fs::read_to_string(&manifest_path)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok());

    let Some(manifest) = manifest else {
        return vec![single_package(root)];
    };

    let patterns = manifest
        .get("workspaces")
        .and_then(workspace_glob_patterns);

    let Some(patterns) = patterns else {
        return vec![single_package(root)];
    };

    let mut packages = Vec::new();
    for pattern in patterns {
        for candidate in expand_glob_dir(root, &pattern) {
            let pkg_manifest = candidate.join("package.json");
            if let Ok(contents) = fs::read_to_string(&pkg_manifest) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) {
                    let name = value
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_else(|| candidate.file_name().and_then(|n| n.to_str()).unwrap_or("package"))
                        .to_string();
                    packages.push(PackageRoot { name, root: candidate });
                }
            }
        }
    }

    if packages.is_empty() {
        vec![single_package(root)]
    } else {
        packages
    }
}

fn single_package(root: &Path) -> PackageRoot {
    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string();
    PackageRoot {
        name,
        root: root.to_path_buf(),
    }
}

fn workspace_glob_patterns(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect(),
        ),
        serde_json::Value::Object(obj) => obj
            .get("packages")
            .and_then(workspace_glob_patterns),
        _ => None,
    }
}

/// Expand a simple `dir/*` glob to its immediate subdirectories, or treat a
/// pattern with no `*` as a literal directory. Workspace globs in practice
/// are single-level (`packages/*`, `apps/*`), so this does not implement
/// full glob recursion.
fn expand_glob_dir(root: &Path, pattern: &str) -> Vec<PathBuf> {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let dir = root.join(prefix);
        return fs::read_dir(&dir)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
    }
    vec![root.join(pattern)]
}

/// Parse every package in the workspace, then run the resolver and edge
/// enhancements over the merged symbol index (spec.md §4.6 "after all
/// packages parse").
pub fn parse_workspace(
    root: &Path,
    project_id: &ProjectId,
    exclude_globs: &[String],
    coordinator_config: &CoordinatorConfig,
) -> codegraph_core::Result<WorkspaceParseResult> {
    let packages = discover_packages(root);
    info!(count = packages.len(), "discovered workspace packages");

    let mut all_nodes = Vec::new();
    let mut all_edges = Vec::new();
    let mut all_deferred: Vec<DeferredReference> = Vec::new();
    let mut all_symbols: Vec<LightweightSymbol> = Vec::new();
    let mut parse_errors = Vec::new();
    let mut package_roots: HashMap<String, PathBuf> = HashMap::new();
    let mut shared_context: HashMap<String, String> = HashMap::new();

    for package in &packages {
        package_roots.insert(package.name.clone(), package.root.clone());

        let collection_config = FileCollectionConfig {
            exclude_globs: exclude_globs.to_vec(),
        };
        let files = crate::file_collect::collect_source_files(&package.root, &collection_config)?;
        if files.is_empty() {
            continue;
        }

        let CoordinatorOutcome {
            nodes,
            edges,
            deferred,
            symbols,
            failed_chunks,
            context_delta,
        } = coordinator::run_chunked_parse(
            project_id,
            Some(&package.name),
            &files,
            coordinator_config,
        )?;

        for (index, message) in failed_chunks {
            warn!(package = package.name, chunk = index, error = message, "chunk failed");
            parse_errors.push((package.name.clone(), message));
        }

        all_nodes.extend(nodes);
        all_edges.extend(edges);
        all_deferred.extend(deferred);
        all_symbols.extend(symbols);
        merge_context_delta(&mut shared_context, context_delta);
    }

    let index = SymbolIndex::build(&all_symbols, &package_roots);
    let mut resolve_stats = ResolveStats::default();
    let resolved_edges = resolve::resolve_deferred(&all_deferred, &index, &mut resolve_stats);
    all_edges.extend(resolved_edges);

    let synthesized_edges = apply_edge_enhancements(&all_symbols, &shared_context);

    Ok(WorkspaceParseResult {
        nodes: all_nodes,
        edges: all_edges,
        resolve_stats,
        parse_errors,
        synthesized_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn single_package_when_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let packages = discover_packages(dir.path());
        assert_eq!(packages.len(), 1);
    }

    #[test]
    fn discovers_workspace_members() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name":"root","workspaces":["packages/*"]}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("packages/a")).unwrap();
        fs::write(
            dir.path().join("packages/a/package.json"),
            r#"{"name":"@scope/a"}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("packages/b")).unwrap();
        fs::write(
            dir.path().join("packages/b/package.json"),
            r#"{"name":"@scope/b"}"#,
        )
        .unwrap();

        let packages = discover_packages(dir.path());
        assert_eq!(packages.len(), 2);
        assert!(packages.iter().any(|p| p.name == "@scope/a"));
    }
}
