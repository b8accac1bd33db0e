//! The File Parser (spec.md §4.4): walks a single Tree-sitter tree,
//! dispatching through the Core Schema table instead of hand-written
//! per-node-kind match arms, mirroring the teacher's `pipeline.rs`
//! traversal shape generalized to be schema-driven.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tree_sitter::Node as TsNode;

use codegraph_core::{
    call_edge_id, core_edge_id, node_id, CodeGraphError, DeclarationKind, DeclarationNode,
    DeferredReference, EdgeOrigin, Id, LightweightSymbol, Location, ProjectId, Relationship,
    RelationshipKind, Result, SourceUnit, Visibility,
};

use crate::enhance::apply_node_enhancement;
use crate::languages::typescript::TypeScriptLanguage;
use crate::normalize::normalized_hash;
use crate::schema::{self, ChildRule, NodeSchema, ReferenceRule};

/// Everything one File Parser run produces for a source unit.
pub struct ParsedUnit {
    pub source_unit: SourceUnit,
    pub nodes: Vec<DeclarationNode>,
    pub edges: Vec<Relationship>,
    pub deferred: Vec<DeferredReference>,
    pub symbols: Vec<LightweightSymbol>,
    /// This file's contribution to the shared parsing context (spec.md
    /// §4.6/§4.7): keyed by `"package-frameworks:{package}"`, a sorted
    /// comma-joined list of the framework semantic kinds seen here, merged
    /// by the coordinator across every file/chunk/package.
    pub context_delta: HashMap<String, String>,
    pub parse_error: Option<String>,
}

/// Names already resolvable within this file, keyed by `(kind, name)`, used
/// for the "local parsed set" lookup named in spec.md §4.4 step 2.
struct LocalIndex(HashMap<(DeclarationKind, String), Id>);

impl LocalIndex {
    fn new() -> Self {
        LocalIndex(HashMap::new())
    }

    fn insert(&mut self, kind: DeclarationKind, name: &str, id: &Id) {
        self.0.insert((kind, name.to_string()), id.clone());
    }

    fn lookup(&self, kind: DeclarationKind, name: &str) -> Option<&Id> {
        self.0.get(&(kind, name.to_string()))
    }
}

pub fn parse_file(
    project_id: &ProjectId,
    package: Option<&str>,
    file_path: &str,
    source: &str,
    mtime_ms: u64,
) -> Result<ParsedUnit> {
    let source_unit = SourceUnit {
        path: file_path.to_string(),
        mtime_ms,
        size_bytes: source.len() as u64,
        content_hash: content_hash(source),
        package: package.map(|p| p.to_string()),
        language: "typescript".to_string(),
    };

    let mut parser = TypeScriptLanguage::new_parser(file_path)?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| CodeGraphError::Parse {
            file: file_path.to_string(),
            message: "tree-sitter returned no tree".to_string(),
        })?;

    if tree.root_node().has_error() {
        tracing::warn!(file = file_path, "parse tree contains error nodes; continuing with partial extraction");
    }

    let mut ctx = ExtractionCtx {
        project_id: project_id.clone(),
        file_path: file_path.to_string(),
        package: package.map(|p| p.to_string()),
        source,
        nodes: Vec::new(),
        edges: Vec::new(),
        deferred: Vec::new(),
        symbols: Vec::new(),
        local: LocalIndex::new(),
        field_types: HashMap::new(),
        class_stack: Vec::new(),
        context_delta: HashMap::new(),
    };

    let file_id = node_id(project_id, "File", file_path, file_path, None);
    let mut file_node = DeclarationNode::new(
        file_id.clone(),
        project_id.clone(),
        DeclarationKind::File,
        file_path,
        file_path,
        whole_file_location(&tree),
    );
    // Persistent tracking fields (spec.md §6.6): every source-file node
    // carries filePath/mtime/size/contentHash so the Change Detector can
    // read them back via `indexed_source_units` without a side table.
    file_node.context_insert("mtimeMs", source_unit.mtime_ms.to_string());
    file_node.context_insert("sizeBytes", source_unit.size_bytes.to_string());
    file_node.context_insert("contentHash", source_unit.content_hash.clone());
    if let Some(package) = &source_unit.package {
        file_node.context_insert("package", package.clone());
    }
    ctx.symbols.push(LightweightSymbol::from(&file_node));
    ctx.nodes.push(file_node);

    let root = tree.root_node();
    for rule in schema::file_children() {
        for child in find_descendants_by_kind(root, rule.ts_kind, 2) {
            ctx.extract(child, &file_id, rule.edge_kind);
        }
    }

    Ok(ParsedUnit {
        source_unit,
        nodes: ctx.nodes,
        edges: ctx.edges,
        deferred: ctx.deferred,
        symbols: ctx.symbols,
        context_delta: ctx.context_delta,
        parse_error: None,
    })
}

/// Build a `ParsedUnit` representing a failed parse: the file's
/// contribution is empty, but the error is recorded rather than fatal to
/// the surrounding chunk (spec.md §4.4 failure semantics).
pub fn failed_unit(file_path: &str, message: String) -> ParsedUnit {
    ParsedUnit {
        source_unit: SourceUnit {
            path: file_path.to_string(),
            mtime_ms: 0,
            size_bytes: 0,
            content_hash: String::new(),
            package: None,
            language: "typescript".to_string(),
        },
        nodes: Vec::new(),
        edges: Vec::new(),
        deferred: Vec::new(),
        symbols: Vec::new(),
        context_delta: HashMap::new(),
        parse_error: Some(message),
    }
}

struct ExtractionCtx<'a> {
    project_id: ProjectId,
    file_path: String,
    package: Option<String>,
    source: &'a str,
    nodes: Vec<DeclarationNode>,
    edges: Vec<Relationship>,
    deferred: Vec<DeferredReference>,
    symbols: Vec<LightweightSymbol>,
    local: LocalIndex,
    /// Declared type name for every field/parameter name seen so far,
    /// letting a later call-site resolve `this.foo.bar()`/`foo.bar()`
    /// receivers to a syntactic type (spec.md §4.4 "receiver's static type
    /// determined syntactically").
    field_types: HashMap<String, String>,
    /// Enclosing class names, innermost last, so a `this` receiver
    /// resolves to the class currently being walked.
    class_stack: Vec<String>,
    context_delta: HashMap<String, String>,
}

impl<'a> ExtractionCtx<'a> {
    fn extract(&mut self, ts_node: TsNode<'a>, parent_id: &Id, edge_kind: RelationshipKind) {
        let Some(schema) = schema::schema_for_ts_kind(ts_node.kind()) else {
            return;
        };
        let decl_kind = resolve_decl_kind(schema, ts_node, self.source);

        let name = extract_name(schema, ts_node, self.source);
        let location = node_location(ts_node);
        let id = node_id(
            &self.project_id,
            decl_kind.as_str(),
            &self.file_path,
            &name,
            Some(parent_id),
        );

        let body = node_text(ts_node, self.source);
        let mut node = DeclarationNode::new(
            id.clone(),
            self.project_id.clone(),
            decl_kind,
            name.clone(),
            self.file_path.clone(),
            location,
        );
        if !decl_kind.skip_embedding_by_default() {
            node = node.with_source_body(body);
        }
        node = node.with_visibility(extract_visibility(ts_node, self.source));
        node = node.with_exported(is_exported(ts_node));
        if let Some(body_text) = node.source_body.clone() {
            node = node.with_normalized_hash(normalized_hash(&body_text));
        }

        let decorators = decorator_names(ts_node, self.source);
        apply_node_enhancement(&mut node, &decorators);
        if let Some(semantic_kind) = &node.semantic_kind {
            self.record_framework_seen(semantic_kind);
        }

        for decorator in decorator_child_nodes(ts_node) {
            self.emit_decorator(decorator, &id);
        }

        if matches!(decl_kind, DeclarationKind::Property | DeclarationKind::Parameter) {
            if let Some(type_name) = declared_type_name(ts_node, self.source) {
                self.field_types.insert(name.clone(), type_name);
            }
        }

        self.local.insert(decl_kind, &name, &id);
        self.symbols.push(LightweightSymbol::from(&node));

        let edge_id = core_edge_id(edge_kind.as_str(), parent_id, &id);
        self.edges.push(
            Relationship::new(
                edge_id,
                parent_id.clone(),
                id.clone(),
                edge_kind,
                EdgeOrigin::Ast,
                self.file_path.clone(),
            )
            .with_line(location_line(&node.location)),
        );

        self.nodes.push(node);

        if decl_kind == DeclarationKind::Class {
            self.class_stack.push(name.clone());
        }

        for rule in schema.children {
            for child in candidate_children(ts_node, rule) {
                self.extract(child, &id, rule.edge_kind);
            }
        }

        for rule in schema.references {
            self.extract_reference(ts_node, &id, decl_kind, rule);
        }

        if decl_kind == DeclarationKind::Class {
            self.class_stack.pop();
        }
    }

    /// Records that `semantic_kind` was seen in this file's package, the
    /// unit of the shared parsing context a cross-package edge enhancement
    /// detector can consult once the coordinator merges every file's delta
    /// (spec.md §4.6 step 2 / §4.7).
    fn record_framework_seen(&mut self, semantic_kind: &str) {
        let Some(package) = &self.package else { return };
        let key = format!("package-frameworks:{package}");
        let existing = self.context_delta.get(&key).cloned().unwrap_or_default();
        let mut seen: Vec<&str> = existing.split(',').filter(|s| !s.is_empty()).collect();
        if !seen.contains(&semantic_kind) {
            seen.push(semantic_kind);
            seen.sort_unstable();
            self.context_delta.insert(key, seen.join(","));
        }
    }

    fn emit_decorator(&mut self, decorator: TsNode<'a>, owner_id: &Id) {
        let name = decorator_name(decorator, self.source).unwrap_or_else(|| "unknown".to_string());
        let location = node_location(decorator);
        let id = node_id(
            &self.project_id,
            DeclarationKind::Decorator.as_str(),
            &self.file_path,
            &name,
            Some(owner_id),
        );
        let node = DeclarationNode::new(
            id.clone(),
            self.project_id.clone(),
            DeclarationKind::Decorator,
            name,
            self.file_path.clone(),
            location,
        );
        let edge_id = core_edge_id(RelationshipKind::DecoratedWith.as_str(), owner_id, &id);
        self.edges.push(Relationship::new(
            edge_id,
            owner_id.clone(),
            id.clone(),
            RelationshipKind::DecoratedWith,
            EdgeOrigin::Decorator,
            self.file_path.clone(),
        ));
        self.symbols.push(LightweightSymbol::from(&node));
        self.nodes.push(node);
    }

    fn extract_reference(
        &mut self,
        ts_node: TsNode<'a>,
        source_id: &Id,
        _source_kind: DeclarationKind,
        rule: &ReferenceRule,
    ) {
        if rule.edge_kind == RelationshipKind::Calls {
            self.extract_calls(ts_node, source_id, rule);
            return;
        }

        let line = location_line(&node_location(ts_node));
        let names = reference_target_names(ts_node, rule, self.source);
        for target_name in names {
            if let Some(target_id) = self.local.lookup(rule.target_kind, &target_name) {
                let edge_id = core_edge_id(rule.edge_kind.as_str(), source_id, target_id);
                self.edges.push(
                    Relationship::new(
                        edge_id,
                        source_id.clone(),
                        target_id.clone(),
                        rule.edge_kind,
                        EdgeOrigin::Ast,
                        self.file_path.clone(),
                    )
                    .with_confidence(1.0)
                    .with_line(line),
                );
            } else {
                let deferred = DeferredReference::new(
                    source_id.clone(),
                    rule.edge_kind,
                    target_name,
                    rule.target_kind,
                    self.file_path.clone(),
                )
                .with_line(line);
                self.deferred.push(deferred);
            }
        }
    }

    /// Extracts `Calls` edges from a function/method body. Each call site's
    /// target kind is `Method` when it has a receiver expression
    /// (`this.foo()`, `obj.bar()`) and `Function` for a bare `foo()` call
    /// (spec.md §4.4: the dominant real-world call shape is a method call,
    /// which never resolves against a `Function`-kind symbol).
    ///
    /// Confidence follows spec.md §4.5: a call whose receiver's static type
    /// is known syntactically (`this` -> enclosing class, or a field/
    /// parameter with a recorded declared type) binds at 0.9; a receiver
    /// call whose type can't be determined at all is dropped rather than
    /// guessed; everything else defers to `resolve::resolve_deferred`,
    /// which picks 0.9 or 0.7 depending on whether a type was recorded.
    fn extract_calls(&mut self, ts_node: TsNode<'a>, source_id: &Id, rule: &ReferenceRule) {
        let line = location_line(&node_location(ts_node));
        let scope = find_descendants_by_kind(ts_node, rule.accessor, 2)
            .into_iter()
            .next()
            .unwrap_or(ts_node);

        for site in call_sites(scope, self.source) {
            let has_receiver = site.receiver.is_some();
            let target_kind = if has_receiver {
                rule.target_kind
            } else {
                DeclarationKind::Function
            };
            let call_site_context = match &site.receiver {
                None => None,
                Some(Receiver::ThisRef) => self.class_stack.last().cloned(),
                Some(Receiver::Named(name)) => self.field_types.get(name).cloned(),
            };

            if let Some(target_id) = self.local.lookup(target_kind, &site.target_name) {
                let edge_id = call_edge_id(source_id, target_id, line);
                self.edges.push(
                    Relationship::new(
                        edge_id,
                        source_id.clone(),
                        target_id.clone(),
                        rule.edge_kind,
                        EdgeOrigin::Ast,
                        self.file_path.clone(),
                    )
                    .with_confidence(0.9)
                    .with_line(line),
                );
                continue;
            }

            if has_receiver && call_site_context.is_none() {
                // Receiver present but its type can't be determined
                // syntactically: drop rather than guess (spec.md §4.5).
                continue;
            }

            let mut deferred = DeferredReference::new(
                source_id.clone(),
                rule.edge_kind,
                site.target_name,
                target_kind,
                self.file_path.clone(),
            )
            .with_line(line);
            if let Some(ctx) = call_site_context {
                deferred = deferred.with_call_site_context(ctx);
            }
            self.deferred.push(deferred);
        }
    }
}

/// Whether a call expression's `function` field names a receiver.
enum Receiver {
    ThisRef,
    Named(String),
}

struct CallSite {
    target_name: String,
    receiver: Option<Receiver>,
}

/// Collects every `call_expression` under `scope`, splitting a
/// member-expression callee (`obj.method()`) into its receiver and the
/// bare method name rather than returning the whole `"obj.method"` text,
/// which never matches anything in `LocalIndex`/`SymbolIndex`.
fn call_sites(scope: TsNode, source: &str) -> Vec<CallSite> {
    find_descendants_by_kind(scope, "call_expression", 6)
        .into_iter()
        .filter_map(|call| {
            let function = call.child_by_field_name("function")?;
            if function.kind() == "member_expression" {
                let property = function.child_by_field_name("property")?;
                let object = function.child_by_field_name("object")?;
                let receiver = if node_text(object, source) == "this" {
                    Receiver::ThisRef
                } else {
                    Receiver::Named(node_text(object, source))
                };
                Some(CallSite {
                    target_name: node_text(property, source),
                    receiver: Some(receiver),
                })
            } else {
                Some(CallSite {
                    target_name: node_text(function, source),
                    receiver: None,
                })
            }
        })
        .collect()
}

/// Reads a property/parameter's declared type annotation, stripped to its
/// leading identifier (`Foo<Bar>` -> `Foo`, `Foo[]` -> `Foo`) so it can be
/// compared against a `DeclarationKind::Class`/`Interface` name.
fn declared_type_name(ts_node: TsNode, source: &str) -> Option<String> {
    let type_node = ts_node.child_by_field_name("type")?;
    let text = node_text(type_node, source);
    let trimmed = text.trim_start_matches(':').trim();
    let ident: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

fn resolve_decl_kind(schema: &NodeSchema, ts_node: TsNode, source: &str) -> DeclarationKind {
    if schema.ts_kind == "method_definition" && extract_name(schema, ts_node, source) == "constructor" {
        return DeclarationKind::Constructor;
    }
    schema.decl_kind
}

fn extract_name(schema: &NodeSchema, ts_node: TsNode, source: &str) -> String {
    if let Some(field) = schema.name_field {
        if let Some(name_node) = ts_node.child_by_field_name(field) {
            return node_text(name_node, source);
        }
    }
    match schema.ts_kind {
        "lexical_declaration" => find_descendants_by_kind(ts_node, "variable_declarator", 1)
            .into_iter()
            .next()
            .and_then(|decl| decl.child_by_field_name("name"))
            .map(|n| node_text(n, source))
            .unwrap_or_else(|| "anonymous".to_string()),
        "import_statement" => ts_node
            .child_by_field_name("source")
            .map(|n| node_text(n, source).trim_matches(|c| c == '"' || c == '\'').to_string())
            .unwrap_or_else(|| "anonymous-import".to_string()),
        "export_statement" => first_identifier_text(ts_node, source)
            .unwrap_or_else(|| "default".to_string()),
        "decorator" => decorator_name(ts_node, source).unwrap_or_else(|| "unknown".to_string()),
        _ => first_identifier_text(ts_node, source).unwrap_or_else(|| "anonymous".to_string()),
    }
}

fn extract_visibility(ts_node: TsNode, source: &str) -> Visibility {
    for i in 0..ts_node.named_child_count() {
        if let Some(child) = ts_node.named_child(i) {
            match node_text(child, source).as_str() {
                "private" => return Visibility::Private,
                "protected" => return Visibility::Protected,
                "public" => return Visibility::Public,
                _ => {}
            }
        }
    }
    Visibility::None
}

fn is_exported(ts_node: TsNode) -> bool {
    let mut current = ts_node.parent();
    while let Some(parent) = current {
        if parent.kind() == "export_statement" {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn decorator_child_nodes<'t>(ts_node: TsNode<'t>) -> Vec<TsNode<'t>> {
    let mut out = Vec::new();
    let mut sibling = ts_node.prev_sibling();
    while let Some(node) = sibling {
        if node.kind() == "decorator" {
            out.push(node);
            sibling = node.prev_sibling();
        } else {
            break;
        }
    }
    out
}

fn decorator_names(ts_node: TsNode, source: &str) -> Vec<String> {
    decorator_child_nodes(ts_node)
        .into_iter()
        .filter_map(|d| decorator_name(d, source))
        .collect()
}

fn decorator_name(decorator: TsNode, source: &str) -> Option<String> {
    first_identifier_text(decorator, source)
}

fn candidate_children<'t>(ts_node: TsNode<'t>, rule: &ChildRule) -> Vec<TsNode<'t>> {
    if let Some(field) = rule.field {
        if let Some(container) = ts_node.child_by_field_name(field) {
            return find_descendants_by_kind(container, rule.ts_kind, 1)
                .into_iter()
                .chain(std::iter::once(container).filter(|n| n.kind() == rule.ts_kind))
                .collect();
        }
        return Vec::new();
    }
    find_descendants_by_kind(ts_node, rule.ts_kind, 3)
}

/// Target names for every non-`Calls` reference rule (`extends`,
/// `implements`, `imports`, `typed-as`, ...). `Calls` references go through
/// `call_sites` instead, since a call's target name needs receiver
/// splitting that a flat identifier scan can't do.
fn reference_target_names(ts_node: TsNode, rule: &ReferenceRule, source: &str) -> Vec<String> {
    let scope = find_descendants_by_kind(ts_node, rule.accessor, 2)
        .into_iter()
        .next()
        .unwrap_or(ts_node);
    let names: Vec<String> = find_descendants_by_kind(scope, "type_identifier", 4)
        .into_iter()
        .chain(find_descendants_by_kind(scope, "identifier", 4))
        .map(|n| node_text(n, source))
        .collect();
    match rule.cardinality {
        schema::Cardinality::One => names.into_iter().take(1).collect(),
        schema::Cardinality::Many => names,
    }
}

fn find_descendants_by_kind<'t>(node: TsNode<'t>, kind: &str, max_depth: usize) -> Vec<TsNode<'t>> {
    let mut out = Vec::new();
    collect_descendants(node, kind, max_depth, &mut out);
    out
}

fn collect_descendants<'t>(node: TsNode<'t>, kind: &str, depth: usize, out: &mut Vec<TsNode<'t>>) {
    if depth == 0 {
        return;
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            if child.kind() == kind {
                out.push(child);
            }
            collect_descendants(child, kind, depth - 1, out);
        }
    }
}

fn first_identifier_text(node: TsNode, source: &str) -> Option<String> {
    if node.kind() == "identifier" || node.kind() == "type_identifier" {
        return Some(node_text(node, source));
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            if let Some(found) = first_identifier_text(child, source) {
                return Some(found);
            }
        }
    }
    None
}

fn node_text(node: TsNode, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or_default()
        .to_string()
}

fn node_location(node: TsNode) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location {
        start_line: start.row as u32 + 1,
        start_column: start.column as u32,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32,
    }
}

fn location_line(location: &Location) -> u32 {
    location.start_line
}

fn whole_file_location(tree: &tree_sitter::Tree) -> Location {
    node_location(tree.root_node())
}

fn content_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cheap clone of the source text for workers that need to hand a file's
/// contents across a channel boundary without re-reading disk.
pub fn shared_source(source: String) -> Arc<str> {
    Arc::from(source.into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::from_path("/project")
    }

    #[test]
    fn extracts_class_and_method() {
        let source = r#"
export class Widget {
  render() {
    return 1;
  }
}
"#;
        let unit = parse_file(&project(), None, "widget.ts", source, 0).unwrap();
        assert!(unit.parse_error.is_none());
        let class_node = unit
            .nodes
            .iter()
            .find(|n| n.kind == DeclarationKind::Class)
            .expect("class node");
        assert_eq!(class_node.name, "Widget");
        assert!(class_node.is_exported);

        let method_node = unit
            .nodes
            .iter()
            .find(|n| n.kind == DeclarationKind::Method)
            .expect("method node");
        assert_eq!(method_node.name, "render");
    }

    #[test]
    fn decorator_sets_semantic_kind() {
        let source = r#"
@Controller()
export class WidgetController {
  list() {}
}
"#;
        let unit = parse_file(&project(), None, "widget.controller.ts", source, 0).unwrap();
        let class_node = unit
            .nodes
            .iter()
            .find(|n| n.kind == DeclarationKind::Class)
            .expect("class node");
        assert_eq!(class_node.semantic_kind.as_deref(), Some("nest-controller"));
    }

    #[test]
    fn file_node_is_first_and_skips_embedding() {
        let unit = parse_file(&project(), None, "a.ts", "export const a = 1;", 0).unwrap();
        assert_eq!(unit.nodes[0].kind, DeclarationKind::File);
        assert!(unit.nodes[0].skip_embedding());
    }

    #[test]
    fn interface_extends_resolves_locally() {
        let source = r#"
interface Base { id: string; }
interface Derived extends Base { name: string; }
"#;
        let unit = parse_file(&project(), None, "types.ts", source, 0).unwrap();
        let extends_edges: Vec<_> = unit
            .edges
            .iter()
            .filter(|e| e.core_kind == RelationshipKind::Extends)
            .collect();
        assert!(!extends_edges.is_empty());
        assert!(unit.deferred.iter().all(|d| d.edge_kind != RelationshipKind::Extends));
    }
}
