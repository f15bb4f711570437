//! Computes transitive reachability and rewrites the schema to the
//! retained subset, the way `prost-build`'s `MessageGraph`
//! builds a `petgraph::Graph` over message references to detect cycles —
//! here the graph drives reachability instead.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::ast::{Type, TypeRef};
use crate::error::{Error, Result};
use crate::identifier_set::{Decision, IdentifierSet};
use crate::schema::Schema;

pub struct Pruner;

impl Pruner {
    /// Produces a new [`Schema`] containing only entities reachable from
    /// `roots` and not excluded by `rubbish`. Returns the input unchanged
    /// (the fast path) when `roots == {"*"}` and `rubbish` is empty.
    pub fn prune(schema: &Schema, roots: &[String], rubbish: &[String]) -> Result<(Schema, PruneReport)> {
        if roots == ["*".to_string()] && rubbish.is_empty() {
            return Ok((schema.clone(), PruneReport::default()));
        }

        let root_set = IdentifierSet::build(roots, &[])?;
        let rubbish_set = IdentifierSet::build(rubbish, &[])?;

        let mut seed: HashSet<usize> = (0..schema.types.len())
            .filter(|&idx| {
                let name = schema.type_at(idx).qualified_name();
                root_set.decide(name) == Decision::Included
                    && rubbish_set.decide(name) != Decision::Included
            })
            .collect();
        // A service always survives pruning with its file, so its RPCs'
        // request/response types must stay reachable too.
        seed.extend(service_referenced_types(schema));

        let graph = build_reference_graph(schema);
        let reachable = reachable_from(&graph, &seed);

        let mut new_schema = Schema::new();
        let mut old_to_new: HashMap<usize, usize> = HashMap::new();

        for &old_idx in &reachable_in_order(schema, &reachable) {
            let ty = retain_members(schema, old_idx, &rubbish_set, &reachable)?;
            let name = ty.qualified_name().to_string();
            let new_idx = new_schema.insert_type(name, ty);
            old_to_new.insert(old_idx, new_idx);
        }

        remap_all(&mut new_schema, &old_to_new);
        copy_files(schema, &mut new_schema, &reachable, &old_to_new);

        let report = PruneReport {
            unused_roots: root_set.unused_includes().into_iter().map(String::from).collect(),
            unused_rubbish: rubbish_set.unused_includes().into_iter().map(String::from).collect(),
        };

        Ok((new_schema, report))
    }
}

#[derive(Default, Debug)]
pub struct PruneReport {
    pub unused_roots: Vec<String>,
    pub unused_rubbish: Vec<String>,
}

fn build_reference_graph(schema: &Schema) -> (DiGraph<usize, ()>, HashMap<usize, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    for idx in 0..schema.types.len() {
        nodes.insert(idx, graph.add_node(idx));
    }
    for idx in 0..schema.types.len() {
        for dep in type_dependencies(schema, idx) {
            graph.add_edge(nodes[&idx], nodes[&dep], ());
        }
    }
    (graph, nodes)
}

/// Outgoing type references of `idx`: a message's field types, resolved
/// to an arena index. An enum has none.
fn type_dependencies(schema: &Schema, idx: usize) -> Vec<usize> {
    let mut deps = Vec::new();
    if let Some(m) = schema.type_at(idx).as_message() {
        for field in m.all_fields() {
            if let TypeRef::Resolved(target) = field.declared_type {
                deps.push(target);
            }
        }
    }
    deps
}

/// Types referenced from constructs this crate always keeps with their
/// owning file (services, extend blocks) rather than subjecting to
/// root/rubbish matching directly. These must stay reachable so pruning
/// never leaves a dangling `TypeRef::Resolved`.
fn service_referenced_types(schema: &Schema) -> HashSet<usize> {
    let mut referenced = HashSet::new();
    for file in &schema.files {
        for service in &file.services {
            for rpc in &service.rpcs {
                if let TypeRef::Resolved(idx) = rpc.request_type {
                    referenced.insert(idx);
                }
                if let TypeRef::Resolved(idx) = rpc.response_type {
                    referenced.insert(idx);
                }
            }
        }
        for extend in &file.extend_declarations {
            if let TypeRef::Resolved(idx) = extend.extendee {
                referenced.insert(idx);
            }
            for field in &extend.fields {
                if let TypeRef::Resolved(idx) = field.declared_type {
                    referenced.insert(idx);
                }
            }
        }
    }
    referenced
}

fn reachable_from(
    (graph, nodes): &(DiGraph<usize, ()>, HashMap<usize, NodeIndex>),
    seed: &HashSet<usize>,
) -> HashSet<usize> {
    let mut reached = HashSet::new();
    for &root in seed {
        let Some(&start) = nodes.get(&root) else {
            continue;
        };
        let mut dfs = Dfs::new(graph, start);
        while let Some(node) = dfs.next(graph) {
            reached.insert(graph[node]);
        }
    }
    reached
}

/// Reachable type indices, in their original arena order (which is, for
/// types, the stable declaration order established by the Linker).
fn reachable_in_order(schema: &Schema, reachable: &HashSet<usize>) -> Vec<usize> {
    (0..schema.types.len()).filter(|i| reachable.contains(i)).collect()
}

fn retain_members(
    schema: &Schema,
    idx: usize,
    rubbish: &IdentifierSet,
    reachable: &HashSet<usize>,
) -> Result<Type> {
    match schema.type_at(idx) {
        Type::Message(m) => {
            let mut retained = m.clone();
            retained.fields.retain(|f| field_survives(schema, &m.qualified_name, f, rubbish, reachable));
            for one_of in &mut retained.one_ofs {
                one_of
                    .fields
                    .retain(|f| field_survives(schema, &m.qualified_name, f, rubbish, reachable));
            }
            retained.nested_types.retain(|n| reachable.contains(n));
            Ok(Type::Message(retained))
        }
        Type::Enum(e) => {
            let mut retained = e.clone();
            retained.constants.retain(|c| {
                let member_name = format!("{}#{}", e.qualified_name, c.name);
                rubbish.decide(&member_name) != Decision::Included
            });
            if retained.constants.is_empty() || !retained.has_zero_constant() && e.has_zero_constant() {
                return Err(Error::EmptyEnum(e.qualified_name.clone()));
            }
            Ok(Type::Enum(retained))
        }
    }
}

fn field_survives(
    schema: &Schema,
    owner_name: &str,
    field: &crate::ast::Field,
    rubbish: &IdentifierSet,
    reachable: &HashSet<usize>,
) -> bool {
    let member_name = format!("{owner_name}#{}", field.name);
    if rubbish.decide(&member_name) == Decision::Included {
        return false;
    }
    match &field.declared_type {
        TypeRef::Resolved(target) => reachable.contains(target),
        TypeRef::Scalar(_) => true,
        TypeRef::Unresolved(_) => false,
    }
}

fn remap_all(schema: &mut Schema, old_to_new: &HashMap<usize, usize>) {
    for ty in &mut schema.types {
        match ty {
            Type::Message(m) => {
                m.nested_types = m
                    .nested_types
                    .iter()
                    .filter_map(|old| old_to_new.get(old).copied())
                    .collect();
                for field in m.all_fields_mut() {
                    if let TypeRef::Resolved(old) = &field.declared_type {
                        if let Some(&new) = old_to_new.get(old) {
                            field.declared_type = TypeRef::Resolved(new);
                        }
                    }
                }
            }
            Type::Enum(_) => {}
        }
    }
}

fn copy_files(
    old_schema: &Schema,
    new_schema: &mut Schema,
    reachable: &HashSet<usize>,
    old_to_new: &HashMap<usize, usize>,
) {
    for file in &old_schema.files {
        let surviving_types: Vec<usize> = file
            .types
            .iter()
            .filter(|t| reachable.contains(t))
            .filter_map(|t| old_to_new.get(t).copied())
            .collect();
        if surviving_types.is_empty() {
            continue;
        }
        let mut new_file = file.clone();
        new_file.types = surviving_types;
        for service in &mut new_file.services {
            for rpc in &mut service.rpcs {
                remap_type_ref(&mut rpc.request_type, old_to_new);
                remap_type_ref(&mut rpc.response_type, old_to_new);
            }
        }
        for extend in &mut new_file.extend_declarations {
            remap_type_ref(&mut extend.extendee, old_to_new);
            for field in &mut extend.fields {
                remap_type_ref(&mut field.declared_type, old_to_new);
            }
        }
        new_schema.files.push(new_file);
        if old_schema.is_source_path(&file.location) {
            new_schema.mark_source_path(file.location.path.clone());
        }
    }
}

fn remap_type_ref(type_ref: &mut TypeRef, old_to_new: &HashMap<usize, usize>) {
    if let TypeRef::Resolved(old) = type_ref {
        if let Some(&new) = old_to_new.get(old) {
            *type_ref = TypeRef::Resolved(new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::Linker;
    use crate::location::Location;
    use crate::parser;
    use std::collections::HashSet as Set;

    fn link(source: &str) -> Schema {
        let parsed = parser::parse(source, "proto", "a.proto").unwrap();
        let mut source_paths = Set::new();
        source_paths.insert("a.proto".to_string());
        Linker::link(vec![(Location::new("proto", "a.proto"), parsed)], &source_paths).unwrap()
    }

    fn link_files(files: &[(&str, &str)]) -> Schema {
        let mut parsed = Vec::new();
        let mut source_paths = Set::new();
        for (path, text) in files {
            parsed.push((
                Location::new("proto", *path),
                parser::parse(text, "proto", path).unwrap(),
            ));
            source_paths.insert(path.to_string());
        }
        Linker::link(parsed, &source_paths).unwrap()
    }

    #[test]
    fn fast_path_returns_input_unchanged() {
        let schema = link("message A {} message B {}");
        let (pruned, _) = Pruner::prune(&schema, &["*".to_string()], &[]).unwrap();
        assert_eq!(pruned.types.len(), schema.types.len());
    }

    #[test]
    fn rubbish_drops_matching_package() {
        let schema = link_files(&[
            ("p.proto", "package p;\nmessage Keep {}"),
            ("vitess.proto", "package vitess;\nmessage X {}"),
        ]);
        let (pruned, report) = Pruner::prune(&schema, &["*".to_string()], &["vitess.*".to_string()]).unwrap();
        assert!(pruned.lookup("p.Keep").is_some());
        assert!(pruned.lookup("vitess.X").is_none());
        assert!(report.unused_rubbish.is_empty());
    }

    #[test]
    fn retains_transitively_referenced_message() {
        let schema = link("package p;\nmessage Root { Dep d = 1; }\nmessage Dep {}\nmessage Unused {}");
        let (pruned, _) = Pruner::prune(&schema, &["p.Root".to_string()], &[]).unwrap();
        assert!(pruned.lookup("p.Root").is_some());
        assert!(pruned.lookup("p.Dep").is_some());
        assert!(pruned.lookup("p.Unused").is_none());
    }

    #[test]
    fn pruning_away_proto3_zero_constant_fails() {
        let schema = link("syntax = \"proto3\";\nenum E { A = 0; B = 1; }");
        let err = Pruner::prune(&schema, &["*".to_string()], &["E#A".to_string()]).unwrap_err();
        assert!(matches!(err, Error::EmptyEnum(_)));
    }

    #[test]
    fn service_rpc_types_survive_pruning_roots_that_exclude_them() {
        let schema = link(concat!(
            "package p;\n",
            "message Req {}\n",
            "message Resp {}\n",
            "message Unrelated {}\n",
            "service Svc { rpc Call(Req) returns (Resp); }\n",
        ));
        let (pruned, _) = Pruner::prune(&schema, &["p.Svc".to_string()], &[]).unwrap();

        let req = pruned.lookup("p.Req").expect("rpc request type must survive");
        let resp = pruned.lookup("p.Resp").expect("rpc response type must survive");
        assert!(pruned.lookup("p.Unrelated").is_none());

        let file = pruned
            .files
            .iter()
            .find(|f| !f.services.is_empty())
            .expect("service-owning file must survive");
        let rpc = &file.services[0].rpcs[0];
        assert_eq!(rpc.request_type, TypeRef::Resolved(req));
        assert_eq!(rpc.response_type, TypeRef::Resolved(resp));
    }
}
