//! Pass B: reference resolution.
//!
//! Every `TypeRef::Unresolved` left after Pass A — field types, RPC
//! request/response types, extendees — is resolved using proto's lexical
//! scoping: innermost enclosing scope outward, then across the file's
//! visible imports. A file always sees its own direct imports;
//! transitive visibility is granted only through a chain of `public`
//! imports beyond that first hop.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{Type, TypeRef};
use crate::error::Error;
use crate::schema::Schema;

pub fn resolve_references(schema: &mut Schema, errors: &mut Vec<Error>) {
    let owner = build_owner_index(schema);
    let files_by_path: HashMap<String, usize> = schema
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| (f.location.path.clone(), i))
        .collect();

    let visibility: Vec<HashSet<usize>> = (0..schema.files.len())
        .map(|i| compute_visible_files(i, &files_by_path, schema))
        .collect();

    for file_idx in 0..schema.files.len() {
        let top_level = schema.files[file_idx].types.clone();
        for &type_idx in &top_level {
            resolve_type_fields(
                schema,
                type_idx,
                file_idx,
                &owner,
                &visibility,
                errors,
            );
        }

        let rpcs: Vec<(usize, usize)> = (0..schema.files[file_idx].services.len())
            .flat_map(|svc_idx| {
                (0..schema.files[file_idx].services[svc_idx].rpcs.len())
                    .map(move |rpc_idx| (svc_idx, rpc_idx))
            })
            .collect();
        for (svc_idx, rpc_idx) in rpcs {
            let package = schema.files[file_idx].package().to_string();
            let (request_name, response_name) = {
                let rpc = &schema.files[file_idx].services[svc_idx].rpcs[rpc_idx];
                (
                    rpc.request_type.name().map(str::to_string),
                    rpc.response_type.name().map(str::to_string),
                )
            };
            if let Some(name) = request_name {
                let from = schema.files[file_idx].services[svc_idx].location.clone();
                match resolve_name(schema, &name, &package, file_idx, &owner, &visibility) {
                    Some(idx) => {
                        schema.files[file_idx].services[svc_idx].rpcs[rpc_idx].request_type =
                            TypeRef::Resolved(idx)
                    }
                    None => errors.push(Error::UnresolvedReference { name, from }),
                }
            }
            if let Some(name) = response_name {
                let from = schema.files[file_idx].services[svc_idx].location.clone();
                match resolve_name(schema, &name, &package, file_idx, &owner, &visibility) {
                    Some(idx) => {
                        schema.files[file_idx].services[svc_idx].rpcs[rpc_idx].response_type =
                            TypeRef::Resolved(idx)
                    }
                    None => errors.push(Error::UnresolvedReference { name, from }),
                }
            }
        }

        let extend_count = schema.files[file_idx].extend_declarations.len();
        for extend_idx in 0..extend_count {
            let package = schema.files[file_idx].package().to_string();
            let extendee_name = schema.files[file_idx].extend_declarations[extend_idx]
                .extendee
                .name()
                .map(str::to_string);
            if let Some(name) = extendee_name {
                let from = schema.files[file_idx].extend_declarations[extend_idx]
                    .location
                    .clone();
                match resolve_name(schema, &name, &package, file_idx, &owner, &visibility) {
                    Some(idx) => {
                        schema.files[file_idx].extend_declarations[extend_idx].extendee =
                            TypeRef::Resolved(idx)
                    }
                    None => errors.push(Error::UnresolvedReference { name, from }),
                }
            }

            let field_count = schema.files[file_idx].extend_declarations[extend_idx]
                .fields
                .len();
            for field_idx in 0..field_count {
                let name = schema.files[file_idx].extend_declarations[extend_idx].fields[field_idx]
                    .declared_type
                    .name()
                    .map(str::to_string);
                let Some(name) = name else { continue };
                let from = schema.files[file_idx].extend_declarations[extend_idx].fields[field_idx]
                    .location
                    .clone();
                match resolve_name(schema, &name, &package, file_idx, &owner, &visibility) {
                    Some(idx) => {
                        schema.files[file_idx].extend_declarations[extend_idx].fields[field_idx]
                            .declared_type = TypeRef::Resolved(idx)
                    }
                    None => errors.push(Error::UnresolvedReference { name, from }),
                }
            }
        }
    }
}

/// Resolves every field's `declared_type` inside `type_idx` and recurses
/// into its nested types (whose enclosing scope is the type itself).
fn resolve_type_fields(
    schema: &mut Schema,
    type_idx: usize,
    file_idx: usize,
    owner: &HashMap<usize, usize>,
    visibility: &[HashSet<usize>],
    errors: &mut Vec<Error>,
) {
    let nested: Vec<usize> = match schema.type_at(type_idx).as_message() {
        Some(m) => m.nested_types.clone(),
        None => Vec::new(),
    };

    if schema.type_at(type_idx).as_message().is_some() {
        let scope = schema.type_at(type_idx).qualified_name().to_string();
        let field_count = schema
            .type_at(type_idx)
            .as_message()
            .unwrap()
            .all_fields()
            .count();
        for field_idx in 0..field_count {
            let name = {
                let m = schema.type_at(type_idx).as_message().unwrap();
                m.all_fields()
                    .nth(field_idx)
                    .and_then(|f| f.declared_type.name())
                    .map(str::to_string)
            };
            let Some(name) = name else { continue };
            let from = {
                let m = schema.type_at(type_idx).as_message().unwrap();
                m.all_fields().nth(field_idx).unwrap().location.clone()
            };
            match resolve_name(schema, &name, &scope, file_idx, owner, visibility) {
                Some(resolved) => {
                    if let Type::Message(m) = schema.type_at_mut(type_idx) {
                        if let Some(field) = m.all_fields_mut().nth(field_idx) {
                            field.declared_type = TypeRef::Resolved(resolved);
                        }
                    }
                }
                None => errors.push(Error::UnresolvedReference { name, from }),
            }
        }
    }

    for child in nested {
        resolve_type_fields(schema, child, file_idx, owner, visibility, errors);
    }
}

/// Resolves a textual type name referenced from `scope` (a fully
/// qualified package/message path) within `file_idx`.
fn resolve_name(
    schema: &Schema,
    name: &str,
    scope: &str,
    file_idx: usize,
    owner: &HashMap<usize, usize>,
    visibility: &[HashSet<usize>],
) -> Option<usize> {
    if let Some(absolute) = name.strip_prefix('.') {
        return schema
            .lookup(absolute)
            .filter(|idx| is_visible(*idx, file_idx, owner, visibility));
    }

    for prefix in scope_chain(scope) {
        let candidate = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        if let Some(idx) = schema.lookup(&candidate) {
            if is_visible(idx, file_idx, owner, visibility) {
                return Some(idx);
            }
        }
    }
    None
}

fn is_visible(
    idx: usize,
    file_idx: usize,
    owner: &HashMap<usize, usize>,
    visibility: &[HashSet<usize>],
) -> bool {
    match owner.get(&idx) {
        Some(&owning_file) => owning_file == file_idx || visibility[file_idx].contains(&owning_file),
        None => false,
    }
}

/// `p.Outer.Inner` yields `["p.Outer.Inner", "p.Outer", "p", ""]`.
fn scope_chain(scope: &str) -> Vec<String> {
    if scope.is_empty() {
        return vec![String::new()];
    }
    let parts: Vec<&str> = scope.split('.').collect();
    let mut chain = Vec::with_capacity(parts.len() + 1);
    for end in (1..=parts.len()).rev() {
        chain.push(parts[..end].join("."));
    }
    chain.push(String::new());
    chain
}

fn build_owner_index(schema: &Schema) -> HashMap<usize, usize> {
    let mut owner = HashMap::new();
    for (file_idx, file) in schema.files.iter().enumerate() {
        for &top in &file.types {
            mark_owner(schema, top, file_idx, &mut owner);
        }
    }
    owner
}

fn mark_owner(schema: &Schema, type_idx: usize, file_idx: usize, owner: &mut HashMap<usize, usize>) {
    owner.insert(type_idx, file_idx);
    if let Some(m) = schema.type_at(type_idx).as_message() {
        for &child in &m.nested_types {
            mark_owner(schema, child, file_idx, owner);
        }
    }
}

fn compute_visible_files(
    file_idx: usize,
    files_by_path: &HashMap<String, usize>,
    schema: &Schema,
) -> HashSet<usize> {
    let mut visible = HashSet::new();
    visible.insert(file_idx);

    let mut queue: VecDeque<usize> = schema.files[file_idx]
        .imports
        .iter()
        .filter_map(|p| files_by_path.get(p).copied())
        .collect();

    while let Some(idx) = queue.pop_front() {
        if visible.contains(&idx) {
            continue;
        }
        visible.insert(idx);
        for p in &schema.files[idx].public_imports {
            if let Some(&next) = files_by_path.get(p) {
                queue.push_back(next);
            }
        }
    }

    visible
}
