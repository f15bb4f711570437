//! Binds every reference, validates structure.
//!
//! Two passes over the files the [`crate::loader::SchemaLoader`] produced:
//! Pass A (`index`) assigns fully qualified names and merges every parsed
//! file's local type arena into the shared [`Schema`] arena; Pass B
//! (`resolve`, in [`resolve`]) binds every `TypeRef::Unresolved` to its
//! declaration, respecting lexical scoping and import visibility. All
//! validation in [`validate`] runs after Pass B, against fully resolved
//! references. Every error from either pass is accumulated rather than
//! raised immediately, so a single bad file doesn't hide every other error
//! in the same run.

mod resolve;
mod validate;

use std::collections::HashMap;

use crate::ast::{Comments, Field, Label, MessageType, ProtoFile, Type, TypeRef};
use crate::error::{Error, Result};
use crate::location::Location;
use crate::parser::ParsedFile;
use crate::schema::Schema;

pub struct Linker;

impl Linker {
    /// Links the given loaded files into a validated [`Schema`]. `source_paths`
    /// marks which `Location.path`s came from a source-path root, carried
    /// through unchanged for the dispatcher.
    pub fn link(
        files: Vec<(Location, ParsedFile)>,
        source_paths: &std::collections::HashSet<String>,
    ) -> Result<Schema> {
        let mut errors = Vec::new();
        let mut schema = Schema::new();

        let proto_files = index_files(&mut schema, files, &mut errors);
        schema.files = proto_files;
        for path in source_paths {
            schema.mark_source_path(path.clone());
        }

        desugar_map_fields(&mut schema);

        resolve::resolve_references(&mut schema, &mut errors);
        validate::validate(&mut schema, &mut errors);

        if errors.is_empty() {
            Ok(schema)
        } else {
            Err(Error::link_failure(errors))
        }
    }
}

/// Pass A: walk every parsed file's local type arena, assign fully
/// qualified names, and merge into `schema`'s global arena.
fn index_files(
    schema: &mut Schema,
    files: Vec<(Location, ParsedFile)>,
    errors: &mut Vec<Error>,
) -> Vec<ProtoFile> {
    let mut proto_files = Vec::new();

    for (location, parsed) in files {
        let package = parsed.package_name.clone().unwrap_or_default();
        let mut local_to_global: HashMap<usize, usize> = HashMap::new();

        for &local_idx in &parsed.top_level_types {
            index_type(
                schema,
                &parsed.types,
                local_idx,
                &package,
                &mut local_to_global,
                errors,
            );
        }

        // Fix up every inserted type's `nested_types` (still local indices)
        // and resolve any proto2-`group` markers left by the parser (a
        // `TypeRef::Unresolved("#group:<local idx>")` pointing at this same
        // file's local arena rather than a textual name).
        let touched_globals: Vec<usize> = local_to_global.values().copied().collect();
        for global_idx in touched_globals {
            if let Type::Message(m) = schema.type_at_mut(global_idx) {
                m.nested_types = m
                    .nested_types
                    .iter()
                    .filter_map(|local| local_to_global.get(local).copied())
                    .collect();
                for field in m.all_fields_mut() {
                    fixup_group_marker(field, &local_to_global);
                }
            }
        }

        // Extension fields declared with the legacy `group` syntax carry the
        // same marker, but `extend` blocks live outside the type arena.
        for extend in &mut parsed.extend_declarations {
            for field in &mut extend.fields {
                fixup_group_marker(field, &local_to_global);
            }
        }

        let top_level_global: Vec<usize> = parsed
            .top_level_types
            .iter()
            .filter_map(|local| local_to_global.get(local).copied())
            .collect();

        proto_files.push(ProtoFile {
            location,
            package_name: parsed.package_name,
            syntax: parsed.syntax,
            imports: parsed.imports,
            public_imports: parsed.public_imports,
            weak_imports: parsed.weak_imports,
            types: top_level_global,
            services: parsed.services,
            extend_declarations: parsed.extend_declarations,
            file_options: parsed.file_options,
        });
    }

    proto_files
}

/// Rewrites a field's `TypeRef::Unresolved("#group:<local idx>")` marker
/// into a `Resolved` arena index, once the group's synthetic message has
/// been indexed into the shared schema.
fn fixup_group_marker(field: &mut Field, local_to_global: &HashMap<usize, usize>) {
    if let TypeRef::Unresolved(name) = &field.declared_type {
        if let Some(rest) = name.strip_prefix("#group:") {
            if let Ok(local) = rest.parse::<usize>() {
                if let Some(&global) = local_to_global.get(&local) {
                    field.declared_type = TypeRef::Resolved(global);
                }
            }
        }
    }
}

fn index_type(
    schema: &mut Schema,
    types: &[Type],
    local_idx: usize,
    scope: &str,
    local_to_global: &mut HashMap<usize, usize>,
    errors: &mut Vec<Error>,
) {
    let ty = types[local_idx].clone();
    let simple_name = ty.qualified_name().to_string();
    let qualified = if scope.is_empty() {
        simple_name
    } else {
        format!("{scope}.{simple_name}")
    };

    if let Some(existing) = schema.lookup(&qualified) {
        errors.push(Error::DuplicateType {
            name: qualified.clone(),
            first: schema.type_at(existing).location().clone(),
            second: ty.location().clone(),
        });
        // Still walk children so further duplicates beneath this
        // declaration are also reported, just not installed in the arena.
        if let Type::Message(m) = &ty {
            for &child in &m.nested_types {
                index_type(schema, types, child, &qualified, local_to_global, errors);
            }
        }
        return;
    }

    let mut renamed = ty.clone();
    match &mut renamed {
        Type::Message(m) => m.qualified_name = qualified.clone(),
        Type::Enum(e) => e.qualified_name = qualified.clone(),
    }
    let global_idx = schema.insert_type(qualified.clone(), renamed);
    local_to_global.insert(local_idx, global_idx);

    if let Type::Message(m) = &ty {
        for &child in &m.nested_types {
            index_type(schema, types, child, &qualified, local_to_global, errors);
        }
    }
}

/// Desugars every `map<K, V>` field into a synthetic nested message with
/// tag layout `1, 2`, run once all real declarations are
/// indexed so the synthetic message's qualified name can never collide
/// with a user type indexed later in the same pass.
fn desugar_map_fields(schema: &mut Schema) {
    let message_indices: Vec<usize> = (0..schema.types.len())
        .filter(|&i| schema.type_at(i).as_message().is_some())
        .collect();

    for msg_idx in message_indices {
        let qualified_name = schema.type_at(msg_idx).qualified_name().to_string();
        let field_count = schema.type_at(msg_idx).as_message().unwrap().fields.len();

        for field_idx in 0..field_count {
            let pending = {
                let m = schema.type_at(msg_idx).as_message().unwrap();
                let f = &m.fields[field_idx];
                match (&f.map_key_type, &f.declared_type) {
                    (Some(key_type), TypeRef::Unresolved(value_name)) => {
                        Some((key_type.clone(), value_name.clone(), f.name.clone(), f.location.clone()))
                    }
                    (Some(key_type), TypeRef::Scalar(_)) => {
                        // A map whose value type is itself a scalar, e.g. `map<string, int32>`.
                        Some((
                            key_type.clone(),
                            String::new(),
                            f.name.clone(),
                            f.location.clone(),
                        ))
                    }
                    _ => None,
                }
            };
            let Some((key_type_name, value_type_name, field_name, loc)) = pending else {
                continue;
            };
            let value_type_ref = if value_type_name.is_empty() {
                schema
                    .type_at(msg_idx)
                    .as_message()
                    .unwrap()
                    .fields[field_idx]
                    .declared_type
                    .clone()
            } else {
                TypeRef::from_name(value_type_name)
            };

            let entry_simple = map_entry_name(&field_name);
            let entry_qualified = format!("{qualified_name}.{entry_simple}");
            if schema.lookup(&entry_qualified).is_some() {
                continue;
            }

            let key_field = Field {
                name: "key".to_string(),
                tag: 1,
                label: Label::Optional,
                declared_type: TypeRef::from_name(key_type_name),
                default: None,
                options: Vec::new(),
                is_extension: false,
                is_packed: None,
                map_key_type: None,
                location: loc.clone(),
            };
            let value_field = Field {
                name: "value".to_string(),
                tag: 2,
                label: Label::Optional,
                declared_type: value_type_ref,
                default: None,
                options: Vec::new(),
                is_extension: false,
                is_packed: None,
                map_key_type: None,
                location: loc.clone(),
            };
            let entry_message = MessageType {
                qualified_name: entry_qualified.clone(),
                location: loc,
                comments: Comments::default(),
                fields: vec![key_field, value_field],
                one_ofs: Vec::new(),
                nested_types: Vec::new(),
                reserved_ranges: Vec::new(),
                reserved_names: Vec::new(),
                extension_ranges: Vec::new(),
                options: Vec::new(),
                is_synthetic_map_entry: true,
            };
            let entry_idx = schema.insert_type(entry_qualified.clone(), Type::Message(entry_message));

            if let Type::Message(m) = schema.type_at_mut(msg_idx) {
                m.nested_types.push(entry_idx);
                m.fields[field_idx].declared_type = TypeRef::Resolved(entry_idx);
            }
        }
    }
}

/// `protoc`'s convention: the synthetic entry message for a field named
/// `foo_bar` is `FooBarEntry`.
fn map_entry_name(field_name: &str) -> String {
    let mut out = field_name
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<String>();
    out.push_str("Entry");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn link_one(source: &str) -> Result<Schema> {
        let parsed = parser::parse(source, "proto", "a.proto").unwrap();
        let mut source_paths = std::collections::HashSet::new();
        source_paths.insert("a.proto".to_string());
        Linker::link(
            vec![(Location::new("proto", "a.proto"), parsed)],
            &source_paths,
        )
    }

    #[test]
    fn indexes_nested_types_with_qualified_names() {
        let schema = link_one("package p; message Outer { message Inner {} }").unwrap();
        assert!(schema.lookup("p.Outer").is_some());
        assert!(schema.lookup("p.Outer.Inner").is_some());
    }

    #[test]
    fn duplicate_type_is_reported() {
        let err = link_one("message M {} message M {}").unwrap_err();
        match err {
            Error::LinkFailure(errors) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, Error::DuplicateType { name, .. } if name == "M")));
            }
            other => panic!("expected LinkFailure, got {other:?}"),
        }
    }

    #[test]
    fn map_field_desugars_into_synthetic_entry_message() {
        let schema = link_one("message M { map<string, int32> counts = 1; }").unwrap();
        let entry = schema.lookup("M.CountsEntry");
        assert!(entry.is_some());
        let entry_message = schema.type_at(entry.unwrap()).as_message().unwrap();
        assert_eq!(entry_message.fields.len(), 2);
        assert_eq!(entry_message.fields[0].tag, 1);
        assert_eq!(entry_message.fields[1].tag, 2);
    }

    #[test]
    fn group_field_resolves_to_its_synthetic_message() {
        let schema = link_one(
            "syntax = \"proto2\"; message M { optional group Item = 1 { optional int32 x = 1; } }",
        )
        .unwrap();
        let item = schema.lookup("M.Item").expect("group message should be indexed");
        let m = schema.type_at(schema.lookup("M").unwrap()).as_message().unwrap();
        assert_eq!(m.fields[0].declared_type, TypeRef::Resolved(item));
        let group = schema.type_at(item).as_message().unwrap();
        assert_eq!(group.fields.len(), 1);
    }
}
