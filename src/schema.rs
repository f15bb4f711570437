//! The linked, validated schema.
//!
//! Represented as a flat arena rather than a pointer graph so that
//! self-referential and mutually-recursive message types don't fight
//! Rust's ownership rules: every
//! [`crate::ast::TypeRef::Resolved`] is an index into `Schema::types`.

use std::collections::HashMap;

use crate::ast::{ProtoFile, Type};
use crate::location::Location;

/// The full set of linked `ProtoFile`s plus the type arena they all
/// reference by index.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    pub types: Vec<Type>,
    pub files: Vec<ProtoFile>,
    /// Fully qualified name → arena index. Built during the Linker's
    /// declaration-indexing pass and never mutated afterwards.
    by_name: HashMap<String, usize>,
    /// Location paths that originated under a source-path root, as
    /// opposed to a proto-path-only root.
    source_paths: std::collections::HashSet<String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn insert_type(&mut self, name: String, ty: Type) -> usize {
        let idx = self.types.len();
        self.types.push(ty);
        self.by_name.insert(name, idx);
        idx
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<usize> {
        self.by_name.get(qualified_name).copied()
    }

    pub fn qualified_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn type_at(&self, idx: usize) -> &Type {
        &self.types[idx]
    }

    pub fn type_at_mut(&mut self, idx: usize) -> &mut Type {
        &mut self.types[idx]
    }

    pub fn mark_source_path(&mut self, path: impl Into<String>) {
        self.source_paths.insert(path.into());
    }

    pub fn is_source_path(&self, location: &Location) -> bool {
        self.source_paths.contains(&location.path)
    }

    /// Every type declared directly in a file whose `Location.path` is in
    /// the source set, in stable
    /// declaration order.
    pub fn source_set_types_in_order(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for file in &self.files {
            if !self.is_source_path(&file.location) {
                continue;
            }
            for &idx in &file.types {
                collect_with_nested(&self.types, idx, &mut out);
            }
        }
        out
    }
}

fn collect_with_nested(types: &[Type], idx: usize, out: &mut Vec<usize>) {
    out.push(idx);
    if let Some(message) = types[idx].as_message() {
        for &nested in &message.nested_types {
            collect_with_nested(types, nested, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Comments, MessageType, Syntax};

    fn dummy_message(name: &str) -> Type {
        Type::Message(MessageType {
            qualified_name: name.to_string(),
            location: Location::new("proto", "a.proto"),
            comments: Comments::default(),
            fields: Vec::new(),
            one_ofs: Vec::new(),
            nested_types: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            extension_ranges: Vec::new(),
            options: Vec::new(),
            is_synthetic_map_entry: false,
        })
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let mut schema = Schema::new();
        let idx = schema.insert_type("p.M".to_string(), dummy_message("M"));
        assert_eq!(schema.lookup("p.M"), Some(idx));
        assert_eq!(schema.lookup("p.N"), None);
    }

    #[test]
    fn source_set_types_in_order_skips_proto_path_files() {
        let mut schema = Schema::new();
        let idx = schema.insert_type("p.M".to_string(), dummy_message("M"));
        schema.files.push(ProtoFile {
            location: Location::new("proto", "a.proto"),
            package_name: Some("p".to_string()),
            syntax: Syntax::Proto3,
            imports: Vec::new(),
            public_imports: Vec::new(),
            weak_imports: Vec::new(),
            types: vec![idx],
            services: Vec::new(),
            extend_declarations: Vec::new(),
            file_options: Vec::new(),
        });
        schema.mark_source_path("a.proto");

        let idx2 = schema.insert_type("q.N".to_string(), dummy_message("N"));
        schema.files.push(ProtoFile {
            location: Location::new("protopath", "q.proto"),
            package_name: Some("q".to_string()),
            syntax: Syntax::Proto3,
            imports: Vec::new(),
            public_imports: Vec::new(),
            weak_imports: Vec::new(),
            types: vec![idx2],
            services: Vec::new(),
            extend_declarations: Vec::new(),
            file_options: Vec::new(),
        });

        assert_eq!(schema.source_set_types_in_order(), vec![idx]);
    }
}
