//! The implicitly-loaded descriptor-option bootstrap file. The
//! `SchemaLoader` needs `google.protobuf.*Options` declared before
//! option resolution in the Linker can proceed, whether or not any loaded
//! `.proto` imports `google/protobuf/descriptor.proto` explicitly.
//!
//! This mirrors how `prost-build`'s `extern_paths` hard-codes knowledge of
//! `google.protobuf.*` (`extern_paths.rs`), except here the well-known
//! names must actually exist as linkable declarations rather than be
//! mapped to a Rust path, since this core never emits target source.

use crate::error::Result;
use crate::location::Location;
use crate::parser::{self, ParsedFile};

/// The raw embedded source text, for callers (the loader) that need to
/// treat this file uniformly with any other located import rather than
/// consume the already-parsed form.
pub fn source() -> &'static str {
    DESCRIPTOR_PROTO_SOURCE
}

/// The synthetic import path the loader registers this file under. Real
/// `.proto` sources that `import "google/protobuf/descriptor.proto";`
/// resolve to this same path if no proto-path root provides a file with
/// that name first — user-provided definitions always take precedence
/// over this bootstrap copy.
pub const DESCRIPTOR_PROTO_PATH: &str = "google/protobuf/descriptor.proto";

const DESCRIPTOR_PROTO_SOURCE: &str = r#"
syntax = "proto2";
package google.protobuf;

message FileOptions {
  optional string java_package = 1;
  optional string java_outer_classname = 8;
  optional string go_package = 11;
  optional bool deprecated = 23;
  extensions 1000 to max;
}

message MessageOptions {
  optional bool message_set_wire_format = 1;
  optional bool no_standard_descriptor_accessor = 2;
  optional bool deprecated = 3;
  optional bool map_entry = 7;
  extensions 1000 to max;
}

message FieldOptions {
  optional bool packed = 2;
  optional bool deprecated = 3;
  optional bool lazy = 5;
  optional string json_name = 10;
  extensions 1000 to max;
}

message OneofOptions {
  extensions 1000 to max;
}

message EnumOptions {
  optional bool allow_alias = 2;
  optional bool deprecated = 3;
  extensions 1000 to max;
}

message EnumValueOptions {
  optional bool deprecated = 1;
  extensions 1000 to max;
}

message ServiceOptions {
  optional bool deprecated = 33;
  extensions 1000 to max;
}

message MethodOptions {
  optional bool deprecated = 33;
  extensions 1000 to max;
}

message ExtensionRangeOptions {
  extensions 1000 to max;
}
"#;

/// Parses the embedded descriptor-option bootstrap text. Re-parsed per
/// loader run rather than cached in a `static`, since a `SchemaLoader` run
/// is already a one-shot, single-threaded pass and the bootstrap
/// text is tiny.
pub fn load() -> Result<ParsedFile> {
    parser::parse(DESCRIPTOR_PROTO_SOURCE, "", DESCRIPTOR_PROTO_PATH)
}

pub fn location() -> Location {
    Location::new("", DESCRIPTOR_PROTO_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_file_parses() {
        let file = load().unwrap();
        assert_eq!(file.package_name.as_deref(), Some("google.protobuf"));
        assert!(file.top_level_types.len() >= 8);
    }

    #[test]
    fn bootstrap_declares_field_options() {
        let file = load().unwrap();
        let found = file.top_level_types.iter().any(|&idx| {
            file.types[idx]
                .as_message()
                .map(|m| m.qualified_name == "FieldOptions")
                .unwrap_or(false)
        });
        assert!(found);
    }
}
