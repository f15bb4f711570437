//! Structural validation run after Pass B, once every reference is bound.

use crate::ast::{Field, Label, Option_, ScalarType, Type, TypeRef};
use crate::error::Error;
use crate::location::Location;
use crate::schema::Schema;

const RESERVED_TAG_RANGE: (i32, i32) = (19000, 19999);

pub fn validate(schema: &mut Schema, errors: &mut Vec<Error>) {
    let message_indices: Vec<usize> = (0..schema.types.len())
        .filter(|&i| schema.type_at(i).as_message().is_some())
        .collect();
    for idx in &message_indices {
        validate_message(schema, *idx, errors);
    }

    let enum_indices: Vec<usize> = (0..schema.types.len())
        .filter(|&i| schema.type_at(i).as_enum().is_some())
        .collect();
    for idx in &enum_indices {
        validate_enum(schema, *idx, errors);
    }

    validate_extension_targets(schema, errors);
    validate_options(schema, errors);
}

fn validate_message(schema: &Schema, idx: usize, errors: &mut Vec<Error>) {
    let m = schema.type_at(idx).as_message().unwrap();
    let name = m.qualified_name.clone();

    let mut seen_tags: std::collections::HashMap<i32, Location> = std::collections::HashMap::new();
    for field in m.all_fields() {
        if field.tag <= 0 {
            errors.push(Error::Validation {
                location: field.location.clone(),
                message: format!("field '{}' in '{name}' has non-positive tag {}", field.name, field.tag),
            });
            continue;
        }
        if field.tag >= RESERVED_TAG_RANGE.0 && field.tag <= RESERVED_TAG_RANGE.1 {
            errors.push(Error::Validation {
                location: field.location.clone(),
                message: format!(
                    "field '{}' in '{name}' uses tag {} in the reserved range {}-{}",
                    field.name, field.tag, RESERVED_TAG_RANGE.0, RESERVED_TAG_RANGE.1
                ),
            });
        }
        if m.reserved_ranges.iter().any(|r| r.contains(field.tag)) {
            errors.push(Error::Validation {
                location: field.location.clone(),
                message: format!("field '{}' in '{name}' uses reserved tag {}", field.name, field.tag),
            });
        }
        if m.reserved_names.contains(&field.name) {
            errors.push(Error::Validation {
                location: field.location.clone(),
                message: format!("field '{}' in '{name}' reuses a reserved name", field.name),
            });
        }
        if let Some(prior) = seen_tags.get(&field.tag) {
            errors.push(Error::Validation {
                location: field.location.clone(),
                message: format!(
                    "duplicate tag {} in '{name}' (first used at {prior})",
                    field.tag
                ),
            });
        } else {
            seen_tags.insert(field.tag, field.location.clone());
        }
    }

    for one_of in &m.one_ofs {
        for field in &one_of.fields {
            if field.label == Label::Repeated {
                errors.push(Error::Validation {
                    location: field.location.clone(),
                    message: format!(
                        "oneof member '{}' in '{name}' may not be repeated",
                        field.name
                    ),
                });
            }
        }
    }

    // Extension fields from any `extend` block targeting this message share
    // its tag space, so a collision against a declared field's tag (or
    // between two extensions) is a duplicate too.
    for file in &schema.files {
        for extend in &file.extend_declarations {
            if extend.extendee.index() != Some(idx) {
                continue;
            }
            for field in &extend.fields {
                if let Some(prior) = seen_tags.get(&field.tag) {
                    errors.push(Error::Validation {
                        location: field.location.clone(),
                        message: format!(
                            "extension field '{}' reuses tag {} already used in '{name}' (first used at {prior})",
                            field.name, field.tag
                        ),
                    });
                } else {
                    seen_tags.insert(field.tag, field.location.clone());
                }
            }
        }
    }
}

fn validate_enum(schema: &Schema, idx: usize, errors: &mut Vec<Error>) {
    let e = schema.type_at(idx).as_enum().unwrap();
    // Proto3 syntax belongs to the owning file, not the enum itself; the
    // Schema doesn't thread file syntax down into each Type, so this
    // invariant is checked relative to whichever file declared the enum.
    let is_proto3 = schema
        .files
        .iter()
        .any(|f| matches!(f.syntax, crate::ast::Syntax::Proto3) && file_declares(schema, f, idx));
    if is_proto3 && !e.has_zero_constant() {
        errors.push(Error::Validation {
            location: e.location.clone(),
            message: format!(
                "proto3 enum '{}' must declare a zero-valued constant",
                e.qualified_name
            ),
        });
    }
}

fn file_declares(schema: &Schema, file: &crate::ast::ProtoFile, idx: usize) -> bool {
    fn contains(schema: &Schema, haystack: &[usize], needle: usize) -> bool {
        for &i in haystack {
            if i == needle {
                return true;
            }
            if let Some(m) = schema.type_at(i).as_message() {
                if contains(schema, &m.nested_types, needle) {
                    return true;
                }
            }
        }
        false
    }
    contains(schema, &file.types, idx)
}

/// Every extension field (`is_extension`) must target a message declaring
/// a matching `extensions` range covering its tag.
fn validate_extension_targets(schema: &Schema, errors: &mut Vec<Error>) {
    for file in &schema.files {
        for extend in &file.extend_declarations {
            let Some(target_idx) = extend.extendee.index() else {
                continue;
            };
            let Type::Message(target) = schema.type_at(target_idx) else {
                continue;
            };
            for field in &extend.fields {
                if !target.extension_ranges.iter().any(|r| r.contains(field.tag)) {
                    errors.push(Error::Validation {
                        location: field.location.clone(),
                        message: format!(
                            "extension field '{}' (tag {}) is not within any extension range of '{}'",
                            field.name, field.tag, target.qualified_name
                        ),
                    });
                }
                if let TypeRef::Unresolved(name) = &field.declared_type {
                    errors.push(Error::Validation {
                        location: field.location.clone(),
                        message: format!("extension field '{}' has unresolved type '{name}'", field.name),
                    });
                }
            }
        }
    }
}

/// Checks every option attached anywhere in the schema against the loaded
/// `google.protobuf.*Options` descriptor messages: a bare option name must
/// name one of that message's own declared fields, and its literal must
/// type-check against that field's declared type (enum values by
/// constant name, scalars by literal form); a parenthesized `(pkg.name)`
/// option must name an extension field some `extend` block has declared
/// against that message.
fn validate_options(schema: &Schema, errors: &mut Vec<Error>) {
    for file in &schema.files {
        validate_option_set(
            schema,
            "google.protobuf.FileOptions",
            &file.file_options,
            &file.location,
            errors,
        );
        for service in &file.services {
            validate_option_set(
                schema,
                "google.protobuf.ServiceOptions",
                &service.options,
                &service.location,
                errors,
            );
            for rpc in &service.rpcs {
                validate_option_set(
                    schema,
                    "google.protobuf.MethodOptions",
                    &rpc.options,
                    &rpc.location,
                    errors,
                );
            }
        }
    }

    for idx in 0..schema.types.len() {
        match schema.type_at(idx) {
            Type::Message(m) => {
                validate_option_set(
                    schema,
                    "google.protobuf.MessageOptions",
                    &m.options,
                    &m.location,
                    errors,
                );
                for field in m.all_fields() {
                    validate_option_set(
                        schema,
                        "google.protobuf.FieldOptions",
                        &field.options,
                        &field.location,
                        errors,
                    );
                }
            }
            Type::Enum(e) => {
                validate_option_set(
                    schema,
                    "google.protobuf.EnumOptions",
                    &e.options,
                    &e.location,
                    errors,
                );
                for constant in &e.constants {
                    validate_option_set(
                        schema,
                        "google.protobuf.EnumValueOptions",
                        &constant.options,
                        &constant.location,
                        errors,
                    );
                }
            }
        }
    }
}

fn validate_option_set(
    schema: &Schema,
    options_message: &str,
    options: &[Option_],
    location: &Location,
    errors: &mut Vec<Error>,
) {
    let Some(options_idx) = schema.lookup(options_message) else {
        return;
    };
    let Some(options_type) = schema.type_at(options_idx).as_message() else {
        return;
    };

    for option in options {
        if let Some(extension_name) = custom_option_name(&option.name) {
            if !extension_is_declared(schema, options_idx, extension_name) {
                errors.push(Error::Validation {
                    location: location.clone(),
                    message: format!(
                        "unknown extension option '{}': no extend block declares it against '{options_message}'",
                        option.name
                    ),
                });
            }
            continue;
        }

        match options_type.all_fields().find(|f| f.name == option.name) {
            None => errors.push(Error::Validation {
                location: location.clone(),
                message: format!("unknown option '{}' for '{options_message}'", option.name),
            }),
            Some(field) => {
                if let Err(message) = check_option_literal(schema, field, &option.value) {
                    errors.push(Error::Validation {
                        location: location.clone(),
                        message,
                    });
                }
            }
        }
    }
}

/// Extracts the dotted name inside a `(pkg.name)` custom-option reference.
fn custom_option_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix('(')?;
    let end = rest.find(')')?;
    Some(&rest[..end])
}

fn extension_is_declared(schema: &Schema, options_idx: usize, extension_name: &str) -> bool {
    let simple_name = extension_name.rsplit('.').next().unwrap_or(extension_name);
    schema.files.iter().any(|file| {
        file.extend_declarations.iter().any(|extend| {
            extend.extendee.index() == Some(options_idx)
                && extend.fields.iter().any(|f| f.name == simple_name)
        })
    })
}

/// Type-checks one option literal against the declared type of the
/// descriptor field it names. Values arrive as the lexer produced them:
/// quotes already stripped from strings, message literals as raw
/// balanced-brace text.
fn check_option_literal(schema: &Schema, field: &Field, value: &str) -> Result<(), String> {
    match &field.declared_type {
        TypeRef::Scalar(ScalarType::Bool) => {
            if value != "true" && value != "false" {
                return Err(format!(
                    "option '{}' expects a bool literal, found '{value}'",
                    field.name
                ));
            }
        }
        TypeRef::Scalar(
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Fixed32
            | ScalarType::Fixed64
            | ScalarType::Sfixed32
            | ScalarType::Sfixed64,
        ) => {
            if value.parse::<i64>().is_err() {
                return Err(format!(
                    "option '{}' expects an integer literal, found '{value}'",
                    field.name
                ));
            }
        }
        TypeRef::Scalar(ScalarType::Float | ScalarType::Double) => {
            if value.parse::<f64>().is_err() {
                return Err(format!(
                    "option '{}' expects a numeric literal, found '{value}'",
                    field.name
                ));
            }
        }
        TypeRef::Scalar(ScalarType::String | ScalarType::Bytes) => {}
        TypeRef::Resolved(target_idx) => match schema.type_at(*target_idx) {
            Type::Enum(e) => {
                if !e.constants.iter().any(|c| c.name == value) {
                    return Err(format!(
                        "option '{}' expects a constant of enum '{}', found '{value}'",
                        field.name, e.qualified_name
                    ));
                }
            }
            Type::Message(_) => {
                if !value.trim_start().starts_with('{') {
                    return Err(format!(
                        "option '{}' expects a message literal, found '{value}'",
                        field.name
                    ));
                }
            }
        },
        TypeRef::Unresolved(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::Linker;
    use crate::location::Location;
    use crate::parser;
    use std::collections::HashSet;

    fn link(source: &str) -> crate::error::Result<Schema> {
        let parsed = parser::parse(source, "proto", "a.proto").unwrap();
        let mut source_paths = HashSet::new();
        source_paths.insert("a.proto".to_string());
        Linker::link(vec![(Location::new("proto", "a.proto"), parsed)], &source_paths)
    }

    /// Links `source` alongside the `google.protobuf.*Options` bootstrap,
    /// the way a real `SchemaLoader` run always does, so option validation
    /// has something to check against.
    fn link_with_well_known(source: &str) -> crate::error::Result<Schema> {
        let parsed = parser::parse(source, "proto", "a.proto").unwrap();
        let bootstrap = crate::well_known::load().unwrap();
        let mut source_paths = HashSet::new();
        source_paths.insert("a.proto".to_string());
        Linker::link(
            vec![
                (Location::new("proto", "a.proto"), parsed),
                (crate::well_known::location(), bootstrap),
            ],
            &source_paths,
        )
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let err = link("message M { int32 a = 1; int32 b = 1; }").unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }

    #[test]
    fn tag_in_reserved_protobuf_range_is_rejected() {
        let err = link("message M { int32 a = 19500; }").unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }

    #[test]
    fn proto3_enum_without_zero_is_rejected() {
        let err = link("syntax = \"proto3\";\nenum E { A = 1; B = 2; }").unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }

    #[test]
    fn proto3_enum_with_zero_is_accepted() {
        let schema = link("syntax = \"proto3\";\nenum E { A = 0; B = 1; }").unwrap();
        assert!(schema.lookup("E").is_some());
    }

    #[test]
    fn repeated_oneof_member_is_rejected() {
        // The hand-written grammar already refuses a `repeated` keyword
        // inside a `oneof` block, so this exercises `validate_message`
        // directly against a schema built without going through the
        // parser, the way a desugared map field could still end up
        // `Label::Repeated` inside a `oneof` in principle.
        use crate::ast::{Comments, Field, MessageType, OneOf, TypeRef};

        let mut schema = Schema::new();
        let field = Field {
            name: "x".to_string(),
            tag: 1,
            label: Label::Repeated,
            declared_type: TypeRef::Scalar(crate::ast::ScalarType::Int32),
            default: None,
            options: Vec::new(),
            is_extension: false,
            is_packed: None,
            map_key_type: None,
            location: Location::new("proto", "a.proto"),
        };
        let message = MessageType {
            qualified_name: "M".to_string(),
            location: Location::new("proto", "a.proto"),
            comments: Comments::default(),
            fields: Vec::new(),
            one_ofs: vec![OneOf {
                name: "c".to_string(),
                fields: vec![field],
                location: Location::new("proto", "a.proto"),
            }],
            nested_types: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            extension_ranges: Vec::new(),
            options: Vec::new(),
            is_synthetic_map_entry: false,
        };
        let idx = schema.insert_type("M".to_string(), crate::ast::Type::Message(message));

        let mut errors = Vec::new();
        validate_message(&schema, idx, &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn known_file_option_with_matching_literal_is_accepted() {
        let schema = link_with_well_known("option deprecated = true;").unwrap();
        assert!(schema.lookup("google.protobuf.FileOptions").is_some());
    }

    #[test]
    fn known_option_with_wrong_literal_type_is_rejected() {
        let err = link_with_well_known("option deprecated = \"nope\";").unwrap_err();
        match err {
            Error::LinkFailure(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    Error::Validation { message, .. } if message.contains("expects a bool")
                )));
            }
            other => panic!("expected LinkFailure, got {other:?}"),
        }
    }

    #[test]
    fn unknown_option_name_is_rejected() {
        let err = link_with_well_known("option not_a_real_option = 1;").unwrap_err();
        match err {
            Error::LinkFailure(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    Error::Validation { message, .. } if message.contains("unknown option")
                )));
            }
            other => panic!("expected LinkFailure, got {other:?}"),
        }
    }

    #[test]
    fn custom_option_without_matching_extend_is_rejected() {
        let err = link_with_well_known("option (my.custom_option) = 1;").unwrap_err();
        match err {
            Error::LinkFailure(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    Error::Validation { message, .. } if message.contains("unknown extension option")
                )));
            }
            other => panic!("expected LinkFailure, got {other:?}"),
        }
    }

    #[test]
    fn extension_tag_colliding_with_declared_field_is_rejected() {
        let err = link(concat!(
            "message M { int32 a = 1; extensions 100 to 200; }\n",
            "extend M { optional int32 b = 1; }\n",
        ))
        .unwrap_err();
        match err {
            Error::LinkFailure(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    Error::Validation { message, .. } if message.contains("reuses tag")
                )));
            }
            other => panic!("expected LinkFailure, got {other:?}"),
        }
    }

    #[test]
    fn custom_option_with_matching_extend_is_accepted() {
        let schema = link_with_well_known(concat!(
            "extend google.protobuf.FileOptions { optional int32 custom_option = 50000; }\n",
            "option (custom_option) = 1;\n",
        ))
        .unwrap();
        assert!(schema.lookup("google.protobuf.FileOptions").is_some());
    }
}
