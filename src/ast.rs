//! The schema data model.
//!
//! Entities are created during loading and parsing, mutated only during
//! linking (reference resolution fills in [`TypeRef::Resolved`] pointers),
//! and treated as immutable afterwards by the [`crate::pruner`] and any
//! target dispatch.

use crate::location::Location;

/// `.proto` syntax version. Proto2 is the default when no `syntax`
/// statement is present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

/// Field cardinality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
    /// A member of a `oneof`; not written explicitly in source.
    OneofMember,
}

/// Streaming-ness of one side of an RPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Streaming {
    #[default]
    Unary,
    Streaming,
}

/// A raw, uninterpreted option: `name = literal_text`. Custom/unknown
/// options are retained this way rather than dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Option_ {
    pub name: String,
    pub value: String,
}

/// Documentation comments attached to a declaration.
///
/// Mirrors `prost-build`'s `ast::Comments`: detached blocks, a leading
/// block, and a trailing block. Unlike `prost-build` this crate performs
/// no Markdown reformatting, since no target source is emitted here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comments {
    pub leading_detached: Vec<String>,
    pub leading: String,
    pub trailing: String,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.leading_detached.is_empty() && self.leading.is_empty() && self.trailing.is_empty()
    }
}

/// One of protobuf's built-in scalar field types. These never appear in
/// the schema's type arena, so a field typed this way needs no linking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Recognizes a bare (non-dotted) type name as a scalar keyword.
    pub fn parse(name: &str) -> Option<ScalarType> {
        Some(match name {
            "double" => ScalarType::Double,
            "float" => ScalarType::Float,
            "int32" => ScalarType::Int32,
            "int64" => ScalarType::Int64,
            "uint32" => ScalarType::Uint32,
            "uint64" => ScalarType::Uint64,
            "sint32" => ScalarType::Sint32,
            "sint64" => ScalarType::Sint64,
            "fixed32" => ScalarType::Fixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed32" => ScalarType::Sfixed32,
            "sfixed64" => ScalarType::Sfixed64,
            "bool" => ScalarType::Bool,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        })
    }
}

/// A reference to a named type. `Scalar` never needs linking; `Unresolved`
/// holds the textual name as written in source until the Linker's
/// reference-resolution pass turns it into `Resolved`, an index into the
/// owning [`crate::schema::Schema`]'s arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Scalar(ScalarType),
    Unresolved(String),
    Resolved(usize),
}

impl TypeRef {
    /// Builds a `TypeRef` from a type name as written in source, resolving
    /// scalar keywords immediately since they never need linking.
    pub fn from_name(name: impl Into<String>) -> TypeRef {
        let name = name.into();
        match ScalarType::parse(&name) {
            Some(scalar) => TypeRef::Scalar(scalar),
            None => TypeRef::Unresolved(name),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Unresolved(name) => Some(name),
            TypeRef::Scalar(_) | TypeRef::Resolved(_) => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            TypeRef::Resolved(idx) => Some(*idx),
            TypeRef::Scalar(_) | TypeRef::Unresolved(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub tag: i32,
    pub label: Label,
    pub declared_type: TypeRef,
    pub default: Option<String>,
    pub options: Vec<Option_>,
    pub is_extension: bool,
    pub is_packed: Option<bool>,
    /// `Some(key_type_name)` if this field was declared `map<K, V>`; the
    /// linker desugars it into a synthetic nested message and rewrites
    /// `label`/`declared_type` accordingly.
    pub map_key_type: Option<String>,
    pub location: Location,
}

/// One member of a `oneof` group: the group's name plus its member fields.
#[derive(Clone, Debug)]
pub struct OneOf {
    pub name: String,
    pub fields: Vec<Field>,
    pub location: Location,
}

/// An inclusive tag range, used for both `reserved` and `extensions`
/// declarations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagRange {
    pub start: i32,
    pub end: i32,
}

impl TagRange {
    pub fn contains(&self, tag: i32) -> bool {
        tag >= self.start && tag <= self.end
    }
}

#[derive(Clone, Debug)]
pub struct MessageType {
    pub qualified_name: String,
    pub location: Location,
    pub comments: Comments,
    pub fields: Vec<Field>,
    pub one_ofs: Vec<OneOf>,
    /// Indices, within the owning schema's arena, of nested `Type`s.
    pub nested_types: Vec<usize>,
    pub reserved_ranges: Vec<TagRange>,
    pub reserved_names: Vec<String>,
    pub extension_ranges: Vec<TagRange>,
    pub options: Vec<Option_>,
    /// `true` for the synthetic per-field message protobuf desugars `map<K, V>`
    /// fields into.
    pub is_synthetic_map_entry: bool,
}

impl MessageType {
    /// All fields, including those declared inside a `oneof`.
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .chain(self.one_ofs.iter().flat_map(|o| o.fields.iter()))
    }

    pub fn all_fields_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields
            .iter_mut()
            .chain(self.one_ofs.iter_mut().flat_map(|o| o.fields.iter_mut()))
    }
}

#[derive(Clone, Debug)]
pub struct EnumConstant {
    pub name: String,
    pub tag: i32,
    pub options: Vec<Option_>,
    pub location: Location,
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub qualified_name: String,
    pub location: Location,
    pub comments: Comments,
    pub constants: Vec<EnumConstant>,
    pub options: Vec<Option_>,
}

impl EnumType {
    /// Proto3 requires the first constant to carry tag zero.
    pub fn has_zero_constant(&self) -> bool {
        self.constants.iter().any(|c| c.tag == 0)
    }
}

#[derive(Clone, Debug)]
pub enum Type {
    Message(MessageType),
    Enum(EnumType),
}

impl Type {
    pub fn qualified_name(&self) -> &str {
        match self {
            Type::Message(m) => &m.qualified_name,
            Type::Enum(e) => &e.qualified_name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Type::Message(m) => &m.location,
            Type::Enum(e) => &e.location,
        }
    }

    pub fn as_message(&self) -> Option<&MessageType> {
        match self {
            Type::Message(m) => Some(m),
            Type::Enum(_) => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageType> {
        match self {
            Type::Message(m) => Some(m),
            Type::Enum(_) => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            Type::Enum(e) => Some(e),
            Type::Message(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Rpc {
    pub name: String,
    pub request_type: TypeRef,
    pub response_type: TypeRef,
    pub request_streaming: Streaming,
    pub response_streaming: Streaming,
    pub options: Vec<Option_>,
    pub comments: Comments,
    pub location: Location,
}

#[derive(Clone, Debug)]
pub struct Service {
    pub qualified_name: String,
    pub rpcs: Vec<Rpc>,
    pub options: Vec<Option_>,
    pub comments: Comments,
    pub location: Location,
}

/// An `extend` block: a set of extension fields declared against an
/// existing message from elsewhere in the schema.
#[derive(Clone, Debug)]
pub struct ExtendDeclaration {
    pub extendee: TypeRef,
    pub fields: Vec<Field>,
    pub location: Location,
}

/// One parsed `.proto` source file. Before linking, `imports` are plain
/// strings and every `TypeRef` inside `types`/`services`/`extend_declarations`
/// is `TypeRef::Unresolved`; after linking they all point into the
/// [`crate::schema::Schema`] arena.
#[derive(Clone, Debug)]
pub struct ProtoFile {
    pub location: Location,
    pub package_name: Option<String>,
    pub syntax: Syntax,
    pub imports: Vec<String>,
    pub public_imports: Vec<String>,
    pub weak_imports: Vec<String>,
    /// Top-level type indices into the owning schema's arena.
    pub types: Vec<usize>,
    pub services: Vec<Service>,
    pub extend_declarations: Vec<ExtendDeclaration>,
    pub file_options: Vec<Option_>,
}

impl ProtoFile {
    pub fn package(&self) -> &str {
        self.package_name.as_deref().unwrap_or("")
    }
}
