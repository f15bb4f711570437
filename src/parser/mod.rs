//! A hand-written recursive-descent parser over one `.proto` source text.
//! Not in the core's hardest-scope trio (loader/linker/pruner)
//! but its output contract matters: every declaration carries the
//! `Location` at which it began, preceding comments are attached as
//! documentation, and unknown options are retained uninterpreted.

mod lexer;

use crate::ast::*;
use crate::error::{Error, Result};
use crate::location::Location;
use lexer::{Lexer, Token};

/// The output of parsing one file: a local arena of `Type`s (nested types
/// reference their parent by index into this same arena) plus the indices
/// of its package-level declarations. [`crate::loader::SchemaLoader`] and
/// the linker's declaration-indexing pass fold these local arenas into the
/// shared [`crate::schema::Schema`] arena, assigning final qualified names.
pub struct ParsedFile {
    pub location: Location,
    pub package_name: Option<String>,
    pub syntax: Syntax,
    pub imports: Vec<String>,
    pub public_imports: Vec<String>,
    pub weak_imports: Vec<String>,
    pub types: Vec<Type>,
    pub top_level_types: Vec<usize>,
    pub services: Vec<Service>,
    pub extend_declarations: Vec<ExtendDeclaration>,
    pub file_options: Vec<Option_>,
}

pub fn parse(source: &str, base: &str, path: &str) -> Result<ParsedFile> {
    let mut parser = Parser::new(source, base, path);
    parser.parse_file()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    comments: Comments,
    loc: Location,
    file_location: Location,
}

impl<'a> Parser<'a> {
    fn new(source: &str, base: &'a str, path: &'a str) -> Self {
        let mut lexer = Lexer::new(source, base, path);
        let (tok, comments, loc) = lexer.next_token();
        Parser {
            lexer,
            tok,
            comments,
            loc,
            file_location: Location::new(base.to_string(), path.to_string()),
        }
    }

    fn bump(&mut self) -> (Token, Comments, Location) {
        let (tok, comments, loc) = self.lexer.next_token();
        (
            std::mem::replace(&mut self.tok, tok),
            std::mem::replace(&mut self.comments, comments),
            std::mem::replace(&mut self.loc, loc),
        )
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            location: self.loc.clone(),
            message: message.into(),
        }
    }

    fn expect_symbol(&mut self, c: char) -> Result<()> {
        match self.tok {
            Token::Symbol(x) if x == c => {
                self.bump();
                Ok(())
            }
            _ => Err(self.err(format!("expected '{}', found {:?}", c, self.tok))),
        }
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        if self.tok == Token::Symbol(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match &self.tok {
            Token::Ident(s) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            other => Err(self.err(format!("expected identifier, found {:?}", other))),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        match &self.tok {
            Token::Ident(s) if s == keyword => {
                self.bump();
                Ok(())
            }
            other => Err(self.err(format!("expected '{}', found {:?}", keyword, other))),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(&self.tok, Token::Ident(s) if s == keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.tok, Token::Ident(s) if s == keyword)
    }

    fn expect_string(&mut self) -> Result<String> {
        match &self.tok {
            Token::Str(s) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            other => Err(self.err(format!("expected string literal, found {:?}", other))),
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        match &self.tok {
            Token::Int(n) => {
                let n = *n;
                self.bump();
                Ok(n)
            }
            Token::Ident(s) if s == "max" => {
                self.bump();
                Ok(536_870_911)
            }
            other => Err(self.err(format!("expected integer, found {:?}", other))),
        }
    }

    fn parse_file(&mut self) -> Result<ParsedFile> {
        let mut file = ParsedFile {
            location: self.file_location.clone(),
            package_name: None,
            syntax: Syntax::Proto2,
            imports: Vec::new(),
            public_imports: Vec::new(),
            weak_imports: Vec::new(),
            types: Vec::new(),
            top_level_types: Vec::new(),
            services: Vec::new(),
            extend_declarations: Vec::new(),
            file_options: Vec::new(),
        };

        while self.tok != Token::Eof {
            if self.eat_symbol(';') {
                continue;
            } else if self.eat_keyword("syntax") {
                self.expect_symbol('=')?;
                let syntax = self.expect_string()?;
                self.expect_symbol(';')?;
                file.syntax = match syntax.as_str() {
                    "proto2" => Syntax::Proto2,
                    "proto3" => Syntax::Proto3,
                    other => {
                        return Err(self.err(format!("unknown syntax: {}", other)));
                    }
                };
            } else if self.eat_keyword("package") {
                let name = self.parse_dotted_name()?;
                self.expect_symbol(';')?;
                file.package_name = Some(name);
            } else if self.eat_keyword("import") {
                if self.eat_keyword("public") {
                    let path = self.expect_string()?;
                    self.expect_symbol(';')?;
                    file.public_imports.push(path.clone());
                    file.imports.push(path);
                } else if self.eat_keyword("weak") {
                    let path = self.expect_string()?;
                    self.expect_symbol(';')?;
                    file.weak_imports.push(path.clone());
                    file.imports.push(path);
                } else {
                    let path = self.expect_string()?;
                    self.expect_symbol(';')?;
                    file.imports.push(path);
                }
            } else if self.eat_keyword("option") {
                let option = self.parse_option_statement()?;
                file.file_options.push(option);
            } else if self.is_keyword("message") {
                let comments = self.comments.clone();
                let mut extends = Vec::new();
                let idx = self.parse_message(&mut file.types, comments, &mut extends)?;
                file.top_level_types.push(idx);
                file.extend_declarations.extend(extends);
            } else if self.is_keyword("enum") {
                let comments = self.comments.clone();
                let idx = self.parse_enum(&mut file.types, comments)?;
                file.top_level_types.push(idx);
            } else if self.is_keyword("service") {
                let service = self.parse_service()?;
                file.services.push(service);
            } else if self.is_keyword("extend") {
                let extend = self.parse_extend(&mut file.types, &mut file.top_level_types)?;
                file.extend_declarations.push(extend);
            } else {
                return Err(self.err(format!("unexpected top-level token {:?}", self.tok)));
            }
        }

        Ok(file)
    }

    fn parse_dotted_name(&mut self) -> Result<String> {
        // `Ident` tokens may already contain interior dots (the lexer
        // treats `.` as an identifier-continuation character), but a
        // leading-dot absolute reference arrives as a separate `.` symbol.
        let mut name = String::new();
        if self.eat_symbol('.') {
            name.push('.');
        }
        name.push_str(&self.expect_ident()?);
        Ok(name)
    }

    /// Reads a raw option name: a dotted/parenthesized path up to (but not
    /// including) the terminating `=`.
    fn parse_option_name(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            match &self.tok {
                Token::Ident(s) => {
                    name.push_str(s);
                    self.bump();
                }
                Token::Symbol(c @ ('(' | ')' | '.')) => {
                    name.push(*c);
                    self.bump();
                }
                _ => break,
            }
        }
        if name.is_empty() {
            return Err(self.err("expected option name"));
        }
        Ok(name)
    }

    fn parse_option_value(&mut self) -> Result<String> {
        if self.tok == Token::Symbol('{') {
            return self.parse_balanced_braces();
        }
        let value = match &self.tok {
            Token::Str(s) => s.clone(),
            Token::Int(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Ident(s) => s.clone(),
            other => return Err(self.err(format!("expected option value, found {:?}", other))),
        };
        self.bump();
        Ok(value)
    }

    /// Captures a `{ ... }` message-literal option value verbatim; the
    /// core never interprets custom option message literals.
    fn parse_balanced_braces(&mut self) -> Result<String> {
        let mut depth = 0i32;
        let mut text = String::new();
        loop {
            match &self.tok {
                Token::Symbol('{') => {
                    depth += 1;
                    text.push('{');
                    self.bump();
                }
                Token::Symbol('}') => {
                    depth -= 1;
                    text.push('}');
                    self.bump();
                    if depth == 0 {
                        break;
                    }
                }
                Token::Eof => return Err(self.err("unterminated option literal")),
                other => {
                    text.push_str(&format!("{:?} ", other));
                    self.bump();
                }
            }
        }
        Ok(text)
    }

    fn parse_option_statement(&mut self) -> Result<Option_> {
        let name = self.parse_option_name()?;
        self.expect_symbol('=')?;
        let value = self.parse_option_value()?;
        self.expect_symbol(';')?;
        Ok(Option_ { name, value })
    }

    fn parse_bracketed_options(&mut self) -> Result<(Vec<Option_>, Option<bool>)> {
        let mut options = Vec::new();
        let mut is_packed = None;
        if !self.eat_symbol('[') {
            return Ok((options, is_packed));
        }
        loop {
            let name = self.parse_option_name()?;
            self.expect_symbol('=')?;
            let value = self.parse_option_value()?;
            if name == "packed" {
                is_packed = Some(value == "true");
            }
            options.push(Option_ { name, value });
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(']')?;
        Ok((options, is_packed))
    }

    fn parse_tag_ranges(&mut self) -> Result<Vec<TagRange>> {
        let mut ranges = Vec::new();
        loop {
            let start = self.expect_int()? as i32;
            let end = if self.eat_keyword("to") {
                self.expect_int()? as i32
            } else {
                start
            };
            ranges.push(TagRange { start, end });
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(ranges)
    }

    fn parse_message(
        &mut self,
        arena: &mut Vec<Type>,
        comments: Comments,
        extends: &mut Vec<ExtendDeclaration>,
    ) -> Result<usize> {
        let loc = self.loc.clone();
        self.expect_keyword("message")?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;

        let mut message = MessageType {
            qualified_name: name,
            location: loc,
            comments,
            fields: Vec::new(),
            one_ofs: Vec::new(),
            nested_types: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            extension_ranges: Vec::new(),
            options: Vec::new(),
            is_synthetic_map_entry: false,
        };

        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            } else if self.is_keyword("message") {
                let comments = self.comments.clone();
                let idx = self.parse_message(arena, comments, extends)?;
                message.nested_types.push(idx);
            } else if self.is_keyword("enum") {
                let comments = self.comments.clone();
                let idx = self.parse_enum(arena, comments)?;
                message.nested_types.push(idx);
            } else if self.is_keyword("extend") {
                // A nested `extend` is folded into the file-level list
                // its fields still belong to the message it names, not the
                // block's lexical position.
                let extend = self.parse_extend(arena, &mut message.nested_types)?;
                extends.push(extend);
            } else if self.eat_keyword("oneof") {
                let one_of = self.parse_oneof()?;
                message.one_ofs.push(one_of);
            } else if self.eat_keyword("reserved") {
                if matches!(self.tok, Token::Str(_)) {
                    loop {
                        message.reserved_names.push(self.expect_string()?);
                        if !self.eat_symbol(',') {
                            break;
                        }
                    }
                } else {
                    message.reserved_ranges.extend(self.parse_tag_ranges()?);
                }
                self.expect_symbol(';')?;
            } else if self.eat_keyword("extensions") {
                message.extension_ranges.extend(self.parse_tag_ranges()?);
                self.expect_symbol(';')?;
            } else if self.eat_keyword("option") {
                message.options.push(self.parse_option_statement()?);
            } else {
                let field = self.parse_field(arena, &mut message.nested_types)?;
                message.fields.push(field);
            }
        }

        arena.push(Type::Message(message));
        Ok(arena.len() - 1)
    }

    fn parse_oneof(&mut self) -> Result<OneOf> {
        let loc = self.loc.clone();
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let mut fields = Vec::new();
        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            }
            let mut field = self.parse_typed_field(None)?;
            field.label = Label::OneofMember;
            fields.push(field);
        }
        Ok(OneOf {
            name,
            fields,
            location: loc,
        })
    }

    /// Parses one ordinary (non-oneof) field declaration, including the
    /// proto2-only cardinality keyword and the `map<K, V>` and legacy
    /// `group` forms.
    fn parse_field(&mut self, arena: &mut Vec<Type>, nested_types: &mut Vec<usize>) -> Result<Field> {
        let label = if self.eat_keyword("optional") {
            Some(Label::Optional)
        } else if self.eat_keyword("required") {
            Some(Label::Required)
        } else if self.eat_keyword("repeated") {
            Some(Label::Repeated)
        } else {
            None
        };

        if self.is_keyword("group") {
            return self.parse_group(arena, nested_types, label.unwrap_or(Label::Optional));
        }

        if self.is_keyword("map") {
            return self.parse_map_field(label);
        }

        self.parse_typed_field(label)
    }

    fn parse_typed_field(&mut self, label: Option<Label>) -> Result<Field> {
        let loc = self.loc.clone();
        let type_name = self.parse_dotted_name()?;
        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let tag = self.expect_int()? as i32;
        let (options, is_packed) = self.parse_bracketed_options()?;
        self.expect_symbol(';')?;
        Ok(Field {
            name,
            tag,
            label: label.unwrap_or(Label::Optional),
            declared_type: TypeRef::from_name(type_name),
            default: options
                .iter()
                .find(|o| o.name == "default")
                .map(|o| o.value.clone()),
            options,
            is_extension: false,
            is_packed,
            map_key_type: None,
            location: loc,
        })
    }

    fn parse_map_field(&mut self, label: Option<Label>) -> Result<Field> {
        if let Some(label) = label {
            if label != Label::Repeated {
                return Err(self.err("map fields may not carry an explicit label"));
            }
        }
        let loc = self.loc.clone();
        self.expect_keyword("map")?;
        self.expect_symbol('<')?;
        let key_type = self.parse_dotted_name()?;
        self.expect_symbol(',')?;
        let value_type = self.parse_dotted_name()?;
        self.expect_symbol('>')?;
        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let tag = self.expect_int()? as i32;
        let (options, _) = self.parse_bracketed_options()?;
        self.expect_symbol(';')?;
        Ok(Field {
            name,
            tag,
            label: Label::Repeated,
            declared_type: TypeRef::from_name(value_type),
            default: None,
            options,
            is_extension: false,
            is_packed: None,
            map_key_type: Some(key_type),
            location: loc,
        })
    }

    /// A proto2 `group`: sugar for a nested message plus a message-typed
    /// field referencing it. The synthetic message is appended to the
    /// enclosing scope's `nested_types` so declaration-indexing actually
    /// walks it; otherwise it would sit in `arena` unreferenced by any
    /// `top_level_types`/`nested_types` chain and never get a global index.
    fn parse_group(
        &mut self,
        arena: &mut Vec<Type>,
        nested_types: &mut Vec<usize>,
        label: Label,
    ) -> Result<Field> {
        let loc = self.loc.clone();
        self.expect_keyword("group")?;
        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let tag = self.expect_int()? as i32;
        self.expect_symbol('{')?;

        let mut message = MessageType {
            qualified_name: name.clone(),
            location: loc.clone(),
            comments: Comments::default(),
            fields: Vec::new(),
            one_ofs: Vec::new(),
            nested_types: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            extension_ranges: Vec::new(),
            options: Vec::new(),
            is_synthetic_map_entry: false,
        };
        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            }
            let field = self.parse_field(arena, &mut message.nested_types)?;
            message.fields.push(field);
        }
        arena.push(Type::Message(message));
        let type_idx = arena.len() - 1;
        nested_types.push(type_idx);

        Ok(Field {
            name: name.to_lowercase(),
            tag,
            label,
            declared_type: TypeRef::Unresolved(format!("#group:{type_idx}")),
            default: None,
            options: Vec::new(),
            is_extension: false,
            is_packed: None,
            map_key_type: None,
            location: loc,
        })
    }

    fn parse_enum(&mut self, arena: &mut Vec<Type>, comments: Comments) -> Result<usize> {
        let loc = self.loc.clone();
        self.expect_keyword("enum")?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;

        let mut enum_type = EnumType {
            qualified_name: name,
            location: loc,
            comments,
            constants: Vec::new(),
            options: Vec::new(),
        };

        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            } else if self.eat_keyword("option") {
                enum_type.options.push(self.parse_option_statement()?);
            } else if self.eat_keyword("reserved") {
                // Reserved names/numbers inside enums are accepted but not
                // separately validated.
                if matches!(self.tok, Token::Str(_)) {
                    loop {
                        self.expect_string()?;
                        if !self.eat_symbol(',') {
                            break;
                        }
                    }
                } else {
                    self.parse_tag_ranges()?;
                }
                self.expect_symbol(';')?;
            } else {
                let constant_loc = self.loc.clone();
                let name = self.expect_ident()?;
                self.expect_symbol('=')?;
                let tag = self.expect_int()? as i32;
                let (options, _) = self.parse_bracketed_options()?;
                self.expect_symbol(';')?;
                enum_type.constants.push(EnumConstant {
                    name,
                    tag,
                    options,
                    location: constant_loc,
                });
            }
        }

        arena.push(Type::Enum(enum_type));
        Ok(arena.len() - 1)
    }

    fn parse_service(&mut self) -> Result<Service> {
        let loc = self.loc.clone();
        let comments = self.comments.clone();
        self.expect_keyword("service")?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;

        let mut service = Service {
            qualified_name: name,
            rpcs: Vec::new(),
            options: Vec::new(),
            comments,
            location: loc,
        };

        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            } else if self.eat_keyword("option") {
                service.options.push(self.parse_option_statement()?);
            } else {
                service.rpcs.push(self.parse_rpc()?);
            }
        }
        Ok(service)
    }

    fn parse_rpc(&mut self) -> Result<Rpc> {
        let loc = self.loc.clone();
        let comments = self.comments.clone();
        self.expect_keyword("rpc")?;
        let name = self.expect_ident()?;
        self.expect_symbol('(')?;
        let request_streaming = if self.eat_keyword("stream") {
            Streaming::Streaming
        } else {
            Streaming::Unary
        };
        let request_type = self.parse_dotted_name()?;
        self.expect_symbol(')')?;
        self.expect_keyword("returns")?;
        self.expect_symbol('(')?;
        let response_streaming = if self.eat_keyword("stream") {
            Streaming::Streaming
        } else {
            Streaming::Unary
        };
        let response_type = self.parse_dotted_name()?;
        self.expect_symbol(')')?;

        let mut options = Vec::new();
        if self.eat_symbol('{') {
            while !self.eat_symbol('}') {
                if self.eat_symbol(';') {
                    continue;
                }
                self.expect_keyword("option")?;
                options.push(self.parse_option_statement()?);
            }
        } else {
            self.expect_symbol(';')?;
        }

        Ok(Rpc {
            name,
            request_type: TypeRef::Unresolved(request_type),
            response_type: TypeRef::Unresolved(response_type),
            request_streaming,
            response_streaming,
            options,
            comments,
            location: loc,
        })
    }

    fn parse_extend(
        &mut self,
        arena: &mut Vec<Type>,
        nested_types: &mut Vec<usize>,
    ) -> Result<ExtendDeclaration> {
        let loc = self.loc.clone();
        self.expect_keyword("extend")?;
        let extendee = self.parse_dotted_name()?;
        self.expect_symbol('{')?;
        let mut fields = Vec::new();
        while !self.eat_symbol('}') {
            if self.eat_symbol(';') {
                continue;
            }
            let mut field = self.parse_field(arena, nested_types)?;
            field.is_extension = true;
            fields.push(field);
        }
        Ok(ExtendDeclaration {
            extendee: TypeRef::Unresolved(extendee),
            fields,
            location: loc,
        })
    }
}
