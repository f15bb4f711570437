//! The error taxonomy for the schema compilation pipeline.
//!
//! Parse and I/O errors surface immediately with the offending [`Location`].
//! Linker errors are accumulated and surfaced once as [`Error::LinkFailure`]
//! so that a single run reports every problem it finds; pruning errors halt
//! the pass at the first offender.

use thiserror::Error;

use crate::location::Location;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{location}: {source}")]
    Io {
        location: Location,
        #[source]
        source: std::io::Error,
    },

    #[error("{location}: {message}")]
    Parse { location: Location, message: String },

    #[error("{importing_file}: import not found: {import_path}")]
    ImportNotFound {
        importing_file: Location,
        import_path: String,
    },

    #[error(
        "duplicate path: '{path}' is provided by both {first} and {second}"
    )]
    DuplicatePath {
        path: String,
        first: Location,
        second: Location,
    },

    #[error("duplicate declaration of '{name}', first declared at {first}, again at {second}")]
    DuplicateType {
        name: String,
        first: Location,
        second: Location,
    },

    #[error("{from}: unresolved reference: {name}")]
    UnresolvedReference { name: String, from: Location },

    #[error("{location}: {message}")]
    Validation { location: Location, message: String },

    #[error("pruning left enum '{0}' with no constants")]
    EmptyEnum(String),

    #[error("{} error(s) while linking:\n{}", .0.len(), render_many(.0))]
    LinkFailure(Vec<Error>),
}

fn render_many(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Wraps a non-empty list of errors collected during linking into a
    /// single aggregate error. Panics if `errors` is empty; callers are
    /// expected to branch on emptiness themselves (see [`crate::linker`]).
    pub fn link_failure(errors: Vec<Error>) -> Error {
        assert!(!errors.is_empty(), "link_failure called with no errors");
        Error::LinkFailure(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_failure_renders_each_error() {
        let err = Error::link_failure(vec![
            Error::UnresolvedReference {
                name: "foo.Bar".into(),
                from: Location::new("proto", "a.proto"),
            },
            Error::EmptyEnum("foo.Baz".into()),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("2 error(s)"));
        assert!(rendered.contains("foo.Bar"));
        assert!(rendered.contains("foo.Baz"));
    }

    #[test]
    #[should_panic]
    fn link_failure_requires_errors() {
        let _ = Error::link_failure(vec![]);
    }
}
