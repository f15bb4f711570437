use std::fmt;

/// Identifies a position in a source file.
///
/// `base` names the root a file was loaded from (a directory, an archive
/// path, or the empty string for a root that is a single file or has no
/// meaningful base). `path` is forward-slash separated and relative to
/// `base`. `line` and `column` are 1-indexed and `-1` when unknown.
///
/// Equality and hashing are structural: two `Location`s naming the same
/// base/path/line/column compare equal regardless of how they were built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub base: String,
    pub path: String,
    pub line: i32,
    pub column: i32,
}

impl Location {
    /// Builds a `Location` with no line/column information, e.g. for a
    /// file as a whole before it has been parsed.
    pub fn new(base: impl Into<String>, path: impl Into<String>) -> Self {
        Location {
            base: base.into(),
            path: path.into(),
            line: -1,
            column: -1,
        }
    }

    /// Returns a copy of this `Location` pointing at a specific line/column.
    pub fn at(&self, line: i32, column: i32) -> Self {
        Location {
            base: self.base.clone(),
            path: self.path.clone(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.base.is_empty() {
            write!(f, "{}/", self.base)?;
        }
        write!(f, "{}", self.path)?;
        if self.line >= 0 {
            write!(f, ":{}", self.line)?;
            if self.column >= 0 {
                write!(f, ":{}", self.column)?;
            }
        }
        Ok(())
    }
}
