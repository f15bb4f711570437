//! The `Filesystem` interface the core consumes.
//!
//! The core never touches `std::fs` directly outside of this module's
//! default implementation; [`SourceSet`](crate::source_set::SourceSet) is
//! generic over [`Filesystem`] so tests can substitute an in-memory one.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub trait Filesystem {
    type Reader: Read;

    fn open(&self, path: &Path) -> io::Result<Self::Reader>;
    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    fn is_directory(&self, path: &Path) -> bool;
    fn is_archive(&self, path: &Path) -> bool;
}

/// The default, OS-backed [`Filesystem`]. Archives are recognized by a
/// `.zip`/`.jar` extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    type Reader = fs::File;

    fn open(&self, path: &Path) -> io::Result<fs::File> {
        fs::File::open(path)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_archive(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("zip") | Some("jar")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_filesystem_recognizes_archive_extensions() {
        let fs = OsFilesystem;
        assert!(fs.is_archive(Path::new("deps.jar")));
        assert!(fs.is_archive(Path::new("deps.zip")));
        assert!(!fs.is_archive(Path::new("deps.proto")));
    }
}
