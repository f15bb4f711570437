//! Drives a [`SourceSet`] and the [`parser`] to build the full set of
//! `ProtoFile`s required to link the source path.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::location::Location;
use crate::parser::{self, ParsedFile};
use crate::source_set::SourceSet;
use crate::well_known::{self, DESCRIPTOR_PROTO_PATH};

/// The result of a loader run: every loaded file in stable, deterministic
/// order (source-path files first in enumeration order, then
/// imported/proto-path files in work-queue discovery order), plus the set
/// of paths that count as the "source set" for dispatch.
pub struct LoadResult {
    pub files: Vec<(Location, ParsedFile)>,
    pub source_paths: HashSet<String>,
}

pub struct SchemaLoader<FS: Filesystem> {
    source_set: SourceSet<FS>,
    proto_set: SourceSet<FS>,
}

impl<FS: Filesystem> SchemaLoader<FS> {
    pub fn new(source_set: SourceSet<FS>, proto_set: SourceSet<FS>) -> Self {
        SchemaLoader {
            source_set,
            proto_set,
        }
    }

    pub fn load(&self) -> Result<LoadResult> {
        let mut order: Vec<(Location, ParsedFile)> = Vec::new();
        let mut index_by_path: HashMap<String, usize> = HashMap::new();
        let mut source_paths: HashSet<String> = HashSet::new();
        let mut first_seen: HashMap<String, Location> = HashMap::new();
        let mut queue: VecDeque<(String, bool, Location)> = VecDeque::new();

        for (location, text) in self.source_set.enumerate_source_roots()? {
            if let Some(prior) = first_seen.get(&location.path) {
                if prior.base != location.base {
                    return Err(Error::DuplicatePath {
                        path: location.path.clone(),
                        first: prior.clone(),
                        second: location.clone(),
                    });
                }
                continue;
            }
            first_seen.insert(location.path.clone(), location.clone());

            let parsed = parser::parse(&text, &location.base, &location.path)?;
            for import in &parsed.imports {
                let weak = parsed.weak_imports.contains(import);
                queue.push_back((import.clone(), weak, location.clone()));
            }
            source_paths.insert(location.path.clone());
            index_by_path.insert(location.path.clone(), order.len());
            order.push((location, parsed));
        }

        queue.push_back((
            DESCRIPTOR_PROTO_PATH.to_string(),
            true,
            Location::new("", ""),
        ));

        while let Some((import_path, weak, importing_file)) = queue.pop_front() {
            if index_by_path.contains_key(&import_path) {
                continue;
            }
            // Claim the slot before parsing so a self-import or an import
            // cycle doesn't re-enqueue the same path forever.
            index_by_path.insert(import_path.clone(), order.len());

            let found = match self.locate_combined(&import_path) {
                Ok(found) => Some(found),
                Err(_) if import_path == DESCRIPTOR_PROTO_PATH => {
                    Some((well_known::location(), well_known::source().to_string()))
                }
                Err(_) if weak => None,
                Err(_) => {
                    return Err(Error::ImportNotFound {
                        importing_file,
                        import_path,
                    });
                }
            };

            let Some((location, text)) = found else {
                index_by_path.remove(&import_path);
                continue;
            };

            let parsed = parser::parse(&text, &location.base, &location.path)?;

            for import in &parsed.imports {
                let weak = parsed.weak_imports.contains(import);
                queue.push_back((import.clone(), weak, location.clone()));
            }
            order.push((location, parsed));
        }

        Ok(LoadResult {
            files: order,
            source_paths,
        })
    }

    fn locate_combined(&self, import_path: &str) -> Result<(Location, String)> {
        match self.source_set.locate(import_path) {
            Ok(found) => Ok(found),
            Err(_) => self.proto_set.locate(import_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFilesystem;
    use crate::source_set::SourceRoot;
    use std::fs as stdfs;

    fn loader_over(dir: &std::path::Path) -> SchemaLoader<OsFilesystem> {
        let source = SourceSet::new(
            vec![SourceRoot::Directory(dir.to_path_buf())],
            OsFilesystem,
        );
        let proto = SourceSet::new(vec![], OsFilesystem);
        SchemaLoader::new(source, proto)
    }

    #[test]
    fn loads_single_file_and_implicit_well_known() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(
            tmp.path().join("a.proto"),
            "package p;\nmessage M { int32 x = 1; }",
        )
        .unwrap();

        let loader = loader_over(tmp.path());
        let result = loader.load().unwrap();
        assert!(result.source_paths.contains("a.proto"));
        assert!(result
            .files
            .iter()
            .any(|(loc, _)| loc.path == DESCRIPTOR_PROTO_PATH));
    }

    #[test]
    fn follows_cross_file_import() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(
            tmp.path().join("a.proto"),
            "package p;\nimport \"q.proto\";\nmessage M { q.N n = 1; }",
        )
        .unwrap();
        stdfs::write(tmp.path().join("q.proto"), "package q;\nmessage N {}").unwrap();

        let loader = loader_over(tmp.path());
        let result = loader.load().unwrap();
        assert!(result.source_paths.contains("a.proto"));
        assert!(!result.source_paths.contains("q.proto"));
        assert!(result.files.iter().any(|(loc, _)| loc.path == "q.proto"));
    }

    #[test]
    fn missing_import_fails() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(
            tmp.path().join("a.proto"),
            "import \"missing.proto\";\nmessage M {}",
        )
        .unwrap();

        let loader = loader_over(tmp.path());
        let err = loader.load().unwrap_err();
        assert!(matches!(err, Error::ImportNotFound { .. }));
    }

    #[test]
    fn missing_weak_import_is_dropped_not_failed() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::write(
            tmp.path().join("a.proto"),
            "import weak \"missing.proto\";\nmessage M {}",
        )
        .unwrap();

        let loader = loader_over(tmp.path());
        let result = loader.load().unwrap();
        assert!(!result.files.iter().any(|(loc, _)| loc.path == "missing.proto"));
    }

    #[test]
    fn duplicate_path_across_source_roots_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        stdfs::create_dir_all(&first).unwrap();
        stdfs::create_dir_all(&second).unwrap();
        stdfs::write(first.join("a.proto"), "message A {}").unwrap();
        stdfs::write(second.join("a.proto"), "message A {}").unwrap();

        let source = SourceSet::new(
            vec![
                SourceRoot::Directory(first),
                SourceRoot::Directory(second),
            ],
            OsFilesystem,
        );
        let proto = SourceSet::new(vec![], OsFilesystem);
        let loader = SchemaLoader::new(source, proto);
        let err = loader.load().unwrap_err();
        assert!(matches!(err, Error::DuplicatePath { .. }));
    }
}
