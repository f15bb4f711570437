//! A uniform read interface over an ordered list of search roots: plain
//! directories, zip/jar archives, and single files.

use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::location::Location;

/// One entry of a [`SourceSet`]'s ordered root list.
#[derive(Clone, Debug)]
pub enum SourceRoot {
    Directory(PathBuf),
    Archive(PathBuf),
    File(PathBuf),
}

impl SourceRoot {
    fn base(&self) -> String {
        match self {
            SourceRoot::Directory(p) | SourceRoot::Archive(p) | SourceRoot::File(p) => {
                p.to_string_lossy().into_owned()
            }
        }
    }
}

/// An ordered list of search roots. When
/// multiple roots contain the same import path the earliest one wins;
/// this ordering is preserved by [`SourceSet::locate`] and is part of the
/// compiler's observable contract.
pub struct SourceSet<FS: Filesystem> {
    roots: Vec<SourceRoot>,
    fs: FS,
}

impl<FS: Filesystem> SourceSet<FS> {
    pub fn new(roots: Vec<SourceRoot>, fs: FS) -> Self {
        SourceSet { roots, fs }
    }

    /// Classifies a root path using the injected [`Filesystem`], in the
    /// order directory, archive, then plain file.
    pub fn classify_root(fs: &FS, path: &Path) -> SourceRoot {
        if fs.is_directory(path) {
            SourceRoot::Directory(path.to_path_buf())
        } else if fs.is_archive(path) {
            SourceRoot::Archive(path.to_path_buf())
        } else {
            SourceRoot::File(path.to_path_buf())
        }
    }

    /// Finds `import_path` under the first root that contains it.
    pub fn locate(&self, import_path: &str) -> Result<(Location, String)> {
        for root in &self.roots {
            if let Some(found) = self.locate_in_root(root, import_path)? {
                return Ok(found);
            }
        }
        Err(Error::ImportNotFound {
            importing_file: Location::new("", ""),
            import_path: import_path.to_string(),
        })
    }

    fn locate_in_root(
        &self,
        root: &SourceRoot,
        import_path: &str,
    ) -> Result<Option<(Location, String)>> {
        match root {
            SourceRoot::Directory(dir) => {
                let full = dir.join(import_path);
                if !full.is_file() {
                    return Ok(None);
                }
                let text = read_to_string(&self.fs, &full)?;
                Ok(Some((Location::new(root.base(), import_path), text)))
            }
            SourceRoot::Archive(archive_path) => {
                let mut zip = open_zip(&self.fs, archive_path)?;
                match zip.by_name(import_path) {
                    Ok(mut entry) => {
                        let mut text = String::new();
                        entry
                            .read_to_string(&mut text)
                            .map_err(|source| Error::Io {
                                location: Location::new(root.base(), import_path.to_string()),
                                source,
                            })?;
                        Ok(Some((Location::new(root.base(), import_path), text)))
                    }
                    Err(_) => Ok(None),
                }
            }
            SourceRoot::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if name != import_path {
                    return Ok(None);
                }
                let text = read_to_string(&self.fs, path)?;
                Ok(Some((Location::new("", name), text)))
            }
        }
    }

    /// Enumerates every `.proto` file transitively under every root, in
    /// root order.
    pub fn enumerate_source_roots(&self) -> Result<Vec<(Location, String)>> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.enumerate_root(root, &mut out)?;
        }
        Ok(out)
    }

    fn enumerate_root(&self, root: &SourceRoot, out: &mut Vec<(Location, String)>) -> Result<()> {
        match root {
            SourceRoot::Directory(dir) => {
                self.walk_directory(dir, dir, &root.base(), out)?;
            }
            SourceRoot::Archive(archive_path) => {
                let mut zip = open_zip(&self.fs, archive_path)?;
                let names: Vec<String> = zip.file_names().map(str::to_string).collect();
                for name in names {
                    if !name.ends_with(".proto") {
                        continue;
                    }
                    let mut entry = zip.by_name(&name).expect("name came from this archive");
                    let mut text = String::new();
                    entry
                        .read_to_string(&mut text)
                        .map_err(|source| Error::Io {
                            location: Location::new(root.base(), name.clone()),
                            source,
                        })?;
                    out.push((Location::new(root.base(), name), text));
                }
            }
            SourceRoot::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let text = read_to_string(&self.fs, path)?;
                out.push((Location::new("", name), text));
            }
        }
        Ok(())
    }

    fn walk_directory(
        &self,
        base: &Path,
        dir: &Path,
        root_base: &str,
        out: &mut Vec<(Location, String)>,
    ) -> Result<()> {
        for entry in self.fs.list(dir).map_err(|source| Error::Io {
            location: Location::new(root_base.to_string(), dir.to_string_lossy().into_owned()),
            source,
        })? {
            if self.fs.is_directory(&entry) {
                self.walk_directory(base, &entry, root_base, out)?;
            } else if entry.extension().and_then(|e| e.to_str()) == Some("proto") {
                let rel = entry
                    .strip_prefix(base)
                    .unwrap_or(&entry)
                    .to_string_lossy()
                    .replace('\\', "/");
                let text = read_to_string(&self.fs, &entry)?;
                out.push((Location::new(root_base.to_string(), rel), text));
            }
        }
        Ok(())
    }
}

fn read_to_string<FS: Filesystem>(fs: &FS, path: &Path) -> Result<String> {
    let mut reader = fs.open(path).map_err(|source| Error::Io {
        location: Location::new("", path.to_string_lossy().into_owned()),
        source,
    })?;
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|source| Error::Io {
            location: Location::new("", path.to_string_lossy().into_owned()),
            source,
        })?;
    Ok(text)
}

fn open_zip<FS: Filesystem>(fs: &FS, path: &Path) -> Result<ZipArchive<FS::Reader>> {
    let reader = fs.open(path).map_err(|source| Error::Io {
        location: Location::new("", path.to_string_lossy().into_owned()),
        source,
    })?;
    ZipArchive::new(reader).map_err(|err| Error::Io {
        location: Location::new("", path.to_string_lossy().into_owned()),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFilesystem;
    use std::fs as stdfs;

    #[test]
    fn earlier_root_wins_on_conflicting_import_path() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        stdfs::create_dir_all(&first).unwrap();
        stdfs::create_dir_all(&second).unwrap();
        stdfs::write(first.join("a.proto"), "// first\n").unwrap();
        stdfs::write(second.join("a.proto"), "// second\n").unwrap();

        let roots = vec![
            SourceRoot::Directory(first),
            SourceRoot::Directory(second),
        ];
        let set = SourceSet::new(roots, OsFilesystem);
        let (_, text) = set.locate("a.proto").unwrap();
        assert_eq!(text, "// first\n");
    }

    #[test]
    fn locate_fails_with_import_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        stdfs::create_dir_all(tmp.path()).unwrap();
        let set = SourceSet::new(
            vec![SourceRoot::Directory(tmp.path().to_path_buf())],
            OsFilesystem,
        );
        let err = set.locate("missing.proto").unwrap_err();
        assert!(matches!(err, Error::ImportNotFound { .. }));
    }

    #[test]
    fn enumerate_walks_nested_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("pkg").join("sub");
        stdfs::create_dir_all(&nested).unwrap();
        stdfs::write(tmp.path().join("root.proto"), "message A {}").unwrap();
        stdfs::write(nested.join("leaf.proto"), "message B {}").unwrap();

        let set = SourceSet::new(
            vec![SourceRoot::Directory(tmp.path().to_path_buf())],
            OsFilesystem,
        );
        let mut files = set.enumerate_source_roots().unwrap();
        files.sort_by(|a, b| a.0.path.cmp(&b.0.path));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0.path, "pkg/sub/leaf.proto");
        assert_eq!(files[1].0.path, "root.proto");
    }

    #[test]
    fn single_file_root_locates_itself_by_basename() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("solo.proto");
        stdfs::write(&file, "message Solo {}").unwrap();

        let set = SourceSet::new(vec![SourceRoot::File(file)], OsFilesystem);
        let (_, text) = set.locate("solo.proto").unwrap();
        assert_eq!(text, "message Solo {}");
    }
}
