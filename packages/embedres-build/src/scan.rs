use std::{
    collections::HashSet,
    ffi::OsStr,
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::{
    Options,
    config::{ResourceSpec, is_identifier},
    error::{ConfigError, ScanError},
};

pub fn scan(opts: &mut Options) -> Result<Catalog> {
    let specs = opts.resources().to_vec();
    Scanner::new(opts).scan(specs)
}

/// Every resource discovered for one run, indexed in discovery order.
#[derive(Debug, Default)]
pub struct Catalog {
    files: Vec<FileResource>,
    directories: Vec<DirectoryResource>,
    len: usize,
}

impl Catalog {
    pub fn files(&self) -> &[FileResource] {
        &self.files
    }

    pub fn directories(&self) -> &[DirectoryResource] {
        &self.directories
    }

    pub fn file(&self, identifier: &str) -> Option<&FileResource> {
        self.files.iter().find(|f| f.identifier == identifier)
    }

    pub fn directory(&self, identifier: &str) -> Option<&DirectoryResource> {
        self.directories.iter().find(|d| d.identifier == identifier)
    }

    /// Number of embedded files, counting every directory entry.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All embedded files, standalone or inside a directory, in index order.
    pub fn embedded(&self) -> Vec<&EmbeddedFile> {
        let mut embedded: Vec<_> = self
            .files
            .iter()
            .map(|f| &f.file)
            .chain(
                self.directories
                    .iter()
                    .flat_map(|d| d.entries.iter().map(|e| &e.file)),
            )
            .collect();
        embedded.sort_by_key(|f| f.index);
        embedded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub index: usize,
    pub source_path: PathBuf,
    pub byte_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResource {
    pub identifier: String,
    pub file: EmbeddedFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryResource {
    pub identifier: String,
    pub source_path: PathBuf,
    /// Entries in discovery order.
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryResource {
    pub fn get(&self, virtual_path: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.virtual_path == virtual_path)
    }

    /// Virtual paths sorted lexicographically.
    pub fn list(&self) -> Vec<&str> {
        let mut paths: Vec<_> = self.entries.iter().map(|e| e.virtual_path.as_str()).collect();
        paths.sort_unstable();
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub virtual_path: String,
    pub file: EmbeddedFile,
}

struct Scanner<'a> {
    opts: &'a mut Options,
    next_index: usize,
    identifiers: HashSet<String>,
    files: Vec<FileResource>,
    directories: Vec<DirectoryResource>,
}

impl<'a> Scanner<'a> {
    fn new(opts: &'a mut Options) -> Self {
        Self {
            opts,
            next_index: 0,
            identifiers: HashSet::new(),
            files: vec![],
            directories: vec![],
        }
    }

    fn scan(mut self, specs: Vec<ResourceSpec>) -> Result<Catalog> {
        for spec in specs {
            self.scan_resource(spec)?;
        }
        Ok(Catalog {
            files: self.files,
            directories: self.directories,
            len: self.next_index,
        })
    }

    fn scan_resource(&mut self, spec: ResourceSpec) -> Result<()> {
        let identifier = spec.name.to_uppercase();
        if !is_identifier(&identifier) {
            return Err(ConfigError::InvalidIdentifier { name: spec.name }.into());
        }

        let metadata = match fs::metadata(&spec.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScanError::MissingPath(spec.path).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("could not stat {}", spec.path.display()));
            }
        };

        if !self.identifiers.insert(identifier.clone()) {
            return Err(ScanError::DuplicateIdentifier(identifier).into());
        }

        if metadata.is_dir() {
            debug!("scanning directory {} as {identifier}", spec.path.display());
            let mut entries = vec![];
            let mut seen = HashSet::new();
            self.walk(&identifier, &spec.path, &spec.path, &mut entries, &mut seen)?;
            self.directories.push(DirectoryResource {
                identifier,
                source_path: spec.path,
                entries,
            });
        } else if metadata.is_file() {
            debug!("embedding file {} as {identifier}", spec.path.display());
            self.opts.track_input(&spec.path);
            let file = self.embed(spec.path, metadata.len());
            self.files.push(FileResource { identifier, file });
        } else {
            return Err(ScanError::UnsupportedKind(spec.path).into());
        }
        Ok(())
    }

    fn embed(&mut self, source_path: PathBuf, byte_length: u64) -> EmbeddedFile {
        let index = self.next_index;
        self.next_index += 1;
        EmbeddedFile {
            index,
            source_path,
            byte_length,
        }
    }

    // Top-down: a level's files get their indices before any of its children.
    fn walk(
        &mut self,
        resource: &str,
        root: &Path,
        dir: &Path,
        entries: &mut Vec<DirectoryEntry>,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        self.opts.track_input(dir);

        let mut files = vec![];
        let mut dirs = vec![];
        let listing =
            fs::read_dir(dir).with_context(|| format!("could not list {}", dir.display()))?;
        for entry in listing {
            let entry = entry.with_context(|| format!("could not list {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("could not stat {}", path.display()))?;
            if file_type.is_dir() {
                dirs.push((entry.file_name(), path));
            } else if file_type.is_file() {
                files.push((entry.file_name(), path));
            } else if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(target) if target.is_file() => files.push((entry.file_name(), path)),
                    Ok(target) if target.is_dir() => {
                        debug!("not following linked directory {}", path.display());
                    }
                    _ => warn!("Ignoring dangling link: {}", path.display()),
                }
            } else {
                warn!("Ignoring special file: {}", path.display());
            }
        }
        files.sort();
        dirs.sort();

        for (name, path) in files {
            if is_backup_file(&name, self.opts.backup_marker()) {
                debug!("skipping backup file {}", path.display());
                continue;
            }

            let relative = path.strip_prefix(root)?;
            let virtual_path = virtual_path(relative)?;
            if self.opts.upcase_check() && virtual_path.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(ScanError::UpperCasePath(virtual_path).into());
            }
            if !seen.insert(virtual_path.to_lowercase()) {
                return Err(ScanError::DuplicateVirtualPath {
                    resource: resource.to_string(),
                    path: virtual_path,
                }
                .into());
            }

            self.opts.track_input(&path);
            let byte_length = fs::metadata(&path)
                .with_context(|| format!("could not stat {}", path.display()))?
                .len();
            entries.push(DirectoryEntry {
                virtual_path,
                file: self.embed(path, byte_length),
            });
        }

        for (name, path) in dirs {
            if name.to_string_lossy().starts_with('.') {
                warn!("Ignoring folder: {}", path.display());
                continue;
            }
            self.walk(resource, root, &path, entries, seen)?;
        }
        Ok(())
    }
}

fn is_backup_file(name: &OsStr, marker: &str) -> bool {
    name.to_string_lossy().contains(marker)
}

/// `/`-prefixed, forward-slash form of a path relative to a directory resource.
fn virtual_path(relative: &Path) -> Result<String, ScanError> {
    let mut result = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| ScanError::NonUtf8Path(relative.to_path_buf()))?;
            result.push('/');
            result.push_str(part);
        }
    }
    Ok(result)
}
