use std::path::PathBuf;

use thiserror::Error;

/// Problems with the generator's own configuration, found before any input is read.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no target base filename given")]
    EmptyTarget,

    #[error("invalid namespace {namespace:?}: segment {segment:?} is not an identifier")]
    InvalidNamespace { namespace: String, segment: String },

    #[error("the backup file marker cannot be empty")]
    EmptyBackupMarker,

    #[error("resource name {name:?} does not form a valid identifier")]
    InvalidIdentifier { name: String },

    #[error("unknown error mode {0:?} (expected \"framework\" or \"system\")")]
    UnknownErrorMode(String),
}

/// Fatal problems discovered while walking the declared resources.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("Non existing path: {}", .0.display())]
    MissingPath(PathBuf),

    #[error("Not a regular file, nor a directory: {}", .0.display())]
    UnsupportedKind(PathBuf),

    #[error("Twice the same resource: {0}")]
    DuplicateIdentifier(String),

    #[error("Twice the same filename (check case): {path} in {resource}")]
    DuplicateVirtualPath { resource: String, path: String },

    #[error("Path in a directory with an upcase letter: {0}")]
    UpperCasePath(String),

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}
