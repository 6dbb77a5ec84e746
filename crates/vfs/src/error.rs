//! Error taxonomy for sandboxed file operations

use std::io;

use thiserror::Error;

/// Outcome of a file operation that did not succeed
///
/// Variants carry the client-relative path so callers can log it without
/// exposing the absolute location of the workspace root.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("path traversal blocked: {0}")]
    PathTraversal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("refusing to delete the workspace root")]
    RootDeletion,

    #[error("not valid UTF-8 text: {0}")]
    NotText(String),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl FsError {
    /// Map an IO error for `path`, keeping races with concurrent removal
    /// as an ordinary `NotFound`. A path that runs through a regular file
    /// (`plain.txt/x`) names nothing, so it is `NotFound` too.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
                Self::NotFound(path.to_string())
            }
            _ => Self::Io(err),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err, "")
    }
}

impl From<tokio::task::JoinError> for FsError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(io::Error::other(err))
    }
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
