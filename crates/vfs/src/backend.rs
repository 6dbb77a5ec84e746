use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// One immediate child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Slash-separated path relative to the workspace root
    pub path: String,
    /// Byte size for files, 0 for directories
    pub size: u64,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
            path: path.into(),
            size,
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
            path: path.into(),
            size: 0,
        }
    }
}

/// What a successful delete removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    File,
    Directory,
}

/// File store trait - every workspace operation goes through this
///
/// Paths are client-relative and untrusted; implementations resolve them
/// through a [`crate::PathSandbox`] before touching storage.
///
/// No ordering is guaranteed between concurrent calls on the same path:
/// writers race last-writer-wins, and an operation racing a delete may
/// observe `NotFound`.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List immediate children of a directory, sorted by name
    async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>>;

    /// Create an empty file, making missing parent directories.
    /// An existing file is truncated.
    async fn create(&self, path: &str) -> Result<()>;

    /// Replace the entire content of a file, creating it if absent.
    /// Parent directories are not created.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Read the entire content of a text file
    async fn read(&self, path: &str) -> Result<String>;

    /// Delete a file, or a directory with everything below it
    async fn delete(&self, path: &str) -> Result<Deleted>;
}
