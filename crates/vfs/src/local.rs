use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{Deleted, DirectoryEntry, FileStore};
use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

/// Local filesystem store rooted at the workspace directory
#[derive(Clone)]
pub struct LocalFs {
    sandbox: Arc<PathSandbox>,
}

impl LocalFs {
    /// Create a local store, creating and canonicalizing `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_sandbox(PathSandbox::new(root)?))
    }

    pub fn with_sandbox(sandbox: PathSandbox) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
        }
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    /// Resolve lexically, then hand the blocking work to the thread pool
    /// with the symlink confinement check run first.
    async fn run<T, F>(&self, path: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PathSandbox, PathBuf, &str) -> Result<T> + Send + 'static,
    {
        let resolved = self.sandbox.resolve(path)?;
        let sandbox = self.sandbox.clone();
        let user_path = path.to_string();
        tokio::task::spawn_blocking(move || {
            sandbox.confine(&resolved, &user_path)?;
            op(&sandbox, resolved, user_path.as_str())
        })
        .await?
    }
}

fn list_blocking(
    sandbox: &PathSandbox,
    dir: &Path,
    user_path: &str,
) -> Result<Vec<DirectoryEntry>> {
    let meta = fs::metadata(dir).map_err(|e| FsError::from_io(e, user_path))?;
    if !meta.is_dir() {
        return Err(FsError::NotADirectory(user_path.to_string()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| FsError::from_io(e, user_path))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = sandbox.relative(&entry.path());

        // Follow symlinks for classification; a child removed mid-listing is skipped
        let meta = match fs::metadata(entry.path()) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        entries.push(if meta.is_dir() {
            DirectoryEntry::dir(name, rel)
        } else {
            DirectoryEntry::file(name, rel, meta.len())
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[async_trait]
impl FileStore for LocalFs {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        self.run(path, |sandbox, dir, user_path| list_blocking(sandbox, &dir, user_path))
            .await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn create(&self, path: &str) -> Result<()> {
        self.run(path, |_, target, user_path| {
            if target.is_dir() {
                return Err(FsError::IsADirectory(user_path.to_string()));
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| FsError::from_io(e, user_path))?;
            }
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&target)
                .map_err(|e| FsError::from_io(e, user_path))?;
            tracing::info!(path = %user_path, "File created");
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self, content), fields(bytes = content.len()), level = "debug")]
    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let content = content.to_owned();
        self.run(path, move |_, target, user_path| {
            if target.is_dir() {
                return Err(FsError::IsADirectory(user_path.to_string()));
            }
            fs::write(&target, content).map_err(|e| FsError::from_io(e, user_path))?;
            tracing::info!(path = %user_path, "Content written");
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn read(&self, path: &str) -> Result<String> {
        self.run(path, |_, target, user_path| {
            let meta = fs::metadata(&target).map_err(|e| FsError::from_io(e, user_path))?;
            if meta.is_dir() {
                return Err(FsError::IsADirectory(user_path.to_string()));
            }
            let bytes = fs::read(&target).map_err(|e| FsError::from_io(e, user_path))?;
            String::from_utf8(bytes).map_err(|_| FsError::NotText(user_path.to_string()))
        })
        .await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<Deleted> {
        self.run(path, |sandbox, target, user_path| {
            if sandbox.is_root(&target) {
                return Err(FsError::RootDeletion);
            }
            let meta =
                fs::symlink_metadata(&target).map_err(|e| FsError::from_io(e, user_path))?;
            let deleted = if meta.is_dir() {
                fs::remove_dir_all(&target).map_err(|e| FsError::from_io(e, user_path))?;
                Deleted::Directory
            } else {
                fs::remove_file(&target).map_err(|e| FsError::from_io(e, user_path))?;
                Deleted::File
            };
            tracing::info!(path = %user_path, kind = ?deleted, "Deleted");
            Ok(deleted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EntryType;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        fs.write("note.txt", "Hello, workspace!").await.unwrap();
        assert_eq!(fs.read("note.txt").await.unwrap(), "Hello, workspace!");

        // Full overwrite, not append
        fs.write("note.txt", "short").await.unwrap();
        assert_eq!(fs.read("note.txt").await.unwrap(), "short");
    }

    #[tokio::test]
    async fn test_create_truncates_existing() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        fs.write("keep.txt", "old content").await.unwrap();
        fs.create("keep.txt").await.unwrap();
        assert_eq!(fs.read("keep.txt").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_create_makes_parents_but_write_does_not() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        fs.create("deep/nested/file.txt").await.unwrap();
        assert!(dir.path().join("deep/nested/file.txt").is_file());

        let err = fs.write("missing/parent.txt", "x").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_directory_conflicts() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("plain.txt"), "x").unwrap();

        assert!(matches!(fs.write("sub", "x").await, Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.read("sub").await, Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.create("sub").await, Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.list("plain.txt").await, Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.list("nope").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_sorted_with_sizes() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("a/zdir")).unwrap();
        std::fs::write(dir.path().join("a/b.txt"), "12345").unwrap();

        let entries = fs.list("a").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirectoryEntry::file("b.txt", "a/b.txt", 5),
                DirectoryEntry::dir("zdir", "a/zdir"),
            ]
        );
        assert_eq!(entries[1].entry_type, EntryType::Directory);
    }

    #[tokio::test]
    async fn test_delete_recursive_and_root_guard() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        fs.create("tree/x/y.txt").await.unwrap();

        assert_eq!(fs.delete("tree").await.unwrap(), Deleted::Directory);
        assert!(matches!(fs.read("tree/x/y.txt").await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.delete("tree").await, Err(FsError::NotFound(_))));

        assert!(matches!(fs.delete("").await, Err(FsError::RootDeletion)));
        assert!(matches!(fs.delete("a/..").await, Err(FsError::RootDeletion)));
        assert!(dir.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_blocked() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "top secret").unwrap();

        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        assert!(matches!(
            fs.read("link/secret.txt").await,
            Err(FsError::PathTraversal(_))
        ));
        assert!(matches!(
            fs.write("link/secret.txt", "pwned").await,
            Err(FsError::PathTraversal(_))
        ));
        assert_eq!(
            std::fs::read_to_string(outside.path().join("secret.txt")).unwrap(),
            "top secret"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_escape_is_blocked() {
        let outside = tempdir().unwrap();
        let planted = outside.path().join("planted.txt");

        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(&planted, dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink("link", dir.path().join("chain")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("nodir"), dir.path().join("dirlink"))
            .unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        assert!(matches!(
            fs.write("link", "pwned").await,
            Err(FsError::PathTraversal(_))
        ));
        assert!(matches!(fs.create("link").await, Err(FsError::PathTraversal(_))));
        assert!(matches!(
            fs.write("chain", "pwned").await,
            Err(FsError::PathTraversal(_))
        ));
        assert!(matches!(
            fs.create("dirlink/sub/file.txt").await,
            Err(FsError::PathTraversal(_))
        ));
        assert!(!planted.exists());
        assert!(!outside.path().join("nodir").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_inside_root_is_allowed() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink("later.txt", dir.path().join("alias")).unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        fs.write("alias", "via link").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("later.txt")).unwrap(),
            "via link"
        );
    }

    #[tokio::test]
    async fn test_path_through_file_is_not_found() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("plain.txt"), "x").unwrap();

        assert!(matches!(fs.read("plain.txt/x").await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.list("plain.txt/x").await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.delete("plain.txt/x").await, Err(FsError::NotFound(_))));
        assert!(dir.path().join("plain.txt").is_file());
    }
}
