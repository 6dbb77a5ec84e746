//! Path sandbox for the workspace root
//!
//! Every client-supplied path is resolved here before any filesystem call.
//! Resolution is lexical: `.` and `..` are folded against the segments
//! accumulated *under* the root, so a path can never climb above it, not
//! even temporarily. Containment is checked component-wise, which keeps a
//! sibling such as `/workspace-evil` out when the root is `/workspace`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, Result};

/// Characters treated as separators in client paths, on every platform
const SEPARATORS: &[char] = &['/', '\\'];

/// The canonical workspace root and the rules for staying inside it
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Open a sandbox at `root`, creating the directory if it is missing
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// Wrap an already-canonical absolute root without touching the disk
    pub fn from_canonical(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client-relative path to an absolute path under the root
    ///
    /// Leading separators are dropped so `/etc/passwd` means
    /// `<root>/etc/passwd`. The empty string resolves to the root itself.
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf> {
        let mut segments: Vec<&str> = Vec::new();

        for segment in user_path.trim_start_matches(SEPARATORS).split(SEPARATORS) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(FsError::PathTraversal(user_path.to_string()));
                    }
                }
                name => {
                    // Drive prefixes and the like must not replace the root
                    let mut components = Path::new(name).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => segments.push(name),
                        _ => return Err(FsError::PathTraversal(user_path.to_string())),
                    }
                }
            }
        }

        let resolved: PathBuf = segments
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment));

        if !self.contains(&resolved) {
            return Err(FsError::PathTraversal(user_path.to_string()));
        }

        Ok(resolved)
    }

    /// Component-wise ancestor test: true for the root and its descendants
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Slash-separated form of `resolved` relative to the root, without a
    /// leading slash. Empty for the root itself.
    pub fn relative(&self, resolved: &Path) -> String {
        resolved
            .strip_prefix(&self.root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }

    /// Reject a resolved path that a symlink redirects out of the root,
    /// including dangling links whose target does not exist yet.
    ///
    /// Touches the filesystem; call from a blocking context. The check is
    /// not atomic with the operation that follows it.
    pub fn confine(&self, resolved: &Path, user_path: &str) -> Result<()> {
        self.confine_within(resolved, user_path, 0)
    }

    fn confine_within(&self, resolved: &Path, user_path: &str, hops: usize) -> Result<()> {
        if hops > MAX_LINK_HOPS {
            return Err(FsError::PathTraversal(user_path.to_string()));
        }

        let mut cursor = Some(resolved);
        while let Some(candidate) = cursor {
            match candidate.canonicalize() {
                Ok(real) if self.contains(&real) => return Ok(()),
                Ok(_) => return Err(FsError::PathTraversal(user_path.to_string())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if let Some(target) = dangling_link_target(candidate)? {
                        return self.confine_within(&target, user_path, hops + 1);
                    }
                    cursor = candidate.parent();
                }
                Err(e) => return Err(FsError::from_io(e, user_path)),
            }
        }
        Err(FsError::PathTraversal(user_path.to_string()))
    }
}

/// Symlink chains longer than this are treated as escapes
const MAX_LINK_HOPS: usize = 40;

/// Where a dangling symlink at `link` points, made absolute against the
/// link's (existing, canonical) parent. `None` if `link` is not a symlink.
fn dangling_link_target(link: &Path) -> Result<Option<PathBuf>> {
    let is_link = match fs::symlink_metadata(link) {
        Ok(meta) => meta.file_type().is_symlink(),
        Err(_) => false,
    };
    if !is_link {
        return Ok(None);
    }

    let target = fs::read_link(link)?;
    let base = match link.parent() {
        Some(parent) => parent.canonicalize()?,
        None => PathBuf::new(),
    };
    Ok(Some(normalize_lexically(&base.join(target))))
}

/// Fold `.` and `..` without touching the disk
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
