//! Per-user path containment.
//!
//! Every path a client sends is resolved here before any other filesystem
//! call is made with it. Resolution happens in two stages:
//!
//! 1. [`Sandbox::resolve_lexical`] normalises the candidate purely on the
//!    string level (no syscalls) and checks that the result lies inside the
//!    user root, comparing whole path components so that `/users/bob` never
//!    contains `/users/bob-evil`.
//! 2. [`Sandbox::resolve`] additionally canonicalises the deepest existing
//!    ancestor of the lexical result, so that a symlink placed inside the
//!    root cannot be used to reach a location outside of it.
//!
//! [`Sandbox::resolve_target`] is the variant used by operations that act on
//! the entry itself (delete, rename, move source). It refuses the root and
//! does not follow a symlink in the final component.

use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("path is outside of the user's storage")]
    PathEscape,
    #[error("the storage root cannot be modified")]
    RootProtected,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create `root` if it is missing, canonicalise it and wrap it.
    pub async fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root).await?;
        let root = tokio::fs::canonicalize(root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Normalise `candidate` against the root without touching the filesystem.
    ///
    /// Relative candidates are joined onto the root. Backslashes count as
    /// separators. `..` above the filesystem root stays at the filesystem root,
    /// which then fails containment like any other outside path.
    pub fn resolve_lexical(&self, candidate: &str) -> Result<PathBuf, SandboxError> {
        if candidate.contains('\0') {
            return Err(SandboxError::PathEscape);
        }

        let unified = candidate.replace('\\', "/");
        let candidate = Path::new(&unified);

        let mut resolved = if candidate.has_root() {
            PathBuf::new()
        } else {
            self.root.clone()
        };

        for component in candidate.components() {
            match component {
                Component::Prefix(_) => return Err(SandboxError::PathEscape),
                Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
            }
        }

        if self.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(SandboxError::PathEscape)
        }
    }

    /// Lexical resolution followed by a symlink check on the real filesystem.
    pub async fn resolve(&self, candidate: &str) -> Result<PathBuf, SandboxError> {
        let resolved = self.resolve_lexical(candidate)?;
        self.check_links(&resolved).await?;
        Ok(resolved)
    }

    /// Resolves an entry that is acted on itself rather than through, and
    /// refuses the root. Only the parent chain is checked for links, so a
    /// symlink can be deleted or moved wherever it points.
    pub async fn resolve_target(&self, candidate: &str) -> Result<PathBuf, SandboxError> {
        let resolved = self.resolve_lexical(candidate)?;
        if self.is_root(&resolved) {
            return Err(SandboxError::RootProtected);
        }
        if let Some(parent) = resolved.parent() {
            self.check_links(parent).await?;
        }
        Ok(resolved)
    }

    /// Resolve `name` as a direct child of an already resolved directory.
    pub async fn resolve_child(&self, parent: &Path, name: &str) -> Result<PathBuf, SandboxError> {
        let child = parent.join(name);
        let child = child.to_str().ok_or(SandboxError::PathEscape)?;
        self.resolve(child).await
    }

    /// Root-relative form of a resolved path, used in logs and messages so
    /// the server layout is never echoed back.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
            Err(_) => "<outside>".to_string(),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        // Component-wise, not a string prefix.
        path.starts_with(&self.root)
    }

    async fn check_links(&self, resolved: &Path) -> Result<(), SandboxError> {
        for ancestor in resolved.ancestors() {
            if !self.contains(ancestor) {
                break;
            }
            match tokio::fs::canonicalize(ancestor).await {
                Ok(real) => {
                    return if self.contains(&real) {
                        Ok(())
                    } else {
                        tracing::warn!(
                            path = %self.display(resolved),
                            "symlink points outside of the user root"
                        );
                        Err(SandboxError::PathEscape)
                    };
                }
                Err(_) => {
                    // A dangling link cannot be verified, so it is refused.
                    if let Ok(meta) = tokio::fs::symlink_metadata(ancestor).await {
                        if meta.file_type().is_symlink() {
                            return Err(SandboxError::PathEscape);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
