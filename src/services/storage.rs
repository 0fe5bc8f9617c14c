use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::models::file::{FileSystemEntry, StorageUsage, UploadedFile};
use crate::storage::{archive, quota, staging, template, tree, Sandbox, SandboxError};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("storage quota exceeded: {required} bytes needed, {max} allowed")]
    QuotaExceeded { required: u64, max: u64 },
    #[error("{0}")]
    Validation(String),
    #[error("{0} is not a file")]
    NotAFile(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("{0} is not valid UTF-8 text")]
    InvalidEncoding(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StorageError {
    fn from_io(err: io::Error, shown: String) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(shown),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(shown),
            _ => StorageError::Io(err),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// What `GET /api/download` streams back.
pub enum Download {
    File { file: fs::File, name: String, len: u64 },
    Archive { file: fs::File, name: String },
}

/// Filesystem operations on per-user roots below a common base directory.
///
/// Every path argument goes through the caller's [`Sandbox`] before any
/// other filesystem call. Usage is recomputed from disk on every quota
/// decision; two concurrent uploads can both pass against the same figure.
pub struct StorageService {
    base_dir: PathBuf,
    quota_bytes: u64,
    template_dir: Option<PathBuf>,
}

impl StorageService {
    pub async fn new(base_dir: impl AsRef<Path>, quota_bytes: u64) -> io::Result<Self> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir).await?;
        let base_dir = fs::canonicalize(base_dir).await?;
        tracing::info!(base_dir = %base_dir.display(), quota_bytes, "storage ready");
        Ok(Self {
            base_dir,
            quota_bytes,
            template_dir: None,
        })
    }

    /// Home directories created from now on start as a copy of `template_dir`.
    pub fn with_template_dir(mut self, template_dir: Option<PathBuf>) -> Self {
        self.template_dir = template_dir;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn user_root(&self, username: &str) -> StorageResult<PathBuf> {
        let username = utils::normalize_username(username).map_err(StorageError::Validation)?;
        Ok(self.base_dir.join(username))
    }

    /// The sandbox for `username`, creating the home directory on first use.
    pub async fn sandbox_for(&self, username: &str) -> StorageResult<Sandbox> {
        let root = self.user_root(username)?;
        let fresh = match fs::symlink_metadata(&root).await {
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        let sandbox = Sandbox::open(&root).await?;
        if !sandbox.root().starts_with(&self.base_dir) {
            return Err(SandboxError::PathEscape.into());
        }
        if fresh {
            self.provision(&sandbox).await;
        }
        Ok(sandbox)
    }

    /// Fills a new home from the template directory. Failures leave the
    /// home as it is; they never fail the request that created it.
    async fn provision(&self, sandbox: &Sandbox) {
        let Some(template_dir) = self.template_dir.clone() else {
            return;
        };
        let dest = sandbox.root().to_path_buf();
        let max = self.quota_bytes;
        let result = tokio::task::spawn_blocking(move || -> io::Result<Option<u64>> {
            if quota::directory_size(&template_dir)? > max {
                return Ok(None);
            }
            template::copy_template(&template_dir, &dest).map(Some)
        })
        .await;

        match result {
            Ok(Ok(Some(bytes))) => tracing::info!(bytes, "home provisioned from template"),
            Ok(Ok(None)) => tracing::warn!(max, "template exceeds the quota; home left empty"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to copy template into new home"),
            Err(e) => tracing::warn!(error = %e, "template copy task failed"),
        }
    }

    /// Moves a user's home directory after a username change.
    pub async fn rename_user_root(&self, old: &str, new: &str) -> StorageResult<()> {
        let from = self.user_root(old)?;
        let to = self.user_root(new)?;
        if fs::symlink_metadata(&to).await.is_ok() {
            return Err(StorageError::AlreadyExists(format!("home directory for '{new}'")));
        }
        match fs::rename(&from, &to).await {
            Ok(()) => Ok(()),
            // Never created yet; the next request creates it under the new name.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_tree(&self, sandbox: &Sandbox) -> StorageResult<FileSystemEntry> {
        let root = sandbox.root().to_path_buf();
        let entry = tokio::task::spawn_blocking(move || tree::build_tree(&root)).await??;
        Ok(entry)
    }

    pub async fn usage(&self, sandbox: &Sandbox) -> StorageResult<StorageUsage> {
        Ok(StorageUsage {
            used: self.current_usage(sandbox).await?,
            max: self.quota_bytes,
        })
    }

    async fn current_usage(&self, sandbox: &Sandbox) -> StorageResult<u64> {
        let root = sandbox.root().to_path_buf();
        let used = tokio::task::spawn_blocking(move || quota::directory_size(&root)).await??;
        Ok(used)
    }

    async fn check_quota(&self, sandbox: &Sandbox, replaced: u64, added: u64) -> StorageResult<u64> {
        let used = self.current_usage(sandbox).await?;
        quota::projected_usage(used, replaced, added, self.quota_bytes).ok_or(
            StorageError::QuotaExceeded {
                required: used.saturating_sub(replaced).saturating_add(added),
                max: self.quota_bytes,
            },
        )
    }

    pub async fn read_text(&self, sandbox: &Sandbox, path: &str) -> StorageResult<String> {
        let path = sandbox.resolve(path).await?;
        let shown = sandbox.display(&path);

        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(shown));
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidEncoding(shown))
    }

    /// Creates or overwrites a text file. The parent directory must exist.
    pub async fn write_text(&self, sandbox: &Sandbox, path: &str, content: &str) -> StorageResult<()> {
        let path = sandbox.resolve(path).await?;
        let shown = sandbox.display(&path);

        let replaced = match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(StorageError::NotAFile(shown)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let projected = self
            .check_quota(sandbox, replaced, content.len() as u64)
            .await?;

        fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;

        tracing::info!(path = %shown, bytes = content.len(), used = projected, "file written");
        Ok(())
    }

    /// Creates an empty file (fails if it exists) or a directory (succeeds if
    /// it already exists) named `name` inside `parent`.
    pub async fn create_entry(
        &self,
        sandbox: &Sandbox,
        parent: &str,
        name: &str,
        is_directory: bool,
    ) -> StorageResult<PathBuf> {
        let name = utils::validate_entry_name(name).map_err(StorageError::Validation)?;
        let parent = sandbox.resolve(parent).await?;
        let target = sandbox.resolve_child(&parent, name).await?;
        let shown = sandbox.display(&target);

        if is_directory {
            fs::create_dir_all(&target)
                .await
                .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        } else {
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
                .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        }

        tracing::info!(path = %shown, is_directory, "entry created");
        Ok(target)
    }

    /// Recursive delete. A symlink is removed itself, never its target.
    pub async fn delete(&self, sandbox: &Sandbox, path: &str) -> StorageResult<()> {
        let path = sandbox.resolve_target(path).await?;
        let shown = sandbox.display(&path);

        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removed.map_err(|e| StorageError::from_io(e, shown.clone()))?;

        tracing::info!(path = %shown, "entry deleted");
        Ok(())
    }

    /// Renames an entry within its parent. An existing entry with the new
    /// name is never replaced.
    pub async fn rename(&self, sandbox: &Sandbox, path: &str, new_name: &str) -> StorageResult<PathBuf> {
        let new_name = utils::validate_entry_name(new_name).map_err(StorageError::Validation)?;
        let source = sandbox.resolve_target(path).await?;
        let shown = sandbox.display(&source);

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;

        let parent = source.parent().ok_or(SandboxError::RootProtected)?;
        let dest = sandbox.resolve_child(parent, new_name).await?;
        if dest == source {
            return Ok(dest);
        }

        self.ensure_vacant(sandbox, &dest).await?;
        fs::rename(&source, &dest)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;

        tracing::info!(from = %shown, to = %sandbox.display(&dest), "entry renamed");
        Ok(dest)
    }

    /// Moves an entry into `target`, keeping its name.
    pub async fn move_entry(&self, sandbox: &Sandbox, path: &str, target: &str) -> StorageResult<PathBuf> {
        let source = sandbox.resolve_target(path).await?;
        let target = sandbox.resolve(target).await?;
        let shown = sandbox.display(&source);

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        self.ensure_directory(sandbox, &target).await?;

        if target.starts_with(&source) {
            return Err(StorageError::Validation(
                "cannot move a directory into itself".to_string(),
            ));
        }

        let name = source.file_name().ok_or(SandboxError::RootProtected)?;
        let dest = target.join(name);
        if dest == source {
            return Ok(dest);
        }

        self.ensure_vacant(sandbox, &dest).await?;
        fs::rename(&source, &dest)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;

        tracing::info!(from = %shown, to = %sandbox.display(&dest), "entry moved");
        Ok(dest)
    }

    /// Writes a batch of uploaded files into `parent`, replacing existing
    /// files of the same name.
    ///
    /// Every destination is validated and the quota checked before anything
    /// is written. The batch lands as a whole or not at all; see
    /// [`staging::commit_batch`].
    pub async fn upload(
        &self,
        sandbox: &Sandbox,
        parent: &str,
        files: Vec<UploadedFile>,
    ) -> StorageResult<Vec<PathBuf>> {
        if files.is_empty() {
            return Err(StorageError::Validation("no files were uploaded".to_string()));
        }

        let parent = sandbox.resolve(parent).await?;
        self.ensure_directory(sandbox, &parent).await?;

        let mut staged: Vec<(PathBuf, bytes::Bytes)> = Vec::with_capacity(files.len());
        for file in files {
            let name = utils::validate_entry_name(&file.name)
                .map_err(|e| StorageError::Validation(format!("{}: {e}", file.name)))?;
            let dest = sandbox.resolve_child(&parent, name).await?;
            if staged.iter().any(|(d, _)| *d == dest) {
                return Err(StorageError::Validation(format!(
                    "{} is uploaded more than once",
                    file.name
                )));
            }
            if let Ok(meta) = fs::symlink_metadata(&dest).await {
                if !meta.is_file() {
                    return Err(StorageError::NotAFile(sandbox.display(&dest)));
                }
            }
            staged.push((dest, file.data));
        }

        let added: u64 = staged.iter().map(|(_, data)| data.len() as u64).sum();
        let projected = self.check_quota(sandbox, 0, added).await?;

        let dir = parent.clone();
        let written =
            tokio::task::spawn_blocking(move || staging::commit_batch(&dir, staged)).await??;

        tracing::info!(
            parent = %sandbox.display(&parent),
            files = written.len(),
            bytes = added,
            used = projected,
            "upload stored"
        );
        Ok(written)
    }

    /// Opens a file for streaming, or zips a directory into a temp file.
    pub async fn download(&self, sandbox: &Sandbox, path: &str) -> StorageResult<Download> {
        let path = sandbox.resolve(path).await?;
        let shown = sandbox.display(&path);

        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        let base_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());

        if meta.is_dir() {
            let dir = path.clone();
            let spool = tokio::task::spawn_blocking(move || archive::zip_directory(&dir)).await??;
            tracing::info!(path = %shown, "directory archived for download");
            Ok(Download::Archive {
                file: fs::File::from_std(spool),
                name: format!("{base_name}.zip"),
            })
        } else if meta.is_file() {
            let file = fs::File::open(&path)
                .await
                .map_err(|e| StorageError::from_io(e, shown.clone()))?;
            Ok(Download::File {
                file,
                name: base_name,
                len: meta.len(),
            })
        } else {
            Err(StorageError::NotFound(shown))
        }
    }

    async fn ensure_directory(&self, sandbox: &Sandbox, path: &Path) -> StorageResult<()> {
        let shown = sandbox.display(path);
        let meta = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(e, shown.clone()))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::NotADirectory(shown))
        }
    }

    async fn ensure_vacant(&self, sandbox: &Sandbox, path: &Path) -> StorageResult<()> {
        match fs::symlink_metadata(path).await {
            Ok(_) => Err(StorageError::AlreadyExists(sandbox.display(path))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
