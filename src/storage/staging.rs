use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::{Builder, NamedTempFile, TempPath};

/// Writes every `(dest, data)` pair into `dir` as one unit.
///
/// All contents are written to temp files before the first destination is
/// touched. An existing destination is moved aside before its replacement
/// lands; if any step fails, the destinations already written are put back
/// the way they were.
pub fn commit_batch(dir: &Path, files: Vec<(PathBuf, Bytes)>) -> io::Result<Vec<PathBuf>> {
    let mut staged = Vec::with_capacity(files.len());
    for (dest, data) in files {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        staged.push((tmp, dest));
    }

    let mut placed: Vec<(PathBuf, Option<TempPath>)> = Vec::with_capacity(staged.len());
    for (tmp, dest) in staged {
        match place(dir, tmp, &dest) {
            Ok(backup) => placed.push((dest, backup)),
            Err(e) => {
                roll_back(placed);
                return Err(e);
            }
        }
    }

    // Dropping the backups deletes the replaced contents.
    Ok(placed.into_iter().map(|(dest, _)| dest).collect())
}

fn place(dir: &Path, tmp: NamedTempFile, dest: &Path) -> io::Result<Option<TempPath>> {
    let backup = match fs::symlink_metadata(dest) {
        Ok(_) => {
            let backup = Builder::new()
                .prefix(".replaced-")
                .tempfile_in(dir)?
                .into_temp_path();
            fs::rename(dest, &backup)?;
            Some(backup)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    match tmp.persist(dest) {
        Ok(_) => Ok(backup),
        Err(e) => {
            if let Some(backup) = backup {
                restore(backup, dest);
            }
            Err(e.error)
        }
    }
}

fn roll_back(placed: Vec<(PathBuf, Option<TempPath>)>) {
    for (dest, backup) in placed.into_iter().rev() {
        match backup {
            Some(backup) => restore(backup, &dest),
            None => {
                if let Err(e) = fs::remove_file(&dest) {
                    tracing::error!(path = %dest.display(), error = %e, "failed to remove partial upload");
                }
            }
        }
    }
}

/// A backup that cannot be moved back is kept on disk rather than deleted.
fn restore(backup: TempPath, dest: &Path) {
    if let Err(e) = fs::rename(&backup, dest) {
        let kept = backup.keep().ok();
        tracing::error!(
            path = %dest.display(),
            backup = ?kept,
            error = %e,
            "failed to restore replaced file"
        );
    }
}
