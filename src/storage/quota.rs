use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Total size of the regular files below `root`. Symlinks are not followed.
pub fn directory_size(root: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Usage after a change that removes `replaced` bytes and adds `added`.
/// `None` when it would not fit under `max`.
pub fn projected_usage(used: u64, replaced: u64, added: u64, max: u64) -> Option<u64> {
    let projected = used.saturating_sub(replaced).checked_add(added)?;
    (projected <= max).then_some(projected)
}
