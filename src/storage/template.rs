use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copies the contents of `template` into `dest`, returning the bytes copied.
///
/// Files that already exist in `dest` are left alone. Symlinks inside the
/// template are skipped.
pub fn copy_template(template: &Path, dest: &Path) -> io::Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(template).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(template)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            let mut out = match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(out) => out,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            let mut input = File::open(entry.path())?;
            copied += io::copy(&mut input, &mut out)?;
        }
    }
    Ok(copied)
}
