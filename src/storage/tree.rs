use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use crate::models::file::FileSystemEntry;

/// Builds the nested listing of `root`. Blocking; run it on the blocking pool.
///
/// Symlinks are neither followed nor listed. An unreadable directory anywhere
/// in the tree fails the whole listing.
pub fn build_tree(root: &Path) -> io::Result<FileSystemEntry> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let children = list_children(root)?;
    Ok(FileSystemEntry::directory(
        name,
        root.to_string_lossy().into_owned(),
        children,
    ))
}

fn list_children(dir: &Path) -> io::Result<Vec<FileSystemEntry>> {
    let mut nodes = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let display = path.to_string_lossy().into_owned();

        if file_type.is_symlink() {
            continue;
        }

        if file_type.is_dir() {
            nodes.push(FileSystemEntry::directory(name, display, list_children(&path)?));
        } else if file_type.is_file() {
            let size = entry.metadata()?.len();
            nodes.push(FileSystemEntry::file(name, display, size));
        }
    }

    nodes.sort_by(|a, b| match (a.is_directory, b.is_directory) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    Ok(nodes)
}
