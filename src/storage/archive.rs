use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Writes a zip of everything below `dir` into an anonymous temp file and
/// returns it rewound to the start. Entry names are relative to `dir` and use
/// `/` separators. Symlinks are skipped.
pub fn zip_directory(dir: &Path) -> zip::result::ZipResult<File> {
    let spool = tempfile::tempfile()?;
    let mut writer = ZipWriter::new(spool);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let name = archive_name(rel);

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut writer)?;
        }
    }

    let mut spool = writer.finish()?;
    spool.seek(SeekFrom::Start(0))?;
    Ok(spool)
}

fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

