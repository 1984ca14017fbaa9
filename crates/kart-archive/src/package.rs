//! Directory packaging.
//!
//! Builds are stored as gzip-compressed tar archives. Packing is
//! deterministic: entries are visited in sorted path order and headers carry
//! normalized timestamps and ownership, so the same tree always yields the
//! same bytes.

use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, EntryType, Header, HeaderMode};
use walkdir::WalkDir;

/// Pack the contents of `source` into a `.tar.gz` byte buffer.
///
/// Paths inside the archive are relative to `source`. Symlinks are stored as
/// links, never followed. An empty directory yields a valid empty archive.
pub fn pack_dir(source: &Path) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(rel, entry.path())?;
        } else if file_type.is_file() {
            builder.append_path_with_name(entry.path(), rel)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_mtime(0);
            builder.append_link(&mut header, rel, target)?;
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping special file");
        }
    }

    builder.into_inner()?.finish()
}

/// Extract a `.tar.gz` buffer produced by [`pack_dir`] into `dest`.
///
/// Entries that would land outside `dest` are rejected by the tar reader.
pub fn unpack(data: &[u8], dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(data));
    archive.set_preserve_mtime(false);
    archive.unpack(dest)
}

/// List the paths stored in a `.tar.gz` buffer, in archive order.
pub fn entries(data: &[u8]) -> io::Result<Vec<String>> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut paths = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        paths.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(paths)
}
