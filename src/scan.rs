//! Directory scanner: turns a source path into filtered [`FileRecord`]s.
//!
//! * A regular file yields one record named after the file.
//! * A directory yields its descendants in pre-order, siblings sorted by
//!   name.  The root itself is not emitted.
//! * A missing source yields nothing.
//!
//! Symlinks are never followed below the root.  Entries that are neither
//! files, directories nor symlinks are dropped, as are names that are not
//! valid UTF-8.  Metadata is best-effort: when `lstat` fails the record keeps
//! its type but reports zero size and attributes.

use std::fs::{self, Metadata};
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::filter::FilterOptions;
use crate::record::{FileAttributes, FileRecord, FileType};

/// Scan `source`, keeping the entries accepted by `filter`.
pub fn scan(source: &Path, filter: &FilterOptions) -> Vec<FileRecord> {
    let root_meta = match fs::metadata(source) {
        Ok(m)  => m,
        Err(e) => {
            debug!(path = %source.display(), error = %e, "scan source unavailable");
            return Vec::new();
        }
    };

    if root_meta.is_file() {
        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %source.display(), "skipping file with non UTF-8 name");
            return Vec::new();
        };
        let record = build_record(source, name.to_owned(), FileType::Regular, Some(&root_meta));
        return if filter.evaluate(&record) { vec![record] } else { Vec::new() };
    }

    if !root_meta.is_dir() {
        return Vec::new();
    }

    let mut records = Vec::new();
    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e)  => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let ft = entry.file_type();
        let file_type = if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::Regular
        } else {
            debug!(path = %entry.path().display(), "dropping unclassified entry");
            continue;
        };

        let Some(rel_path) = relative_path(source, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping entry with non UTF-8 path");
            continue;
        };

        let meta = entry.metadata().ok();
        let record = build_record(entry.path(), rel_path, file_type, meta.as_ref());
        if filter.evaluate(&record) {
            records.push(record);
        }
    }

    debug!(root = %source.display(), kept = records.len(), "scan complete");
    records
}

fn build_record(path: &Path, rel_path: String, file_type: FileType, meta: Option<&Metadata>) -> FileRecord {
    let link_target = if file_type == FileType::Symlink {
        match fs::read_link(path) {
            Ok(t)  => Some(t.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read symlink target");
                Some(String::new())
            }
        }
    } else {
        None
    };

    let size = match file_type {
        FileType::Regular   => meta.map(|m| m.len()).unwrap_or(0),
        FileType::Symlink   => link_target.as_ref().map(|t| t.len() as u64).unwrap_or(0),
        _                   => 0,
    };

    FileRecord {
        rel_path,
        source_path: path.to_path_buf(),
        file_type,
        size,
        link_target,
        attrs: meta.map(attributes_of).unwrap_or_default(),
    }
}

/// Forward-slash relative path, `None` if any component is not UTF-8.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }
    Some(parts.join("/"))
}

fn attributes_of(meta: &Metadata) -> FileAttributes {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| match t.duration_since(UNIX_EPOCH) {
            Ok(d)  => i64::try_from(d.as_secs()).ok(),
            Err(e) => i64::try_from(e.duration().as_secs()).ok().map(|s| -s),
        })
        .unwrap_or(0);

    let (mode, uid, gid) = ownership_of(meta);
    FileAttributes { mode, uid, gid, mtime }
}

#[cfg(unix)]
fn ownership_of(meta: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode() & 0o7777, meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn ownership_of(_meta: &Metadata) -> (u32, u32, u32) {
    (0, 0, 0)
}
