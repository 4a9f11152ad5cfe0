//! High-level API over paths.
//!
//! ```no_run
//! use std::path::Path;
//! use minibk::archive::{self, PackOptions};
//! use minibk::crypto::CipherMode;
//!
//! let opts = PackOptions {
//!     cipher:   CipherMode::Rc4,
//!     password: Some("secret".into()),
//!     ..PackOptions::default()
//! };
//! archive::pack(Path::new("photos"), Path::new("photos.mbk"), &opts)?;
//! let summary = archive::unpack(Path::new("photos.mbk"), Path::new("restore"), "secret")?;
//! assert!(summary.warnings.is_empty());
//! # Ok::<(), minibk::ArchiveError>(())
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::CompressionMode;
use crate::crypto::CipherMode;
use crate::error::{ArchiveError, Result, Warning};
use crate::filter::FilterOptions;
use crate::io_stream::{ArchiveReader, ArchiveWriter, Entry, PackSummary};
use crate::record::{FileAttributes, FileRecord, FileType};
use crate::scan::scan;
use crate::sink::{FsMetadataSink, MetadataSink};

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`pack`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Requested cipher.  Ignored (treated as none) without a password.
    pub cipher:      CipherMode,
    pub compression: CompressionMode,
    pub password:    Option<String>,
    pub filter:      FilterOptions,
}

impl PackOptions {
    fn password_bytes(&self) -> &[u8] {
        self.password.as_deref().unwrap_or("").as_bytes()
    }
}

// ── Pack ──────────────────────────────────────────────────────────────────────

/// Scan `source` and write every accepted entry to a new archive at `output`.
///
/// A missing `source` produces a valid, empty archive.
pub fn pack(source: &Path, output: &Path, opts: &PackOptions) -> Result<PackSummary> {
    let records = scan(source, &opts.filter);
    debug!(source = %source.display(), records = records.len(), "scanned");
    pack_records(&records, output, opts)
}

/// Write already-scanned records.  `opts.filter` is not consulted.
pub fn pack_records(records: &[FileRecord], output: &Path, opts: &PackOptions) -> Result<PackSummary> {
    let file = File::create(output).map_err(|source| ArchiveError::CreateOutput {
        path: output.to_owned(),
        source,
    })?;

    let mut writer = ArchiveWriter::new(
        BufWriter::new(file),
        opts.cipher,
        opts.password_bytes(),
        opts.compression,
    )?;
    for record in records {
        writer.add_record(record)?;
    }
    let (_, summary) = writer.finish()?;

    info!(
        output = %output.display(),
        frames = summary.frames(),
        cipher = %summary.cipher,
        compression = %summary.compression,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        warnings = summary.warnings.len(),
        "pack complete"
    );
    Ok(summary)
}

// ── Unpack ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnpackSummary {
    pub cipher:            CipherMode,
    pub compression:       CompressionMode,
    pub files:             u64,
    pub directories:       u64,
    pub symlinks:          u64,
    /// Entries whose attributes could not be (fully) restored.
    pub metadata_failures: u64,
    pub warnings:          Vec<Warning>,
}

impl UnpackSummary {
    pub fn restored(&self) -> u64 {
        self.files + self.directories + self.symlinks
    }

    pub fn integrity_failures(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_integrity()).count()
    }
}

/// Restore the archive at `input` under `dest`, applying attributes with
/// [`FsMetadataSink`].
pub fn unpack(input: &Path, dest: &Path, password: &str) -> Result<UnpackSummary> {
    unpack_with_sink(input, dest, password, &FsMetadataSink)
}

/// Restore the archive at `input` under `dest`.
///
/// The header is validated before `dest` is touched, so an unknown format or
/// a missing password leaves the filesystem unchanged.  Frames that fail
/// their CRC are still restored and reported.  Directory attributes are
/// applied last, deepest first.
pub fn unpack_with_sink(
    input:    &Path,
    dest:     &Path,
    password: &str,
    sink:     &dyn MetadataSink,
) -> Result<UnpackSummary> {
    let mut reader = open_reader(input, password)?;
    let header = reader.header();
    fs::create_dir_all(dest)?;

    let mut summary = UnpackSummary {
        cipher:      header.cipher,
        compression: header.compression,
        ..UnpackSummary::default()
    };
    let mut pending_dirs: Vec<(PathBuf, FileAttributes)> = Vec::new();

    while let Some(entry) = reader.next_entry()? {
        if let Some(w) = entry.integrity_warning() {
            summary.warnings.push(w);
        }

        let path = &entry.meta.path;
        let Some(target) = safe_join(dest, path) else {
            warn!(path = %path, "refusing to restore unsafe path");
            summary.warnings.push(Warning::UnsafePath { path: path.clone() });
            continue;
        };

        if let Err(e) = materialize(dest, &target, &entry) {
            warn!(path = %path, error = %e, "cannot restore entry");
            summary.warnings.push(Warning::Materialize { path: path.clone(), reason: e.to_string() });
            continue;
        }

        match entry.meta.file_type {
            FileType::Directory => {
                summary.directories += 1;
                pending_dirs.push((target, entry.meta.attrs));
                continue;
            }
            FileType::Regular => summary.files += 1,
            FileType::Symlink => summary.symlinks += 1,
            FileType::Other   => continue,
        }
        apply_attrs(sink, &target, entry.meta.file_type, &entry.meta.attrs, &mut summary);
    }

    // Pre-order in the archive, so reversed order visits children first.
    for (target, attrs) in pending_dirs.iter().rev() {
        apply_attrs(sink, target, FileType::Directory, attrs, &mut summary);
    }

    info!(
        input = %input.display(),
        dest = %dest.display(),
        restored = summary.restored(),
        warnings = summary.warnings.len(),
        integrity_failures = summary.integrity_failures(),
        "unpack complete"
    );
    Ok(summary)
}

fn apply_attrs(
    sink:      &dyn MetadataSink,
    target:    &Path,
    file_type: FileType,
    attrs:     &FileAttributes,
    summary:   &mut UnpackSummary,
) {
    if let Err(e) = sink.apply(target, file_type, attrs) {
        debug!(path = %target.display(), error = %e, "attributes not fully restored");
        summary.metadata_failures += 1;
    }
}

fn materialize(dest: &Path, target: &Path, entry: &Entry) -> io::Result<()> {
    if entry.meta.file_type != FileType::Directory {
        ensure_parent(dest, target)?;
    }
    match entry.meta.file_type {
        FileType::Directory => {
            ensure_no_symlink_ancestor(dest, target)?;
            fs::create_dir_all(target)
        }
        FileType::Regular => {
            if is_symlink(target) {
                fs::remove_file(target)?;
            }
            fs::write(target, &entry.data)
        }
        FileType::Symlink => {
            remove_existing(target)?;
            let link = String::from_utf8_lossy(&entry.data);
            create_symlink(link.as_ref(), target)
        }
        FileType::Other => Ok(()),
    }
}

fn ensure_parent(dest: &Path, target: &Path) -> io::Result<()> {
    ensure_no_symlink_ancestor(dest, target)?;
    match target.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None         => Ok(()),
    }
}

/// Entries never live below a symlink in a scanned tree; one appearing there
/// would write outside `dest`.
fn ensure_no_symlink_ancestor(dest: &Path, target: &Path) -> io::Result<()> {
    let Ok(rel) = target.strip_prefix(dest) else {
        return Ok(());
    };
    let mut cur = dest.to_path_buf();
    let mut components = rel.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        cur.push(component);
        if is_symlink(&cur) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("parent {} is a symlink", cur.display()),
            ));
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

fn remove_existing(target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(target) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(target),
        Ok(_)               => fs::remove_file(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e)              => Err(e),
    }
}

#[cfg(unix)]
fn create_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn create_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(link, target)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_link: &str, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported on this platform"))
}

/// Join a stored relative path onto `dest`, refusing anything that is empty,
/// absolute or climbs out with `..`.
fn safe_join(dest: &Path, stored: &str) -> Option<PathBuf> {
    let mut out = dest.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(stored).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(out)
}

// ── List / verify ─────────────────────────────────────────────────────────────

/// One archive entry as shown by [`list`].
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path:        String,
    pub file_type:   FileType,
    /// Decompressed size.
    pub size:        u64,
    /// Stored (compressed) payload size.
    pub stored_size: u64,
    pub crc32:       u32,
    pub crc_ok:      bool,
    pub attrs:       FileAttributes,
}

impl From<&Entry> for EntryInfo {
    fn from(e: &Entry) -> Self {
        EntryInfo {
            path:        e.meta.path.clone(),
            file_type:   e.meta.file_type,
            size:        e.data.len() as u64,
            stored_size: e.meta.payload_len,
            crc32:       e.meta.crc32,
            crc_ok:      e.crc_ok(),
            attrs:       e.meta.attrs,
        }
    }
}

/// Decode every frame without touching the filesystem.
pub fn list(input: &Path, password: &str) -> Result<Vec<EntryInfo>> {
    let mut reader = open_reader(input, password)?;
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        out.push(EntryInfo::from(&entry));
    }
    Ok(out)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub entries:  u64,
    pub warnings: Vec<Warning>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Check every frame's CRC.  Framing errors are still fatal.
pub fn verify(input: &Path, password: &str) -> Result<VerifyReport> {
    let mut reader = open_reader(input, password)?;
    let mut report = VerifyReport::default();
    while let Some(entry) = reader.next_entry()? {
        report.entries += 1;
        report.warnings.extend(entry.integrity_warning());
    }
    Ok(report)
}

fn open_reader(input: &Path, password: &str) -> Result<ArchiveReader<BufReader<File>>> {
    let file = File::open(input).map_err(|source| ArchiveError::OpenInput {
        path: input.to_owned(),
        source,
    })?;
    ArchiveReader::open(BufReader::new(file), password.as_bytes())
}
