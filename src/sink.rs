//! Restoring file attributes after an entry has been materialized.
//!
//! The unpacker never lets a sink error escape: failures are logged at debug
//! level and counted in the summary.  Restoring ownership without privileges
//! is expected to fail on most systems.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use crate::record::{FileAttributes, FileType};

pub trait MetadataSink {
    fn apply(&self, path: &Path, file_type: FileType, attrs: &FileAttributes) -> io::Result<()>;
}

/// Applies nothing.
pub struct NoopMetadataSink;

impl MetadataSink for NoopMetadataSink {
    fn apply(&self, _: &Path, _: FileType, _: &FileAttributes) -> io::Result<()> {
        Ok(())
    }
}

/// Best-effort std-backed sink.
///
/// Order is ownership, then mtime, then mode, so a restrictive mode cannot
/// stop the timestamp from being set.  Symlinks only get ownership.  A mode of
/// zero means "not recorded" and is skipped.  Every step is attempted; the
/// first error is returned.
pub struct FsMetadataSink;

impl MetadataSink for FsMetadataSink {
    fn apply(&self, path: &Path, file_type: FileType, attrs: &FileAttributes) -> io::Result<()> {
        let mut first_err: Option<io::Error> = None;
        let mut record = |r: io::Result<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        record(set_owner(path, attrs.uid, attrs.gid));

        if file_type != FileType::Symlink {
            record(set_mtime(path, attrs.mtime));
            if attrs.mode != 0 {
                record(set_mode(path, attrs.mode));
            }
        }

        match first_err {
            Some(e) => Err(e),
            None    => Ok(()),
        }
    }
}

fn set_mtime(path: &Path, mtime: i64) -> io::Result<()> {
    let time = if mtime >= 0 {
        UNIX_EPOCH + Duration::from_secs(mtime as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(mtime.unsigned_abs())
    };
    File::open(path)?.set_modified(time)
}

#[cfg(unix)]
fn set_owner(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
}

#[cfg(not(unix))]
fn set_owner(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
