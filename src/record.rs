//! Scanned entry records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// Sockets, FIFOs, devices.  Never written to an archive.
    Other,
}

impl FileType {
    /// Frame type code.  `Other` has none.
    pub fn code(self) -> Option<u8> {
        match self {
            FileType::Regular   => Some(1),
            FileType::Directory => Some(2),
            FileType::Symlink   => Some(3),
            FileType::Other     => None,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FileType::Regular),
            2 => Some(FileType::Directory),
            3 => Some(FileType::Symlink),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Regular   => "file",
            FileType::Directory => "dir",
            FileType::Symlink   => "symlink",
            FileType::Other     => "other",
        }
    }

    /// Parse the CLI spelling (`file`, `dir`, `symlink`).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" | "regular"   => Some(FileType::Regular),
            "dir"  | "directory" => Some(FileType::Directory),
            "symlink" | "link"   => Some(FileType::Symlink),
            _                    => None,
        }
    }
}

/// POSIX-ish attributes carried in every frame.  Zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileAttributes {
    pub mode:  u32,
    pub uid:   u32,
    pub gid:   u32,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Forward-slash separated path relative to the scan root.
    pub rel_path:    String,
    /// Where the entry was found; only meaningful while packing.
    pub source_path: PathBuf,
    pub file_type:   FileType,
    /// Byte length of a regular file or of a symlink target; 0 for directories.
    pub size:        u64,
    pub link_target: Option<String>,
    pub attrs:       FileAttributes,
}

impl FileRecord {
    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }
}
