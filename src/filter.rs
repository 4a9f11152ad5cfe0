//! Entry filter applied while scanning.
//!
//! All set predicates must hold.  Unset, empty and zero values are unbounded.
//!
//! Not every predicate applies to every entry type:
//!
//! | Predicate       | Regular | Symlink | Directory |
//! |-----------------|---------|---------|-----------|
//! | name / path     | yes     | yes     | yes       |
//! | type            | yes     | yes     | yes       |
//! | min / max size  | yes     | no      | no        |
//! | modified after  | yes     | yes     | no        |
//! | uid             | yes     | yes     | no        |
//!
//! A directory that passes the name, path and type checks is always kept so
//! the restored tree keeps its shape.

use serde::{Deserialize, Serialize};

use crate::record::{FileRecord, FileType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Substring of the last path segment.
    pub name_contains:  Option<String>,
    /// Substring of the full relative path.
    pub path_contains:  Option<String>,
    pub file_type:      Option<FileType>,
    pub min_size:       Option<u64>,
    pub max_size:       Option<u64>,
    /// Keep entries whose mtime (Unix seconds) is at or after this value.
    pub modified_after: Option<i64>,
    pub uid:            Option<u32>,
}

impl FilterOptions {
    pub fn is_unbounded(&self) -> bool {
        *self == Self::default()
    }

    pub fn evaluate(&self, record: &FileRecord) -> bool {
        if let Some(needle) = non_empty(&self.name_contains) {
            if !record.file_name().contains(needle) {
                return false;
            }
        }
        if let Some(needle) = non_empty(&self.path_contains) {
            if !record.rel_path.contains(needle) {
                return false;
            }
        }
        if let Some(t) = self.file_type {
            if record.file_type != t {
                return false;
            }
        }

        if record.file_type == FileType::Directory {
            return true;
        }

        if record.file_type == FileType::Regular {
            if let Some(min) = self.min_size.filter(|&m| m > 0) {
                if record.size < min {
                    return false;
                }
            }
            if let Some(max) = self.max_size.filter(|&m| m > 0) {
                if record.size > max {
                    return false;
                }
            }
        }

        if let Some(floor) = self.modified_after.filter(|&t| t > 0) {
            if record.attrs.mtime < floor {
                return false;
            }
        }
        if let Some(uid) = self.uid {
            if record.attrs.uid != uid {
                return false;
            }
        }
        true
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}
