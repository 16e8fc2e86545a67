//! # Per-File Records
//!
//! A [`FileInfo`] is the manager's stable identity for one mapped file:
//! the canonicalized path, the file size captured at first open, and the
//! read-only descriptor that regions borrow while they create their maps.
//!
//! The size is deliberately frozen at open time. Regions and cursors
//! derive every bounds check from it, so a file growing underneath the
//! manager never moves an existing cursor's end-of-file; the new tail is
//! simply not visible until the file is opened again by a fresh manager.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

use crate::error::MapError;

/// Identity record for one mapped file: canonical path, frozen size, and
/// the owned read-only descriptor.
///
/// Created by the manager on first reference to a path and shared with
/// every region and cursor of that file via `Rc`. The descriptor closes
/// when the last holder drops.
#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    size: u64,
    file: File,
}

impl FileInfo {
    /// Opens `path` read-only and captures its identity.
    ///
    /// Fails when the path does not resolve, names something other than a
    /// regular file, or names an empty file (a region of size 0 is
    /// invalid, so empty files are rejected up front).
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let path = fs::canonicalize(path)
            .wrap_err_with(|| format!("failed to resolve '{}'", path.display()))?;

        let file = File::open(&path)
            .wrap_err_with(|| format!("failed to open '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?;

        if !metadata.is_file() {
            return Err(MapError::NotRegular { path }.into());
        }

        let size = metadata.len();
        if size == 0 {
            return Err(MapError::EmptyFile { path }.into());
        }

        Ok(Self { path, size, file })
    }

    /// Canonical path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes, captured when the file was first opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }
}
