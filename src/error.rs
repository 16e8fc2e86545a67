//! # Error Kinds
//!
//! Every fallible operation in this crate returns [`eyre::Result`]; the
//! variants below are the stable, matchable kinds carried inside those
//! reports. Callers that need to branch on a failure mode downcast the
//! report chain:
//!
//! ```ignore
//! match mman.make_cursor_at(&path, offset, 0) {
//!     Ok(cursor) => read(cursor),
//!     Err(report) => match report.downcast_ref::<MapError>() {
//!         Some(MapError::OutOfRange { .. }) => break,
//!         _ => return Err(report),
//!     },
//! }
//! ```
//!
//! Plain I/O failures (file open, non-retryable mmap errors) enter the
//! chain as `std::io::Error` with path context wrapped around them; they
//! carry no `MapError` variant.

use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds of the window manager and its cursors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// The requested offset lies at or beyond the end of the file.
    #[error("offset {offset} beyond end of file '{}' ({file_size} bytes)", .path.display())]
    OutOfRange {
        path: PathBuf,
        offset: u64,
        file_size: u64,
    },

    /// A sliding cursor was requested from a manager that cannot tile.
    #[error("sliding cursors require a tiling manager")]
    Unsupported,

    /// The region budget is exhausted and no unused region is left to
    /// evict, or eviction retries around a failing mmap ran out.
    #[error(
        "cannot map {requested} bytes: {mapped} of {max_memory_size} budget bytes in use \
         and no unused region to evict"
    )]
    OutOfMemory {
        requested: usize,
        mapped: usize,
        max_memory_size: usize,
    },

    /// `release()` called on a cursor that was already released.
    #[error("cursor already released")]
    AlreadyReleased,

    /// Operation on a closed cursor or a closed manager.
    #[error("manager or cursor is closed")]
    Closed,

    /// Zero-length files cannot be mapped; a region of size 0 is invalid.
    #[error("cannot map empty file '{}'", .path.display())]
    EmptyFile { path: PathBuf },

    /// The path names something other than a regular file.
    #[error("'{}' is not a regular file", .path.display())]
    NotRegular { path: PathBuf },
}
