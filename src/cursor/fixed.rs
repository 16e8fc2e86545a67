//! # Fixed Cursors
//!
//! A [`FixedCursor`] pins exactly one region for its whole open life and
//! exposes a zero-copy view over its logical byte range. When a request
//! is larger than the serving region (tiling managers with windows
//! smaller than the file), the cursor is truncated to the region boundary
//! and [`next_cursor`](FixedCursor::next_cursor) walks the remainder.

use std::path::Path;
use std::rc::Rc;

use eyre::Result;

use crate::error::MapError;
use crate::finfo::FileInfo;
use crate::manager;
use crate::region::{MapView, Region};

use super::CursorInner;

/// Immutable view into exactly one region of one file.
///
/// Created by a manager's `make_cursor` / `make_cursor_at`. While open,
/// the backing region's client count includes this cursor exactly once;
/// dropping the cursor releases the pin, making the region eligible for
/// eviction once unused.
#[derive(Debug)]
pub struct FixedCursor {
    inner: Rc<CursorInner>,
}

impl FixedCursor {
    pub(crate) fn from_inner(inner: Rc<CursorInner>) -> Self {
        Self { inner }
    }

    /// Zero-copy view over the cursor's logical range.
    ///
    /// The view spans exactly [`size`](Self::size) bytes. Fails with
    /// [`MapError::Closed`] once the cursor or its manager is closed.
    pub fn buffer(&self) -> Result<MapView> {
        let region = self.inner.region().ok_or(MapError::Closed)?;
        let start = (self.inner.ofs() - region.ofs()) as usize;
        let len = self
            .inner
            .size()
            .min((region.ofs_end() - self.inner.ofs()) as usize);
        Ok(MapView::new(region, start, len))
    }

    /// Absolute file offset of the first byte this cursor exposes.
    pub fn ofs(&self) -> u64 {
        self.inner.ofs()
    }

    /// Number of bytes this cursor exposes. May be smaller than requested
    /// when the serving region ends first; see the type-level docs.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// One byte past the end of the cursor's range.
    pub fn ofs_end(&self) -> u64 {
        self.inner.ofs_end()
    }

    /// True if the absolute file offset falls inside this cursor's range.
    pub fn includes_ofs(&self, ofs: u64) -> bool {
        self.inner.ofs() <= ofs && ofs < self.inner.ofs_end()
    }

    /// Size of the underlying file, frozen at first open.
    pub fn file_size(&self) -> u64 {
        self.inner.finfo().size()
    }

    /// Canonical path of the underlying file.
    pub fn path(&self) -> &Path {
        self.inner.finfo().path()
    }

    /// The per-file record this cursor reads.
    pub fn finfo(&self) -> &FileInfo {
        self.inner.finfo()
    }

    /// The region currently pinned, or `None` once closed.
    pub fn region(&self) -> Option<Rc<Region>> {
        self.inner.region()
    }

    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Releases the region pin and closes the cursor. Idempotent; also
    /// runs on drop.
    pub fn close(&self) {
        self.inner.close_via_manager();
    }

    /// Single-shot close: fails with [`MapError::AlreadyReleased`] when
    /// the cursor is no longer open.
    pub fn release(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(MapError::AlreadyReleased.into());
        }
        self.inner.close_via_manager();
        Ok(())
    }

    /// Closes this cursor and requests a new one on the same file.
    /// `size == 0` means as much as the serving region provides from
    /// `offset`.
    pub fn make_cursor(self, offset: u64, size: usize) -> Result<FixedCursor> {
        let mman = self.inner.mman().clone();
        let finfo = Rc::clone(self.inner.finfo_rc());
        self.inner.close_via_manager();

        let state = mman.upgrade().ok_or(MapError::Closed)?;
        manager::make_fixed_with_finfo(&state, finfo, offset, size)
    }

    /// The cursor over the range immediately after this one, with the
    /// same size. Fails with [`MapError::OutOfRange`] at end-of-file,
    /// which terminates sequential walks.
    pub fn next_cursor(self) -> Result<FixedCursor> {
        let offset = self.inner.ofs_end();
        let size = self.inner.size();
        self.make_cursor(offset, size)
    }
}

impl Drop for FixedCursor {
    fn drop(&mut self) {
        self.inner.close_via_manager();
    }
}
