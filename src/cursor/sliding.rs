//! # Sliding Cursors
//!
//! A [`SlidingCursor`] presents one stable byte range over a file while
//! silently re-homing to whatever region covers each access. Reads that
//! straddle a window boundary are served from successive regions and
//! concatenated, at the cost of a copy, into one contiguous result.
//!
//! The pin discipline is per-access: the serving region is pinned for the
//! duration of a single read and released before the read returns, so a
//! sliding cursor never blocks eviction between accesses.

use std::path::Path;
use std::rc::Rc;

use eyre::Result;

use crate::error::MapError;
use crate::finfo::FileInfo;
use crate::region::Region;

use super::CursorInner;

/// Byte-range view that lazily switches its backing region per access.
///
/// Only tiling managers issue these. Indices are absolute file offsets;
/// negative indices resolve relative to the file size, Python-style.
///
/// `close()` is deliberately a no-op (see the method docs); the cursor
/// leaves the manager's books when it is dropped or the manager closes.
#[derive(Debug)]
pub struct SlidingCursor {
    inner: Rc<CursorInner>,
}

impl SlidingCursor {
    pub(crate) fn from_inner(inner: Rc<CursorInner>) -> Self {
        Self { inner }
    }

    /// The byte at absolute file offset `i`; negative `i` counts back
    /// from the end of the file (`-1` is the last byte).
    pub fn byte(&self, i: i64) -> Result<u8> {
        let pos = self.resolve(i)?;
        let region = self.acquire(pos)?;
        let b = region.bytes()[(pos - region.ofs()) as usize];
        self.release_access(&region);
        Ok(b)
    }

    /// The bytes of `[a, b)` as one contiguous vector; either bound may
    /// be negative (relative to the file size). A range spanning several
    /// regions is read region by region and concatenated.
    pub fn slice(&self, a: i64, b: i64) -> Result<Vec<u8>> {
        let start = self.resolve_bound(a)?;
        let end = self.resolve_bound(b)?;
        if start > end {
            return Err(self.out_of_range(b));
        }

        let mut out = Vec::with_capacity((end - start) as usize);
        let mut pos = start;
        while pos < end {
            let region = self.acquire(pos)?;
            let from = (pos - region.ofs()) as usize;
            let take = (end.min(region.ofs_end()) - pos) as usize;
            out.extend_from_slice(&region.bytes()[from..from + take]);
            self.release_access(&region);
            pos += take as u64;
        }
        Ok(out)
    }

    /// All bytes of the cursor's range.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.slice(self.inner.ofs() as i64, self.inner.ofs_end() as i64)
    }

    /// Absolute file offset of the first byte this cursor exposes.
    pub fn ofs(&self) -> u64 {
        self.inner.ofs()
    }

    /// Number of bytes this cursor exposes.
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

    /// True once the manager has closed this cursor (or it was dropped;
    /// observable through the manager's counters only at that point).
    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Deliberately ignored: a sliding cursor stays open until its
    /// manager closes or the handle is dropped. It holds no pin between
    /// accesses, so ignoring the request costs no memory.
    pub fn close(&self) {}

    fn out_of_range(&self, requested: i64) -> eyre::Report {
        MapError::OutOfRange {
            path: self.inner.finfo().path().to_path_buf(),
            offset: requested.max(0) as u64,
            file_size: self.inner.finfo().size(),
        }
        .into()
    }

    /// Resolves an index to an absolute offset inside `[ofs, ofs_end)`.
    fn resolve(&self, i: i64) -> Result<u64> {
        let abs = self.absolute(i);
        if abs < self.inner.ofs() as i64 || abs >= self.inner.ofs_end() as i64 {
            return Err(self.out_of_range(i));
        }
        Ok(abs as u64)
    }

    /// Resolves a slice bound; unlike indices, a bound may sit at
    /// `ofs_end` (empty tail slice).
    fn resolve_bound(&self, i: i64) -> Result<u64> {
        let abs = self.absolute(i);
        if abs < self.inner.ofs() as i64 || abs > self.inner.ofs_end() as i64 {
            return Err(self.out_of_range(i));
        }
        Ok(abs as u64)
    }

    fn absolute(&self, i: i64) -> i64 {
        if i < 0 {
            self.inner.finfo().size() as i64 + i
        } else {
            i
        }
    }

    /// Obtains and pins the region covering `pos`.
    fn acquire(&self, pos: u64) -> Result<Rc<Region>> {
        if self.inner.is_closed() {
            return Err(MapError::Closed.into());
        }
        let state = self.inner.mman().upgrade().ok_or(MapError::Closed)?;
        let mut st = state.borrow_mut();
        if st.is_closed() {
            return Err(MapError::Closed.into());
        }
        let region = st.obtain_region(self.inner.finfo_rc(), pos)?;
        st.pin_region(&region);
        Ok(region)
    }

    fn release_access(&self, region: &Rc<Region>) {
        if let Some(state) = self.inner.mman().upgrade() {
            let mut st = state.borrow_mut();
            if !st.is_closed() {
                st.unpin_region(region);
            }
        }
    }
}

impl Drop for SlidingCursor {
    fn drop(&mut self) {
        self.inner.close_via_manager();
    }
}
