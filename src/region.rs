//! # Mapped Regions
//!
//! A [`Region`] wraps one OS-level memory mapping over a page-aligned byte
//! range of one file. Regions are created by the manager's allocator,
//! shared by reference with the cursors that pin them, and unmapped when
//! the manager evicts them or closes.
//!
//! ## Safety Model
//!
//! All mappings are read-only and the file size is frozen in the
//! [`FileInfo`], so the mapped bytes are immutable for the region's
//! lifetime. Out-of-range indexing is prevented at the cursor layer:
//! regions hand out either the whole mapping or a [`MapView`] whose range
//! was validated against the region bounds before construction.
//!
//! ## Lifecycle Accounting
//!
//! `client_count` counts the cursors currently pinned to the region; a
//! region with a non-zero count is "used" and must never be unmapped.
//! `last_access` is a monotone tick maintained by the manager: it advances
//! every time the allocator returns the region to a caller and every time
//! the count drops back to zero, which is exactly the ordering the LRU
//! eviction scan consumes.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::sync::OnceLock;

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapOptions};

use crate::error::MapError;
use crate::finfo::FileInfo;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Granularity that mmap offsets must be aligned to.
///
/// Queried once from the OS and cached. On non-unix targets the Windows
/// allocation granularity of 64 KiB is assumed, which is the alignment
/// `CreateFileMapping` offsets require.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(os_page_size)
}

#[cfg(unix)]
fn os_page_size() -> usize {
    // SAFETY: sysconf with a valid name constant has no preconditions; it
    // reads a process-wide value and touches no caller memory.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 {
        sz as usize
    } else {
        4096
    }
}

#[cfg(not(unix))]
fn os_page_size() -> usize {
    64 * 1024
}

/// Rounds `ofs` down to the previous page boundary.
pub(crate) fn align_down(ofs: u64) -> u64 {
    let page = page_size() as u64;
    (ofs / page) * page
}

/// One live memory mapping over `[ofs, ofs + size)` of a single file.
///
/// Immutable once created except for its pin count and LRU tick. The
/// offset is page-aligned and the range never extends past the frozen
/// file size; cursors quote their own logical offsets, which may differ
/// from the rounded values here.
#[derive(Debug)]
pub struct Region {
    finfo: Rc<FileInfo>,
    ofs: u64,
    size: usize,
    map: Mmap,
    client_count: Cell<u32>,
    last_access: Cell<u64>,
}

impl Region {
    /// Maps `[ofs, ofs + size)` of `finfo`, rounding the offset down to
    /// the page size (the end point is preserved) and clamping the end to
    /// the file size.
    pub(crate) fn map(finfo: &Rc<FileInfo>, ofs: u64, size: usize) -> Result<Self> {
        let file_size = finfo.size();
        if ofs >= file_size {
            return Err(MapError::OutOfRange {
                path: finfo.path().to_path_buf(),
                offset: ofs,
                file_size,
            }
            .into());
        }
        ensure!(size > 0, "zero-sized region for '{}'", finfo.path().display());

        let aligned = align_down(ofs);
        let end = ofs.saturating_add(size as u64).min(file_size);
        let span = (end - aligned) as usize;

        // SAFETY: Mmap::map is unsafe because the underlying file could be
        // truncated or rewritten by another process, invalidating the
        // mapping. This is accepted here because:
        // 1. The mapping is read-only (PROT_READ); this crate never writes.
        // 2. The span was clamped against the size frozen in FileInfo, so
        //    the range was valid at open time.
        // 3. All access goes through Region::bytes()/MapView, whose ranges
        //    are validated against `span` before a slice is formed.
        let map = unsafe {
            MmapOptions::new()
                .offset(aligned)
                .len(span)
                .map(finfo.file())
        }
        .wrap_err_with(|| {
            format!(
                "failed to map {} bytes at offset {} of '{}'",
                span,
                aligned,
                finfo.path().display()
            )
        })?;

        Ok(Self {
            finfo: Rc::clone(finfo),
            ofs: aligned,
            size: span,
            map,
            client_count: Cell::new(0),
            last_access: Cell::new(0),
        })
    }

    /// Page-aligned offset of the mapping into the file.
    pub fn ofs(&self) -> u64 {
        self.ofs
    }

    /// Mapped length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// One byte past the end of the mapping, as an absolute file offset.
    pub fn ofs_end(&self) -> u64 {
        self.ofs + self.size as u64
    }

    /// True if the absolute file offset `ofs` falls inside the mapping.
    pub fn includes_ofs(&self, ofs: u64) -> bool {
        self.ofs <= ofs && ofs < self.ofs_end()
    }

    /// True if the whole range `[ofs, ofs + len)` falls inside the mapping.
    pub fn includes_ofs_range(&self, ofs: u64, len: usize) -> bool {
        self.ofs <= ofs && ofs + len as u64 <= self.ofs_end()
    }

    /// Number of cursors currently pinning this region. A non-zero count
    /// makes the region ineligible for eviction.
    pub fn client_count(&self) -> u32 {
        self.client_count.get()
    }

    /// True if at least one cursor pins this region.
    pub fn is_used(&self) -> bool {
        self.client_count.get() > 0
    }

    /// The per-file record this region maps.
    pub fn finfo(&self) -> &FileInfo {
        &self.finfo
    }

    /// Canonical path of the mapped file.
    pub fn path(&self) -> &Path {
        self.finfo.path()
    }

    /// The mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub(crate) fn finfo_rc(&self) -> &Rc<FileInfo> {
        &self.finfo
    }

    pub(crate) fn pin(&self) -> u32 {
        let count = self.client_count.get() + 1;
        self.client_count.set(count);
        count
    }

    pub(crate) fn unpin(&self) -> u32 {
        let count = self.client_count.get();
        debug_assert!(count > 0, "unpin on region with no clients");
        let count = count.saturating_sub(1);
        self.client_count.set(count);
        count
    }

    pub(crate) fn touch(&self, tick: u64) {
        self.last_access.set(tick);
    }

    pub(crate) fn last_access(&self) -> u64 {
        self.last_access.get()
    }
}

/// Zero-copy byte view into a region, returned by
/// [`FixedCursor::buffer`](crate::cursor::FixedCursor::buffer).
///
/// Dereferences to `[u8]`. The view shares ownership of the mapping, so
/// the bytes stay valid even if the manager evicts the region or closes
/// while the view is alive; manager counters stop accounting for the
/// region at that point, which is why views are meant to be short-lived.
#[derive(Debug, Clone)]
pub struct MapView {
    region: Rc<Region>,
    start: usize,
    len: usize,
}

impl MapView {
    pub(crate) fn new(region: Rc<Region>, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= region.size());
        Self { region, start, len }
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the view spans zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for MapView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.region.bytes()[self.start..self.start + self.len]
    }
}

impl AsRef<[u8]> for MapView {
    fn as_ref(&self) -> &[u8] {
        self
    }
}
