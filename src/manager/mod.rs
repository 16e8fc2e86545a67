//! # Window Managers
//!
//! The manager owns every piece of bookkeeping in this crate: the
//! FileInfo registry, the region index, and the weak tokens of all issued
//! cursors. It is the sole mutator of that state; cursors reach back into
//! it through a `Weak` reference that is validated on each use.
//!
//! ## Ownership Shape
//!
//! ```text
//! GreedyManager / TilingManager
//!        │ Rc
//!        ▼
//! RefCell<MmanState> ──────────── files: path → Rc<FileInfo>
//!        │                        index: path → [Rc<Region>]   (strong)
//!        │                        cursors: [Weak<CursorInner>] (weak)
//!        ▼
//! CursorInner ── Weak ──► MmanState
//!        └───── Rc ─────► Region (pin, fixed cursors only)
//! ```
//!
//! The index is the single long-term owner of regions; cursors hold a
//! strong reference only while pinned, so dropping a region from the
//! index unmaps it as soon as the last pin (or view) lets go. The cycle
//! manager→region→manager that a naive design would create is broken by
//! regions knowing nothing about the manager at all.
//!
//! ## Lifecycle Guarantees
//!
//! - A region with `client_count > 0` is never evicted.
//! - `close()` force-releases every cursor, drops every region and every
//!   FileInfo, and is idempotent; dropping the last manager handle runs
//!   the same path, so release is deterministic on panic unwinds too.
//! - Counters are maintained eagerly; they are never recomputed from a
//!   finalizer, so mid-run observations are exact.

mod greedy;
mod tiling;

pub use greedy::GreedyManager;
pub use tiling::{TilingManager, TilingManagerBuilder};

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::cursor::{CursorInner, FixedCursor, SlidingCursor};
use crate::error::MapError;
use crate::finfo::FileInfo;
use crate::region::Region;
use crate::relation::RegionIndex;

/// Allocation policy of a manager, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Policy {
    /// One whole-file region per file, never tiled.
    Greedy,
    /// Fixed-size windows under a memory and handle budget.
    Tiling(TilingConfig),
}

/// Resolved tiling options (defaults already applied).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TilingConfig {
    pub window_size: usize,
    pub max_memory_size: usize,
    pub max_open_handles: usize,
}

/// Shared state behind both manager flavors.
#[derive(Debug)]
pub(crate) struct MmanState {
    policy: Policy,
    files: HashMap<PathBuf, Rc<FileInfo>>,
    index: RegionIndex,
    cursors: Vec<Weak<CursorInner>>,
    open_cursors: usize,
    tick: u64,
    max_mapped: usize,
    peak_regions: usize,
    closed: bool,
}

impl MmanState {
    pub(crate) fn new_shared(policy: Policy) -> Rc<RefCell<MmanState>> {
        Rc::new(RefCell::new(MmanState {
            policy,
            files: HashMap::new(),
            index: RegionIndex::new(),
            cursors: Vec::new(),
            open_cursors: 0,
            tick: 0,
            max_mapped: 0,
            peak_regions: 0,
            closed: false,
        }))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn supports_sliding(&self) -> bool {
        matches!(self.policy, Policy::Tiling(_))
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Idempotent per canonical path: first lookup opens the file and
    /// records its identity, later lookups reuse it without touching the
    /// filesystem beyond path resolution.
    pub(crate) fn intern_file(&mut self, path: &Path) -> Result<Rc<FileInfo>> {
        let canon = std::fs::canonicalize(path)
            .wrap_err_with(|| format!("failed to resolve '{}'", path.display()))?;
        if let Some(existing) = self.files.get(&canon) {
            return Ok(Rc::clone(existing));
        }

        let finfo = Rc::new(FileInfo::open(&canon)?);
        self.files.insert(canon, Rc::clone(&finfo));
        Ok(finfo)
    }

    /// Re-inserts a FileInfo that a cursor is still carrying, preserving
    /// identity when the registry dropped the entry in between.
    fn reintern_file(&mut self, finfo: &Rc<FileInfo>) {
        self.files
            .entry(finfo.path().to_path_buf())
            .or_insert_with(|| Rc::clone(finfo));
    }

    /// Dispatches to the flavor's allocator; the returned region always
    /// covers `offset` and has been touched for LRU purposes.
    pub(crate) fn obtain_region(
        &mut self,
        finfo: &Rc<FileInfo>,
        offset: u64,
    ) -> Result<Rc<Region>> {
        let region = match self.policy {
            Policy::Greedy => self.obtain_whole(finfo, offset)?,
            Policy::Tiling(cfg) => self.obtain_tile(finfo, offset, cfg)?,
        };
        debug_assert!(region.includes_ofs(offset));
        Ok(region)
    }

    pub(crate) fn pin_region(&mut self, region: &Rc<Region>) {
        if region.pin() == 1 {
            self.index.note_used();
        }
    }

    pub(crate) fn unpin_region(&mut self, region: &Rc<Region>) {
        if region.unpin() == 0 {
            self.index.note_unused();
            let tick = self.next_tick();
            region.touch(tick);
        }
    }

    /// Registers a region in the index and advances the high-water marks.
    fn adopt_region(&mut self, region: &Rc<Region>) {
        self.index.insert(Rc::clone(region));
        self.max_mapped = self.max_mapped.max(self.index.mapped_size());
        self.peak_regions = self.peak_regions.max(self.index.region_count());
    }

    /// Drops one region from the index; the FileInfo registry entry goes
    /// with it when this was the file's last region and no open cursor
    /// still addresses the file.
    fn release_region(&mut self, region: &Rc<Region>) {
        if !self.index.remove(region) {
            return;
        }
        if !self.index.has_regions_for(region.path())
            && !self.file_has_open_cursor(region.finfo_rc())
        {
            self.files.remove(region.path());
        }
    }

    /// Evicts the least-recently-used unused region, if one exists.
    pub(crate) fn evict_one_lru(&mut self) -> bool {
        let Some(victim) = self.index.lru_unused() else {
            return false;
        };
        debug!(
            path = %victim.path().display(),
            ofs = victim.ofs(),
            size = victim.size(),
            "evicting unused region"
        );
        self.release_region(&victim);
        true
    }

    /// Releases every region with no clients; returns how many.
    pub(crate) fn purge_unused(&mut self) -> usize {
        let mut freed = 0;
        while self.evict_one_lru() {
            freed += 1;
        }
        freed
    }

    fn file_has_open_cursor(&self, finfo: &Rc<FileInfo>) -> bool {
        self.cursors
            .iter()
            .filter_map(Weak::upgrade)
            .any(|c| !c.is_closed() && Rc::ptr_eq(c.finfo_rc(), finfo))
    }

    fn register_cursor(&mut self, inner: &Rc<CursorInner>) {
        self.cursors.retain(|w| w.strong_count() > 0);
        self.cursors.push(Rc::downgrade(inner));
        self.open_cursors += 1;
    }

    /// A cursor finished (explicit release, close, or drop).
    pub(crate) fn cursor_closed(&mut self) {
        debug_assert!(self.open_cursors > 0);
        self.open_cursors = self.open_cursors.saturating_sub(1);
    }

    /// Force-closes all cursors, drops all regions and files. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }

        if self.open_cursors > 0 {
            warn!(
                open_cursors = self.open_cursors,
                open_regions = self.index.region_count(),
                "manager closed with open cursors"
            );
        }

        for weak in std::mem::take(&mut self.cursors) {
            let Some(inner) = weak.upgrade() else { continue };
            if inner.is_closed() {
                continue;
            }
            // The index still owns the region; only the pin is returned
            // here so client counts stay exact until the index clears.
            if let Some(region) = inner.take_region() {
                region.unpin();
            }
            inner.set_closed();
        }

        self.open_cursors = 0;
        self.index.clear();
        self.files.clear();
        self.closed = true;
    }

    // counter snapshots, all zero once closed

    pub(crate) fn num_open_regions(&self) -> usize {
        self.index.region_count()
    }

    pub(crate) fn num_used_regions(&self) -> usize {
        self.index.used_count()
    }

    pub(crate) fn num_open_cursors(&self) -> usize {
        self.open_cursors
    }

    pub(crate) fn num_open_files(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn mapped_memory_size(&self) -> usize {
        self.index.mapped_size()
    }

    pub(crate) fn max_mapped_memory_size(&self) -> usize {
        self.max_mapped
    }

    pub(crate) fn max_file_handles(&self) -> usize {
        self.peak_regions
    }

    pub(crate) fn index(&self) -> &RegionIndex {
        &self.index
    }
}

impl Drop for MmanState {
    fn drop(&mut self) {
        // Last manager handle gone: same deterministic teardown as an
        // explicit close(), including on panic unwinds.
        self.close();
    }
}

/// True for mmap failures worth retrying after eviction (address-space or
/// memory exhaustion).
pub(crate) fn is_retryable_mmap_failure(report: &eyre::Report) -> bool {
    report
        .downcast_ref::<std::io::Error>()
        .is_some_and(|e| {
            e.raw_os_error() == Some(libc::ENOMEM)
                || e.kind() == std::io::ErrorKind::OutOfMemory
        })
}

/// Issues a fixed cursor for `(path, offset, size)`.
pub(crate) fn make_fixed(
    state: &Rc<RefCell<MmanState>>,
    path: &Path,
    offset: u64,
    size: usize,
) -> Result<FixedCursor> {
    let mut st = state.borrow_mut();
    if st.is_closed() {
        return Err(MapError::Closed.into());
    }
    let finfo = st.intern_file(path)?;
    make_fixed_inner(state, &mut st, finfo, offset, size)
}

/// Fixed-cursor factory for cursors derived from an existing one: reuses
/// the FileInfo identity instead of re-opening the path.
pub(crate) fn make_fixed_with_finfo(
    state: &Rc<RefCell<MmanState>>,
    finfo: Rc<FileInfo>,
    offset: u64,
    size: usize,
) -> Result<FixedCursor> {
    let mut st = state.borrow_mut();
    if st.is_closed() {
        return Err(MapError::Closed.into());
    }
    st.reintern_file(&finfo);
    make_fixed_inner(state, &mut st, finfo, offset, size)
}

fn make_fixed_inner(
    state: &Rc<RefCell<MmanState>>,
    st: &mut MmanState,
    finfo: Rc<FileInfo>,
    offset: u64,
    size: usize,
) -> Result<FixedCursor> {
    let region = st.obtain_region(&finfo, offset)?;

    // The cursor's logical size is what fits between the requested offset
    // and the serving region's end; a caller wanting more chains via
    // next_cursor().
    let avail = (finfo.size().min(region.ofs_end()) - offset) as usize;
    let csize = if size > 0 { size.min(avail) } else { avail };

    st.pin_region(&region);
    let inner = Rc::new(CursorInner::new(
        Rc::downgrade(state),
        finfo,
        offset,
        csize,
        Some(region),
    ));
    st.register_cursor(&inner);
    Ok(FixedCursor::from_inner(inner))
}

/// Issues a sliding cursor; fails with `Unsupported` unless the manager
/// tiles.
pub(crate) fn make_sliding(
    state: &Rc<RefCell<MmanState>>,
    path: &Path,
    offset: u64,
    size: usize,
) -> Result<SlidingCursor> {
    let mut st = state.borrow_mut();
    if st.is_closed() {
        return Err(MapError::Closed.into());
    }
    if !st.supports_sliding() {
        return Err(MapError::Unsupported.into());
    }

    let finfo = st.intern_file(path)?;
    let file_size = finfo.size();
    if offset >= file_size {
        return Err(MapError::OutOfRange {
            path: finfo.path().to_path_buf(),
            offset,
            file_size,
        }
        .into());
    }

    let avail = (file_size - offset) as usize;
    let csize = if size > 0 { size.min(avail) } else { avail };

    // No region binding here: sliding cursors acquire and release their
    // backing region per access.
    let inner = Rc::new(CursorInner::new(
        Rc::downgrade(state),
        finfo,
        offset,
        csize,
        None,
    ));
    st.register_cursor(&inner);
    Ok(SlidingCursor::from_inner(inner))
}
