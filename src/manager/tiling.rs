//! # Tiling Manager
//!
//! Serves arbitrary `(offset, size)` requests from a bounded pool of
//! window-sized, page-aligned regions. Reuse is preferred; under memory
//! or handle pressure the least-recently-used region with no clients is
//! evicted, and pinned regions are never touched.
//!
//! ## Candidate Window
//!
//! A miss maps `[align_down(offset), min(offset + window_size,
//! file_size))`. Measuring the window from the requested offset (with the
//! start aligned downward) guarantees the new region covers the request
//! even when the window is smaller than a page. When the candidate would
//! leave at most `window_size / TAIL_SWALLOW_DIVISOR` bytes of file tail
//! unmapped, it is extended to end-of-file instead: a tiny final region
//! would occupy a handle without ever saving memory.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use eyre::{Result, WrapErr};
use tracing::warn;

use crate::config::{
    DEFAULT_MAX_MEMORY_SIZE, DEFAULT_MAX_OPEN_HANDLES, DEFAULT_WINDOW_SIZE, MMAP_RETRY_LIMIT,
    TAIL_SWALLOW_DIVISOR,
};
use crate::cursor::{FixedCursor, SlidingCursor};
use crate::error::MapError;
use crate::finfo::FileInfo;
use crate::region::{align_down, Region};

use super::{is_retryable_mmap_failure, make_fixed, make_sliding, MmanState, Policy, TilingConfig};

/// Computes the candidate region `(start, size)` for a request at
/// `offset`. Deterministic: geometry depends only on the arguments.
fn tile_window(offset: u64, file_size: u64, window_size: usize) -> (u64, usize) {
    debug_assert!(offset < file_size);

    let start = align_down(offset);
    let mut end = offset.saturating_add(window_size as u64).min(file_size);
    let tail = file_size - end;
    if tail <= (window_size / TAIL_SWALLOW_DIVISOR) as u64 {
        end = file_size;
    }
    (start, (end - start) as usize)
}

impl MmanState {
    /// Tiling allocation: reuse any region covering `offset`, otherwise
    /// map a fresh window, evicting LRU unused regions to stay inside the
    /// memory and handle budgets.
    pub(crate) fn obtain_tile(
        &mut self,
        finfo: &Rc<FileInfo>,
        offset: u64,
        cfg: TilingConfig,
    ) -> Result<Rc<Region>> {
        let file_size = finfo.size();
        if offset >= file_size {
            return Err(MapError::OutOfRange {
                path: finfo.path().to_path_buf(),
                offset,
                file_size,
            }
            .into());
        }

        if let Some(region) = self.index().find_covering(finfo.path(), offset) {
            let tick = self.next_tick();
            region.touch(tick);
            return Ok(region);
        }

        let (start, size) = tile_window(offset, file_size, cfg.window_size);

        // Hard budgets: make room before mapping, fail once nothing
        // unused is left to evict.
        while self.mapped_memory_size() + size > cfg.max_memory_size
            || self.num_open_regions() + 1 > cfg.max_open_handles
        {
            if !self.evict_one_lru() {
                return Err(MapError::OutOfMemory {
                    requested: size,
                    mapped: self.mapped_memory_size(),
                    max_memory_size: cfg.max_memory_size,
                }
                .into());
            }
        }

        let mut attempts = 0;
        let region = loop {
            match Region::map(finfo, start, size) {
                Ok(region) => break Rc::new(region),
                Err(err)
                    if is_retryable_mmap_failure(&err)
                        && attempts < MMAP_RETRY_LIMIT
                        && self.evict_one_lru() =>
                {
                    attempts += 1;
                    warn!(
                        path = %finfo.path().display(),
                        attempts,
                        "mmap failed, retrying after eviction"
                    );
                }
                Err(err) if is_retryable_mmap_failure(&err) => {
                    return Err(err.wrap_err(MapError::OutOfMemory {
                        requested: size,
                        mapped: self.mapped_memory_size(),
                        max_memory_size: cfg.max_memory_size,
                    }));
                }
                Err(err) => {
                    return Err(err).wrap_err_with(|| {
                        format!(
                            "failed to map window at offset {} of '{}'",
                            start,
                            finfo.path().display()
                        )
                    })
                }
            }
        };

        let tick = self.next_tick();
        region.touch(tick);
        self.adopt_region(&region);
        Ok(region)
    }
}

/// Manager tiling files into multiple window-sized regions.
///
/// Serves arbitrary byte ranges under a hard memory budget by evicting
/// least-recently-used regions that no cursor pins. The only flavor that
/// issues [`SlidingCursor`]s.
///
/// Dropping the manager (or calling [`close`](TilingManager::close))
/// releases every cursor, region and file descriptor it issued.
#[derive(Debug)]
pub struct TilingManager {
    state: Rc<RefCell<MmanState>>,
}

impl TilingManager {
    /// Manager with the default window size and budgets from
    /// [`crate::config`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TilingManagerBuilder {
        TilingManagerBuilder::default()
    }

    fn with_config(cfg: TilingConfig) -> Self {
        Self {
            state: MmanState::new_shared(Policy::Tiling(cfg)),
        }
    }

    /// Cursor over the whole file, equivalent to `make_cursor_at(path, 0, 0)`.
    ///
    /// With a window smaller than the file, the cursor is truncated to
    /// its serving region; chain with
    /// [`next_cursor`](FixedCursor::next_cursor) to walk the rest.
    pub fn make_cursor(&self, path: impl AsRef<Path>) -> Result<FixedCursor> {
        make_fixed(&self.state, path.as_ref(), 0, 0)
    }

    /// Cursor over `[offset, offset + size)`; `size == 0` means as much
    /// as possible from `offset`. Fails with `OutOfRange` when `offset`
    /// is at or past end-of-file.
    pub fn make_cursor_at(
        &self,
        path: impl AsRef<Path>,
        offset: u64,
        size: usize,
    ) -> Result<FixedCursor> {
        make_fixed(&self.state, path.as_ref(), offset, size)
    }

    /// Sliding cursor over `[offset, offset + size)` (`size == 0`: to
    /// end-of-file). The cursor re-homes to whatever region covers each
    /// access, hiding window boundaries at the cost of a copy per read.
    pub fn make_sliding_cursor(
        &self,
        path: impl AsRef<Path>,
        offset: u64,
        size: usize,
    ) -> Result<SlidingCursor> {
        make_sliding(&self.state, path.as_ref(), offset, size)
    }

    /// Releases all regions with no clients; returns how many were freed.
    pub fn collect(&self) -> usize {
        self.state.borrow_mut().purge_unused()
    }

    /// Force-closes every cursor and unmaps every region. Idempotent;
    /// also runs when the manager is dropped.
    pub fn close(&self) {
        self.state.borrow_mut().close();
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    /// Live regions, used or unused.
    pub fn num_open_regions(&self) -> usize {
        self.state.borrow().num_open_regions()
    }

    /// Live regions with at least one cursor pinned.
    pub fn num_used_regions(&self) -> usize {
        self.state.borrow().num_used_regions()
    }

    /// Cursors issued and not yet released.
    pub fn num_open_cursors(&self) -> usize {
        self.state.borrow().num_open_cursors()
    }

    /// Files currently interned in the registry.
    pub fn num_open_files(&self) -> usize {
        self.state.borrow().num_open_files()
    }

    /// Sum of all live regions' sizes in bytes. Never exceeds the
    /// configured `max_memory_size`.
    pub fn mapped_memory_size(&self) -> usize {
        self.state.borrow().mapped_memory_size()
    }

    /// High-water mark of [`mapped_memory_size`](Self::mapped_memory_size).
    pub fn max_mapped_memory_size(&self) -> usize {
        self.state.borrow().max_mapped_memory_size()
    }

    /// High-water mark of [`num_open_regions`](Self::num_open_regions).
    pub fn max_file_handles(&self) -> usize {
        self.state.borrow().max_file_handles()
    }
}

impl Default for TilingManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TilingManager`]; unset options take the documented
/// defaults from [`crate::config`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TilingManagerBuilder {
    window_size: Option<usize>,
    max_memory_size: Option<usize>,
    max_open_handles: Option<usize>,
}

impl TilingManagerBuilder {
    /// Target region size in bytes. Not rounded to a page multiple; only
    /// region offsets are aligned, so sub-page windows stay honest about
    /// their mapped sizes.
    pub fn window_size(mut self, bytes: usize) -> Self {
        self.window_size = Some(bytes);
        self
    }

    /// Hard upper bound on the summed size of all live regions.
    pub fn max_memory_size(mut self, bytes: usize) -> Self {
        self.max_memory_size = Some(bytes);
        self
    }

    /// Upper bound on the number of live regions.
    pub fn max_open_handles(mut self, count: usize) -> Self {
        self.max_open_handles = Some(count);
        self
    }

    pub fn build(self) -> TilingManager {
        let cfg = TilingConfig {
            window_size: self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE).max(1),
            max_memory_size: self.max_memory_size.unwrap_or(DEFAULT_MAX_MEMORY_SIZE),
            max_open_handles: self.max_open_handles.unwrap_or(DEFAULT_MAX_OPEN_HANDLES).max(1),
        };
        TilingManager::with_config(cfg)
    }
}
