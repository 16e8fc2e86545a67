//! # Greedy Manager
//!
//! One region per file, covering the whole file, created on first demand
//! and reused for every later cursor. There is no memory budget beyond
//! the sum of the open files' sizes: callers who know their files fit in
//! address space pay no per-access region lookup beyond a single hash.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use eyre::{Result, WrapErr};
use tracing::warn;

use crate::config::MMAP_RETRY_LIMIT;
use crate::cursor::{FixedCursor, SlidingCursor};
use crate::error::MapError;
use crate::finfo::FileInfo;
use crate::region::Region;

use super::{is_retryable_mmap_failure, make_fixed, make_sliding, MmanState, Policy};

impl MmanState {
    /// Greedy allocation: the file's single whole-file region, mapped
    /// lazily on first request.
    pub(crate) fn obtain_whole(
        &mut self,
        finfo: &Rc<FileInfo>,
        offset: u64,
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

        if let Some(region) = self.index().sole_region(finfo.path()) {
            let tick = self.next_tick();
            region.touch(tick);
            return Ok(region);
        }

        let size = usize::try_from(file_size).map_err(|_| MapError::OutOfMemory {
            requested: usize::MAX,
            mapped: self.mapped_memory_size(),
            max_memory_size: usize::MAX,
        })?;

        let mut attempts = 0;
        let region = loop {
            match Region::map(finfo, 0, size) {
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
                        max_memory_size: usize::MAX,
                    }));
                }
                Err(err) => {
                    return Err(err).wrap_err_with(|| {
                        format!("failed to map whole file '{}'", finfo.path().display())
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

/// Manager mapping each file into a single full-size region.
///
/// Cursors from this manager always see their whole request in one
/// region, so `next_cursor()` chaining is never forced by region
/// boundaries; the trade-off is that a file larger than the address
/// space cannot be opened at all. Sliding cursors are unsupported.
///
/// Dropping the manager (or calling [`close`](GreedyManager::close))
/// releases every cursor, region and file descriptor it issued.
#[derive(Debug)]
pub struct GreedyManager {
    state: Rc<RefCell<MmanState>>,
}

impl GreedyManager {
    pub fn new() -> Self {
        Self {
            state: MmanState::new_shared(Policy::Greedy),
        }
    }

    /// Cursor over the whole file, equivalent to `make_cursor_at(path, 0, 0)`.
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

    /// Always fails with [`MapError::Unsupported`]: greedy managers do
    /// not tile, so there is nothing for a sliding cursor to slide over.
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

    /// Sum of all live regions' sizes in bytes.
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

impl Default for GreedyManager {
    fn default() -> Self {
        Self::new()
    }
}
