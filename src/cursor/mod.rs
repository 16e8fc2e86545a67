//! # Cursors
//!
//! A cursor is the client-facing handle over a byte range of one file,
//! backed by one region ([`FixedCursor`]) or by whatever region covers
//! the current access ([`SlidingCursor`]).
//!
//! Cursors quote *logical* offsets: the range the client asked for, not
//! the page-rounded range of the backing region. The shared core below
//! carries that logical range plus a weak back-reference to the manager,
//! which is upgraded and validated on every operation, so a cursor can
//! never outlive its manager's bookkeeping: once the manager closes, the
//! cursor observes `closed` and exposes no bytes.

mod fixed;
mod sliding;

pub use fixed::FixedCursor;
pub use sliding::SlidingCursor;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::finfo::FileInfo;
use crate::manager::MmanState;
use crate::region::Region;

/// State shared between a cursor handle and the manager's weak token for
/// it. The manager force-closes cursors through this block at close time.
#[derive(Debug)]
pub(crate) struct CursorInner {
    mman: Weak<RefCell<MmanState>>,
    finfo: Rc<FileInfo>,
    ofs: u64,
    size: usize,
    /// Pin slot. Fixed cursors hold their region here for their whole
    /// open life; sliding cursors leave it empty between accesses.
    region: RefCell<Option<Rc<Region>>>,
    closed: Cell<bool>,
}

impl CursorInner {
    pub(crate) fn new(
        mman: Weak<RefCell<MmanState>>,
        finfo: Rc<FileInfo>,
        ofs: u64,
        size: usize,
        region: Option<Rc<Region>>,
    ) -> Self {
        Self {
            mman,
            finfo,
            ofs,
            size,
            region: RefCell::new(region),
            closed: Cell::new(false),
        }
    }

    pub(crate) fn mman(&self) -> &Weak<RefCell<MmanState>> {
        &self.mman
    }

    pub(crate) fn finfo(&self) -> &FileInfo {
        &self.finfo
    }

    pub(crate) fn finfo_rc(&self) -> &Rc<FileInfo> {
        &self.finfo
    }

    pub(crate) fn ofs(&self) -> u64 {
        self.ofs
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn ofs_end(&self) -> u64 {
        self.ofs + self.size as u64
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn set_closed(&self) {
        self.closed.set(true);
    }

    pub(crate) fn region(&self) -> Option<Rc<Region>> {
        self.region.borrow().clone()
    }

    pub(crate) fn take_region(&self) -> Option<Rc<Region>> {
        self.region.borrow_mut().take()
    }

    /// Closes this cursor through the manager, returning the pin and
    /// updating the counters. Safe to call any number of times and with
    /// the manager already closed or gone.
    pub(crate) fn close_via_manager(&self) {
        if self.closed.get() {
            return;
        }
        self.closed.set(true);

        let region = self.take_region();
        if let Some(state) = self.mman.upgrade() {
            let mut st = state.borrow_mut();
            if !st.is_closed() {
                if let Some(region) = &region {
                    st.unpin_region(region);
                }
                st.cursor_closed();
            }
        }
    }
}
