//! # winmap - Sliding-Window Memory-Map Manager
//!
//! winmap exposes slices of on-disk files as zero-copy byte views while
//! hiding the arithmetic of partitioning those files into OS-level memory
//! mappings, bounding total resident memory, and releasing mappings
//! deterministically when no cursor references them.
//!
//! ## Quick Start
//!
//! ```ignore
//! use winmap::TilingManager;
//!
//! let mman = TilingManager::builder()
//!     .window_size(64 * 1024 * 1024)
//!     .max_memory_size(1024 * 1024 * 1024)
//!     .build();
//!
//! let cursor = mman.make_cursor_at("pack.bin", 4096, 1024)?;
//! let bytes = cursor.buffer()?;          // zero-copy &[u8] view
//! assert_eq!(bytes.len(), 1024);
//!
//! let sliding = mman.make_sliding_cursor("pack.bin", 0, 0)?;
//! let tail = sliding.slice(-16, -1)?;    // negative offsets, window-blind
//! # eyre::Ok(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │   GreedyManager        TilingManager      │   allocation policy,
//! │   (whole-file regions) (windowed, LRU)    │   budgets, eviction
//! ├───────────────────────────────────────────┤
//! │   FixedCursor          SlidingCursor      │   client handles,
//! │   (one pinned region)  (re-homes per read)│   logical offsets
//! ├───────────────────────────────────────────┤
//! │   Region pool + RegionIndex               │   page-aligned mmaps,
//! │                                           │   pin counts, LRU ticks
//! ├───────────────────────────────────────────┤
//! │   FileInfo registry                       │   canonical path, frozen
//! │                                           │   size, read-only fd
//! └───────────────────────────────────────────┘
//! ```
//!
//! A cursor request resolves its file in the registry, asks the manager's
//! policy for a region covering the range (reusing, or mapping fresh and
//! evicting LRU unused regions under pressure), pins that region, and
//! returns a handle bound to region + logical slice. Releasing the handle
//! unpins; unpinned regions stay cached until pressure or
//! [`collect`](TilingManager::collect) reclaims them.
//!
//! ## Resource Model
//!
//! Managers are single-threaded and perform no locking; re-entrant use on
//! one thread is fine. All mappings are read-only. Release is
//! deterministic without a collector: dropping cursors returns pins,
//! dropping (or closing) the manager unmaps everything it issued, on
//! panic unwinds included.

pub mod config;
pub mod cursor;
pub mod error;
pub mod finfo;
pub mod manager;
pub mod region;

mod relation;

pub use cursor::{FixedCursor, SlidingCursor};
pub use error::MapError;
pub use finfo::FileInfo;
pub use manager::{GreedyManager, TilingManager, TilingManagerBuilder};
pub use region::{page_size, MapView, Region};
