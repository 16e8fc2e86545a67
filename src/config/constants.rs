//! # Window Manager Constants
//!
//! All numeric defaults of the tiling allocator in one place, with their
//! relationships documented. The tiling manager copies these into its own
//! configuration at construction time; changing a constant here never
//! affects managers that already exist.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_WINDOW_SIZE (64 MiB on 64-bit, 16 MiB on 32-bit)
//!       │
//!       ├─> DEFAULT_MAX_MEMORY_SIZE (a large multiple of the window size;
//!       │     the eviction loop frees LRU unused regions to stay below it)
//!       │
//!       └─> TAIL_SWALLOW_DIVISOR (tail-merge threshold is
//!             window_size / TAIL_SWALLOW_DIVISOR)
//!
//! MMAP_RETRY_LIMIT
//!       └─> bounds the evict-and-retry loop around ENOMEM mmap failures
//! ```
//!
//! ## Choosing a window size
//!
//! A larger window means fewer regions per file and fewer boundary
//! crossings for sliding cursors, at the cost of coarser eviction. 64 MiB
//! keeps a multi-gigabyte file under ~100 regions while staying far below
//! the address-space pressure that matters on 32-bit targets, where 16 MiB
//! is used instead.

/// Target region size in bytes for the tiling manager.
///
/// Regions may exceed this by up to one page of downward offset alignment
/// plus the swallowed file tail (see [`TAIL_SWALLOW_DIVISOR`]).
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_WINDOW_SIZE: usize = 64 * 1024 * 1024;
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_WINDOW_SIZE: usize = 16 * 1024 * 1024;

/// Default upper bound on the summed size of all live regions.
///
/// A hard limit: allocation evicts LRU unused regions to stay below it and
/// fails with out-of-memory once nothing evictable remains.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_MAX_MEMORY_SIZE: usize = 8 * 1024 * 1024 * 1024;
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_MAX_MEMORY_SIZE: usize = 1024 * 1024 * 1024;

/// Default upper bound on the number of live regions. Effectively
/// unbounded; the memory limit is the operative cap.
pub const DEFAULT_MAX_OPEN_HANDLES: usize = usize::MAX;

/// Swallow-the-tail threshold divisor.
///
/// When a candidate region would leave at most `window_size /
/// TAIL_SWALLOW_DIVISOR` bytes of file tail unmapped, the candidate is
/// extended to end-of-file instead of leaving a tiny final region. The
/// heuristic is deterministic: same request, same region geometry.
pub const TAIL_SWALLOW_DIVISOR: usize = 2;

/// How many times an ENOMEM mmap failure is retried after evicting the
/// least-recently-used unused region. Retries stop early when nothing is
/// left to evict.
pub const MMAP_RETRY_LIMIT: usize = 3;

const _: () = assert!(TAIL_SWALLOW_DIVISOR >= 1, "tail threshold must not exceed the window size");
const _: () = assert!(
    DEFAULT_MAX_MEMORY_SIZE >= DEFAULT_WINDOW_SIZE,
    "memory budget below the window size could never admit a single region"
);
