//! # Configuration Module
//!
//! Centralizes the tunable constants of the window manager. Values that
//! depend on each other live next to each other in [`constants`] and are
//! guarded by compile-time assertions so they cannot drift apart.

pub mod constants;
pub use constants::*;
