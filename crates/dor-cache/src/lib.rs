//! Reader cache for the Digital Object Repository.
//!
//! Opening a reader is comparatively expensive, so resolved readers are
//! kept for a short while keyed by pid. The cache is bounded by both entry
//! count and entry age.
//!
//! # Key Types
//!
//! - [`ReaderCache`] -- insertion-ordered map with capacity eviction and age sweep
//! - [`Sweeper`] -- the single background task that sweeps a cache
//! - [`Clock`] -- injectable time source ([`SystemClock`], [`ManualClock`])

pub mod cache;
pub mod clock;
pub mod sweeper;

pub use cache::{CacheLimits, ReaderCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use sweeper::Sweeper;
