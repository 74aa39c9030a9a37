//! Background Tasks Module
//!
//! Long-running tasks a cache host spawns alongside its managers.
//!
//! # Tasks
//! - Invalidation listener: replays pattern invalidations from other contexts

mod invalidation;

pub use invalidation::spawn_invalidation_listener;
