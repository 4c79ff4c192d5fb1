//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Eager sweep: Removes expired in-memory entries at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
