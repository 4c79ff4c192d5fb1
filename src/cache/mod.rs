//! Cache Module
//!
//! The TTL-aware cache client and the pieces it is built from: the stored
//! entry envelope, the value codec, the retry policy and statistics.

mod client;
mod codec;
mod entry;
mod retry;
mod stats;


// Re-export public types
pub use client::CacheClient;
pub use codec::Codec;
pub use entry::{current_timestamp_ms, CacheEntry, EnvelopeHeader, HEADER_LEN};
pub use retry::RetryPolicy;
pub use stats::{CacheStats, StatsRecorder};
