// ── Cache store ──
//
// Versioned per-key entries with push-based change notification.

mod cache_store;
mod entry;

pub use cache_store::{CacheStore, FetchTicket, Restored, Snapshot};
pub use entry::{CacheEntry, DEFAULT_STALE_AFTER, FetchStatus};
