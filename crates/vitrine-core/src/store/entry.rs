// ── Cache entries ──

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use strum::Display;
use tracing::debug;
use vitrine_api::ResourceKey;

use crate::error::CoreError;
use crate::model::{CacheData, decode_record};

/// Default age after which an entry is refetched on observation.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Fetch lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum FetchStatus {
    /// Created, never fetched.
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Last-known state for one resource key.
///
/// Entries are immutable snapshots: every store operation replaces the
/// entry whole, so a reader never sees a half-applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: ResourceKey,
    pub data: CacheData,
    pub status: FetchStatus,
    /// Error of the most recent fetch, cleared by the next success.
    pub error: Option<CoreError>,
    /// When `data` was last confirmed by the server.
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale_after: Duration,
    /// Set by `invalidate`; cleared by the next successful fetch.
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn new(key: ResourceKey, stale_after: Duration) -> Self {
        Self {
            key,
            data: CacheData::Empty,
            status: FetchStatus::Idle,
            error: None,
            fetched_at: None,
            stale_after,
            invalidated: false,
        }
    }

    /// Whether the entry should be refetched when observed at `now`.
    ///
    /// Never-fetched and invalidated entries are always stale; otherwise
    /// an entry is stale once strictly older than `stale_after`.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        if self.invalidated {
            return true;
        }
        let Some(fetched_at) = self.fetched_at else {
            return true;
        };
        // A threshold too large for chrono never expires.
        let Ok(threshold) = TimeDelta::from_std(self.stale_after) else {
            return false;
        };
        now.signed_duration_since(fetched_at) > threshold
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    /// Decode the cached documents as `T`. Documents that fail to decode
    /// are skipped.
    pub fn items<T: DeserializeOwned>(&self) -> Vec<T> {
        self.data
            .items()
            .iter()
            .filter_map(|doc| match decode_record(doc) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!(key = %self.key, error = %e, "skipping undecodable document");
                    None
                }
            })
            .collect()
    }

    /// Decode the single cached document, or the first of a collection.
    pub fn document<T: DeserializeOwned>(&self) -> Option<T> {
        self.items().into_iter().next()
    }
}
