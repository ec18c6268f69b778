// ── Keyed reactive cache ──
//
// One slot per resource key. Each slot owns a `watch` channel carrying
// the current entry plus bookkeeping counters. Writers go through
// `DashMap::get_mut`, so writes to a key are serialized while reads
// stay lock-free for subscribers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};
use vitrine_api::{ItemId, ResourceKey};

use super::entry::{CacheEntry, DEFAULT_STALE_AFTER, FetchStatus};
use crate::error::CoreError;
use crate::model::{CacheData, PatchOp};
use crate::stream::EntryStream;

struct Slot {
    tx: watch::Sender<Arc<CacheEntry>>,
    /// Bumped by every change to the entry.
    version: u64,
    /// Version of the last server-confirmed write (`set` or fetch commit).
    base_version: u64,
    /// Latest fetch ticket issued for this key.
    fetch_generation: u64,
    touched: Instant,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        let (tx, _) = watch::channel(Arc::new(entry));
        Self {
            tx,
            version: 0,
            base_version: 0,
            fetch_generation: 0,
            touched: Instant::now(),
        }
    }

    fn entry(&self) -> Arc<CacheEntry> {
        self.tx.borrow().clone()
    }

    /// Publish a new entry and bump the version.
    fn publish(&mut self, entry: CacheEntry) -> u64 {
        self.version += 1;
        self.touched = Instant::now();
        self.tx.send_replace(Arc::new(entry));
        self.version
    }

    fn commit(&mut self, data: CacheData, now: DateTime<Utc>) -> u64 {
        let mut entry = (*self.entry()).clone();
        entry.data = data;
        entry.status = FetchStatus::Success;
        entry.error = None;
        entry.fetched_at = Some(now);
        entry.invalidated = false;
        let version = self.publish(entry);
        self.base_version = version;
        version
    }

    fn observed(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

/// A point-in-time copy of an entry with the versions it was taken at.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entry: Arc<CacheEntry>,
    pub version: u64,
    pub base_version: u64,
}

/// Proof that a fetch was started; only the latest ticket may commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: ResourceKey,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

/// How a rollback was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restored {
    /// The entry is back to the pre-mutation snapshot.
    Exact,
    /// Other patches landed during the flight. Only the mutated item was
    /// reverted and those patches were kept.
    Reverted,
    /// The mutated item itself changed during the flight. It was reverted,
    /// discarding that change, and a refetch has been scheduled.
    DiscardedConcurrent,
}

/// Process-wide cache of resource snapshots, keyed by [`ResourceKey`].
///
/// Subscribers get a [`EntryStream`] per key and are notified of every
/// change. Keys that need refetching are pushed onto a queue the sync
/// client drains (see [`take_refetch_queue`](Self::take_refetch_queue)).
pub struct CacheStore {
    slots: DashMap<ResourceKey, Slot>,
    stale_after: Duration,
    refetch_tx: mpsc::UnboundedSender<ResourceKey>,
    refetch_rx: Mutex<Option<mpsc::UnboundedReceiver<ResourceKey>>>,
}

impl CacheStore {
    pub fn new(stale_after: Duration) -> Self {
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        Self {
            slots: DashMap::new(),
            stale_after,
            refetch_tx,
            refetch_rx: Mutex::new(Some(refetch_rx)),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Take the refetch queue. Returns `None` after the first call.
    pub fn take_refetch_queue(&self) -> Option<mpsc::UnboundedReceiver<ResourceKey>> {
        self.refetch_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current entry for `key`, creating an idle one on first access.
    pub fn get(&self, key: &ResourceKey) -> Arc<CacheEntry> {
        if let Some(slot) = self.slots.get(key) {
            return slot.entry();
        }
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(CacheEntry::new(key.clone(), self.stale_after)))
            .entry()
    }

    /// Current entry, without creating one.
    pub fn peek(&self, key: &ResourceKey) -> Option<Arc<CacheEntry>> {
        self.slots.get(key).map(|slot| slot.entry())
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Snapshot {
        let slot = self.slot_mut(key);
        Snapshot {
            entry: slot.entry(),
            version: slot.version,
            base_version: slot.base_version,
        }
    }

    pub fn version(&self, key: &ResourceKey) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.version)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.slots.iter().map(|r| r.key().clone()).collect()
    }

    /// Cached keys for a resource collection, whatever their parameters.
    pub fn keys_named(&self, name: &str) -> Vec<ResourceKey> {
        self.slots
            .iter()
            .filter(|r| r.key().name() == name)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Observed keys whose entries are stale at `now` and not loading.
    pub fn stale_keys(&self, now: DateTime<Utc>) -> Vec<ResourceKey> {
        self.slots
            .iter()
            .filter(|r| r.observed())
            .filter(|r| {
                let entry = r.entry();
                !entry.is_loading() && entry.is_stale_at(now)
            })
            .map(|r| r.key().clone())
            .collect()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Observe `key`. Creates an idle entry if none exists.
    pub fn subscribe(&self, key: &ResourceKey) -> EntryStream {
        let rx = self.slot_mut(key).tx.subscribe();
        EntryStream::new(rx)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the data wholesale as server-confirmed state.
    pub fn set(&self, key: &ResourceKey, data: CacheData) -> u64 {
        let mut slot = self.slot_mut(key);
        // Outstanding fetches started before this write lose.
        slot.fetch_generation += 1;
        slot.commit(data, Utc::now())
    }

    /// Apply a pure transform to the current data.
    ///
    /// Returns the resulting version, or `None` if the key has no entry.
    /// A transform that leaves the data unchanged publishes nothing.
    /// Patches do not count as server-confirmed.
    pub fn patch<F>(&self, key: &ResourceKey, updater: F) -> Option<u64>
    where
        F: FnOnce(&CacheData) -> CacheData,
    {
        let mut slot = self.slots.get_mut(key)?;
        let current = slot.entry();
        let next = updater(&current.data);
        if next == current.data {
            return Some(slot.version);
        }
        let mut entry = (*current).clone();
        entry.data = next;
        Some(slot.publish(entry))
    }

    /// [`patch`](Self::patch), returning a snapshot of the result taken
    /// under the same lock. Creates an idle entry if none exists.
    pub fn patch_snapshot<F>(&self, key: &ResourceKey, updater: F) -> Snapshot
    where
        F: FnOnce(&CacheData) -> CacheData,
    {
        let mut slot = self.slot_mut(key);
        let current = slot.entry();
        let next = updater(&current.data);
        if next != current.data {
            let mut entry = (*current).clone();
            entry.data = next;
            slot.publish(entry);
        }
        Snapshot {
            entry: slot.entry(),
            version: slot.version,
            base_version: slot.base_version,
        }
    }

    /// [`patch`](Self::patch) with a [`PatchOp`].
    pub fn apply(&self, key: &ResourceKey, op: &PatchOp) -> Option<u64> {
        self.patch(key, |data| op.apply(data))
    }

    /// Mark the entry stale without touching its data. Observed entries
    /// are queued for refetch right away; others refetch when next observed.
    pub fn invalidate(&self, key: &ResourceKey) {
        if self.mark_invalidated(key) {
            self.schedule_refetch(key);
        }
    }

    /// Invalidate every entry.
    pub fn invalidate_all(&self) {
        for key in self.keys() {
            self.invalidate(&key);
        }
    }

    /// Remove an entry. Subscribers see their stream end.
    pub fn remove(&self, key: &ResourceKey) -> bool {
        self.slots.remove(key).is_some()
    }

    // ── Fetch bookkeeping ────────────────────────────────────────────

    /// Mark `key` as loading and issue a ticket superseding earlier ones.
    pub fn begin_fetch(&self, key: &ResourceKey) -> FetchTicket {
        let mut slot = self.slot_mut(key);
        slot.fetch_generation += 1;
        let generation = slot.fetch_generation;
        let mut entry = (*slot.entry()).clone();
        entry.status = FetchStatus::Loading;
        slot.publish(entry);
        FetchTicket {
            key: key.clone(),
            generation,
        }
    }

    /// Record a fetch result. Returns `false` when the ticket was
    /// superseded and the result discarded.
    pub fn complete_fetch(&self, ticket: &FetchTicket, result: Result<CacheData, CoreError>) -> bool {
        let Some(mut slot) = self.slots.get_mut(&ticket.key) else {
            debug!(key = %ticket.key, "entry removed before fetch completed");
            return false;
        };
        if slot.fetch_generation != ticket.generation {
            debug!(key = %ticket.key, "discarding superseded fetch");
            return false;
        }
        match result {
            Ok(data) => {
                slot.commit(data, Utc::now());
            }
            Err(err) => {
                let mut entry = (*slot.entry()).clone();
                entry.status = FetchStatus::Error;
                entry.error = Some(err);
                slot.publish(entry);
            }
        }
        true
    }

    // ── Rollback ─────────────────────────────────────────────────────

    /// Undo a failed optimistic write to `item`.
    ///
    /// `previous` and `optimistic` are the snapshots taken before and
    /// right after the optimistic patch. If nothing else changed the
    /// entry since, `previous` is restored verbatim. Otherwise only
    /// `item` is put back to its `previous` state, so patches made to
    /// other items in the meantime (including other in-flight
    /// mutations) survive.
    ///
    /// Fails with [`CoreError::StaleBase`] when server-confirmed state
    /// replaced the entry since `previous` was taken: the rollback is
    /// dropped and the key queued for refetch instead.
    pub fn rollback(
        &self,
        previous: &Snapshot,
        optimistic: &Snapshot,
        item: &ItemId,
    ) -> Result<Restored, CoreError> {
        let key = &previous.entry.key;
        let mut slot = self.slot_mut(key);

        if slot.base_version != previous.base_version {
            drop(slot);
            warn!(key = %key, "rollback base is stale, dropping and refetching");
            self.mark_invalidated(key);
            self.schedule_refetch(key);
            return Err(CoreError::StaleBase {
                key: key.to_string(),
            });
        }

        if slot.version == optimistic.version {
            slot.publish((*previous.entry).clone());
            return Ok(Restored::Exact);
        }

        let current = slot.entry();
        let touched = current.data.find(item) != optimistic.entry.data.find(item);
        let reverted = current.data.revert_item(item, &previous.entry.data);
        if reverted != current.data {
            let mut entry = (*current).clone();
            entry.data = reverted;
            slot.publish(entry);
        }
        drop(slot);

        if touched {
            debug!(key = %key, item = %item, "rollback discarded a concurrent change, refetching");
            self.mark_invalidated(key);
            self.schedule_refetch(key);
            Ok(Restored::DiscardedConcurrent)
        } else {
            Ok(Restored::Reverted)
        }
    }

    // ── Garbage collection ───────────────────────────────────────────

    /// Remove unobserved entries untouched for at least `gc_after`.
    /// Returns the number removed.
    pub fn collect_garbage(&self, gc_after: Duration) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| slot.observed() || slot.touched.elapsed() < gc_after);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed, "collected unobserved cache entries");
        }
        removed
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot_mut(&self, key: &ResourceKey) -> dashmap::mapref::one::RefMut<'_, ResourceKey, Slot> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(CacheEntry::new(key.clone(), self.stale_after)))
    }

    /// Flag the entry stale. Returns whether it has live subscribers.
    fn mark_invalidated(&self, key: &ResourceKey) -> bool {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return false;
        };
        let mut entry = (*slot.entry()).clone();
        if !entry.invalidated {
            entry.invalidated = true;
            slot.publish(entry);
        }
        slot.observed()
    }

    fn schedule_refetch(&self, key: &ResourceKey) {
        // The receiver is gone only after the sync client shut down.
        let _ = self.refetch_tx.send(key.clone());
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
