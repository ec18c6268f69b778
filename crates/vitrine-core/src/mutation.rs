// ── Optimistic mutation coordination ──
//
// Wraps one remote write in optimistic-patch / confirm / rollback and
// enforces at most one in-flight mutation per item.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use strum::Display;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vitrine_api::{ItemId, ResourceKey};

use crate::error::CoreError;
use crate::model::CacheData;
use crate::store::{CacheEntry, CacheStore, Restored};

/// Generic fallback when a mutation names none.
const DEFAULT_FALLBACK: &str = "The change could not be saved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MutationStatus {
    InFlight,
    Committed,
    RolledBack,
}

/// Bookkeeping for a mutation between start and resolution.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: Uuid,
    pub key: ResourceKey,
    pub item: ItemId,
    pub previous: Arc<CacheEntry>,
    pub optimistic: Arc<CacheEntry>,
    pub status: MutationStatus,
    pub started_at: DateTime<Utc>,
}

/// Identifies what a mutation touches and how to report its failure.
#[derive(Debug, Clone)]
pub struct Mutation {
    key: ResourceKey,
    item: ItemId,
    fallback: String,
}

impl Mutation {
    pub fn new(key: ResourceKey, item: impl Into<ItemId>) -> Self {
        Self {
            key,
            item: item.into(),
            fallback: DEFAULT_FALLBACK.to_owned(),
        }
    }

    /// Message shown when the server gives no reason for a failure,
    /// e.g. "Failed to toggle product visibility".
    #[must_use]
    pub fn fallback(mut self, message: impl Into<String>) -> Self {
        self.fallback = message.into();
        self
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn item(&self) -> &ItemId {
        &self.item
    }
}

type PendingKey = (ResourceKey, ItemId);

/// Runs optimistic writes against a [`CacheStore`].
pub struct MutationCoordinator {
    store: Arc<CacheStore>,
    pending: DashMap<PendingKey, PendingMutation>,
}

impl MutationCoordinator {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            pending: DashMap::new(),
        }
    }

    /// The pending mutation for an item, if one is in flight.
    pub fn pending(&self, key: &ResourceKey, item: &ItemId) -> Option<PendingMutation> {
        self.pending
            .get(&(key.clone(), item.clone()))
            .map(|p| p.value().clone())
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Apply `optimistic` to the cached data, run `remote`, then commit
    /// or roll back.
    ///
    /// On success the entry is invalidated so the server's version
    /// replaces the optimistic one. On failure the item is put back to
    /// its pre-mutation state, leaving other items' pending changes in
    /// place, and [`CoreError::MutationFailed`] carries the server's
    /// message, or the mutation's fallback when there is none.
    ///
    /// Fails fast with [`CoreError::AlreadyInFlight`], leaving the cache
    /// untouched, when the item already has a mutation in flight.
    pub async fn mutate<T, P, F, Fut>(
        &self,
        mutation: Mutation,
        optimistic: P,
        remote: F,
    ) -> Result<T, CoreError>
    where
        P: FnOnce(&CacheData) -> CacheData,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let Mutation {
            key,
            item,
            fallback,
        } = mutation;

        let guard = self.register(&key, &item)?;
        let previous = self.store.snapshot(&key);

        let applied = self.store.patch_snapshot(&key, optimistic);
        guard.update(|p| {
            p.previous = previous.entry.clone();
            p.optimistic = applied.entry.clone();
        });

        debug!(key = %key, item = %item, mutation = %guard.id, "mutation in flight");

        match remote().await {
            Ok(value) => {
                guard.update(|p| p.status = MutationStatus::Committed);
                self.store.invalidate(&key);
                debug!(key = %key, item = %item, "mutation committed");
                Ok(value)
            }
            Err(cause) => {
                match self.store.rollback(&previous, &applied, &item) {
                    Ok(Restored::Exact) => {}
                    Ok(Restored::Reverted) => {
                        debug!(key = %key, item = %item, "reverted item, kept concurrent updates");
                    }
                    Ok(Restored::DiscardedConcurrent) => {
                        info!(key = %key, item = %item, "rollback discarded a concurrent update");
                    }
                    Err(e) => {
                        debug!(key = %key, item = %item, error = %e, "rollback dropped");
                    }
                }
                guard.update(|p| p.status = MutationStatus::RolledBack);
                warn!(key = %key, item = %item, error = %cause, "mutation rolled back");
                Err(CoreError::MutationFailed {
                    message: cause.user_message(&fallback),
                    cause: Box::new(cause),
                })
            }
        }
    }

    fn register(&self, key: &ResourceKey, item: &ItemId) -> Result<PendingGuard<'_>, CoreError> {
        let slot = (key.clone(), item.clone());
        match self.pending.entry(slot.clone()) {
            Entry::Occupied(_) => Err(CoreError::AlreadyInFlight {
                key: key.to_string(),
                item: item.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let id = Uuid::new_v4();
                let previous = self.store.get(key);
                vacant.insert(PendingMutation {
                    id,
                    key: key.clone(),
                    item: item.clone(),
                    optimistic: previous.clone(),
                    previous,
                    status: MutationStatus::InFlight,
                    started_at: Utc::now(),
                });
                Ok(PendingGuard {
                    pending: &self.pending,
                    slot,
                    id,
                })
            }
        }
    }
}

/// Clears the pending record when the mutation resolves, including when
/// the `mutate` future is dropped mid-flight.
struct PendingGuard<'a> {
    pending: &'a DashMap<PendingKey, PendingMutation>,
    slot: PendingKey,
    id: Uuid,
}

impl PendingGuard<'_> {
    fn update(&self, f: impl FnOnce(&mut PendingMutation)) {
        if let Some(mut p) = self.pending.get_mut(&self.slot) {
            f(&mut p);
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove_if(&self.slot, |_, p| p.id == self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::PatchOp;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn setup() -> (Arc<CacheStore>, MutationCoordinator) {
        let store = Arc::new(CacheStore::default());
        store.set(
            &ResourceKey::new("products"),
            CacheData::collection(vec![json!({"_id": "1", "isHidden": false})]),
        );
        let coordinator = MutationCoordinator::new(store.clone());
        (store, coordinator)
    }

    fn toggle(id: &str) -> impl FnOnce(&CacheData) -> CacheData {
        let op = PatchOp::Toggle {
            id: ItemId::from(id),
            field: "isHidden".into(),
        };
        move |data| op.apply(data)
    }

    fn products() -> ResourceKey {
        ResourceKey::new("products")
    }

    #[tokio::test]
    async fn commit_keeps_optimistic_state_and_invalidates() {
        let (store, coordinator) = setup();

        let result: Result<(), CoreError> = coordinator
            .mutate(Mutation::new(products(), "1"), toggle("1"), || async { Ok(()) })
            .await;

        assert!(result.is_ok());
        let entry = store.get(&products());
        assert_eq!(entry.data.find(&ItemId::from("1")).unwrap()["isHidden"], true);
        assert!(entry.invalidated);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_restores_previous_entry() {
        let (store, coordinator) = setup();
        let before = store.get(&products());

        let err = coordinator
            .mutate(
                Mutation::new(products(), "1").fallback("Failed to toggle product visibility"),
                toggle("1"),
                || async {
                    Err::<(), _>(CoreError::Server {
                        status: 500,
                        message: None,
                    })
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to toggle product visibility");
        assert_eq!(*store.get(&products()), *before);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn second_mutation_on_same_item_is_rejected() {
        let (store, coordinator) = setup();
        let coordinator = Arc::new(coordinator);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move {
                coordinator
                    .mutate(Mutation::new(products(), "1"), toggle("1"), || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<_, CoreError>(())
                    })
                    .await
            }
        });
        started_rx.await.unwrap();

        let during = store.get(&products());
        let pending = coordinator.pending(&products(), &ItemId::from("1")).unwrap();
        assert_eq!(pending.status, MutationStatus::InFlight);
        assert_eq!(pending.optimistic, during);

        let err = coordinator
            .mutate(Mutation::new(products(), "1"), toggle("1"), || async { Ok::<_, CoreError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyInFlight { .. }));
        assert_eq!(*store.get(&products()), *during);

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert!(coordinator.pending(&products(), &ItemId::from("1")).is_none());
    }

    #[tokio::test]
    async fn different_items_run_concurrently() {
        let (store, coordinator) = setup();
        store.apply(&products(), &PatchOp::Upsert(json!({"_id": "2", "isHidden": false})));

        let a = coordinator.mutate(Mutation::new(products(), "1"), toggle("1"), || async {
            Ok::<_, CoreError>(())
        });
        let b = coordinator.mutate(Mutation::new(products(), "2"), toggle("2"), || async {
            Ok::<_, CoreError>(())
        });
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_ok() && b.is_ok());
    }

    fn hidden(store: &CacheStore, id: &str) -> bool {
        store.get(&products()).data.find(&ItemId::from(id)).unwrap()["isHidden"] == true
    }

    fn server_error() -> CoreError {
        CoreError::Server {
            status: 500,
            message: None,
        }
    }

    type Release = oneshot::Sender<Result<(), CoreError>>;
    type Outcome = tokio::task::JoinHandle<Result<(), CoreError>>;

    /// Start a toggle of `id` whose remote call resolves with whatever is
    /// sent on the returned channel.
    async fn held_toggle(coordinator: &Arc<MutationCoordinator>, id: &'static str) -> (Release, Outcome) {
        let (release_tx, release_rx) = oneshot::channel::<Result<(), CoreError>>();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn({
            let coordinator = coordinator.clone();
            async move {
                coordinator
                    .mutate(Mutation::new(products(), id), toggle(id), || async move {
                        let _ = started_tx.send(());
                        release_rx.await.unwrap_or(Ok(()))
                    })
                    .await
            }
        });
        started_rx.await.unwrap();
        (release_tx, handle)
    }

    fn setup_two() -> (Arc<CacheStore>, Arc<MutationCoordinator>) {
        let (store, coordinator) = setup();
        store.apply(&products(), &PatchOp::Upsert(json!({"_id": "2", "isHidden": false})));
        (store, Arc::new(coordinator))
    }

    #[tokio::test]
    async fn failed_then_committed_keeps_the_commit() {
        let (store, coordinator) = setup_two();
        let (release_a, a) = held_toggle(&coordinator, "1").await;
        let (release_b, b) = held_toggle(&coordinator, "2").await;
        assert!(hidden(&store, "1") && hidden(&store, "2"));

        release_a.send(Err(server_error())).unwrap();
        assert!(a.await.unwrap().is_err());
        let entry = store.get(&products());
        assert!(!hidden(&store, "1"), "A's toggle is reverted");
        assert!(hidden(&store, "2"), "B's toggle is still pending");
        assert!(!entry.invalidated);

        release_b.send(Ok(())).unwrap();
        b.await.unwrap().unwrap();
        assert!(!hidden(&store, "1"));
        assert!(hidden(&store, "2"));
        assert!(store.get(&products()).invalidated);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_then_failed_restores_both() {
        let (store, coordinator) = setup_two();
        let before = store.get(&products());
        let (release_a, a) = held_toggle(&coordinator, "1").await;
        let (release_b, b) = held_toggle(&coordinator, "2").await;

        release_a.send(Err(server_error())).unwrap();
        assert!(a.await.unwrap().is_err());
        assert!(!hidden(&store, "1"));
        assert!(hidden(&store, "2"));

        // B's snapshot was taken with A's toggle applied.
        release_b.send(Err(server_error())).unwrap();
        assert!(b.await.unwrap().is_err());
        assert!(!hidden(&store, "1"), "A's rejected toggle must not come back");
        assert!(!hidden(&store, "2"));
        assert_eq!(store.get(&products()).data, before.data);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn later_failure_keeps_earlier_pending_change() {
        let (store, coordinator) = setup_two();
        let (release_a, a) = held_toggle(&coordinator, "1").await;
        let (release_b, b) = held_toggle(&coordinator, "2").await;

        release_b.send(Err(server_error())).unwrap();
        assert!(b.await.unwrap().is_err());
        assert!(hidden(&store, "1"), "A is still in flight");
        assert!(!hidden(&store, "2"));

        release_a.send(Ok(())).unwrap();
        a.await.unwrap().unwrap();
        assert!(hidden(&store, "1"));
        assert!(!hidden(&store, "2"));
    }

    #[tokio::test]
    async fn server_message_is_reported_verbatim() {
        let (_store, coordinator) = setup();
        let err = coordinator
            .mutate(Mutation::new(products(), "1"), toggle("1"), || async {
                Err::<(), _>(CoreError::Server {
                    status: 409,
                    message: Some("Product is locked".into()),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Product is locked");
        assert_eq!(
            err.server_message(),
            Some("Product is locked"),
            "cause is preserved"
        );
    }
}
