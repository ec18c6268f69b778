// ── Realtime reconciliation ──
//
// Routes named server pushes to registered handlers, which patch the
// cache. All events funnel through one bridge task, so patches for a
// key are applied in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use vitrine_api::{ChannelState, ItemId, RealtimeEvent, RealtimeHandle, ReconnectConfig};

use crate::error::CoreError;
use crate::model::{PatchOp, Resource};
use crate::store::CacheStore;

/// Callback invoked with the event payload. Handlers patch the store.
pub type EventHandler = Arc<dyn Fn(&CacheStore, &Value) + Send + Sync>;

// ── Handler registry ─────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    handlers: DashMap<String, Vec<(u64, EventHandler)>>,
    next_id: AtomicU64,
}

impl Registry {
    fn add(&self, event: &str, handler: EventHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(event.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, event: &str, id: u64) {
        let emptied = self.handlers.get_mut(event).is_some_and(|mut list| {
            list.retain(|(hid, _)| *hid != id);
            list.is_empty()
        });
        if emptied {
            self.handlers.remove_if(event, |_, list| list.is_empty());
        }
    }

    fn for_event(&self, event: &str) -> Vec<EventHandler> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

/// Keeps a handler registered; unregisters it on drop.
#[must_use = "the handler is unregistered when the guard is dropped"]
pub struct SubscriptionGuard {
    registry: Arc<Registry>,
    event: String,
    id: u64,
    detached: bool,
}

impl SubscriptionGuard {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Keep the handler registered for the lifetime of the channel.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if !self.detached {
            self.registry.remove(&self.event, self.id);
        }
    }
}

// ── RealtimeChannel ──────────────────────────────────────────────────

/// One push connection feeding the cache.
///
/// Dropping the channel (or calling [`shutdown`](Self::shutdown)) closes
/// the connection, stops the bridge task and releases every handler.
pub struct RealtimeChannel {
    store: Arc<CacheStore>,
    registry: Arc<Registry>,
    handle: Option<RealtimeHandle>,
    state_rx: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl RealtimeChannel {
    /// Open a websocket to `url` and start applying its events.
    ///
    /// `parent` scopes the connection: cancelling it tears the channel down.
    pub fn connect(
        store: Arc<CacheStore>,
        url: Url,
        reconnect: ReconnectConfig,
        cookie: Option<String>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        info!(url = %url, "opening realtime channel");
        let handle = RealtimeHandle::connect(url, reconnect, cancel.clone(), cookie);
        let events = handle.subscribe();
        let state_rx = handle.state();
        let channel = Self {
            store,
            registry: Arc::new(Registry::default()),
            handle: Some(handle),
            state_rx,
            cancel,
        };
        channel.spawn_bridge(events);
        channel
    }

    /// Apply events from an in-process source instead of a socket.
    pub fn attach(
        store: Arc<CacheStore>,
        events: broadcast::Receiver<Arc<RealtimeEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        let (_, state_rx) = watch::channel(ChannelState::Connected);
        let channel = Self {
            store,
            registry: Arc::new(Registry::default()),
            handle: None,
            state_rx,
            cancel: parent.child_token(),
        };
        channel.spawn_bridge(events);
        channel
    }

    fn spawn_bridge(&self, mut events: broadcast::Receiver<Arc<RealtimeEvent>>) {
        let store = self.store.clone();
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = events.recv() => match result {
                        Ok(event) => dispatch(&registry, &store, &event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "realtime bridge lagged, invalidating cache");
                            store.invalidate_all();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("realtime bridge stopped");
        });
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionGuard
    where
        F: Fn(&CacheStore, &Value) + Send + Sync + 'static,
    {
        let id = self.registry.add(event, Arc::new(handler));
        SubscriptionGuard {
            registry: self.registry.clone(),
            event: event.to_owned(),
            id,
            detached: false,
        }
    }

    /// Drop every handler for `event`.
    pub fn unsubscribe(&self, event: &str) {
        self.registry.handlers.remove(event);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.handlers.get(event).map_or(0, |l| l.len())
    }

    /// Register the standard handlers for `R`: updated events replace the
    /// cached document, created events upsert, deleted events remove.
    pub fn register_resource<R: Resource>(&self) {
        for event in R::UPDATED_EVENTS {
            self.subscribe(event, replace_in(R::COLLECTION)).detach();
        }
        for event in R::CREATED_EVENTS {
            self.subscribe(event, upsert_into(R::COLLECTION)).detach();
        }
        for event in R::DELETED_EVENTS {
            self.subscribe(event, remove_from(R::COLLECTION)).detach();
        }
    }

    /// Run the handlers for `event` now, on the caller's task.
    pub fn dispatch(&self, event: &RealtimeEvent) {
        dispatch(&self.registry, &self.store, event);
    }

    /// Send an event to the server.
    pub async fn emit(&self, event: RealtimeEvent) -> Result<(), CoreError> {
        match &self.handle {
            Some(handle) => handle.emit(event).await.map_err(CoreError::from),
            None => Err(CoreError::Realtime {
                reason: "channel has no connection".into(),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Close the connection and release all handlers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.handlers.clear();
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(registry: &Registry, store: &CacheStore, event: &RealtimeEvent) {
    let handlers = registry.for_event(&event.name);
    if handlers.is_empty() {
        debug!(event = %event.name, "no handler for realtime event");
        return;
    }
    for handler in handlers {
        handler(store, &event.payload);
    }
}

// ── Standard handlers ────────────────────────────────────────────────

/// Replace the matching document in every cached `collection` key.
/// Payloads for documents not in the cache are ignored.
pub fn replace_in(collection: &'static str) -> impl Fn(&CacheStore, &Value) + Send + Sync {
    move |store, payload| {
        if ItemId::of(payload).is_none() {
            warn!(collection, "dropping realtime payload without an id");
            return;
        }
        apply_to_collection(store, collection, &PatchOp::ReplaceOne(payload.clone()));
    }
}

/// Replace the matching document, or append it when absent.
pub fn upsert_into(collection: &'static str) -> impl Fn(&CacheStore, &Value) + Send + Sync {
    move |store, payload| {
        if ItemId::of(payload).is_none() {
            warn!(collection, "dropping realtime payload without an id");
            return;
        }
        apply_to_collection(store, collection, &PatchOp::Upsert(payload.clone()));
    }
}

/// Drop the document named by the payload: a document, `{id}` or a bare id.
pub fn remove_from(collection: &'static str) -> impl Fn(&CacheStore, &Value) + Send + Sync {
    move |store, payload| {
        let id = ItemId::of(payload).or_else(|| match payload {
            Value::String(s) if !s.is_empty() => Some(ItemId::from(s.as_str())),
            Value::Number(n) => Some(ItemId::new(n.to_string())),
            _ => None,
        });
        let Some(id) = id else {
            warn!(collection, "dropping realtime removal without an id");
            return;
        };
        apply_to_collection(store, collection, &PatchOp::Remove(id));
    }
}

fn apply_to_collection(store: &CacheStore, collection: &str, op: &PatchOp) {
    for key in store.keys_named(collection) {
        store.apply(&key, op);
    }
}
