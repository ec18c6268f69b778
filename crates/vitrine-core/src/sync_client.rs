// ── Sync client facade ──
//
// Owns the cache, the REST client, the mutation coordinator and the
// realtime channel, and runs the background tasks that keep observed
// entries fresh: the refetch worker, the staleness sweep and GC.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vitrine_api::{
    Action, ChannelState, ItemId, RealtimeEvent, ResourceClient, ResourceKey, TransportConfig,
};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::model::{
    Announcement, CacheData, HelpMessage, NetworkAddress, PatchOp, PremiumPlan, Product, Resource,
    ResourceItem, Subscription, Transaction, User,
};
use crate::mutation::{Mutation, MutationCoordinator};
use crate::realtime::{RealtimeChannel, SubscriptionGuard};
use crate::store::{CacheEntry, CacheStore, FetchTicket};
use crate::stream::EntryStream;

/// Prefix for ids given to optimistically created documents.
const PROVISIONAL_ID_PREFIX: &str = "tmp-";

// ── SyncClient ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SyncInner>`. Reads go through
/// [`fetch`](Self::fetch) and [`observe`](Self::observe); writes through
/// the optimistic helpers ([`create`](Self::create),
/// [`update`](Self::update), [`remove`](Self::remove),
/// [`patch_action`](Self::patch_action)).
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    client: ResourceClient,
    store: Arc<CacheStore>,
    coordinator: MutationCoordinator,
    /// `Cookie` header for the websocket upgrade.
    cookie: Option<String>,
    realtime: Mutex<Option<RealtimeChannel>>,
    connection_state: watch::Sender<ChannelState>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    /// Build a client from configuration. Does NOT start background
    /// work: call [`connect`](Self::connect) for that. One-shot reads
    /// and writes work without connecting.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let mut transport = TransportConfig {
            tls: config.tls.clone(),
            timeout: config.timeout,
            retry: config.retry,
            cookie_jar: None,
        }
        .with_cookie_jar();
        if let Some(session) = &config.session {
            transport = transport.with_session(&config.api_url, &config.cookie_name, session);
        }
        let cookie = transport.cookie_header(&config.api_url);
        let client = ResourceClient::new(config.api_url.clone(), config.routes.clone(), &transport)?;

        let store = Arc::new(CacheStore::new(config.stale_after));
        let coordinator = MutationCoordinator::new(store.clone());
        let (connection_state, _) = watch::channel(ChannelState::Disconnected);

        Ok(Self {
            inner: Arc::new(SyncInner {
                config,
                client,
                store,
                coordinator,
                cookie,
                realtime: Mutex::new(None),
                connection_state,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn resource_client(&self) -> &ResourceClient {
        &self.inner.client
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.inner.coordinator
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start background work: the refetch worker, the staleness sweep
    /// and GC, and (if enabled) the realtime channel with the standard
    /// handlers for every storefront resource.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;

        if let Some(queue) = self.inner.store.take_refetch_queue() {
            let client = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(refetch_worker(client, queue, cancel)));
        }

        let sweep = self.inner.config.sweep_interval;
        if !sweep.is_zero() {
            let client = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(sweep_task(client, sweep, cancel)));
        }

        if self.inner.config.realtime_enabled {
            let url = self.inner.config.realtime_url();
            let channel = RealtimeChannel::connect(
                self.inner.store.clone(),
                url,
                self.inner.config.reconnect.clone(),
                self.inner.cookie.clone(),
                &self.inner.cancel,
            );
            register_default_handlers(&channel);
            handles.push(self.forward_state(channel.state_changes()));
            *self.inner.realtime.lock().await = Some(channel);
        }

        info!(api = %self.inner.config.api_url, "sync client connected");
        Ok(())
    }

    /// Feed realtime events from an in-process source, with the standard
    /// handlers registered. Replaces any existing channel.
    pub async fn attach_events(&self, events: broadcast::Receiver<Arc<RealtimeEvent>>) {
        let channel = RealtimeChannel::attach(self.inner.store.clone(), events, &self.inner.cancel);
        register_default_handlers(&channel);
        self.inner.connection_state.send_replace(channel.state());
        *self.inner.realtime.lock().await = Some(channel);
    }

    /// Stop background work and close the realtime channel.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        if let Some(channel) = self.inner.realtime.lock().await.take() {
            channel.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ChannelState::Disconnected);
        debug!("sync client disconnected");
    }

    /// Observe the realtime connection lifecycle.
    pub fn connection_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.connection_state.subscribe()
    }

    fn forward_state(&self, mut source: watch::Receiver<ChannelState>) -> JoinHandle<()> {
        let client = self.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                let state = *source.borrow_and_update();
                client.inner.connection_state.send_replace(state);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = source.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch `key` from the server into the cache and return the entry.
    ///
    /// A fetch superseded by a later one for the same key still returns
    /// the (newer) cached entry.
    pub async fn fetch(&self, key: &ResourceKey) -> Result<Arc<CacheEntry>, CoreError> {
        let ticket = self.inner.store.begin_fetch(key);
        self.run_fetch(&ticket).await
    }

    async fn run_fetch(&self, ticket: &FetchTicket) -> Result<Arc<CacheEntry>, CoreError> {
        let store = &self.inner.store;
        let key = ticket.key();
        debug!(key = %key, "fetching");

        let result = self
            .inner
            .client
            .fetch::<Value>(key)
            .await
            .map(CacheData::from)
            .map_err(CoreError::from);

        match result {
            Ok(data) => {
                store.complete_fetch(ticket, Ok(data));
                Ok(store.get(key))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "fetch failed");
                store.complete_fetch(ticket, Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Fetch a resource collection and decode it.
    pub async fn fetch_all<R: Resource>(&self) -> Result<Vec<R>, CoreError> {
        Ok(self.fetch(&R::key()).await?.items())
    }

    /// Subscribe to `key`, refetching in the background if the entry is
    /// stale (or was never fetched).
    pub fn observe(&self, key: &ResourceKey) -> EntryStream {
        let stream = self.inner.store.subscribe(key);
        let entry = stream.current();
        if !entry.is_loading() && entry.is_stale_at(Utc::now()) {
            self.spawn_fetch(key.clone());
        }
        stream
    }

    /// Start background refetches for every observed stale entry.
    /// Returns how many were started.
    pub fn refetch_stale(&self) -> usize {
        let keys = self.inner.store.stale_keys(Utc::now());
        let count = keys.len();
        for key in keys {
            self.spawn_fetch(key);
        }
        count
    }

    /// Start a fetch in the background. The entry is marked loading
    /// before this returns, so callers checking `is_loading` see it.
    fn spawn_fetch(&self, key: ResourceKey) {
        let ticket = self.inner.store.begin_fetch(&key);
        let client = self.clone();
        tokio::spawn(async move {
            // Failures are recorded on the entry and logged by `run_fetch`.
            let _ = client.run_fetch(&ticket).await;
        });
    }

    // ── Optimistic writes ────────────────────────────────────────────

    /// Create a document. It appears in the cached collection right away
    /// under a provisional id, replaced by the server's copy on success.
    ///
    /// Returns `None` when the server acknowledged the create without
    /// echoing the document; the provisional copy then stays until the
    /// refetch triggered by the commit replaces it.
    pub async fn create(&self, key: &ResourceKey, payload: Value) -> Result<Option<Value>, CoreError> {
        let provisional = ItemId::new(format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::new_v4()));
        let mut draft = payload.clone();
        if let Some(obj) = draft.as_object_mut() {
            obj.insert("_id".into(), Value::String(provisional.to_string()));
        }

        let mutation = Mutation::new(key.clone(), provisional.clone())
            .fallback(format!("Failed to create {}", noun(key)));
        let client = &self.inner.client;
        let body = &payload;
        let created: Option<Value> = self
            .inner
            .coordinator
            .mutate(
                mutation,
                |data| PatchOp::Upsert(draft).apply(data),
                move || async move { client.create(key, body).await.map_err(CoreError::from) },
            )
            .await?;

        if let Some(created) = &created {
            self.inner.store.patch(key, |data| {
                let without = PatchOp::Remove(provisional).apply(data);
                PatchOp::Upsert(created.clone()).apply(&without)
            });
        }
        Ok(created)
    }

    /// Merge `fields` into a document. The server's copy, when it sends
    /// one, replaces the optimistic merge.
    pub async fn update(
        &self,
        key: &ResourceKey,
        id: &ItemId,
        fields: Map<String, Value>,
    ) -> Result<Option<Value>, CoreError> {
        let mutation = Mutation::new(key.clone(), id.clone())
            .fallback(format!("Failed to update {}", noun(key)));
        let op = PatchOp::Merge {
            id: id.clone(),
            fields: fields.clone(),
        };
        let body = &Value::Object(fields);
        let client = &self.inner.client;
        let updated: Option<Value> = self
            .inner
            .coordinator
            .mutate(
                mutation,
                |data| op.apply(data),
                move || async move { client.update(key, id, body).await.map_err(CoreError::from) },
            )
            .await?;

        self.replace_confirmed(key, updated.as_ref());
        Ok(updated)
    }

    /// Delete a document.
    pub async fn remove(&self, key: &ResourceKey, id: &ItemId) -> Result<(), CoreError> {
        let mutation = Mutation::new(key.clone(), id.clone())
            .fallback(format!("Failed to delete {}", noun(key)));
        let op = PatchOp::Remove(id.clone());
        let client = &self.inner.client;
        self.inner
            .coordinator
            .mutate(
                mutation,
                |data| op.apply(data),
                move || async move { client.remove(key, id).await.map_err(CoreError::from) },
            )
            .await
    }

    /// Run an item action, e.g. `toggle-visibility` or `approve`, with the
    /// matching optimistic change.
    ///
    /// Actions often answer with only `{success, message}`. The
    /// optimistic change is then kept as is until the refetch.
    pub async fn patch_action(
        &self,
        key: &ResourceKey,
        id: &ItemId,
        action: Action,
        body: Option<Value>,
    ) -> Result<Option<Value>, CoreError> {
        let mutation = Mutation::new(key.clone(), id.clone())
            .fallback(action_fallback(&action, &noun(key)));
        let op = optimistic_action(&action, id);
        let client = &self.inner.client;
        let (action, body) = (&action, body.as_ref());
        let updated: Option<Value> = self
            .inner
            .coordinator
            .mutate(
                mutation,
                |data| op.map_or_else(|| data.clone(), |op| op.apply(data)),
                move || async move {
                    client
                        .patch_action(key, id, action, body)
                        .await
                        .map_err(CoreError::from)
                },
            )
            .await?;

        self.replace_confirmed(key, updated.as_ref());
        Ok(updated)
    }

    fn replace_confirmed(&self, key: &ResourceKey, doc: Option<&Value>) {
        if let Some(doc) = doc {
            self.inner.store.apply(key, &PatchOp::ReplaceOne(doc.clone()));
        }
    }

    // ── Realtime ─────────────────────────────────────────────────────

    /// Register an extra realtime handler.
    pub async fn on_event<F>(&self, event: &str, handler: F) -> Result<SubscriptionGuard, CoreError>
    where
        F: Fn(&CacheStore, &Value) + Send + Sync + 'static,
    {
        match self.inner.realtime.lock().await.as_ref() {
            Some(channel) => Ok(channel.subscribe(event, handler)),
            None => Err(CoreError::Realtime {
                reason: "realtime channel is not running".into(),
            }),
        }
    }

    /// Send an event (e.g. an update intent) to the server.
    pub async fn emit(&self, event: RealtimeEvent) -> Result<(), CoreError> {
        match self.inner.realtime.lock().await.as_ref() {
            Some(channel) => channel.emit(event).await,
            None => Err(CoreError::Realtime {
                reason: "realtime channel is not running".into(),
            }),
        }
    }
}

fn register_default_handlers(channel: &RealtimeChannel) {
    channel.register_resource::<Product>();
    channel.register_resource::<Subscription>();
    channel.register_resource::<Announcement>();
    channel.register_resource::<Transaction>();
    channel.register_resource::<NetworkAddress>();
    channel.register_resource::<PremiumPlan>();
    channel.register_resource::<ResourceItem>();
    channel.register_resource::<HelpMessage>();
    channel.register_resource::<User>();
}

// ── Background tasks ─────────────────────────────────────────────────

/// Refetch keys queued by invalidation and dropped rollbacks. Each key
/// gets its own task; a key already loading is skipped.
async fn refetch_worker(
    client: SyncClient,
    mut queue: mpsc::UnboundedReceiver<ResourceKey>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            key = queue.recv() => {
                let Some(key) = key else { break };
                if client.inner.store.peek(&key).is_some_and(|e| e.is_loading()) {
                    continue;
                }
                client.spawn_fetch(key);
            }
        }
    }
}

/// Periodically refetch stale observed entries and collect unobserved ones.
async fn sweep_task(client: SyncClient, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let refetched = client.refetch_stale();
                let collected = client.inner.store.collect_garbage(client.inner.config.gc_after);
                if refetched > 0 || collected > 0 {
                    debug!(refetched, collected, "cache sweep");
                }
            }
        }
    }
}

// ── Optimistic action mapping ────────────────────────────────────────

/// The local change an action is expected to make, if any.
fn optimistic_action(action: &Action, id: &ItemId) -> Option<PatchOp> {
    let set = |field: &str, value: Value| {
        let mut fields = Map::new();
        fields.insert(field.to_owned(), value);
        PatchOp::Merge {
            id: id.clone(),
            fields,
        }
    };
    match action {
        Action::ToggleVisibility => Some(PatchOp::Toggle {
            id: id.clone(),
            field: "isHidden".into(),
        }),
        Action::Activate => Some(set("isActive", Value::Bool(true))),
        Action::Deactivate => Some(set("isActive", Value::Bool(false))),
        Action::Approve => Some(set("status", Value::from("approved"))),
        Action::Reject => Some(set("status", Value::from("rejected"))),
        Action::MarkRead => Some(set("isRead", Value::Bool(true))),
        Action::Custom(_) => None,
    }
}

fn action_fallback(action: &Action, noun: &str) -> String {
    match action {
        Action::ToggleVisibility => format!("Failed to toggle {noun} visibility"),
        Action::MarkRead => format!("Failed to mark {noun} as read"),
        Action::Custom(segment) => format!("Failed to {segment} {noun}"),
        other => format!("Failed to {other} {noun}"),
    }
}

/// Singular human name of a collection, for messages.
fn noun(key: &ResourceKey) -> String {
    match key.name() {
        "products" => "product",
        "subscriptions" => "subscription",
        "announcements" => "announcement",
        "transactions" => "transaction",
        "networkAddresses" => "network address",
        "premiumPlans" => "premium plan",
        "resources" => "resource",
        "helpMessages" => "help message",
        "users" => "user",
        other => return other.to_owned(),
    }
    .to_owned()
}
