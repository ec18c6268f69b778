//! Client-side data synchronization for the Vitrine admin API.
//!
//! - **[`CacheStore`]**: keyed, versioned snapshots of resource collections
//!   with staleness tracking and push-based change notification.
//! - **[`MutationCoordinator`]**: optimistic writes with exact rollback and
//!   at most one in-flight mutation per item.
//! - **[`RealtimeChannel`]**: applies server pushes to the cache through a
//!   single ordered bridge task.
//! - **[`SyncClient`]**: facade tying the above to a
//!   [`vitrine_api::ResourceClient`] plus background refetch and GC.

pub mod config;
pub mod error;
pub mod model;
pub mod mutation;
pub mod realtime;
pub mod store;
pub mod stream;
pub mod sync_client;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_GC_AFTER, DEFAULT_SWEEP_INTERVAL, SyncConfig};
pub use error::CoreError;
pub use mutation::{Mutation, MutationCoordinator, MutationStatus, PendingMutation};
pub use realtime::{EventHandler, RealtimeChannel, SubscriptionGuard};
pub use store::{CacheEntry, CacheStore, DEFAULT_STALE_AFTER, FetchStatus, FetchTicket};
pub use stream::{EntryStream, EntryWatchStream};
pub use sync_client::SyncClient;

// Model re-exports
pub use model::{
    Announcement, CacheData, HelpMessage, NetworkAddress, PatchOp, PremiumPlan, Product, Resource,
    ResourceItem, Subscription, SubscriptionStatus, Transaction, TransactionStatus, User,
    decode_record,
};

// Transport types consumers need without depending on vitrine-api directly.
pub use vitrine_api::{
    Action, ChannelState, ItemId, RealtimeEvent, ReconnectConfig, ResourceKey, RetryPolicy, Route,
    RouteTable, TlsMode,
};
