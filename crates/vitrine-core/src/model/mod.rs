// ── Cache data model ──
//
// Raw cached payloads, the patch algebra over them, and the typed
// storefront records consumers decode into.

pub mod data;
pub mod resources;

pub use data::{CacheData, PatchOp};
pub use resources::{
    Announcement, HelpMessage, NetworkAddress, PremiumPlan, Product, Resource, ResourceItem,
    Subscription, SubscriptionStatus, Transaction, TransactionStatus, User, decode_record,
};
