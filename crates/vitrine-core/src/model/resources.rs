// ── Storefront domain records ──
//
// Typed views over the documents the dashboard manages. The cache stores
// raw JSON; these decode from it on demand, so unknown fields are ignored
// and missing optional fields default. Go through `decode_record` so a
// document keyed by a plain `id` decodes too.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use vitrine_api::{ItemId, ResourceKey};

/// Decode a cached document into a record.
///
/// Records read their id from `_id`. A document carrying only `id` has
/// it copied over first; when both are present `_id` wins and `id` is
/// ignored like any other unknown field.
pub fn decode_record<T: DeserializeOwned>(doc: &Value) -> Result<T, serde_json::Error> {
    let mut doc = doc.clone();
    if let Some(obj) = doc.as_object_mut() {
        if matches!(obj.get("_id"), None | Some(Value::Null)) {
            if let Some(id) = obj.get("id").cloned() {
                obj.insert("_id".to_owned(), id);
            }
        }
    }
    serde_json::from_value(doc)
}

/// A document type stored under a fixed collection name.
pub trait Resource: serde::de::DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    /// Collection name; also the default route path.
    const COLLECTION: &'static str;

    /// Realtime events carrying a full updated document.
    const UPDATED_EVENTS: &'static [&'static str] = &[];
    /// Realtime events carrying a newly created document.
    const CREATED_EVENTS: &'static [&'static str] = &[];
    /// Realtime events carrying the document (or id) of a deleted item.
    const DELETED_EVENTS: &'static [&'static str] = &[];

    fn id(&self) -> &ItemId;

    fn key() -> ResourceKey {
        ResourceKey::new(Self::COLLECTION)
    }
}

// ── Products ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Product {
    const COLLECTION: &'static str = "products";
    const UPDATED_EVENTS: &'static [&'static str] = &["productUpdated", "productVisibilityChanged"];
    const CREATED_EVENTS: &'static [&'static str] = &["productCreated"];
    const DELETED_EVENTS: &'static [&'static str] = &["productDeleted"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    #[default]
    Inactive,
    Pending,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl Resource for Subscription {
    const COLLECTION: &'static str = "subscriptions";
    const UPDATED_EVENTS: &'static [&'static str] = &["subscriptionUpdated"];
    const CREATED_EVENTS: &'static [&'static str] = &["subscriptionCreated"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Announcements ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Announcement {
    const COLLECTION: &'static str = "announcements";
    const UPDATED_EVENTS: &'static [&'static str] = &["announcementUpdated"];
    const CREATED_EVENTS: &'static [&'static str] = &["announcementCreated"];
    const DELETED_EVENTS: &'static [&'static str] = &["announcementDeleted"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Transactions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Transaction {
    const COLLECTION: &'static str = "transactions";
    const UPDATED_EVENTS: &'static [&'static str] = &["transactionUpdated"];
    const CREATED_EVENTS: &'static [&'static str] = &["transactionCreated"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Wallet network addresses ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddress {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub network: String,
    pub address: String,
    #[serde(default)]
    pub is_active: bool,
}

impl Resource for NetworkAddress {
    const COLLECTION: &'static str = "networkAddresses";
    const UPDATED_EVENTS: &'static [&'static str] = &["networkAddressUpdated"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Premium plans ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumPlan {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl Resource for PremiumPlan {
    const COLLECTION: &'static str = "premiumPlans";
    const UPDATED_EVENTS: &'static [&'static str] = &["premiumPlanUpdated"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Downloadable resources ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Resource for ResourceItem {
    const COLLECTION: &'static str = "resources";
    const UPDATED_EVENTS: &'static [&'static str] = &["resourceUpdated"];
    const CREATED_EVENTS: &'static [&'static str] = &["resourceCreated"];
    const DELETED_EVENTS: &'static [&'static str] = &["resourceDeleted"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Help center ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpMessage {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for HelpMessage {
    const COLLECTION: &'static str = "helpMessages";
    const CREATED_EVENTS: &'static [&'static str] = &["helpMessageCreated", "newHelpMessage"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for User {
    const COLLECTION: &'static str = "users";
    const UPDATED_EVENTS: &'static [&'static str] = &["userUpdated"];

    fn id(&self) -> &ItemId {
        &self.id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_decodes_mongo_shape() {
        let p: Product = serde_json::from_value(json!({
            "_id": "p1",
            "name": "Starter",
            "price": 9.5,
            "isHidden": true,
            "__v": 0
        }))
        .unwrap();
        assert_eq!(p.id.as_str(), "p1");
        assert!(p.is_hidden);
        assert_eq!(Product::key().to_string(), "products");
    }

    #[test]
    fn plain_id_is_accepted() {
        let u: User = decode_record(&json!({"id": "u1", "email": "a@b.c"})).unwrap();
        assert_eq!(u.id(), &ItemId::from("u1"));
        assert!(!u.is_premium);
    }

    #[test]
    fn mongo_and_plain_id_together_decode() {
        let p: Product = decode_record(&json!({"_id": "p1", "id": "p1", "name": "Starter"})).unwrap();
        assert_eq!(p.id.as_str(), "p1");

        let p: Product = decode_record(&json!({"_id": "p2", "id": 7, "name": "Pro"})).unwrap();
        assert_eq!(p.id.as_str(), "p2");
    }

    #[test]
    fn numeric_and_oid_ids_decode() {
        let plan: PremiumPlan = decode_record(&json!({"id": 3, "name": "Gold"})).unwrap();
        assert_eq!(plan.id(), &ItemId::from(3_u64));

        let p: Product = decode_record(&json!({"_id": {"$oid": "abc"}, "name": "Legacy"})).unwrap();
        assert_eq!(p.id.as_str(), "abc");
    }

    #[test]
    fn statuses_parse() {
        let t: Transaction =
            serde_json::from_value(json!({"_id": "t1", "amount": 5, "status": "approved"})).unwrap();
        assert_eq!(t.status, TransactionStatus::Approved);
        assert_eq!("active".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Active);
    }

    #[test]
    fn event_names_are_declared() {
        assert!(Product::UPDATED_EVENTS.contains(&"productVisibilityChanged"));
        assert!(ResourceItem::UPDATED_EVENTS.contains(&"resourceUpdated"));
        assert!(User::CREATED_EVENTS.is_empty());
    }
}
