// ── Cached payloads and patch operations ──
//
// CacheData is what a cache entry holds; PatchOp is the closed set of
// deterministic transforms that optimistic mutations and realtime events
// apply to it. Every op returns a new value: entries are replaced whole.

use std::sync::Arc;

use serde_json::{Map, Value};
use vitrine_api::{ItemId, NormalizedEnvelope};

/// Data held by a cache entry: a collection, a single document, or nothing.
///
/// Documents are JSON objects carrying an `_id` or `id` field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CacheData {
    #[default]
    Empty,
    Collection(Arc<Vec<Value>>),
    Document(Arc<Value>),
}

impl CacheData {
    pub fn collection(items: Vec<Value>) -> Self {
        Self::Collection(Arc::new(items))
    }

    pub fn document(doc: Value) -> Self {
        Self::Document(Arc::new(doc))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Collection(items) => items.is_empty(),
            Self::Document(_) => false,
        }
    }

    /// All documents, in order. A single document is a one-element slice.
    pub fn items(&self) -> &[Value] {
        match self {
            Self::Empty => &[],
            Self::Collection(items) => items.as_slice(),
            Self::Document(doc) => std::slice::from_ref(doc.as_ref()),
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Find a document by id.
    pub fn find(&self, id: &ItemId) -> Option<&Value> {
        self.items()
            .iter()
            .find(|doc| ItemId::of(doc).as_ref() == Some(id))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.find(id).is_some()
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.items()
            .iter()
            .position(|doc| ItemId::of(doc).as_ref() == Some(id))
    }

    /// Put the document `id` back to how it is in `previous`, keeping
    /// every other document as it is now.
    ///
    /// A document absent from `previous` is dropped; one that has since
    /// disappeared is reinserted at its old position.
    pub fn revert_item(&self, id: &ItemId, previous: &CacheData) -> CacheData {
        let was = previous.find(id);
        match self {
            Self::Collection(items) => {
                let mut next = items.as_ref().clone();
                match (self.position(id), was) {
                    (Some(at), Some(doc)) => {
                        if let Some(slot) = next.get_mut(at) {
                            slot.clone_from(doc);
                        }
                    }
                    (Some(at), None) => {
                        next.remove(at);
                    }
                    (None, Some(doc)) => {
                        let at = previous.position(id).unwrap_or(next.len()).min(next.len());
                        next.insert(at, doc.clone());
                    }
                    (None, None) => return self.clone(),
                }
                Self::collection(next)
            }
            Self::Document(doc) if ItemId::of(doc).as_ref() == Some(id) => match was {
                Some(prev) => Self::document(prev.clone()),
                None => Self::Empty,
            },
            Self::Empty => match (previous, was) {
                (Self::Document(_), Some(_)) => previous.clone(),
                _ => Self::Empty,
            },
            Self::Document(_) => self.clone(),
        }
    }
}

impl From<NormalizedEnvelope<Value>> for CacheData {
    fn from(env: NormalizedEnvelope<Value>) -> Self {
        match env {
            NormalizedEnvelope::Collection(items) => Self::collection(items),
            NormalizedEnvelope::Document(doc) => Self::document(doc),
            NormalizedEnvelope::Empty => Self::Empty,
        }
    }
}

// ── PatchOp ─────────────────────────────────────────────────────────

/// A deterministic transform of [`CacheData`].
///
/// Ops that target an id not present in the data are no-ops, except
/// [`Upsert`](Self::Upsert) which appends to a collection. Nothing is
/// ever inserted into [`CacheData::Empty`]: data that was never fetched
/// arrives with the next fetch instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Replace the document with the same id, in place.
    ReplaceOne(Value),
    /// Replace in place if present, else append.
    Upsert(Value),
    /// Drop the document with this id.
    Remove(ItemId),
    /// Shallow-merge fields into the document with this id.
    Merge { id: ItemId, fields: Map<String, Value> },
    /// Flip a boolean field (missing counts as `false`).
    Toggle { id: ItemId, field: String },
}

impl PatchOp {
    /// The id this op targets, or `None` for a document without one.
    pub fn target(&self) -> Option<ItemId> {
        match self {
            Self::ReplaceOne(doc) | Self::Upsert(doc) => ItemId::of(doc),
            Self::Remove(id) | Self::Merge { id, .. } | Self::Toggle { id, .. } => Some(id.clone()),
        }
    }

    /// Apply to `data`, returning the new value. `data` is untouched.
    pub fn apply(&self, data: &CacheData) -> CacheData {
        let Some(target) = self.target() else {
            return data.clone();
        };

        match data {
            CacheData::Empty => CacheData::Empty,
            CacheData::Document(doc) => {
                if ItemId::of(doc).as_ref() != Some(&target) {
                    return data.clone();
                }
                match self.rewrite(doc) {
                    Some(next) => CacheData::document(next),
                    None => CacheData::Empty,
                }
            }
            CacheData::Collection(items) => {
                let mut found = false;
                let mut next: Vec<Value> = Vec::with_capacity(items.len() + 1);
                for doc in items.iter() {
                    if !found && ItemId::of(doc).as_ref() == Some(&target) {
                        found = true;
                        if let Some(rewritten) = self.rewrite(doc) {
                            next.push(rewritten);
                        }
                    } else {
                        next.push(doc.clone());
                    }
                }
                if !found {
                    match self {
                        Self::Upsert(doc) => next.push(doc.clone()),
                        _ => return data.clone(),
                    }
                }
                CacheData::collection(next)
            }
        }
    }

    /// New version of a matching document, or `None` to drop it.
    fn rewrite(&self, current: &Value) -> Option<Value> {
        match self {
            Self::ReplaceOne(doc) | Self::Upsert(doc) => Some(doc.clone()),
            Self::Remove(_) => None,
            Self::Merge { fields, .. } => {
                let mut next = current.clone();
                if let Some(obj) = next.as_object_mut() {
                    for (k, v) in fields {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                Some(next)
            }
            Self::Toggle { field, .. } => {
                let mut next = current.clone();
                if let Some(obj) = next.as_object_mut() {
                    let flipped = !obj.get(field).and_then(Value::as_bool).unwrap_or(false);
                    obj.insert(field.clone(), Value::Bool(flipped));
                }
                Some(next)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn products() -> CacheData {
        CacheData::collection(vec![
            json!({"_id": "1", "name": "A", "isHidden": false}),
            json!({"_id": "2", "name": "B", "isHidden": false}),
            json!({"_id": "3", "name": "C", "isHidden": true}),
        ])
    }

    #[test]
    fn replace_one_preserves_order() {
        let op = PatchOp::ReplaceOne(json!({"_id": "2", "name": "B2"}));
        let next = op.apply(&products());
        let names: Vec<_> = next.items().iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("A"), json!("B2"), json!("C")]);
    }

    #[test]
    fn replace_one_ignores_absent_id() {
        let data = products();
        let op = PatchOp::ReplaceOne(json!({"_id": "42", "name": "Ghost"}));
        assert_eq!(op.apply(&data), data);
    }

    #[test]
    fn upsert_appends_absent_id() {
        let op = PatchOp::Upsert(json!({"_id": "4", "name": "D"}));
        let next = op.apply(&products());
        assert_eq!(next.len(), 4);
        assert_eq!(next.items()[3]["name"], "D");
    }

    #[test]
    fn ops_are_idempotent() {
        let data = products();
        for op in [
            PatchOp::ReplaceOne(json!({"_id": "1", "name": "A2"})),
            PatchOp::Upsert(json!({"_id": "9", "name": "New"})),
            PatchOp::Remove(ItemId::from("2")),
        ] {
            let once = op.apply(&data);
            let twice = op.apply(&once);
            assert_eq!(once, twice, "op {op:?} is not idempotent");
        }
    }

    #[test]
    fn remove_filters_item() {
        let next = PatchOp::Remove(ItemId::from("1")).apply(&products());
        assert_eq!(next.len(), 2);
        assert!(!next.contains(&ItemId::from("1")));
    }

    #[test]
    fn toggle_and_merge_fields() {
        let toggled = PatchOp::Toggle {
            id: ItemId::from("1"),
            field: "isHidden".into(),
        }
        .apply(&products());
        assert_eq!(toggled.find(&ItemId::from("1")).unwrap()["isHidden"], true);

        let mut fields = Map::new();
        fields.insert("price".into(), json!(10));
        let merged = PatchOp::Merge {
            id: ItemId::from("3"),
            fields,
        }
        .apply(&products());
        let doc = merged.find(&ItemId::from("3")).unwrap();
        assert_eq!(doc["price"], 10);
        assert_eq!(doc["name"], "C");
    }

    #[test]
    fn nothing_is_inserted_into_empty() {
        let op = PatchOp::Upsert(json!({"_id": "1"}));
        assert_eq!(op.apply(&CacheData::Empty), CacheData::Empty);
    }

    #[test]
    fn document_data_is_patched_or_cleared() {
        let doc = CacheData::document(json!({"_id": "u1", "role": "user"}));
        let next = PatchOp::ReplaceOne(json!({"_id": "u1", "role": "admin"})).apply(&doc);
        assert_eq!(next.items()[0]["role"], "admin");
        assert_eq!(PatchOp::Remove(ItemId::from("u1")).apply(&doc), CacheData::Empty);
    }

    #[test]
    fn payload_without_id_is_noop() {
        let data = products();
        assert_eq!(PatchOp::Upsert(json!({"name": "x"})).apply(&data), data);
    }

    #[test]
    fn revert_item_leaves_other_documents_alone() {
        let before = products();
        let hide_1 = PatchOp::Toggle {
            id: ItemId::from("1"),
            field: "isHidden".into(),
        };
        let hide_2 = PatchOp::Toggle {
            id: ItemId::from("2"),
            field: "isHidden".into(),
        };
        let both = hide_2.apply(&hide_1.apply(&before));

        let reverted = both.revert_item(&ItemId::from("1"), &before);
        assert_eq!(reverted.find(&ItemId::from("1")).unwrap()["isHidden"], false);
        assert_eq!(reverted.find(&ItemId::from("2")).unwrap()["isHidden"], true);
    }

    #[test]
    fn revert_item_drops_or_restores_membership() {
        let before = products();
        let added = PatchOp::Upsert(json!({"_id": "tmp-1", "name": "New"})).apply(&before);
        assert_eq!(added.revert_item(&ItemId::from("tmp-1"), &before), before);

        let removed = PatchOp::Remove(ItemId::from("2")).apply(&before);
        assert_eq!(removed.revert_item(&ItemId::from("2"), &before), before);
    }

    #[test]
    fn revert_item_on_document_data() {
        let before = CacheData::document(json!({"_id": "u1", "role": "user"}));
        let cleared = PatchOp::Remove(ItemId::from("u1")).apply(&before);
        assert_eq!(cleared.revert_item(&ItemId::from("u1"), &before), before);
        assert_eq!(before.revert_item(&ItemId::from("other"), &CacheData::Empty), before);
    }
}
