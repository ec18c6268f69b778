// ── Resource identity ──
//
// ResourceKey names one cacheable collection or document; ItemId names
// one document inside it. Both are shared by the REST client, the cache
// and the realtime channel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// ── ResourceKey ─────────────────────────────────────────────────────

/// Logical identifier for one cached collection or document.
///
/// Composed of a resource name (`"products"`, `"networkAddresses"`) and
/// zero or more parameters. Two keys with the same name but different
/// parameters are distinct cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    params: Vec<String>,
}

impl ResourceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter, e.g. a page number or a refresh trigger.
    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for p in &self.params {
            write!(f, ":{p}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourceKey {
    type Err = std::convert::Infallible;

    /// Parses the `name:p1:p2` display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        Ok(Self {
            name: name.to_owned(),
            params: parts.map(String::from).collect(),
        })
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ── ItemId ──────────────────────────────────────────────────────────

/// Identifier of one document inside a collection.
///
/// The backend uses MongoDB ObjectIds (`_id`) for most collections, but
/// some payloads carry numeric `id` fields. Both normalize to a string.
/// Deserializes from a string, a number, or extended JSON `{"$oid": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the id of a JSON document: `_id` first, then `id`.
    ///
    /// Returns `None` for non-objects and for ids that are neither
    /// strings nor numbers.
    pub fn of(doc: &serde_json::Value) -> Option<Self> {
        let obj = doc.as_object()?;
        let raw = obj.get("_id").or_else(|| obj.get("id"))?;
        match raw {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            // Extended JSON: {"$oid": "..."}
            serde_json::Value::Object(inner) => inner
                .get("$oid")
                .and_then(serde_json::Value::as_str)
                .map(|s| Self(s.to_owned())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
            Oid {
                #[serde(rename = "$oid")]
                oid: String,
            },
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) | Raw::Oid { oid: s } => s,
            Raw::Number(n) => n.to_string(),
        };
        if raw.is_empty() {
            return Err(serde::de::Error::custom("empty document id"));
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}
