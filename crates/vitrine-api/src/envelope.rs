// ── Response envelope normalization ──
//
// The backend answers in two shapes: `{success, data, message?}` from the
// newer controllers and a bare array/document from the older ones. Both
// are decoded here into `NormalizedEnvelope` and never leak further.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// Body preview length used in error messages.
const PREVIEW_LEN: usize = 200;

/// A decoded response body, stripped of any `{success, data}` wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEnvelope<T> {
    Collection(Vec<T>),
    Document(T),
    /// 2xx with no payload (`{success: true}` or an empty body).
    Empty,
}

impl<T> NormalizedEnvelope<T> {
    /// Collapse into a collection. A single document becomes a
    /// one-element collection; `Empty` becomes an empty one.
    pub fn into_collection(self) -> Vec<T> {
        match self {
            Self::Collection(items) => items,
            Self::Document(doc) => vec![doc],
            Self::Empty => Vec::new(),
        }
    }

    /// Collapse into a single document, or `None` for `Empty`.
    ///
    /// A one-element collection is accepted as a document since some
    /// endpoints wrap single results in an array.
    pub fn into_document(self) -> Option<T> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::Collection(items) => items.into_iter().next(),
            Self::Empty => None,
        }
    }
}

/// The `{success, data, message}` wrapper.
#[derive(Debug, Deserialize)]
struct Wrapped {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a successful (2xx) response body.
///
/// `status` is used only for the `{success: false}` error path.
pub fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<NormalizedEnvelope<T>, Error> {
    if body.trim().is_empty() {
        return Ok(NormalizedEnvelope::Empty);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| shape_error(&e.to_string(), body))?;

    let payload = if is_wrapped(&value) {
        let wrapped: Wrapped =
            serde_json::from_value(value).map_err(|e| shape_error(&e.to_string(), body))?;
        if !wrapped.success {
            return Err(Error::Server {
                status,
                message: wrapped.message.or(wrapped.error),
            });
        }
        match wrapped.data {
            None | Some(Value::Null) => return Ok(NormalizedEnvelope::Empty),
            Some(data) => data,
        }
    } else {
        value
    };

    match payload {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map(NormalizedEnvelope::Collection)
            .map_err(|e| shape_error(&e.to_string(), body)),
        Value::Object(_) => serde_json::from_value(payload)
            .map(NormalizedEnvelope::Document)
            .map_err(|e| shape_error(&e.to_string(), body)),
        other => Err(shape_error(
            &format!("expected an array or object, found {}", kind(&other)),
            body,
        )),
    }
}

/// Extract a human-readable message from an error body.
///
/// Accepts `{message}`, `{error}` (string) and `{error: {message}}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;
    let msg = obj
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| obj.get("error").and_then(Value::as_str))
        .or_else(|| {
            obj.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        })?;
    let msg = msg.trim();
    (!msg.is_empty()).then(|| msg.to_owned())
}

/// An object is treated as the wrapper only when it has a boolean
/// `success` field, so documents that merely contain `data` pass through.
fn is_wrapped(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get("success"))
        .is_some_and(Value::is_boolean)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn shape_error(reason: &str, body: &str) -> Error {
    let preview: String = body.chars().take(PREVIEW_LEN).collect();
    Error::Shape {
        message: format!("{reason} (body preview: {preview:?})"),
        body: body.to_owned(),
    }
}
