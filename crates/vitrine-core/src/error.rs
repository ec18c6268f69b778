// ── Core error types ──
//
// Consumer-facing errors from vitrine-core. Transport details (reqwest
// errors, raw bodies) never cross this boundary: the
// `From<vitrine_api::Error>` impl flattens them into cloneable variants
// so a failed fetch can be stored on its cache entry.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// No response was received.
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Non-2xx response, or an explicit `{success: false}`.
    #[error("Server error (HTTP {status}){}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Server {
        status: u16,
        message: Option<String>,
    },

    /// The response body had an unexpected shape.
    #[error("Unexpected response: {message}")]
    Shape { message: String },

    /// The session cookie expired; the host application must re-authenticate.
    #[error("Session expired -- please sign in again")]
    AuthExpired,

    // ── Synchronization ──────────────────────────────────────────────
    /// A mutation for the same item is still in flight.
    #[error("Another change to {item} in {key} is still in progress")]
    AlreadyInFlight { key: String, item: String },

    /// A commit or rollback was based on a snapshot the server has since
    /// replaced. Recovered locally; never returned from public mutation APIs.
    #[error("Cache entry {key} changed underneath the pending write")]
    StaleBase { key: String },

    /// A mutation was rolled back. `message` is what to show the user.
    #[error("{message}")]
    MutationFailed {
        message: String,
        #[source]
        cause: Box<CoreError>,
    },

    // ── Realtime ─────────────────────────────────────────────────────
    #[error("Realtime channel error: {reason}")]
    Realtime { reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The message the server sent, if any (looks through `MutationFailed`).
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => message.as_deref(),
            Self::MutationFailed { cause, .. } => cause.server_message(),
            _ => None,
        }
    }

    /// The text to show a user: the server's message verbatim when there
    /// is one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_owned()
    }

    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::AuthExpired => true,
            Self::MutationFailed { cause, .. } => cause.is_auth_expired(),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vitrine_api::Error> for CoreError {
    fn from(err: vitrine_api::Error) -> Self {
        match err {
            vitrine_api::Error::Network(e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::Network {
                        reason: e.to_string(),
                    }
                }
            }
            vitrine_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            vitrine_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            vitrine_api::Error::Tls(msg) => CoreError::Network {
                reason: format!("TLS error: {msg}"),
            },
            vitrine_api::Error::AuthExpired => CoreError::AuthExpired,
            vitrine_api::Error::Server { status, message } => CoreError::Server { status, message },
            vitrine_api::Error::Shape { message, body: _ } => CoreError::Shape { message },
            vitrine_api::Error::WebSocketConnect(reason) => CoreError::Realtime {
                reason: format!("connection failed: {reason}"),
            },
            vitrine_api::Error::WebSocketClosed { code, reason } => CoreError::Realtime {
                reason: format!("closed (code {code}): {reason}"),
            },
            vitrine_api::Error::NotConnected => CoreError::Realtime {
                reason: "not connected".into(),
            },
        }
    }
}
