use thiserror::Error;

/// Top-level error type for the `vitrine-api` crate.
///
/// Covers every failure mode of the REST and realtime surfaces.
/// `vitrine-core` maps these into consumer-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// No response was received (connection refused, DNS failure, reset).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Session ─────────────────────────────────────────────────────
    /// The session cookie was rejected (HTTP 401).
    #[error("Session expired -- re-authentication required")]
    AuthExpired,

    // ── Server ──────────────────────────────────────────────────────
    /// Non-2xx response, or a `{success: false}` envelope.
    ///
    /// `message` is the server-provided human-readable text, if any.
    #[error("Server error (HTTP {status}): {}", .message.as_deref().unwrap_or("no message"))]
    Server {
        status: u16,
        message: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// The body matched neither the `{success, data}` envelope nor a bare
    /// collection/document.
    #[error("Unexpected response shape: {message}")]
    Shape { message: String, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The realtime channel is not running, so nothing can be emitted.
    #[error("Realtime channel is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` if the session expired and the surrounding
    /// application should re-authenticate.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Server { status: 404, .. })
    }

    /// The server-provided message, if the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
