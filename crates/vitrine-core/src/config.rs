// ── Runtime sync configuration ──
//
// Describes *where* the API lives and how the cache behaves. Carries
// the session credential but never touches disk: the CLI (through
// vitrine-config) builds a `SyncConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use vitrine_api::{DEFAULT_SESSION_COOKIE, ReconnectConfig, RetryPolicy, RouteTable, TlsMode};

use crate::store::DEFAULT_STALE_AFTER;

/// Unobserved entries older than this are collected.
pub const DEFAULT_GC_AFTER: Duration = Duration::from_secs(5 * 60);

/// How often background tasks look for stale or collectable entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for one [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API root, e.g. `https://admin.example.com/api/`.
    pub api_url: Url,
    /// Websocket endpoint. `None` derives it from `api_url`.
    pub realtime_url: Option<Url>,
    /// Session cookie value.
    pub session: Option<SecretString>,
    pub cookie_name: String,
    pub tls: TlsMode,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub stale_after: Duration,
    pub gc_after: Duration,
    /// Interval for the staleness sweep and GC. Zero disables both.
    pub sweep_interval: Duration,
    pub realtime_enabled: bool,
    pub reconnect: ReconnectConfig,
    pub routes: RouteTable,
}

impl SyncConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            realtime_url: None,
            session: None,
            cookie_name: DEFAULT_SESSION_COOKIE.to_owned(),
            tls: TlsMode::default(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            stale_after: DEFAULT_STALE_AFTER,
            gc_after: DEFAULT_GC_AFTER,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            realtime_enabled: true,
            reconnect: ReconnectConfig::default(),
            routes: RouteTable::new(),
        }
    }

    /// The websocket URL: the explicit one, else `api_url`'s origin with
    /// a `ws`/`wss` scheme and the Socket.IO path.
    pub fn realtime_url(&self) -> Url {
        if let Some(url) = &self.realtime_url {
            return url.clone();
        }
        let mut url = self.api_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always a permitted scheme change.
        let _ = url.set_scheme(scheme);
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        url
    }
}
