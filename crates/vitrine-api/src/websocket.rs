//! Realtime event stream with auto-reconnect.
//!
//! Connects to the admin backend's push endpoint and streams parsed
//! [`RealtimeEvent`]s through a [`tokio::sync::broadcast`] channel.
//! Handles reconnection with exponential backoff + jitter automatically
//! and exposes the connection lifecycle through a `watch` channel.
//!
//! Three frame shapes are understood:
//!
//! - `{"event": "productUpdated", "data": {...}}`
//! - `["productUpdated", {...}]`
//! - Socket.IO event packets: `42["productUpdated", {...}]`
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_api::websocket::{RealtimeHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("wss://admin.example.com/realtime")?;
//!
//! let handle = RealtimeHandle::connect(url, ReconnectConfig::default(), cancel.clone(), None);
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {}", event.name, event.payload);
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Socket.IO engine packet "message" (4) + socket packet "event" (2).
const SOCKET_IO_EVENT_PREFIX: &str = "42";

// ── RealtimeEvent ────────────────────────────────────────────────────

/// A named server push, e.g. `productVisibilityChanged` with the full
/// updated document as payload. The payload is untyped here; per-resource
/// handlers in `vitrine-core` decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(alias = "event", alias = "type")]
    pub name: String,
    #[serde(default, alias = "data")]
    pub payload: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Encode as a Socket.IO event packet for emitting.
    pub fn to_frame(&self) -> String {
        let body = serde_json::Value::Array(vec![
            serde_json::Value::String(self.name.clone()),
            self.payload.clone(),
        ]);
        format!("{SOCKET_IO_EVENT_PREFIX}{body}")
    }
}

// ── ChannelState ─────────────────────────────────────────────────────

/// Connection lifecycle observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── RealtimeHandle ───────────────────────────────────────────────────

/// Handle to a running realtime connection.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear down the background task.
pub struct RealtimeHandle {
    event_rx: broadcast::Receiver<Arc<RealtimeEvent>>,
    outbound_tx: mpsc::Sender<RealtimeEvent>,
    state_rx: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl RealtimeHandle {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously. If `cookie`
    /// is provided it is sent as a `Cookie` header on the upgrade request.
    pub fn connect(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        cookie: Option<String>,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let link = Link {
                url: &url,
                cookie: cookie.as_deref(),
                event_tx: &event_tx,
                state_tx: &state_tx,
                cancel: &task_cancel,
            };
            realtime_loop(link, outbound_rx, &reconnect).await;
            let _ = state_tx.send(ChannelState::Disconnected);
        });

        Self {
            event_rx,
            outbound_tx,
            state_rx,
            cancel,
        }
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// If a consumer falls behind it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RealtimeEvent>> {
        self.event_rx.resubscribe()
    }

    /// Observe the connection lifecycle.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Queue an outbound event (e.g. an update intent).
    ///
    /// Events queued while disconnected are sent after reconnecting.
    pub async fn emit(&self, event: RealtimeEvent) -> Result<(), Error> {
        self.outbound_tx
            .send(event)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Borrowed pieces shared by every connection attempt.
struct Link<'a> {
    url: &'a Url,
    cookie: Option<&'a str>,
    event_tx: &'a broadcast::Sender<Arc<RealtimeEvent>>,
    state_tx: &'a watch::Sender<ChannelState>,
    cancel: &'a CancellationToken,
}

/// Main loop: connect → read → on error, backoff → reconnect.
async fn realtime_loop(
    link: Link<'_>,
    mut outbound_rx: mpsc::Receiver<RealtimeEvent>,
    reconnect: &ReconnectConfig,
) {
    let mut attempt: u32 = 0;

    loop {
        let state = if attempt == 0 {
            ChannelState::Connecting
        } else {
            ChannelState::Reconnecting { attempt }
        };
        let _ = link.state_tx.send(state);

        tokio::select! {
            biased;
            () = link.cancel.cancelled() => break,
            result = connect_and_read(&link, &mut outbound_rx) => {
                match result {
                    // Clean disconnect: reset and reconnect immediately.
                    Ok(()) => {
                        if link.cancel.is_cancelled() {
                            break;
                        }
                        tracing::info!("realtime channel disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        let _ = link.state_tx.send(ChannelState::Disconnected);
                        tracing::warn!(error = %e, attempt, "realtime channel error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "realtime reconnection limit reached, falling back to polling"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = link.cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("realtime loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and pump frames until it drops.
async fn connect_and_read(
    link: &Link<'_>,
    outbound_rx: &mut mpsc::Receiver<RealtimeEvent>,
) -> Result<(), Error> {
    tracing::info!(url = %link.url, "connecting realtime channel");

    let uri: tungstenite::http::Uri = link
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(cookie_val) = link.cookie {
        request = request.with_header("Cookie", cookie_val);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("realtime channel connected");
    let _ = link.state_tx.send(ChannelState::Connected);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = link.cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            Some(event) = outbound_rx.recv() => {
                tracing::debug!(event = %event.name, "emitting realtime event");
                write
                    .send(tungstenite::Message::text(event.to_frame()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(reply) = handle_text(text.as_str(), link.event_tx) {
                            write
                                .send(tungstenite::Message::text(reply))
                                .await
                                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong reply itself
                        tracing::trace!("realtime ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "realtime close frame received"
                            );
                            if cf.code != tungstenite::protocol::frame::coding::CloseCode::Normal {
                                return Err(Error::WebSocketClosed {
                                    code: cf.code.into(),
                                    reason: cf.reason.to_string(),
                                });
                            }
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("realtime stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// What a single text frame turned out to be.
#[derive(Debug, PartialEq)]
enum Frame {
    Event(RealtimeEvent),
    /// Engine.IO ping ("2"), answered with pong ("3").
    EnginePing,
    /// Handshake, acks, namespace connects and anything else harmless.
    Control,
}

/// Parse a text frame and broadcast the event inside, if any.
///
/// Returns a reply frame to send back (Engine.IO heartbeat).
fn handle_text(text: &str, event_tx: &broadcast::Sender<Arc<RealtimeEvent>>) -> Option<String> {
    match parse_frame(text) {
        Ok(Frame::Event(event)) => {
            tracing::trace!(event = %event.name, "realtime event");
            // No subscribers right now is fine.
            let _ = event_tx.send(Arc::new(event));
            None
        }
        Ok(Frame::EnginePing) => Some("3".into()),
        Ok(Frame::Control) => None,
        Err(reason) => {
            tracing::debug!(reason, "dropping unparseable realtime frame");
            None
        }
    }
}

fn parse_frame(text: &str) -> Result<Frame, String> {
    let trimmed = text.trim();

    if trimmed == "2" {
        return Ok(Frame::EnginePing);
    }

    // Socket.IO: leading packet-type digits, optional namespace/ack id.
    let json_start = trimmed.find(['[', '{']);
    let (prefix, json) = match json_start {
        Some(idx) => trimmed.split_at(idx),
        None => return Ok(Frame::Control),
    };
    if !prefix.is_empty() && !prefix.starts_with(SOCKET_IO_EVENT_PREFIX) {
        // "0{...}" open packet, "40" connect, "43[...]" ack, etc.
        return Ok(Frame::Control);
    }

    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    match value {
        serde_json::Value::Array(mut parts) => {
            if parts.is_empty() {
                return Err("empty event array".into());
            }
            let name = match parts.remove(0) {
                serde_json::Value::String(s) => s,
                other => return Err(format!("event name is not a string: {other}")),
            };
            let payload = if parts.is_empty() {
                serde_json::Value::Null
            } else {
                parts.remove(0)
            };
            Ok(Frame::Event(RealtimeEvent { name, payload }))
        }
        obj @ serde_json::Value::Object(_) => serde_json::from_value::<RealtimeEvent>(obj)
            .map(Frame::Event)
            .map_err(|e| e.to_string()),
        other => Err(format!("unexpected frame: {other}")),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
