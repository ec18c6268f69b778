//! Async transport for the Vitrine storefront admin API.
//!
//! - **[`ResourceClient`]**: one REST call per method for a named resource
//!   collection (list / fetch / create / update / patch-action / delete),
//!   with cookie-based session credentials and envelope normalization.
//! - **[`websocket`]**: a reconnecting realtime connection that broadcasts
//!   named server pushes as [`RealtimeEvent`]s.
//! - **[`ResourceKey`] / [`ItemId`]**: identity types shared with the cache.

pub mod client;
pub mod envelope;
pub mod error;
pub mod key;
pub mod transport;
pub mod websocket;

pub use client::{Action, ResourceClient, Route, RouteTable};
pub use envelope::NormalizedEnvelope;
pub use error::Error;
pub use key::{ItemId, ResourceKey};
pub use transport::{DEFAULT_SESSION_COOKIE, RetryPolicy, TlsMode, TransportConfig};
pub use websocket::{ChannelState, RealtimeEvent, RealtimeHandle, ReconnectConfig};
