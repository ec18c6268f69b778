// REST client for resource collections
//
// Wraps `reqwest::Client` with route resolution, envelope normalization,
// error translation, and retry of idempotent reads. One network
// operation per call; no caching happens at this layer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};
use url::Url;

use crate::envelope::{self, NormalizedEnvelope};
use crate::error::Error;
use crate::key::{ItemId, ResourceKey};
use crate::transport::{RetryPolicy, TransportConfig};

// ── Actions ─────────────────────────────────────────────────────────

/// A state-changing action on a single item, sent as
/// `PATCH {collection}/{id}/{action}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    Activate,
    Deactivate,
    Approve,
    Reject,
    MarkRead,
    ToggleVisibility,
    /// Any other path segment the backend understands.
    #[strum(default)]
    Custom(String),
}

impl Action {
    /// Path segment appended after the item id.
    pub fn segment(&self) -> &str {
        match self {
            Self::Custom(s) => s,
            other => other.as_ref(),
        }
    }
}

// ── Routes ──────────────────────────────────────────────────────────

/// How a resource name maps onto an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    /// Path relative to the API base (defaults to the resource name).
    pub path: Option<String>,
    /// Query parameter names for the key's parameters, by position.
    /// Key parameters without a name are not sent.
    pub query: Vec<String>,
}

/// Per-resource route overrides. Resources without an entry use
/// `{base}/{name}` and send no query parameters.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, resource: impl Into<String>, route: Route) -> Self {
        self.routes.insert(resource.into(), route);
        self
    }

    pub fn insert(&mut self, resource: impl Into<String>, route: Route) {
        self.routes.insert(resource.into(), route);
    }

    fn path_for<'a>(&'a self, key: &'a ResourceKey) -> &'a str {
        self.routes
            .get(key.name())
            .and_then(|r| r.path.as_deref())
            .unwrap_or(key.name())
    }

    fn query_for(&self, key: &ResourceKey) -> Vec<(String, String)> {
        let Some(route) = self.routes.get(key.name()) else {
            return Vec::new();
        };
        route
            .query
            .iter()
            .zip(key.params())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Async client for the admin REST API.
///
/// Every call carries the session cookie from the transport's jar.
/// Responses in either the `{success, data}` or bare shape are
/// normalized; failures are translated into [`Error`].
#[derive(Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    base_url: Url,
    routes: Arc<RouteTable>,
    retry: RetryPolicy,
    timeout_secs: u64,
}

impl ResourceClient {
    /// Build a client from a transport config.
    ///
    /// `base_url` is the API root, e.g. `https://admin.example.com/api/`.
    pub fn new(base_url: Url, routes: RouteTable, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url: normalize_base(base_url),
            routes: Arc::new(routes),
            retry: transport.retry,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages cookies).
    pub fn with_client(http: reqwest::Client, base_url: Url, routes: RouteTable) -> Self {
        Self {
            http,
            base_url: normalize_base(base_url),
            routes: Arc::new(routes),
            retry: RetryPolicy::default(),
            timeout_secs: 30,
        }
    }

    /// Override the read retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// List a collection. Bare arrays and `{success, data}` wrappers are
    /// both accepted; a single document becomes a one-element list.
    pub async fn fetch_collection<T: DeserializeOwned>(
        &self,
        key: &ResourceKey,
    ) -> Result<Vec<T>, Error> {
        Ok(self.fetch(key).await?.into_collection())
    }

    /// Read the resource at `key`, keeping the collection/document shape.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        key: &ResourceKey,
    ) -> Result<NormalizedEnvelope<T>, Error> {
        let url = self.collection_url(key)?;
        let query = self.routes.query_for(key);
        self.send_idempotent(|| self.http.get(url.clone()).query(&query))
            .await
    }

    /// Fetch a single document by id.
    pub async fn fetch_document<T: DeserializeOwned>(
        &self,
        key: &ResourceKey,
        id: &ItemId,
    ) -> Result<T, Error> {
        let url = self.item_url(key, id, None)?;
        let env = self.send_idempotent(|| self.http.get(url.clone())).await?;
        require_document(env)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Create a document. Returns the server's stored version, or `None`
    /// when the server only acknowledged the write (`{success, message}`).
    pub async fn create<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        key: &ResourceKey,
        payload: &B,
    ) -> Result<Option<T>, Error> {
        let url = self.collection_url(key)?;
        debug!("POST {url}");
        let env = self.send_once(self.http.post(url).json(payload)).await?;
        Ok(env.into_document())
    }

    /// Replace/merge a document. `None` when the server sent no document.
    pub async fn update<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        key: &ResourceKey,
        id: &ItemId,
        payload: &B,
    ) -> Result<Option<T>, Error> {
        let url = self.item_url(key, id, None)?;
        debug!("PUT {url}");
        let env = self.send_once(self.http.put(url).json(payload)).await?;
        Ok(env.into_document())
    }

    /// Apply an action to a document, e.g. `approve` or `toggle-visibility`.
    ///
    /// Many actions answer with just `{success, message}`; those yield `None`.
    pub async fn patch_action<T: DeserializeOwned>(
        &self,
        key: &ResourceKey,
        id: &ItemId,
        action: &Action,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>, Error> {
        let url = self.item_url(key, id, Some(action.segment()))?;
        debug!("PATCH {url}");
        let mut builder = self.http.patch(url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let env = self.send_once(builder).await?;
        Ok(env.into_document())
    }

    /// Delete a document.
    pub async fn remove(&self, key: &ResourceKey, id: &ItemId) -> Result<(), Error> {
        let url = self.item_url(key, id, None)?;
        debug!("DELETE {url}");
        self.send_once::<serde_json::Value>(self.http.delete(url)).await?;
        Ok(())
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn collection_url(&self, key: &ResourceKey) -> Result<Url, Error> {
        let path = self.routes.path_for(key).trim_matches('/');
        Ok(self.base_url.join(path)?)
    }

    fn item_url(&self, key: &ResourceKey, id: &ItemId, action: Option<&str>) -> Result<Url, Error> {
        let mut url = self.collection_url(key)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty().push(id.as_str());
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    // ── Response handling ────────────────────────────────────────────

    /// Send a read, retrying transient failures per the retry policy.
    async fn send_idempotent<T, F>(&self, build: F) -> Result<NormalizedEnvelope<T>, Error>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let result = self.send_once(build()).await;

            match result {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient read failure, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                other => return other,
            }
        }
    }

    /// Send a request once. Writes go through here directly; they are
    /// never retried.
    async fn send_once<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<NormalizedEnvelope<T>, Error> {
        match request.send().await {
            Ok(resp) => self.handle_response(resp).await,
            Err(e) => Err(self.transport_error(e)),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Network(e)
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<NormalizedEnvelope<T>, Error> {
        let status = resp.status();
        debug!(status = status.as_u16(), url = %resp.url(), "response");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                message: envelope::error_message(&body),
            });
        }

        envelope::decode(status.as_u16(), &body)
    }
}

/// Ensure the base URL ends with `/` so relative joins append.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn require_document<T>(env: NormalizedEnvelope<T>) -> Result<T, Error> {
    env.into_document().ok_or_else(|| Error::Shape {
        message: "expected a document, response carried no data".into(),
        body: String::new(),
    })
}
