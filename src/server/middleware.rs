//! Axum middleware for Braid protocol support.
//!
//! # Usage
//!
//! ```
//! use axum::{routing::get, Router};
//! use braid_axum_server::{BraidContext, BraidLayer, Version};
//!
//! async fn handler(ctx: BraidContext) -> axum::response::Response {
//!     use axum::response::IntoResponse;
//!
//!     match ctx.subscription_response() {
//!         Some(stream) => stream.into_response(),
//!         None => braid_axum_server::server::VersionResponse(Version::new("1").with_body("{}"))
//!             .into_response(),
//!     }
//! }
//!
//! let braid = BraidLayer::new();
//! let app: Router = Router::new()
//!     .route("/resource", get(handler))
//!     .layer(braid.middleware());
//! ```
//!
//! # How It Works
//!
//! For every request the middleware:
//! 1. Answers OPTIONS with `204` and the capability headers
//! 2. Parses the Braid headers into a typed [`BraidState`]
//! 3. On PUT, buffers the body and decodes the carried [`Version`], rejecting
//!    the request before the handler runs if the framing is malformed
//! 4. On GET with `Subscribe`, registers a [`Subscription`] for the requester
//! 5. Hands the handler a [`BraidContext`] through request extensions
//! 6. Decorates the response with the capability headers and, for an
//!    acknowledged subscription, status `209` and the `Peer` token

use super::config::ServerConfig;
use super::registry::{SubscriberId, SubscriptionRegistry};
use super::send_update::{
    decorate_capabilities, options_response, status, SubscriptionResponse, VersionResponse,
};
use super::subscription::Subscription;
use crate::error::{BraidError, Result};
use crate::protocol::{self, constants::headers};
use crate::types::{Version, VersionData};
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn braid_middleware_handler(
    State(layer): State<BraidLayer>,
    req: Request,
    next: Next,
) -> Response {
    layer.handle_middleware(req, next).await
}

/// Braid protocol state extracted from HTTP request headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BraidState {
    /// `Subscribe` was truthy (`true`, `t` or `1`, case-insensitive)
    pub subscribe: bool,

    /// Version id from the `Version` header
    pub version: Option<String>,

    /// Parent version ids from the `Parents` header
    pub parents: Vec<String>,

    /// Subscriber token from the `Peer` header
    pub peer: Option<String>,

    /// Merge-type tag from the `Merge-Type` header
    pub merge_type: Option<String>,

    /// Requested keep-alive interval from the `Heartbeats` header
    pub heartbeat: Option<Duration>,

    /// Declared patch count from the `Patches` header
    pub patches: Option<usize>,

    /// Media type from the `Content-Type` header
    pub content_type: Option<String>,
}

impl BraidState {
    /// Parse the Braid headers of a request.
    ///
    /// Never fails: unreadable values are treated as absent. Strict decoding
    /// of PUT bodies happens separately in
    /// [`parse_request_version`](crate::protocol::parse_request_version).
    #[must_use]
    pub fn from_headers(map: &HeaderMap) -> Self {
        let mut braid_state = BraidState::default();

        for (name, value) in map {
            let Ok(value) = value.to_str() else {
                continue;
            };

            if *name == headers::SUBSCRIBE {
                braid_state.subscribe = protocol::is_truthy(value);
            } else if *name == headers::VERSION {
                braid_state.version = Some(protocol::parse_version_id(value));
            } else if *name == headers::PARENTS {
                braid_state.parents = protocol::parse_version_list(value);
            } else if *name == headers::PEER {
                braid_state.peer = Some(value.trim().to_string()).filter(|peer| !peer.is_empty());
            } else if *name == headers::MERGE_TYPE {
                braid_state.merge_type = Some(value.to_string());
            } else if *name == headers::HEARTBEATS {
                braid_state.heartbeat = protocol::parse_heartbeat(value).ok();
            } else if *name == headers::PATCHES {
                braid_state.patches = protocol::parse_patches_count(value).ok();
            } else if *name == headers::CONTENT_TYPE {
                braid_state.content_type = Some(value.to_string());
            }
        }

        braid_state
    }
}

/// Capability to fan a version out to every subscriber of one resource.
///
/// Bound to the request path by the middleware.
#[derive(Clone, Debug)]
pub struct Advertiser {
    registry: SubscriptionRegistry,
    path: String,
}

impl Advertiser {
    /// Bind `registry` to the resource at `path`.
    pub fn new(registry: SubscriptionRegistry, path: impl Into<String>) -> Self {
        Advertiser {
            registry,
            path: path.into(),
        }
    }

    /// The resource path versions are advertised on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serialize `version` and push it to every active subscriber of the path.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn advertise(&self, version: &Version) -> usize {
        self.registry
            .advertise(&self.path, protocol::serialize_version(version))
    }
}

/// Typed per-request context produced by [`BraidLayer`].
///
/// Extract it in a handler by naming it as an argument.
#[derive(Clone, Debug)]
pub struct BraidContext {
    state: Arc<BraidState>,
    version: Option<Version>,
    subscription: Option<Subscription>,
    advertiser: Advertiser,
    peer: String,
    heartbeat: Option<Duration>,
}

impl BraidContext {
    /// Parsed Braid headers.
    pub fn state(&self) -> &BraidState {
        &self.state
    }

    /// Version decoded from a PUT body, if the request carried one.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// The subscription registered for this GET, if any.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Returns `true` when this request opened a subscription.
    pub fn is_subscribing(&self) -> bool {
        self.subscription.is_some()
    }

    /// The requester's peer token: its `Peer` header or a server-issued one.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.advertiser.path()
    }

    /// Effective heartbeat interval for a subscription stream.
    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat
    }

    /// The advertise capability for this request's path.
    pub fn advertiser(&self) -> &Advertiser {
        &self.advertiser
    }

    /// Shorthand for `self.advertiser().advertise(version)`.
    pub fn advertise(&self, version: &Version) -> usize {
        self.advertiser.advertise(version)
    }

    /// A `209` response streaming this request's subscription.
    ///
    /// `None` when the request did not open a subscription.
    pub fn subscription_response(&self) -> Option<SubscriptionResponse> {
        self.subscription
            .clone()
            .map(|subscription| SubscriptionResponse::new(subscription).with_heartbeat(self.heartbeat))
    }

    /// Deliver `version` to this requester.
    ///
    /// On a subscribing request the serialized version is queued on the
    /// subscription and `None` is returned; otherwise the version is returned
    /// as a `200` response.
    ///
    /// After `None` the handler must return
    /// [`subscription_response`](Self::subscription_response) for the request
    /// to be answered with `209`; a subscription whose stream is not returned
    /// is closed when the handler finishes. See [`BraidLayer`].
    pub fn create_version(&self, version: Version) -> Option<Response> {
        match &self.subscription {
            Some(subscription) => {
                subscription.push(protocol::serialize_version(&version));
                None
            }
            None => Some(VersionResponse(version).into_response()),
        }
    }

    /// Like [`create_version`](Self::create_version), building the version from `data`.
    ///
    /// # Errors
    ///
    /// [`BraidError::NoContentProvided`] when `data` has neither patches nor body,
    /// or any patch construction error.
    pub fn create_version_from(&self, data: VersionData) -> Result<Option<Response>> {
        Ok(self.create_version(Version::try_from(data)?))
    }
}

impl<S> FromRequestParts<S> for BraidContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts.extensions.get::<BraidContext>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "BraidLayer middleware is not installed",
        ))
    }
}

/// Axum middleware layer for Braid protocol support.
///
/// Holds the server configuration and the shared [`SubscriptionRegistry`].
/// Clones share the registry, so a layer can be cloned into handler state to
/// advertise from outside a request.
///
/// # Subscribing GETs
///
/// A GET with `Subscribe: true` registers a [`Subscription`] before the
/// handler runs. The response becomes `209` with a `Peer` header only when
/// the handler returns a 2xx response whose body streams that subscription,
/// as built by [`BraidContext::subscription_response`].
///
/// Any other response passes through with its own status, and the
/// subscription is closed and removed from the registry. A handler that
/// answers a subscribing GET with a plain [`VersionResponse`] (or any other
/// 200) therefore silently ends the subscription. The subscription is also
/// closed if the handler panics or the request is cancelled.
///
/// ```
/// use braid_axum_server::{BraidLayer, ServerConfig};
///
/// let layer = BraidLayer::with_config(ServerConfig {
///     max_subscriptions: 500,
///     ..Default::default()
/// });
/// assert_eq!(layer.config().max_subscriptions, 500);
/// assert!(layer.registry().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct BraidLayer {
    config: ServerConfig,
    registry: SubscriptionRegistry,
}

impl Default for BraidLayer {
    fn default() -> Self {
        Self::with_config(ServerConfig::default())
    }
}

impl BraidLayer {
    /// Create a new Braid layer with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Braid layer with custom configuration.
    ///
    /// The fresh registry drops subscribers with more than
    /// [`ServerConfig::max_queued_updates`] undelivered updates.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let registry = SubscriptionRegistry::with_queue_limit(config.max_queued_updates);
        Self { config, registry }
    }

    /// Use an existing registry instead of a fresh one.
    ///
    /// The registry keeps its own queue limit.
    #[must_use]
    pub fn with_registry(mut self, registry: SubscriptionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The layer's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The shared subscription registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Create the middleware for use with `Router::layer`.
    #[must_use]
    pub fn middleware(
        &self,
    ) -> impl tower::Layer<
        axum::routing::Route,
        Service = impl tower::Service<
            Request,
            Response = Response,
            Error = std::convert::Infallible,
            Future = impl Send + 'static,
        > + Clone
                      + Send
                      + Sync
                      + 'static,
    > + Clone
           + Send
           + Sync
           + 'static {
        axum::middleware::from_fn_with_state(self.clone(), braid_middleware_handler)
    }

    async fn handle_middleware(&self, mut req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if method == Method::OPTIONS && self.config.answer_options {
            tracing::debug!(%path, "answering capability discovery");
            return options_response();
        }

        let braid_state = BraidState::from_headers(req.headers());
        let peer = braid_state
            .peer
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut version = None;
        if method == Method::PUT {
            let (parts, body) = req.into_parts();
            match self.read_version(&parts.headers, body).await {
                Ok((decoded, bytes)) => {
                    version = decoded;
                    req = Request::from_parts(parts, Body::from(bytes));
                }
                Err(e) => {
                    tracing::warn!(%path, error = %e, "rejecting PUT");
                    return rejection(e);
                }
            }
        }

        let guard = SubscriptionGuard(if method == Method::GET && braid_state.subscribe {
            if self.config.enable_subscriptions {
                let id = SubscriberId::new(peer.clone(), path.clone());
                match self.registry.try_subscribe(
                    path.clone(),
                    id,
                    self.config.max_subscriptions,
                    || {},
                ) {
                    Ok(subscription) => Some(subscription),
                    Err(e) => return rejection(e),
                }
            } else {
                tracing::debug!(%path, "subscriptions disabled, serving plain GET");
                None
            }
        } else {
            None
        });

        let heartbeat = braid_state
            .heartbeat
            .or_else(|| self.config.default_heartbeat());

        tracing::debug!(
            %method,
            %path,
            subscribe = guard.0.is_some(),
            version = ?version.as_ref().map(|v: &Version| v.version.as_str()),
            "negotiated braid request"
        );

        let braid_state = Arc::new(braid_state);
        let context = BraidContext {
            state: Arc::clone(&braid_state),
            version,
            subscription: guard.0.clone(),
            advertiser: Advertiser::new(self.registry.clone(), path),
            peer: peer.clone(),
            heartbeat,
        };
        req.extensions_mut().insert(braid_state);
        req.extensions_mut().insert(context);

        let mut response = next.run(req).await;
        decorate_capabilities(response.headers_mut());

        if let Some(subscription) = guard.disarm() {
            if response.status().is_success() && subscription.is_attached() {
                *response.status_mut() = status::subscription();
                if let Ok(value) = HeaderValue::from_str(&peer) {
                    response.headers_mut().insert(headers::PEER, value);
                }
            } else {
                tracing::debug!(
                    subscriber = %subscription.id(),
                    status = %response.status(),
                    "handler did not stream subscription, closing"
                );
                subscription.close();
            }
        }

        response
    }

    /// Buffer a PUT body and decode the version it carries.
    async fn read_version(&self, map: &HeaderMap, body: Body) -> Result<(Option<Version>, Bytes)> {
        let limit = self.config.max_body_bytes;
        let declared = map
            .get(headers::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(BraidError::PayloadTooLarge(limit));
        }

        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| BraidError::BodyRead(e.to_string()))?;
        let version = protocol::parse_request_version(map, &bytes)?;

        Ok((version, bytes))
    }
}

/// Closes a subscription the handler never got to stream.
///
/// Held across `next.run` so a panicking or cancelled handler does not leave
/// the subscription registered.
struct SubscriptionGuard(Option<Subscription>);

impl SubscriptionGuard {
    fn disarm(mut self) -> Option<Subscription> {
        self.0.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            if !subscription.is_attached() {
                tracing::debug!(subscriber = %subscription.id(), "request abandoned, closing subscription");
                subscription.close();
            }
        }
    }
}

fn rejection(error: BraidError) -> Response {
    let mut response = error.into_response();
    decorate_capabilities(response.headers_mut());
    response
}
