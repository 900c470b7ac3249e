//! Response types for sending Braid versions to clients.
//!
//! # Status Codes
//!
//! - `200 OK` - a single serialized version ([`VersionResponse`])
//! - `204 No Content` - capability discovery on OPTIONS
//! - `209 Subscription` - a newly acknowledged subscription stream ([`SubscriptionResponse`])
//!
//! Every response leaving a [`BraidLayer`](super::BraidLayer) also carries the
//! capability headers written by [`decorate_capabilities`].

use super::subscription::{HeartbeatStream, Subscription};
use crate::protocol::constants::{capabilities, headers};
use crate::protocol::serialize_version;
use crate::types::Version;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Write the capability headers advertised on every response.
pub fn decorate_capabilities(map: &mut HeaderMap) {
    map.insert(
        headers::RANGE_REQUEST_ALLOW_METHODS,
        capabilities::ALLOW_METHODS,
    );
    map.insert(headers::RANGE_REQUEST_ALLOW_UNITS, capabilities::ALLOW_UNITS);
    map.insert(headers::PATCHES, capabilities::PATCHES_OK);
}

/// A single version sent as a `200 OK` response.
///
/// The body is the full wire form produced by
/// [`serialize_version`](crate::protocol::serialize_version).
///
/// # Examples
///
/// ```
/// use axum::response::IntoResponse;
/// use braid_axum_server::server::VersionResponse;
/// use braid_axum_server::Version;
///
/// let response = VersionResponse(Version::new("1").with_body("{}")).into_response();
/// assert_eq!(response.status(), 200);
/// ```
#[derive(Clone, Debug)]
pub struct VersionResponse(pub Version);

impl IntoResponse for VersionResponse {
    fn into_response(self) -> Response {
        let wire = serialize_version(&self.0);
        let mut response = Response::new(Body::from(wire));
        if let Ok(version) = HeaderValue::from_str(&self.0.version) {
            response.headers_mut().insert(headers::VERSION, version);
        }
        response
    }
}

/// A long-lived `209 Subscription` response streaming a subscription's queue.
///
/// The body owns the subscription: when the transport drops it, because the
/// peer went away or a write failed, the subscription is closed and leaves
/// the registry.
pub struct SubscriptionResponse {
    subscription: Subscription,
    heartbeat: Option<Duration>,
}

impl SubscriptionResponse {
    /// Stream `subscription` as the response body.
    pub fn new(subscription: Subscription) -> Self {
        SubscriptionResponse {
            subscription,
            heartbeat: None,
        }
    }

    /// Emit a blank line whenever the stream is idle for `interval`.
    ///
    /// A zero interval disables heartbeats.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat = interval.filter(|interval| !interval.is_zero());
        self
    }

    /// The subscription being streamed.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl IntoResponse for SubscriptionResponse {
    fn into_response(self) -> Response {
        let chunks = self.subscription.stream().close_on_drop(&self.subscription);
        let chunks: BoxStream<'static, Bytes> = match self.heartbeat {
            Some(interval) => HeartbeatStream::new(chunks, interval).boxed(),
            None => chunks.boxed(),
        };

        tracing::debug!(
            subscriber = %self.subscription.id(),
            heartbeat = ?self.heartbeat,
            "streaming subscription"
        );

        let mut response = Response::new(Body::from_stream(chunks.map(Ok::<_, Infallible>)));
        *response.status_mut() = status::subscription();
        response
    }
}

/// HTTP response status codes
pub mod status {
    use crate::protocol::constants::status::SUBSCRIPTION;
    use axum::http::StatusCode;

    /// 209 Subscription
    pub fn subscription() -> StatusCode {
        match StatusCode::from_u16(SUBSCRIPTION) {
            Ok(status) => status,
            Err(_) => unreachable!("209 is within the valid status range"),
        }
    }

    /// Returns `true` if `status` acknowledges a subscription.
    pub fn is_subscription(status: StatusCode) -> bool {
        status.as_u16() == SUBSCRIPTION
    }
}

/// `204 No Content` response for capability discovery.
pub(crate) fn options_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    decorate_capabilities(response.headers_mut());
    response
}
