//! Axum integration for the Braid-HTTP server engine.
//!
//! - [`BraidLayer`] - middleware that negotiates each request and decorates each response
//! - [`BraidContext`] - the typed per-request context handlers extract
//! - [`SubscriptionRegistry`] - shared table of live subscriptions
//! - [`Subscription`] - one subscriber's queue and lifecycle
//! - [`VersionResponse`] / [`SubscriptionResponse`] - `200` and `209` responses
//!
//! # Example
//!
//! ```
//! use axum::{response::{IntoResponse, Response}, routing::get, Router};
//! use braid_axum_server::{BraidContext, BraidLayer, Version};
//!
//! async fn document(ctx: BraidContext) -> Response {
//!     let current = Version::new("1").with_body(r#"{"title":"Hello"}"#);
//!     match ctx.create_version(current) {
//!         Some(response) => response,
//!         None => ctx
//!             .subscription_response()
//!             .map(IntoResponse::into_response)
//!             .unwrap_or_default(),
//!     }
//! }
//!
//! let app: Router = Router::new()
//!     .route("/doc", get(document))
//!     .layer(BraidLayer::new().middleware());
//! ```

mod config;
mod middleware;
mod registry;
mod send_update;
mod subscription;

pub use config::ServerConfig;
pub use middleware::{Advertiser, BraidContext, BraidLayer, BraidState};
pub use registry::{SubscriberId, SubscriptionRegistry};
pub use send_update::{decorate_capabilities, status, SubscriptionResponse, VersionResponse};
pub use subscription::{HeartbeatStream, Subscription, SubscriptionStatus, SubscriptionStream};
