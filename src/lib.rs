#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Module Structure
//!
//! - **[types]** - Plain records: [`Patch`], [`Version`] and their serde inputs
//! - **[error]** - Error types and result handling
//! - **[protocol]** - Header parsing, patch framing and version wire form
//! - **[server]** - Axum middleware, subscriptions and responses

pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

pub use error::{BraidError, Result};
pub use server::{
    Advertiser, BraidContext, BraidLayer, BraidState, ServerConfig, SubscriberId, Subscription,
    SubscriptionRegistry,
};
pub use types::{ContentRange, Patch, PatchData, Version, VersionData};
