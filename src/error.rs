//! Error types for the Braid-HTTP server engine.
//!
//! Every failure produced here is scoped to a single request or a single
//! subscription. A rejected PUT never creates a [`Version`](crate::Version),
//! never reaches [`Advertiser::advertise`](crate::server::Advertiser::advertise),
//! and never disturbs other in-flight requests or live subscriptions.
//!
//! # Error Categories
//!
//! | Category | Variants | Status |
//! |----------|----------|--------|
//! | Framing | `Framing`, `CountMismatch`, `MissingContentDescriptor` | 400 |
//! | Construction | `NoContentProvided` | 400 |
//! | Headers | `HeaderParse` | 400 |
//! | Transport | `BodyRead`, `PayloadTooLarge` | 400 / 413 |
//! | Capacity | `SubscriptionLimit` | 503 |
//!
//! # Examples
//!
//! ```
//! use braid_axum_server::BraidError;
//!
//! let err = BraidError::CountMismatch { expected: 2, actual: 1 };
//! assert!(err.to_string().contains("expected 2"));
//! assert_eq!(err.status_code().as_u16(), 400);
//! ```

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

/// Result type for Braid engine operations.
pub type Result<T> = std::result::Result<T, BraidError>;

/// Errors that can occur while decoding, constructing or delivering Braid updates.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BraidError {
    /// Malformed or incomplete patch framing.
    ///
    /// Raised when no header/body boundary can be found in the remaining
    /// buffer, when a patch lacks `Content-Length`, or when a patch declares
    /// more content than the buffer holds.
    #[error("Framing error: {0}")]
    Framing(String),

    /// The `Patches` header declared a different number of patches than the body holds.
    #[error("Patch count mismatch: expected {expected}, parsed {actual}")]
    CountMismatch {
        /// Count declared by the `Patches` header
        expected: usize,
        /// Count actually found in the body
        actual: usize,
    },

    /// A patch carries neither `Content-Type` nor `Content-Range`.
    #[error("Patch has neither Content-Type nor Content-Range")]
    MissingContentDescriptor,

    /// A version was requested with neither a body nor a non-empty patch list.
    #[error("No 'patches' or 'body' provided in new version data")]
    NoContentProvided,

    /// A Braid header carried a value that could not be parsed.
    #[error("Header parse error: {0}")]
    HeaderParse(String),

    /// The transport failed while delivering the request body.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// The request body exceeded the configured limit.
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The configured maximum number of live subscriptions was reached.
    #[error("Subscription limit of {0} reached")]
    SubscriptionLimit(usize),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Patch framing headers were not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl BraidError {
    /// HTTP status used when this error rejects a request.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            BraidError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            BraidError::SubscriptionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Returns `true` for errors caused by a malformed request body.
    #[inline]
    #[must_use]
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            BraidError::Framing(_)
                | BraidError::CountMismatch { .. }
                | BraidError::MissingContentDescriptor
                | BraidError::InvalidUtf8(_)
        )
    }
}

impl IntoResponse for BraidError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mismatch_display() {
        let err = BraidError::CountMismatch { expected: 3, actual: 2 };
        let msg = err.to_string();
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("parsed 2"));
    }

    #[test]
    fn test_framing_errors_are_bad_request() {
        assert_eq!(BraidError::Framing("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(BraidError::MissingContentDescriptor.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(BraidError::NoContentProvided.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_limit_statuses() {
        assert_eq!(BraidError::PayloadTooLarge(10).status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(BraidError::SubscriptionLimit(1).status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_is_framing() {
        assert!(BraidError::Framing("no boundary".into()).is_framing());
        assert!(BraidError::CountMismatch { expected: 1, actual: 0 }.is_framing());
        assert!(!BraidError::HeaderParse("Patches".into()).is_framing());
    }

    #[test]
    fn test_into_response_status() {
        let response = BraidError::CountMismatch { expected: 1, actual: 2 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
