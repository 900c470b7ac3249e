//! Braid-HTTP protocol constants.

/// Header names consumed and produced by the engine, lowercase as stored by `http`.
pub mod headers {
    use http::HeaderName;

    /// `Version` - id of the version carried by the message
    pub const VERSION: HeaderName = HeaderName::from_static("version");
    /// `Parents` - comma-separated parent version ids
    pub const PARENTS: HeaderName = HeaderName::from_static("parents");
    /// `Peer` - subscriber token
    pub const PEER: HeaderName = HeaderName::from_static("peer");
    /// `Subscribe` - request a long-lived update stream
    pub const SUBSCRIBE: HeaderName = HeaderName::from_static("subscribe");
    /// `Patches` - declared patch count, or `OK` as a capability
    pub const PATCHES: HeaderName = HeaderName::from_static("patches");
    /// `Merge-Type` - opaque conflict-resolution tag
    pub const MERGE_TYPE: HeaderName = HeaderName::from_static("merge-type");
    /// `Heartbeats` - requested keep-alive interval
    pub const HEARTBEATS: HeaderName = HeaderName::from_static("heartbeats");
    /// `Content-Type`
    pub const CONTENT_TYPE: HeaderName = http::header::CONTENT_TYPE;
    /// `Content-Length`
    pub const CONTENT_LENGTH: HeaderName = http::header::CONTENT_LENGTH;
    /// `Content-Range`
    pub const CONTENT_RANGE: HeaderName = http::header::CONTENT_RANGE;
    /// `Range-Request-Allow-Methods` capability header
    pub const RANGE_REQUEST_ALLOW_METHODS: HeaderName =
        HeaderName::from_static("range-request-allow-methods");
    /// `Range-Request-Allow-Units` capability header
    pub const RANGE_REQUEST_ALLOW_UNITS: HeaderName =
        HeaderName::from_static("range-request-allow-units");
}

/// Capability values advertised on every response.
pub mod capabilities {
    use http::HeaderValue;

    /// Methods that accept range/patch bodies
    pub const ALLOW_METHODS: HeaderValue = HeaderValue::from_static("PATCH, PUT");
    /// Range units understood by the server
    pub const ALLOW_UNITS: HeaderValue = HeaderValue::from_static("json");
    /// Value of the `Patches` capability header
    pub const PATCHES_OK: HeaderValue = HeaderValue::from_static("OK");
}

/// Status codes specific to Braid.
pub mod status {
    /// 209 Subscription - a newly acknowledged subscription
    pub const SUBSCRIPTION: u16 = 209;
}

/// Line terminator used by the framing.
pub const CRLF: &str = "\r\n";
