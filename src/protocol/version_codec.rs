//! Version wire form and request decoding.
//!
//! A serialized version is a header block followed by its content:
//!
//! ```text
//! Version: <id>\r\n
//! [Parents: <a,b,c>\r\n]
//! [Merge-Type: <t>\r\n]
//! Content-Type: <type>\r\n
//! [Patches: <n>\r\n]
//! Content-Length: <len>\r\n
//! \r\n
//! <content>
//! ```
//!
//! The content is the concatenated patch frames when the version carries a
//! non-empty patch list, and the raw body otherwise.

use crate::error::{BraidError, Result};
use crate::protocol::constants::{headers, CRLF};
use crate::protocol::headers::{parse_patches_count, parse_version_id, parse_version_list};
use crate::protocol::patch_codec::{parse_all, write_header, write_patch};
use crate::types::{Version, DEFAULT_CONTENT_TYPE};
use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderName};

/// The content a version carries on the wire.
pub fn content(version: &Version) -> Bytes {
    match &version.patches {
        Some(patches) if !patches.is_empty() => {
            let mut buffer = BytesMut::new();
            for patch in patches {
                write_patch(&mut buffer, patch);
            }
            buffer.freeze()
        }
        _ => version.body.clone(),
    }
}

/// Serialize a version to its wire form.
///
/// # Examples
///
/// ```
/// use braid_axum_server::protocol::serialize_version;
/// use braid_axum_server::Version;
///
/// let v = Version::new("2").with_parents(["1"]).with_body("{}");
/// assert_eq!(
///     serialize_version(&v),
///     "Version: 2\r\nParents: 1\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}"
/// );
/// ```
pub fn serialize_version(version: &Version) -> Bytes {
    let content = content(version);
    let mut buffer = BytesMut::with_capacity(content.len() + 128);

    write_header(&mut buffer, "Version", &version.version);
    if !version.parents.is_empty() {
        write_header(&mut buffer, "Parents", &version.parents.join(","));
    }
    if let Some(merge_type) = &version.merge_type {
        write_header(&mut buffer, "Merge-Type", merge_type);
    }
    write_header(&mut buffer, "Content-Type", &version.content_type);
    if let Some(patches) = version.patches.as_ref().filter(|p| !p.is_empty()) {
        write_header(&mut buffer, "Patches", &patches.len().to_string());
    }
    write_header(&mut buffer, "Content-Length", &content.len().to_string());
    buffer.put_slice(CRLF.as_bytes());
    buffer.put_slice(&content);

    buffer.freeze()
}

/// Whether the version's content parses as JSON.
///
/// Informational only; a `false` result never rejects anything.
pub fn is_valid_json(version: &Version) -> bool {
    match serde_json::from_slice::<serde_json::Value>(&content(version)) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(version = %version.version, error = %e, "version content is not JSON");
            false
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map_err(|_| {
                BraidError::HeaderParse(format!("Non-ASCII value in '{}' header", name))
            })
        })
        .transpose()
}

/// Decode the version carried by an incoming request.
///
/// Returns `Ok(None)` when the request has no `Version` header; a PUT without
/// version semantics is legal. When a `Patches` header is present the body is
/// decoded as that many patch frames, otherwise the whole body becomes the
/// version's raw body.
///
/// The body must be complete; callers buffer it before decoding.
///
/// # Errors
///
/// Any framing error from [`parse_all`], or [`BraidError::HeaderParse`] for an
/// unreadable `Patches` or other Braid header. On error no version is built.
pub fn parse_request_version(headers: &HeaderMap, body: &Bytes) -> Result<Option<Version>> {
    let Some(id) = header_str(headers, &headers::VERSION)? else {
        return Ok(None);
    };

    let parents = header_str(headers, &headers::PARENTS)?
        .map(parse_version_list)
        .unwrap_or_default();
    let content_type = header_str(headers, &headers::CONTENT_TYPE)?
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let merge_type = header_str(headers, &headers::MERGE_TYPE)?.map(str::to_string);

    let (patches, body) = match header_str(headers, &headers::PATCHES)? {
        Some(count) => {
            let count = parse_patches_count(count)?;
            (Some(parse_all(body, count)?), Bytes::new())
        }
        None => (None, body.clone()),
    };

    Ok(Some(Version {
        version: parse_version_id(id),
        parents,
        merge_type,
        content_type,
        patches,
        body,
    }))
}
