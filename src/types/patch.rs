//! Patch representing a partial update to a resource.
//!
//! A patch is addressed either by a media type (`Content-Type`), by a range
//! within the resource (`Content-Range: <unit> <range>`), or both. A patch with
//! neither descriptor is meaningless and cannot be constructed.
//!
//! # Examples
//!
//! ```
//! use braid_axum_server::Patch;
//!
//! let typed = Patch::typed("application/json", r#"{"type":"title","value":"x"}"#);
//! assert_eq!(typed.content_type(), Some("application/json"));
//!
//! let ranged = Patch::ranged("json", ".title", r#""Hello""#);
//! assert_eq!(ranged.content_range().unwrap().unit, "json");
//!
//! assert!(Patch::new("orphan", None, None).is_err());
//! ```

use crate::error::{BraidError, Result};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;

/// Range addressing of a patch, serialized as `<unit> <range>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentRange {
    /// Addressing unit, e.g. `json`
    pub unit: String,
    /// Range within the resource in the unit's syntax, e.g. `.title`
    pub range: String,
}

impl ContentRange {
    /// Create a content range from its two components.
    pub fn new(unit: impl Into<String>, range: impl Into<String>) -> Self {
        ContentRange {
            unit: unit.into(),
            range: range.into(),
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.unit, self.range)
    }
}

/// An immutable update fragment.
///
/// At least one of [`content_type`](Patch::content_type) and
/// [`content_range`](Patch::content_range) is always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    content: Bytes,
    content_type: Option<String>,
    content_range: Option<ContentRange>,
}

impl Patch {
    /// Create a patch, validating that it carries a content descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BraidError::MissingContentDescriptor`] when both
    /// `content_type` and `content_range` are `None`.
    pub fn new(
        content: impl Into<Bytes>,
        content_type: Option<String>,
        content_range: Option<ContentRange>,
    ) -> Result<Self> {
        if content_type.is_none() && content_range.is_none() {
            return Err(BraidError::MissingContentDescriptor);
        }
        Ok(Patch {
            content: content.into(),
            content_type,
            content_range,
        })
    }

    /// Create a patch described only by its media type.
    #[must_use]
    pub fn typed(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Patch {
            content: content.into(),
            content_type: Some(content_type.into()),
            content_range: None,
        }
    }

    /// Create a patch addressed to a range of the resource.
    #[must_use]
    pub fn ranged(
        unit: impl Into<String>,
        range: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Patch {
            content: content.into(),
            content_type: None,
            content_range: Some(ContentRange::new(unit, range)),
        }
    }

    /// Add a media type to this patch.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The patch payload.
    #[inline]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Media type of the payload.
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Range of the resource this patch replaces.
    #[inline]
    pub fn content_range(&self) -> Option<&ContentRange> {
        self.content_range.as_ref()
    }
}

/// Deserializable patch input, validated into a [`Patch`] on conversion.
///
/// `content_range` uses the header syntax, `"<unit> <range>"`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatchData {
    /// Patch payload
    pub content: String,
    /// Optional media type
    #[serde(default)]
    pub content_type: Option<String>,
    /// Optional `unit range` pair
    #[serde(default)]
    pub content_range: Option<String>,
}

impl TryFrom<PatchData> for Patch {
    type Error = BraidError;

    fn try_from(data: PatchData) -> Result<Self> {
        let content_range = data
            .content_range
            .as_deref()
            .map(crate::protocol::parse_content_range)
            .transpose()?;
        Patch::new(data.content, data.content_type, content_range)
    }
}
