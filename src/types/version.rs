//! Version records.
//!
//! A [`Version`] names one state (or delta) of a resource. Its content is
//! either the concatenated wire form of its patches or its raw body; when
//! `patches` is present and non-empty it takes precedence.

use super::patch::{Patch, PatchData};
use crate::error::{BraidError, Result};
use bytes::Bytes;
use serde::Deserialize;

/// Media type assumed when none is declared.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// An immutable snapshot or delta descriptor.
///
/// # Examples
///
/// ```
/// use braid_axum_server::{Patch, Version};
///
/// let snapshot = Version::new("2").with_parents(["1"]).with_body(r#"{"title":"x"}"#);
/// assert_eq!(snapshot.content_type, "application/json");
///
/// let delta = Version::new("3")
///     .with_merge_type("sync9")
///     .with_patches(vec![Patch::ranged("json", ".title", r#""y""#)]);
/// assert!(delta.has_patches());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    /// Opaque version id
    pub version: String,
    /// Ordered parent version ids
    pub parents: Vec<String>,
    /// Opaque merge-type tag; never interpreted by the engine
    pub merge_type: Option<String>,
    /// Media type of the content
    pub content_type: String,
    /// Ordered patches, when the version is a delta
    pub patches: Option<Vec<Patch>>,
    /// Raw body, used when there are no patches
    pub body: Bytes,
}

impl Version {
    /// Create a version with an empty body and default content type.
    pub fn new(version: impl Into<String>) -> Self {
        Version {
            version: version.into(),
            parents: Vec::new(),
            merge_type: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            patches: None,
            body: Bytes::new(),
        }
    }

    /// Set the parent version ids.
    #[must_use]
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    /// Set the merge-type tag.
    #[must_use]
    pub fn with_merge_type(mut self, merge_type: impl Into<String>) -> Self {
        self.merge_type = Some(merge_type.into());
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the patches.
    #[must_use]
    pub fn with_patches(mut self, patches: Vec<Patch>) -> Self {
        self.patches = Some(patches);
        self
    }

    /// Set the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns `true` when the content is carried by a non-empty patch list.
    #[inline]
    #[must_use]
    pub fn has_patches(&self) -> bool {
        self.patches.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// Loosely-typed version input, e.g. deserialized from a handler's JSON.
///
/// Converting into a [`Version`] requires at least one of `body` or `patches`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VersionData {
    /// Version id
    pub version: String,
    /// Parent ids
    pub parents: Option<Vec<String>>,
    /// Merge-type tag
    pub merge_type: Option<String>,
    /// Content type; defaults to [`DEFAULT_CONTENT_TYPE`]
    pub content_type: Option<String>,
    /// Patches
    pub patches: Option<Vec<PatchData>>,
    /// Raw body
    pub body: Option<String>,
}

impl TryFrom<VersionData> for Version {
    type Error = BraidError;

    fn try_from(data: VersionData) -> Result<Self> {
        let has_patches = data.patches.as_ref().is_some_and(|patches| !patches.is_empty());
        if !has_patches && data.body.is_none() {
            return Err(BraidError::NoContentProvided);
        }

        let patches = data
            .patches
            .map(|patches| {
                patches
                    .into_iter()
                    .map(Patch::try_from)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(Version {
            version: data.version,
            parents: data.parents.unwrap_or_default(),
            merge_type: data.merge_type,
            content_type: data
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            patches,
            body: data.body.map(Bytes::from).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let v = Version::new("1");
        assert_eq!(v.content_type, DEFAULT_CONTENT_TYPE);
        assert!(v.parents.is_empty());
        assert!(v.body.is_empty());
        assert!(!v.has_patches());
    }

    #[test]
    fn test_empty_patch_list_is_not_patched() {
        let v = Version::new("1").with_patches(Vec::new());
        assert!(!v.has_patches());
    }

    #[test]
    fn test_version_data_requires_content() {
        let data = VersionData {
            version: "1".into(),
            ..Default::default()
        };
        assert!(matches!(
            Version::try_from(data),
            Err(BraidError::NoContentProvided)
        ));

        let data: VersionData =
            serde_json::from_str(r#"{"version": "1", "patches": []}"#).unwrap();
        assert!(matches!(
            Version::try_from(data),
            Err(BraidError::NoContentProvided)
        ));

        let data: VersionData =
            serde_json::from_str(r#"{"version": "1", "patches": [], "body": ""}"#).unwrap();
        assert!(Version::try_from(data).is_ok());
    }

    #[test]
    fn test_version_data_from_json_body() {
        let data: VersionData =
            serde_json::from_str(r#"{"version": "1", "body": "{\"title\":\"Hello\"}"}"#).unwrap();
        let v = Version::try_from(data).unwrap();
        assert_eq!(v.version, "1");
        assert_eq!(v.body, Bytes::from(r#"{"title":"Hello"}"#));
        assert_eq!(v.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_version_data_with_patches() {
        let data: VersionData = serde_json::from_str(
            r#"{
                "version": "1",
                "parents": ["0"],
                "merge_type": "auto",
                "patches": [{"content": "100", "content_range": "json .latest_change"}]
            }"#,
        )
        .unwrap();
        let v = Version::try_from(data).unwrap();
        assert_eq!(v.parents, vec!["0".to_string()]);
        assert_eq!(v.merge_type.as_deref(), Some("auto"));
        assert!(v.has_patches());
    }

    #[test]
    fn test_version_data_rejects_bad_patch() {
        let data: VersionData =
            serde_json::from_str(r#"{"version": "1", "patches": [{"content": "x"}]}"#).unwrap();
        assert!(matches!(
            Version::try_from(data),
            Err(BraidError::MissingContentDescriptor)
        ));
    }
}
