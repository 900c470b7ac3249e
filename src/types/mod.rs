//! Core Braid protocol records.
//!
//! These are plain immutable values. Their wire forms live in
//! [`protocol::patch_codec`](crate::protocol::patch_codec) and
//! [`protocol::version_codec`](crate::protocol::version_codec).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Patch`] | One framed update fragment |
//! | [`ContentRange`] | `unit range` addressing of a patch |
//! | [`Version`] | Named snapshot or delta of a resource |
//! | [`VersionData`] | Deserializable input for building a [`Version`] |

mod patch;
mod version;

pub use patch::{ContentRange, Patch, PatchData};
pub use version::{Version, VersionData, DEFAULT_CONTENT_TYPE};
