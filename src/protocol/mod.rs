//! Protocol-level utilities for Braid-HTTP.
//!
//! - [`constants`] - header names, status codes and capability values
//! - [`headers`] - parsing and formatting of individual header values
//! - [`patch_codec`] - length-delimited patch framing
//! - [`version_codec`] - version wire form and request decoding

pub mod constants;
pub mod headers;
pub mod patch_codec;
pub mod version_codec;

pub use headers::*;
pub use patch_codec::{parse_all, serialize_all, serialize_patch};
pub use version_codec::{content, is_valid_json, parse_request_version, serialize_version};
