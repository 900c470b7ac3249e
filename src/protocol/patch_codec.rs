//! Length-delimited patch framing.
//!
//! Each patch is a small header block followed by exactly `Content-Length`
//! bytes of content and one line terminator. Multiple patches are written
//! back-to-back with no separator beyond the framing itself:
//!
//! ```text
//! Content-Length: 28\r\n
//! Content-Type: application/json\r\n
//! \r\n
//! {"type":"title","value":"x"}\r\n
//! Content-Length: 7\r\n
//! Content-Range: json .title\r\n
//! \r\n
//! "Hello"\r\n
//! ```
//!
//! The decoder works on a complete buffer. Callers collect the whole request
//! body first; there is no partial-frame API.
//!
//! # Examples
//!
//! ```
//! use braid_axum_server::protocol::{parse_all, serialize_all};
//! use braid_axum_server::Patch;
//!
//! let patches = vec![
//!     Patch::typed("application/json", r#"{"a":1}"#),
//!     Patch::ranged("json", ".b", "2"),
//! ];
//! let wire = serialize_all(&patches);
//! assert_eq!(parse_all(&wire, 2).unwrap(), patches);
//! ```

use crate::error::{BraidError, Result};
use crate::protocol::constants::CRLF;
use crate::protocol::headers::parse_content_range;
use crate::types::Patch;
use bytes::{BufMut, Bytes, BytesMut};

/// Parse every patch in `buffer`, requiring exactly `expected_count` of them.
///
/// Blank lines between frames are tolerated. Both `\r\n` and bare `\n` line
/// terminators are accepted.
///
/// # Errors
///
/// - [`BraidError::Framing`] if a non-empty remainder has no header/body
///   boundary, a patch lacks a valid `Content-Length`, a header line is
///   malformed, or the declared content runs past the end of the buffer.
/// - [`BraidError::MissingContentDescriptor`] if a patch has neither
///   `Content-Type` nor `Content-Range`.
/// - [`BraidError::CountMismatch`] if the number of parsed patches differs
///   from `expected_count`.
pub fn parse_all(buffer: &Bytes, expected_count: usize) -> Result<Vec<Patch>> {
    // The declared count is client input; grow only with parsed frames
    let mut patches = Vec::new();
    let mut offset = skip_line_terminators(buffer, 0);

    while offset < buffer.len() {
        let (patch, next) = parse_one(buffer, offset)?;
        patches.push(patch);
        offset = skip_line_terminators(buffer, next);
    }

    if patches.len() != expected_count {
        return Err(BraidError::CountMismatch {
            expected: expected_count,
            actual: patches.len(),
        });
    }

    Ok(patches)
}

/// Parse the frame starting at `start`, returning it with the offset just past it.
fn parse_one(buffer: &Bytes, start: usize) -> Result<(Patch, usize)> {
    let (headers_end, content_start) = find_header_end(&buffer[start..])
        .map(|(end, body)| (start + end, start + body))
        .ok_or_else(|| {
            BraidError::Framing(format!(
                "Could not find end of patch headers after byte {}",
                start
            ))
        })?;

    let header_block = std::str::from_utf8(&buffer[start..headers_end])?;

    let mut content_length = None;
    let mut content_type = None;
    let mut content_range = None;

    for line in header_block.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            BraidError::Framing(format!("Malformed patch header line: '{}'", line))
        })?;
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("content-length") {
            let len = value.parse::<usize>().map_err(|_| {
                BraidError::Framing(format!("Invalid Content-Length in patch: '{}'", value))
            })?;
            content_length = Some(len);
        } else if name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-range") {
            let range = parse_content_range(value)
                .map_err(|e| BraidError::Framing(e.to_string()))?;
            content_range = Some(range);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        BraidError::Framing("No 'Content-Length' header found in patch".to_string())
    })?;

    let content_end = content_start + content_length;
    if content_end > buffer.len() {
        return Err(BraidError::Framing(format!(
            "Patch content truncated: declared {} bytes, {} available",
            content_length,
            buffer.len() - content_start
        )));
    }

    // A declared length that swallowed the CR of the trailing CRLF.
    let value_end = if content_end > content_start
        && buffer[content_end - 1] == b'\r'
        && buffer.get(content_end) == Some(&b'\n')
    {
        content_end - 1
    } else {
        content_end
    };

    let patch = Patch::new(
        buffer.slice(content_start..value_end),
        content_type,
        content_range,
    )?;

    Ok((patch, skip_one_line_terminator(buffer, content_end)))
}

/// Locate the first blank line in `buf`.
///
/// Returns the end of the header block and the start of the content.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    (0..buf.len()).find_map(|i| blank_line_at(buf, i).map(|end| (i, end)))
}

/// Match two consecutive line terminators (`\r\n` or `\n`) at `i`.
fn blank_line_at(buf: &[u8], i: usize) -> Option<usize> {
    let mut j = i;
    for _ in 0..2 {
        if buf.get(j) == Some(&b'\r') {
            j += 1;
        }
        if buf.get(j) != Some(&b'\n') {
            return None;
        }
        j += 1;
    }
    Some(j)
}

fn skip_one_line_terminator(buf: &[u8], offset: usize) -> usize {
    if buf[offset..].starts_with(b"\r\n") {
        offset + 2
    } else if buf[offset..].starts_with(b"\n") {
        offset + 1
    } else {
        offset
    }
}

fn skip_line_terminators(buf: &[u8], mut offset: usize) -> usize {
    while offset < buf.len() && (buf[offset] == b'\r' || buf[offset] == b'\n') {
        offset += 1;
    }
    offset
}

/// Serialize one patch: header block, blank line, content, line terminator.
///
/// Headers are written in a fixed order: `Content-Length`, then
/// `Content-Type` and `Content-Range` when set.
pub fn serialize_patch(patch: &Patch) -> Bytes {
    let mut buffer = BytesMut::new();
    write_patch(&mut buffer, patch);
    buffer.freeze()
}

/// Serialize patches back-to-back.
pub fn serialize_all(patches: &[Patch]) -> Bytes {
    let mut buffer = BytesMut::new();
    for patch in patches {
        write_patch(&mut buffer, patch);
    }
    buffer.freeze()
}

pub(crate) fn write_patch(buffer: &mut BytesMut, patch: &Patch) {
    write_header(buffer, "Content-Length", &patch.content().len().to_string());
    if let Some(content_type) = patch.content_type() {
        write_header(buffer, "Content-Type", content_type);
    }
    if let Some(range) = patch.content_range() {
        write_header(buffer, "Content-Range", &range.to_string());
    }
    buffer.put_slice(CRLF.as_bytes());
    buffer.put_slice(patch.content());
    buffer.put_slice(CRLF.as_bytes());
}

pub(crate) fn write_header(buffer: &mut BytesMut, key: &str, value: &str) {
    buffer.put_slice(key.as_bytes());
    buffer.put_slice(b": ");
    buffer.put_slice(value.as_bytes());
    buffer.put_slice(CRLF.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_parse_single_typed_patch() {
        let body = bytes(
            "Content-Length: 28\r\nContent-Type: application/json\r\n\r\n{\"type\":\"title\",\"value\":\"x\"}\r\n",
        );
        let patches = parse_all(&body, 1).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].content_str(), Some(r#"{"type":"title","value":"x"}"#));
        assert_eq!(patches[0].content_type(), Some("application/json"));
        assert!(patches[0].content_range().is_none());
    }

    #[test]
    fn test_declared_length_including_carriage_return() {
        let body = bytes(
            "Content-Length: 29\r\nContent-Type: application/json\r\n\r\n{\"type\":\"title\",\"value\":\"x\"}\r\n",
        );
        let patches = parse_all(&body, 1).unwrap();
        assert_eq!(patches[0].content_str(), Some(r#"{"type":"title","value":"x"}"#));
    }

    #[test]
    fn test_content_ending_in_carriage_return_round_trips() {
        let patch = Patch::typed("text/plain", "line\r");
        assert_eq!(parse_all(&serialize_patch(&patch), 1).unwrap()[0], patch);
    }

    #[test]
    fn test_parse_multiple_patches() {
        let body = bytes(concat!(
            "Content-Length: 7\r\n",
            "Content-Range: json .name\r\n",
            "\r\n",
            "\"Alice\"\r\n",
            "Content-Length: 2\r\n",
            "Content-Range: json .age\r\n",
            "\r\n",
            "30\r\n",
        ));
        let patches = parse_all(&body, 2).unwrap();
        assert_eq!(patches[0].content_range().unwrap().range, ".name");
        assert_eq!(patches[0].content(), &Bytes::from("\"Alice\""));
        assert_eq!(patches[1].content_range().unwrap().range, ".age");
        assert_eq!(patches[1].content(), &Bytes::from("30"));
    }

    #[test]
    fn test_content_may_contain_blank_lines() {
        let body = bytes("Content-Length: 6\r\nContent-Type: text/plain\r\n\r\na\r\n\r\nb\r\n");
        let patches = parse_all(&body, 1).unwrap();
        assert_eq!(patches[0].content_str(), Some("a\r\n\r\nb"));
    }

    #[test]
    fn test_lf_only_framing() {
        let body = bytes("Content-Length: 2\nContent-Range: json .a\n\n42\n");
        let patches = parse_all(&body, 1).unwrap();
        assert_eq!(patches[0].content_str(), Some("42"));
    }

    #[test]
    fn test_header_names_case_insensitive() {
        let body = bytes("content-length: 1\r\ncontent-type: text/plain\r\n\r\nx\r\n");
        let patches = parse_all(&body, 1).unwrap();
        assert_eq!(patches[0].content_type(), Some("text/plain"));
    }

    #[test]
    fn test_blank_lines_between_frames() {
        let body = bytes(
            "Content-Length: 1\r\nContent-Type: a\r\n\r\nx\r\n\r\n\r\nContent-Length: 1\r\nContent-Type: b\r\n\r\ny",
        );
        let patches = parse_all(&body, 2).unwrap();
        assert_eq!(patches[1].content_str(), Some("y"));
    }

    #[test]
    fn test_empty_buffer_zero_patches() {
        assert!(parse_all(&Bytes::new(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_no_boundary_is_framing_error() {
        let body = bytes("Content-Length: 5\r\nContent-Type: text/plain\r\nhello");
        assert!(matches!(parse_all(&body, 1), Err(BraidError::Framing(_))));
    }

    #[test]
    fn test_missing_content_length_is_framing_error() {
        let body = bytes("Content-Type: text/plain\r\n\r\nhello\r\n");
        assert!(matches!(parse_all(&body, 1), Err(BraidError::Framing(_))));
    }

    #[test]
    fn test_invalid_content_length_is_framing_error() {
        let body = bytes("Content-Length: five\r\nContent-Type: text/plain\r\n\r\nhello\r\n");
        assert!(matches!(parse_all(&body, 1), Err(BraidError::Framing(_))));
    }

    #[test]
    fn test_truncated_content_is_framing_error() {
        let body = bytes("Content-Length: 50\r\nContent-Type: text/plain\r\n\r\nshort");
        assert!(matches!(parse_all(&body, 1), Err(BraidError::Framing(_))));
    }

    #[test]
    fn test_missing_descriptor() {
        let body = bytes("Content-Length: 5\r\n\r\nhello\r\n");
        assert!(matches!(
            parse_all(&body, 1),
            Err(BraidError::MissingContentDescriptor)
        ));
    }

    #[test]
    fn test_count_mismatch() {
        let body = bytes("Content-Length: 1\r\nContent-Type: a\r\n\r\nx\r\n");
        match parse_all(&body, 2) {
            Err(BraidError::CountMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected count mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_serialize_header_order() {
        let patch = Patch::ranged("json", ".title", "\"x\"").with_content_type("application/json");
        let wire = serialize_patch(&patch);
        assert_eq!(
            wire,
            Bytes::from(
                "Content-Length: 3\r\nContent-Type: application/json\r\nContent-Range: json .title\r\n\r\n\"x\"\r\n"
            )
        );
    }

    #[test]
    fn test_round_trip_mixed_descriptors() {
        let patches = vec![
            Patch::typed("application/json", "{\"data\": 100}"),
            Patch::ranged("json", ".latest_change", "{}"),
            Patch::ranged("json", ".a b", "").with_content_type("text/plain"),
        ];
        let wire = serialize_all(&patches);
        assert_eq!(parse_all(&wire, patches.len()).unwrap(), patches);
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let patch = Patch::typed("text/plain", "héllo");
        let wire = serialize_patch(&patch);
        assert!(wire.starts_with(b"Content-Length: 6\r\n"));
        assert_eq!(parse_all(&wire, 1).unwrap()[0], patch);
    }

    #[test]
    fn test_huge_declared_count_is_a_mismatch() {
        let body = bytes("Content-Length: 1\r\nContent-Type: a\r\n\r\nx\r\n");
        assert!(matches!(
            parse_all(&body, 100_000_000_000_000),
            Err(BraidError::CountMismatch { expected: 100_000_000_000_000, actual: 1 })
        ));
        assert!(matches!(
            parse_all(&Bytes::new(), usize::MAX),
            Err(BraidError::CountMismatch { actual: 0, .. })
        ));
    }
}
