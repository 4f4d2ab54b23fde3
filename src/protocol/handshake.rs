//! Bootstrap and open-packet parsing.
//!
//! The polling bootstrap response is a sequence of length-prefixed records
//! (`<decimal-length>:<payload>`); the first record is the framing open
//! packet carrying the session JSON, and an optional second record must be
//! the messaging connect acknowledgement (`40`). The direct-duplex path
//! receives the same open packet as the first WebSocket message, without
//! record framing.
//!
//! The session JSON is scanned directly on the byte slice — a quoted-string
//! scanner, a string-array scanner, and a decimal scanner, each reporting
//! how many bytes it consumed so the caller advances a cursor without
//! copying. The record's declared length is validated as a decimal but the
//! open record itself is parsed structurally; servers in the wild disagree
//! with their own length arithmetic, and the object's closing brace is
//! authoritative.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::packet::wire;

// ============================================================================
// ConnectionInfo
// ============================================================================

/// Session parameters produced once from the bootstrap/open payload.
///
/// Immutable for the life of one connection; the engine uses
/// `ping_interval` to arm the keepalive timer and `upgrades` to validate
/// upgrade capability. Keys missing from the payload leave their field at
/// the zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Server-assigned session id (`sid`).
    pub socket_id: String,
    /// Transports the session may upgrade to.
    pub upgrades: Vec<String>,
    /// Keepalive ping period.
    pub ping_interval: Duration,
    /// Server-side pong deadline.
    pub ping_timeout: Duration,
}

impl ConnectionInfo {
    /// Whether the session advertises the websocket upgrade
    /// (case-insensitive).
    #[must_use]
    pub fn supports_websocket(&self) -> bool {
        self.upgrades
            .iter()
            .any(|u| u.eq_ignore_ascii_case("websocket"))
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parses the polling bootstrap response body.
///
/// Accepts an open record alone, or an open record followed by exactly the
/// 2-byte connect acknowledgement record `2:40`. Anything else trailing the
/// open record is fatal.
pub fn parse_bootstrap_payload(content: &[u8]) -> Result<ConnectionInfo> {
    let (_declared, consumed) = scan_decimal(content)?;
    if byte_at(content, consumed)? != b':' {
        return Err(Error::parse("missing ':' after record length"));
    }
    let content = &content[consumed + 1..];

    let (info, record_len) = parse_open_payload(content)?;
    let rest = &content[record_len..];
    if rest.is_empty() {
        return Ok(info);
    }

    let (length, consumed) = scan_decimal(rest)?;
    if length != 2 {
        return Err(Error::parse(format!(
            "trailing record must have length 2, got {length}"
        )));
    }
    if byte_at(rest, consumed)? != b':' {
        return Err(Error::parse("missing ':' after record length"));
    }
    let ack = &rest[consumed + 1..];
    if ack != wire::CONNECT_ACK {
        return Err(Error::parse(
            "trailing record is not the connect acknowledgement",
        ));
    }
    Ok(info)
}

/// Parses the open packet received as the first message on the direct
/// duplex path (no record framing).
pub fn parse_open_frame(content: &[u8]) -> Result<ConnectionInfo> {
    let (info, consumed) = parse_open_payload(content)?;
    if consumed != content.len() {
        return Err(Error::parse("trailing bytes after open packet"));
    }
    Ok(info)
}

// ============================================================================
// Open Payload
// ============================================================================

/// Parses `0{...}` and reports how many bytes the packet occupied.
fn parse_open_payload(content: &[u8]) -> Result<(ConnectionInfo, usize)> {
    if byte_at(content, 0)? != wire::OPEN {
        return Err(Error::parse("open packet must start with the open marker"));
    }
    if byte_at(content, 1)? != b'{' {
        return Err(Error::parse("open packet payload must be a JSON object"));
    }

    let mut info = ConnectionInfo::default();
    let mut cursor = 2;

    loop {
        if byte_at(content, cursor)? == b'}' {
            cursor += 1;
            break;
        }

        let (key, consumed) = scan_quoted_string(&content[cursor..])?;
        cursor += consumed;
        if byte_at(content, cursor)? != b':' {
            return Err(Error::parse("missing ':' after object key"));
        }
        cursor += 1;

        let consumed = if key.eq_ignore_ascii_case("sid") {
            let (socket_id, consumed) = scan_quoted_string(&content[cursor..])?;
            info.socket_id = socket_id;
            consumed
        } else if key.eq_ignore_ascii_case("upgrades") {
            let (upgrades, consumed) = scan_string_array(&content[cursor..])?;
            info.upgrades = upgrades;
            consumed
        } else if key.eq_ignore_ascii_case("pingInterval") {
            let (millis, consumed) = scan_decimal(&content[cursor..])?;
            info.ping_interval = Duration::from_millis(millis);
            consumed
        } else if key.eq_ignore_ascii_case("pingTimeout") {
            let (millis, consumed) = scan_decimal(&content[cursor..])?;
            info.ping_timeout = Duration::from_millis(millis);
            consumed
        } else {
            return Err(Error::parse(format!("unknown handshake key {key:?}")));
        };
        cursor += consumed;

        match byte_at(content, cursor)? {
            b',' => cursor += 1,
            b'}' => {
                cursor += 1;
                break;
            }
            other => {
                return Err(Error::parse(format!(
                    "expected ',' or '}}' after value, got {:?}",
                    other as char
                )))
            }
        }
    }

    Ok((info, cursor))
}

// ============================================================================
// Sub-parsers
// ============================================================================

#[inline]
fn byte_at(content: &[u8], index: usize) -> Result<u8> {
    content
        .get(index)
        .copied()
        .ok_or_else(|| Error::parse("truncated payload"))
}

/// Scans a quoted string, returning the content and bytes consumed
/// (including both quotes). Escaped quotes do not terminate the string.
fn scan_quoted_string(source: &[u8]) -> Result<(String, usize)> {
    if byte_at(source, 0)? != b'"' {
        return Err(Error::parse("expected '\"'"));
    }

    let mut escaped = false;
    for (index, &byte) in source.iter().enumerate().skip(1) {
        if escaped {
            escaped = false;
        } else if byte == b'\\' {
            escaped = true;
        } else if byte == b'"' {
            let value = String::from_utf8(source[1..index].to_vec())
                .map_err(|_| Error::parse("string is not valid UTF-8"))?;
            return Ok((value, index + 1));
        }
    }
    Err(Error::parse("unterminated string"))
}

/// Scans a JSON array of strings, returning the items and bytes consumed
/// (including both brackets).
fn scan_string_array(source: &[u8]) -> Result<(Vec<String>, usize)> {
    if byte_at(source, 0)? != b'[' {
        return Err(Error::parse("expected '['"));
    }

    let mut items = Vec::new();
    let mut cursor = 1;
    if byte_at(source, cursor)? == b']' {
        return Ok((items, 2));
    }

    loop {
        let (item, consumed) = scan_quoted_string(&source[cursor..])?;
        items.push(item);
        cursor += consumed;

        match byte_at(source, cursor)? {
            b',' => cursor += 1,
            b']' => return Ok((items, cursor + 1)),
            other => {
                return Err(Error::parse(format!(
                    "expected ',' or ']' in array, got {:?}",
                    other as char
                )))
            }
        }
    }
}

/// Scans an unsigned decimal integer, returning the value and digits
/// consumed.
fn scan_decimal(source: &[u8]) -> Result<(u64, usize)> {
    let digits = source
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(Error::parse("expected a decimal integer"));
    }

    let mut value: u64 = 0;
    for &byte in &source[..digits] {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| Error::parse("decimal integer overflow"))?;
    }
    Ok((value, digits))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN_RECORD: &str =
        "0{\"sid\":\"abc123\",\"upgrades\":[\"websocket\"],\"pingInterval\":25000,\"pingTimeout\":5000}";

    fn expected_info() -> ConnectionInfo {
        ConnectionInfo {
            socket_id: "abc123".into(),
            upgrades: vec!["websocket".into()],
            ping_interval: Duration::from_millis(25000),
            ping_timeout: Duration::from_millis(5000),
        }
    }

    #[test]
    fn test_bootstrap_with_connect_ack() {
        let payload = format!("97:{OPEN_RECORD}2:40");
        let info = parse_bootstrap_payload(payload.as_bytes()).unwrap();
        assert_eq!(info, expected_info());
    }

    #[test]
    fn test_bootstrap_open_record_only() {
        let payload = format!("97:{OPEN_RECORD}");
        let info = parse_bootstrap_payload(payload.as_bytes()).unwrap();
        assert_eq!(info, expected_info());
    }

    #[test]
    fn test_bootstrap_rejects_wrong_ack_value() {
        let payload = format!("97:{OPEN_RECORD}2:41");
        let err = parse_bootstrap_payload(payload.as_bytes()).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_bootstrap_rejects_wrong_ack_length() {
        let payload = format!("97:{OPEN_RECORD}3:400");
        let err = parse_bootstrap_payload(payload.as_bytes()).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_bootstrap_rejects_non_numeric_length() {
        let err = parse_bootstrap_payload(b"ab:0{}").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_open_frame() {
        let info = parse_open_frame(OPEN_RECORD.as_bytes()).unwrap();
        assert_eq!(info, expected_info());
    }

    #[test]
    fn test_open_frame_rejects_wrong_marker() {
        let err = parse_open_frame(b"4{\"sid\":\"x\"}").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_open_frame_rejects_trailing_bytes() {
        let err = parse_open_frame(b"0{\"sid\":\"x\"}garbage").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_missing_keys_leave_zero_values() {
        let info = parse_open_frame(b"0{\"sid\":\"only\"}").unwrap();
        assert_eq!(info.socket_id, "only");
        assert!(info.upgrades.is_empty());
        assert_eq!(info.ping_interval, Duration::ZERO);
        assert_eq!(info.ping_timeout, Duration::ZERO);
    }

    #[test]
    fn test_unknown_key_is_fatal() {
        let err = parse_open_frame(b"0{\"sid\":\"x\",\"maxPayload\":100}").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let info = parse_open_frame(b"0{\"SID\":\"x\",\"PINGINTERVAL\":10}").unwrap();
        assert_eq!(info.socket_id, "x");
        assert_eq!(info.ping_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_supports_websocket_case_insensitive() {
        let mut info = ConnectionInfo {
            upgrades: vec!["WebSocket".into()],
            ..ConnectionInfo::default()
        };
        assert!(info.supports_websocket());

        info.upgrades = vec!["polling".into()];
        assert!(!info.supports_websocket());

        info.upgrades.clear();
        assert!(!info.supports_websocket());
    }

    #[test]
    fn test_scan_quoted_string() {
        let (value, consumed) = scan_quoted_string(b"\"abc\",rest").unwrap();
        assert_eq!(value, "abc");
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_scan_quoted_string_skips_escaped_quote() {
        let (value, consumed) = scan_quoted_string(br#""a\"b""#).unwrap();
        assert_eq!(value, r#"a\"b"#);
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_scan_quoted_string_unterminated() {
        assert!(scan_quoted_string(b"\"abc").unwrap_err().is_parse());
    }

    #[test]
    fn test_scan_string_array() {
        let (items, consumed) = scan_string_array(b"[\"a\",\"b\"]}").unwrap();
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(consumed, 9);

        let (items, consumed) = scan_string_array(b"[]").unwrap();
        assert!(items.is_empty());
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_scan_decimal() {
        let (value, consumed) = scan_decimal(b"25000,").unwrap();
        assert_eq!(value, 25000);
        assert_eq!(consumed, 5);

        assert!(scan_decimal(b"x1").unwrap_err().is_parse());
    }
}
