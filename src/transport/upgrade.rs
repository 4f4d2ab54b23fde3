//! Manual WebSocket upgrade handshake for the direct-duplex connect path.
//!
//! The poll-then-upgrade path lets the WebSocket library drive the upgrade;
//! the direct path performs it by hand so the accept hash can be verified
//! explicitly: a random 16-byte key is base64-encoded into
//! `Sec-Websocket-Key`, and the response's `Sec-Websocket-Accept` must
//! equal `base64(SHA-1(key + GUID))` with the GUID fixed by RFC 6455.

// ============================================================================
// Imports
// ============================================================================

use base64::prelude::*;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::{Position, Url};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::duplex::WsStream;

// ============================================================================
// Constants
// ============================================================================

/// Protocol-upgrade GUID from RFC 6455 section 1.3.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the upgrade response head; anything larger is hostile.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

// ============================================================================
// Key / Accept Computation
// ============================================================================

/// Generates a random websocket key and the accept value the server must
/// answer with.
pub(crate) fn websocket_key_and_accept() -> (String, String) {
    let key = BASE64_STANDARD.encode(Uuid::new_v4().into_bytes());
    let accept = expected_accept(&key);
    (key, accept)
}

/// Computes `base64(SHA-1(key + GUID))` for a given key.
pub(crate) fn expected_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

// ============================================================================
// Upgrade Exchange
// ============================================================================

/// Response head of the upgrade request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct UpgradeResponse {
    pub status: u16,
    pub accept: Option<String>,
}

/// Performs the upgrade handshake and returns a client-role WebSocket over
/// the raw TCP stream.
///
/// Only `ws://` endpoints are supported on this path.
pub(crate) async fn connect_direct(url: &Url) -> Result<WsStream> {
    if url.scheme() != "ws" {
        return Err(Error::config(format!(
            "direct upgrade supports ws:// endpoints only, got {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::config("endpoint URL has no host"))?;
    let port = url.port_or_known_default().unwrap_or(80);
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut stream = TcpStream::connect((host, port)).await?;

    let (key, expected) = websocket_key_and_accept();
    let target = &url[Position::BeforePath..];
    let request = format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-Websocket-Version: 13\r\n\
         Sec-Websocket-Key: {key}\r\n\
         Sec-Websocket-Extensions: permessage-deflate; client_max_window_bits\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let head = read_response_head(&mut stream).await?;
    let response = parse_upgrade_response(&head)?;

    if response.status != 101 {
        return Err(Error::handshake_rejected(format!(
            "expected status 101, got {}",
            response.status
        )));
    }
    if response.accept.as_deref() != Some(expected.as_str()) {
        return Err(Error::handshake_rejected(
            "Sec-Websocket-Accept does not match the computed hash",
        ));
    }

    debug!(%url, "direct websocket upgrade accepted");

    Ok(WebSocketStream::from_raw_socket(MaybeTlsStream::Plain(stream), Role::Client, None).await)
}

/// Reads the response head byte-by-byte up to the blank line, so no bytes
/// of the first WebSocket frame are consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::handshake_rejected("oversized upgrade response head"));
        }
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }
    Ok(head)
}

/// Parses the status code and `Sec-Websocket-Accept` header out of a
/// response head.
pub(crate) fn parse_upgrade_response(head: &[u8]) -> Result<UpgradeResponse> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::handshake_rejected("upgrade response head is not valid UTF-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| Error::handshake_rejected("empty upgrade response"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            Error::handshake_rejected(format!("malformed status line: {status_line:?}"))
        })?;

    let mut accept = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-accept") {
                accept = Some(value.trim().to_string());
            }
        }
    }

    Ok(UpgradeResponse { status, accept })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_accept_rfc6455_vector() {
        // Worked example from RFC 6455 section 1.3.
        assert_eq!(
            expected_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_key_is_16_random_bytes_base64() {
        let (key, accept) = websocket_key_and_accept();
        let decoded = BASE64_STANDARD.decode(&key).expect("valid base64");
        assert_eq!(decoded.len(), 16);
        assert_eq!(accept, expected_accept(&key));
    }

    #[test]
    fn test_parse_upgrade_response_success() {
        let head = b"HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
                     \r\n";
        let response = parse_upgrade_response(head).unwrap();
        assert_eq!(response.status, 101);
        assert_eq!(
            response.accept.as_deref(),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn test_parse_upgrade_response_header_name_case_insensitive() {
        let head = b"HTTP/1.1 101 Switching Protocols\r\n\
                     sec-websocket-accept: abc=\r\n\
                     \r\n";
        let response = parse_upgrade_response(head).unwrap();
        assert_eq!(response.accept.as_deref(), Some("abc="));
    }

    #[test]
    fn test_parse_upgrade_response_non_switching_status() {
        let head = b"HTTP/1.1 400 Bad Request\r\n\r\n";
        let response = parse_upgrade_response(head).unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.accept, None);
    }

    #[test]
    fn test_parse_upgrade_response_malformed_status_line() {
        let err = parse_upgrade_response(b"nonsense\r\n\r\n").unwrap_err();
        assert!(err.is_handshake_rejected());
    }
}
