//! Error types for the Socket.IO client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socketio_client::{Result, SocketIoClient};
//!
//! async fn example(client: &SocketIoClient) -> Result<()> {
//!     client.connect().await?;
//!     client.emit("chat", "hi")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::HandshakeRejected`], [`Error::Timeout`] |
//! | Protocol | [`Error::Parse`], [`Error::Protocol`] |
//! | Connection | [`Error::NotConnected`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Transport`], [`Error::Http`], [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every variant is fatal to the operation that observed it: parse and
/// protocol errors end the connection attempt or the current message, and
/// nothing is retried internally. Retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid client configuration or endpoint URL.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The server rejected the connection handshake.
    ///
    /// Covers a non-2xx bootstrap response, a missing `websocket` upgrade
    /// capability, a non-101 status on the direct upgrade request, and a
    /// `Sec-WebSocket-Accept` value that does not match the computed hash.
    #[error("Handshake rejected: {message}")]
    HandshakeRejected {
        /// Description of the rejection.
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed bootstrap, open, or event payload.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the structural violation.
        message: String,
    },

    /// Unexpected packet kind or value for the current connection state.
    #[error("Protocol violation: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation requires an established connection.
    #[error("Not connected")]
    NotConnected,

    /// The connection closed while the operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// Transport-level WebSocket error.
    #[error("Transport error: {0}")]
    Transport(#[from] WsError),

    /// Bootstrap HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake rejection error.
    #[inline]
    pub fn handshake_rejected(message: impl Into<String>) -> Self {
        Self::HandshakeRejected {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a parse error.
    #[inline]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a protocol violation error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a parse error.
    #[inline]
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Returns `true` if this is a protocol violation.
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if the server rejected the handshake.
    #[inline]
    #[must_use]
    pub fn is_handshake_rejected(&self) -> bool {
        matches!(self, Self::HandshakeRejected { .. })
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::Transport(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::handshake_rejected("upgrade list has no websocket entry");
        assert_eq!(
            err.to_string(),
            "Handshake rejected: upgrade list has no websocket entry"
        );
    }

    #[test]
    fn test_parse_error() {
        let err = Error::parse("unterminated string");
        assert_eq!(err.to_string(), "Parse error: unterminated string");
        assert!(err.is_parse());
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn test_is_handshake_rejected() {
        let rejected = Error::handshake_rejected("status 502");
        let other = Error::protocol("unexpected packet");

        assert!(rejected.is_handshake_rejected());
        assert!(!other.is_handshake_rejected());
        assert!(other.is_protocol_violation());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("bad url").is_connection_error());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("connect", 30_000);
        assert_eq!(err.to_string(), "Timeout after 30000ms: connect");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "no route");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
