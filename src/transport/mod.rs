//! Duplex transport layer.
//!
//! The protocol engine talks to the wire through two narrow seams: a
//! frame-oriented reader/writer pair ([`TransportReader`]/
//! [`TransportWriter`], implemented over split tokio-tungstenite halves)
//! and the chunked message stream built on top of them.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `duplex` | Transport traits and WebSocket adapters |
//! | `stream` | Chunked message reader/writer |
//! | `upgrade` | Manual upgrade handshake for the direct connect path |

// ============================================================================
// Submodules
// ============================================================================

/// Transport traits and WebSocket adapters.
pub mod duplex;

/// Chunked message reader/writer.
pub mod stream;

/// Manual upgrade handshake for the direct connect path.
pub(crate) mod upgrade;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use duplex::{FrameRead, TransportReader, TransportWriter, WsReader, WsStream, WsWriter};
pub use stream::{MessageReader, MessageWrite, MessageWriter, DEFAULT_CHUNK_SIZE};
