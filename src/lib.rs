//! Asynchronous Socket.IO client over WebSocket.
//!
//! Connects to a Socket.IO server, exchanges named JSON events over a
//! single WebSocket connection, and keeps the session alive with
//! framing-level pings. Two bootstrap paths are supported: the standard
//! poll-then-upgrade sequence, and a direct WebSocket connection that
//! skips the polling round trip.
//!
//! # Architecture
//!
//! | Layer | Module | Description |
//! |-------|--------|-------------|
//! | Client | [`client`] | Connection lifecycle, emit/receive, handlers |
//! | Protocol | [`protocol`] | Packet model, handshake parsing, event codec |
//! | Transport | [`transport`] | Duplex frame seam, chunked message stream |
//! | Errors | [`error`] | Error type shared by every layer |
//!
//! Outgoing traffic is serialized through a FIFO queue drained by a send
//! task that owns the write half; a receive task owns the read half and
//! dispatches decoded events. Large messages are streamed out in fixed
//! size frames instead of being buffered whole.
//!
//! # Quick start
//!
//! ```no_run
//! use socketio_client::{ClientOptions, SocketIoClient};
//!
//! #[tokio::main]
//! async fn main() -> socketio_client::Result<()> {
//!     let client = SocketIoClient::new("http://localhost:3000/", ClientOptions::default())?;
//!     client.on_event(|event| {
//!         println!("{} {:?}", event.name(), event.arguments());
//!     });
//!
//!     client.connect().await?;
//!     client.emit("chat", serde_json::json!({ "text": "hello" }))?;
//!     client.close().await
//! }
//! ```
//!
//! # Typed events
//!
//! Registering a type against an event name makes incoming arguments of
//! that event decode into the type instead of raw JSON:
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use socketio_client::{ClientOptions, SocketIoClient};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct ChatMessage {
//!     sender: String,
//!     text: String,
//! }
//!
//! # fn run() -> socketio_client::Result<()> {
//! let client = SocketIoClient::new("http://localhost:3000/", ClientOptions::default())?;
//! client.register_event_type::<ChatMessage>("chat");
//! client.on_event(|event| {
//!     if let Some(message) = event.argument().and_then(|a| a.downcast_ref::<ChatMessage>()) {
//!         println!("{}: {}", message.sender, message.text);
//!     }
//! });
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

/// Connection engine and public client surface.
pub mod client;

/// Error types shared by every layer.
pub mod error;

/// Packet model, handshake parsing, and the event codec.
pub mod protocol;

/// Duplex transport seam and chunked message stream.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{
    ClientOptions, ConnectedHandler, ConnectionState, ErrorHandler, EventHandler, SocketIoClient,
};
pub use error::{Error, Result};
pub use protocol::{ArgumentValue, ConnectionInfo, Event, Payload, TypeRegistry, TypedValue};
