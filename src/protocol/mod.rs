//! Protocol layer: packet model, handshake parsing, and the event codec.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `packet` | Framing/messaging packet enums and wire constants |
//! | `handshake` | Bootstrap and open-packet parsing |
//! | `event` | Event model and JSON codec |
//! | `registry` | Per-event-name argument type registry |

// ============================================================================
// Submodules
// ============================================================================

/// Framing/messaging packet enums and wire constants.
pub mod packet;

/// Bootstrap and open-packet parsing.
pub mod handshake;

/// Event model and JSON codec.
pub mod event;

/// Per-event-name argument type registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ArgumentValue, Event, Payload};
pub use handshake::ConnectionInfo;
pub use packet::{FramingKind, FramingPacket, MessagingKind};
pub use registry::{TypeRegistry, TypedValue};
