//! Framing-layer and messaging-layer packet model.
//!
//! The framing layer is the outer packet protocol (open/close/ping/pong/
//! message/upgrade/noop control packets); the messaging layer rides inside
//! framing `Message` packets. Both are closed enums with exhaustive
//! matching at every dispatch site.
//!
//! # Wire bytes
//!
//! | Framing | Byte | Messaging | Byte |
//! |---------|------|-----------|------|
//! | Open    | `0`  | Connect   | `0`  |
//! | Close   | `1`  | Disconnect| `1`  |
//! | Ping    | `2`  | Event     | `2`  |
//! | Pong    | `3`  | Ack       | `3`  |
//! | Message | `4`  | Error     | `4`  |
//! | Upgrade | `5`  | BinaryEvent | `5` |
//! | Noop    | `6`  | BinaryAck | `6`  |

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::transport::duplex::TransportReader;
use crate::transport::stream::MessageReader;

// ============================================================================
// Wire Constants
// ============================================================================

/// Raw wire byte values.
pub mod wire {
    /// Framing open packet.
    pub const OPEN: u8 = b'0';
    /// Framing close packet.
    pub const CLOSE: u8 = b'1';
    /// Framing ping packet.
    pub const PING: u8 = b'2';
    /// Framing pong packet.
    pub const PONG: u8 = b'3';
    /// Framing message packet.
    pub const MESSAGE: u8 = b'4';
    /// Framing upgrade packet.
    pub const UPGRADE: u8 = b'5';
    /// Framing noop packet.
    pub const NOOP: u8 = b'6';

    /// Probe payload carried by the probe ping/pong.
    pub const PROBE: &[u8; 5] = b"probe";
    /// Full ping-probe frame sent while probing the upgrade.
    pub const PING_PROBE: &[u8] = b"2probe";
    /// Messaging connect acknowledgement (`4` message + `0` connect).
    pub const CONNECT_ACK: &[u8; 2] = b"40";
    /// Messaging disconnect frame (`4` message + `1` disconnect).
    pub const CLOSE_MESSAGE: &[u8] = b"41";
    /// Prefix of a messaging event frame (`4` message + `2` event).
    pub const EVENT_PREFIX: &[u8] = b"42";
}

// ============================================================================
// FramingPacket
// ============================================================================

/// A framing-layer packet.
///
/// Only `Open` carries a payload here; a `Message` body is intentionally
/// not materialized — the reader delivers `Message` with the body left on
/// the stream so the caller can consume it incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingPacket {
    /// Session-open packet carrying the handshake JSON.
    Open(Vec<u8>),
    /// Connection close.
    Close,
    /// Keepalive ping.
    Ping,
    /// Keepalive pong.
    Pong,
    /// Upgrade-probe ping (`2probe`).
    PingProbe,
    /// Upgrade-probe pong (`3probe`).
    PongProbe,
    /// Carrier for one messaging-layer packet; body remains on the stream.
    Message,
    /// Upgrade finalization.
    Upgrade,
    /// Padding packet, ignored.
    Noop,
}

impl FramingPacket {
    /// Payload-free kind, for routing control flow by identity.
    #[must_use]
    pub fn kind(&self) -> FramingKind {
        match self {
            Self::Open(_) => FramingKind::Open,
            Self::Close => FramingKind::Close,
            Self::Ping => FramingKind::Ping,
            Self::Pong => FramingKind::Pong,
            Self::PingProbe => FramingKind::PingProbe,
            Self::PongProbe => FramingKind::PongProbe,
            Self::Message => FramingKind::Message,
            Self::Upgrade => FramingKind::Upgrade,
            Self::Noop => FramingKind::Noop,
        }
    }

    /// Complete wire form for control packets; `None` for the
    /// payload-carrying kinds.
    #[must_use]
    pub fn control_bytes(&self) -> Option<&'static [u8]> {
        match self {
            Self::Close => Some(&[wire::CLOSE]),
            Self::Ping => Some(&[wire::PING]),
            Self::Pong => Some(&[wire::PONG]),
            Self::PingProbe => Some(wire::PING_PROBE),
            Self::PongProbe => Some(b"3probe"),
            Self::Upgrade => Some(&[wire::UPGRADE]),
            Self::Noop => Some(&[wire::NOOP]),
            Self::Open(_) | Self::Message => None,
        }
    }
}

/// Payload-free framing packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramingKind {
    Open,
    Close,
    Ping,
    Pong,
    PingProbe,
    PongProbe,
    Message,
    Upgrade,
    Noop,
}

// ============================================================================
// MessagingKind
// ============================================================================

/// Messaging-layer packet kind (first byte after the framing `4`).
///
/// Only `Event` is handled in steady state; `Connect` appears solely in the
/// handshake acknowledgement. Observing any other kind is a protocol
/// violation, and the binary kinds are never supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagingKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
    BinaryEvent,
    BinaryAck,
}

impl MessagingKind {
    /// Decodes a messaging kind byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Connect),
            b'1' => Some(Self::Disconnect),
            b'2' => Some(Self::Event),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::Error),
            b'5' => Some(Self::BinaryEvent),
            b'6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    /// Wire byte of this kind.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Connect => b'0',
            Self::Disconnect => b'1',
            Self::Event => b'2',
            Self::Ack => b'3',
            Self::Error => b'4',
            Self::BinaryEvent => b'5',
            Self::BinaryAck => b'6',
        }
    }
}

// ============================================================================
// Framing Packet Read
// ============================================================================

/// Reads one framing packet in steady state.
///
/// Exactly one discriminator byte is consumed first. A `Pong` that ends the
/// message is a keepalive pong; otherwise the next five bytes must spell
/// `probe`. A `Message` is delivered with its body left unconsumed. Any
/// other discriminator is fatal. `Ok(None)` reports a transport-level
/// close, the read side's only normal exit.
pub async fn read_framing_packet<R: TransportReader>(
    reader: &mut MessageReader<R>,
) -> Result<Option<FramingPacket>> {
    let mut discriminator = [0u8; 1];
    let count = match reader.read(&mut discriminator).await? {
        None => return Ok(None),
        Some(count) => count,
    };
    if count == 0 {
        return Err(Error::protocol("empty frame"));
    }

    match discriminator[0] {
        wire::PONG => {
            if reader.at_message_end() {
                reader.expect_message_end().await?;
                return Ok(Some(FramingPacket::Pong));
            }
            let mut probe = [0u8; 5];
            reader.read_exact(&mut probe).await?;
            if probe != *wire::PROBE {
                return Err(Error::protocol("pong payload is not the probe literal"));
            }
            reader.expect_message_end().await?;
            Ok(Some(FramingPacket::PongProbe))
        }
        wire::MESSAGE => Ok(Some(FramingPacket::Message)),
        other => Err(Error::protocol(format!(
            "unexpected framing byte {:?}",
            other as char
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockReader;
    use crate::transport::stream::MessageReader;

    #[test]
    fn test_kind_is_identity_comparable() {
        assert_eq!(FramingPacket::Open(b"{}".to_vec()).kind(), FramingKind::Open);
        assert_eq!(FramingPacket::Message.kind(), FramingKind::Message);
        assert_ne!(FramingKind::Ping, FramingKind::Pong);
    }

    #[test]
    fn test_control_bytes() {
        assert_eq!(FramingPacket::Ping.control_bytes(), Some(b"2".as_slice()));
        assert_eq!(FramingPacket::Close.control_bytes(), Some(b"1".as_slice()));
        assert_eq!(
            FramingPacket::PingProbe.control_bytes(),
            Some(b"2probe".as_slice())
        );
        assert_eq!(FramingPacket::Message.control_bytes(), None);
        assert_eq!(FramingPacket::Open(Vec::new()).control_bytes(), None);
    }

    #[test]
    fn test_messaging_kind_round_trip() {
        for byte in b'0'..=b'6' {
            let kind = MessagingKind::from_byte(byte).expect("valid kind byte");
            assert_eq!(kind.byte(), byte);
        }
        assert_eq!(MessagingKind::from_byte(b'7'), None);
        assert_eq!(MessagingKind::from_byte(b'2'), Some(MessagingKind::Event));
    }

    #[tokio::test]
    async fn test_read_keepalive_pong() {
        let mut reader = MessageReader::new(MockReader::new([b"3".to_vec()]));
        let packet = read_framing_packet(&mut reader).await.unwrap();
        assert_eq!(packet, Some(FramingPacket::Pong));
    }

    #[tokio::test]
    async fn test_read_pong_probe() {
        let mut reader = MessageReader::new(MockReader::new([b"3probe".to_vec()]));
        let packet = read_framing_packet(&mut reader).await.unwrap();
        assert_eq!(packet, Some(FramingPacket::PongProbe));
    }

    #[tokio::test]
    async fn test_read_pong_with_wrong_payload_is_fatal() {
        let mut reader = MessageReader::new(MockReader::new([b"3probs".to_vec()]));
        let err = read_framing_packet(&mut reader).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_read_message_leaves_body_on_stream() {
        let mut reader = MessageReader::new(MockReader::new([b"42[\"x\"]".to_vec()]));
        let packet = read_framing_packet(&mut reader).await.unwrap();
        assert_eq!(packet, Some(FramingPacket::Message));

        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"2[\"x\"]");
    }

    #[tokio::test]
    async fn test_read_unexpected_byte_is_fatal() {
        let mut reader = MessageReader::new(MockReader::new([b"6".to_vec()]));
        let err = read_framing_packet(&mut reader).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_read_transport_close_is_none() {
        let mut reader = MessageReader::new(MockReader::new([]));
        let packet = read_framing_packet(&mut reader).await.unwrap();
        assert_eq!(packet, None);
    }
}
