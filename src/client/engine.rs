//! Send, receive, and keepalive loops.
//!
//! After the bootstrap the connection is driven by two independent loops.
//! The send loop owns the write half and drains a FIFO queue of outgoing
//! packets; everything that wants to write — emits, keepalive pings, the
//! disconnect — goes through the queue, so frames never interleave. The
//! receive loop owns the read half and turns framing packets into decoded
//! events. The keepalive timer is its own task that only queues pings.
//!
//! Disconnect is a queue sentinel: it closes the queue, writes the
//! messaging close frame after everything queued ahead of it, and hands the
//! writer back so the caller can close the transport.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::event::{decode_event, write_event, Event};
use crate::protocol::packet::{read_framing_packet, wire, FramingPacket, MessagingKind};
use crate::protocol::registry::TypeRegistry;
use crate::transport::duplex::{TransportReader, TransportWriter};
use crate::transport::stream::{MessageReader, MessageWriter};

// ============================================================================
// OutgoingPacket
// ============================================================================

/// One entry in the outgoing queue.
#[derive(Debug)]
pub(crate) enum OutgoingPacket {
    /// Keepalive ping frame.
    Ping,
    /// A messaging event to encode and send.
    Event(Event),
    /// Sentinel that ends the send loop after a close frame.
    Disconnect,
}

// ============================================================================
// Send Loop
// ============================================================================

/// Drains the outgoing queue until a `Disconnect` sentinel or until every
/// sender is gone, then returns the writer for transport shutdown.
///
/// On `Disconnect` the queue is closed first, so packets queued after the
/// sentinel are dropped rather than written to a closing connection.
pub(crate) async fn run_send_loop<W: TransportWriter>(
    mut writer: MessageWriter<W>,
    mut queue: mpsc::UnboundedReceiver<OutgoingPacket>,
) -> Result<MessageWriter<W>> {
    while let Some(packet) = queue.recv().await {
        match packet {
            OutgoingPacket::Ping => {
                trace!("sending keepalive ping");
                writer.send_control(&[wire::PING]).await?;
            }
            OutgoingPacket::Event(event) => {
                trace!(name = event.name(), "sending event");
                let mut message = writer.begin_message();
                message.write(wire::EVENT_PREFIX).await?;
                write_event(&event, &mut message).await?;
                message.finish().await?;
            }
            OutgoingPacket::Disconnect => {
                trace!("sending disconnect");
                queue.close();
                writer.send_control(wire::CLOSE_MESSAGE).await?;
                break;
            }
        }
    }
    Ok(writer)
}

// ============================================================================
// Receive
// ============================================================================

/// Reads framing packets until the next event.
///
/// Keepalive pongs are consumed silently. A transport close returns
/// `Ok(None)` and is the only normal end of the stream. A probe pong is
/// valid only during the upgrade probe, so seeing one here is fatal, as is
/// any messaging packet other than an event — including a messaging
/// disconnect, which peers signal through the transport close instead.
pub(crate) async fn read_next_event<R: TransportReader>(
    reader: &mut MessageReader<R>,
    registry: &TypeRegistry,
) -> Result<Option<Event>> {
    loop {
        let packet = match read_framing_packet(reader).await? {
            Some(packet) => packet,
            None => return Ok(None),
        };

        match packet {
            FramingPacket::Pong => {
                trace!("received keepalive pong");
            }
            FramingPacket::Message => {
                let mut kind = [0u8; 1];
                reader.read_exact(&mut kind).await?;
                let kind = MessagingKind::from_byte(kind[0]).ok_or_else(|| {
                    Error::protocol(format!("unknown messaging byte {:?}", kind[0] as char))
                })?;

                match kind {
                    MessagingKind::Event => {
                        let mut body = Vec::new();
                        reader.read_to_end(&mut body).await?;
                        return Ok(Some(decode_event(&body, registry)?));
                    }
                    other => {
                        return Err(Error::protocol(format!(
                            "unsupported messaging packet {other:?}"
                        )))
                    }
                }
            }
            other => {
                return Err(Error::protocol(format!(
                    "unexpected framing packet {:?} in steady state",
                    other.kind()
                )))
            }
        }
    }
}

/// Owns the read half and dispatches every decoded event until the
/// connection ends.
pub(crate) async fn run_receive_loop<R, F>(
    mut reader: MessageReader<R>,
    registry: Arc<TypeRegistry>,
    mut dispatch: F,
) -> Result<()>
where
    R: TransportReader,
    F: FnMut(Event) + Send,
{
    while let Some(event) = read_next_event(&mut reader, &registry).await? {
        dispatch(event);
    }
    Ok(())
}

// ============================================================================
// Keepalive
// ============================================================================

/// Queues a ping every `period` until the queue is gone.
///
/// A zero period means the session advertised no keepalive; the task exits
/// without arming a timer.
pub(crate) async fn run_keepalive(queue: mpsc::UnboundedSender<OutgoingPacket>, period: Duration) {
    if period.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; the bootstrap counts as contact.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if queue.send(OutgoingPacket::Ping).is_err() {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReader, MockWriter};
    use serde_json::json;

    #[tokio::test]
    async fn test_send_loop_writes_event_then_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutgoingPacket::Event(
            Event::with_argument("chat", json!({"text": "hi"})).unwrap(),
        ))
        .unwrap();
        tx.send(OutgoingPacket::Disconnect).unwrap();

        let writer = run_send_loop(MessageWriter::new(MockWriter::new()), rx)
            .await
            .unwrap();
        let transport = writer.into_inner();

        assert_eq!(transport.frames.len(), 2);
        assert_eq!(transport.frames[0].0, br#"42["chat",{"text":"hi"}]"#);
        assert!(transport.frames[0].1);
        assert_eq!(transport.frames[1].0, b"41");
        assert!(transport.frames[1].1);
    }

    #[tokio::test]
    async fn test_send_loop_writes_ping_and_ends_when_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutgoingPacket::Ping).unwrap();
        drop(tx);

        let writer = run_send_loop(MessageWriter::new(MockWriter::new()), rx)
            .await
            .unwrap();
        let transport = writer.into_inner();

        assert_eq!(transport.frames, vec![(b"2".to_vec(), true)]);
        assert!(!transport.closed);
    }

    #[tokio::test]
    async fn test_send_loop_drops_packets_queued_after_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutgoingPacket::Disconnect).unwrap();
        tx.send(OutgoingPacket::Event(Event::new("late"))).unwrap();

        let writer = run_send_loop(MessageWriter::new(MockWriter::new()), rx)
            .await
            .unwrap();
        let transport = writer.into_inner();
        assert_eq!(transport.frames, vec![(b"41".to_vec(), true)]);
    }

    #[tokio::test]
    async fn test_read_next_event_skips_keepalive_pong() {
        let registry = TypeRegistry::new();
        let mut reader = MessageReader::new(MockReader::new([
            b"3".to_vec(),
            br#"42["chat",{"text":"hi"}]"#.to_vec(),
        ]));

        let event = read_next_event(&mut reader, &registry)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.name(), "chat");
        assert_eq!(
            event.argument().unwrap().as_value(),
            Some(&json!({"text": "hi"}))
        );

        assert!(read_next_event(&mut reader, &registry)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_read_next_event_rejects_messaging_disconnect() {
        let registry = TypeRegistry::new();
        let mut reader = MessageReader::new(MockReader::new([b"41".to_vec()]));
        let err = read_next_event(&mut reader, &registry).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_read_next_event_rejects_ack_packet() {
        let registry = TypeRegistry::new();
        let mut reader = MessageReader::new(MockReader::new([b"43[\"x\"]".to_vec()]));
        let err = read_next_event(&mut reader, &registry).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_read_next_event_rejects_probe_pong_in_steady_state() {
        let registry = TypeRegistry::new();
        let mut reader = MessageReader::new(MockReader::new([b"3probe".to_vec()]));
        let err = read_next_event(&mut reader, &registry).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_receive_loop_dispatches_until_close() {
        let registry = Arc::new(TypeRegistry::new());
        let reader = MessageReader::new(MockReader::new([
            br#"42["a"]"#.to_vec(),
            b"3".to_vec(),
            br#"42["b",1]"#.to_vec(),
        ]));

        let mut names = Vec::new();
        run_receive_loop(reader, registry, |event| names.push(event.name().to_string()))
            .await
            .unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_queues_pings_on_the_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_keepalive(tx, Duration::from_millis(10)));

        assert!(matches!(rx.recv().await, Some(OutgoingPacket::Ping)));
        assert!(matches!(rx.recv().await, Some(OutgoingPacket::Ping)));

        drop(rx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_zero_period_exits_immediately() {
        let (tx, _rx) = mpsc::unbounded_channel();
        run_keepalive(tx, Duration::ZERO).await;
    }
}
