//! Duplex transport seam over a WebSocket connection.
//!
//! The protocol engine reads and writes *frames of one logical message*
//! rather than whole WebSocket messages: a reader may consume an incoming
//! message a few bytes at a time (the packet discriminator is a single
//! byte), and a writer may emit a large message as several non-final frames
//! followed by a final one. [`TransportReader`] and [`TransportWriter`]
//! capture exactly those primitives so the engine and its tests do not
//! depend on a live socket.
//!
//! [`WsReader`] and [`WsWriter`] adapt the split halves of a
//! tokio-tungstenite stream. Each half is owned by exactly one loop (the
//! receive loop reads, the send loop writes), so no locking is layered on
//! top of the stream.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// The concrete WebSocket stream both connect paths produce.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of one transport read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRead {
    /// Number of bytes copied into the caller's buffer.
    pub count: usize,
    /// Whether this read drained the current logical message.
    pub end_of_message: bool,
}

// ============================================================================
// Traits
// ============================================================================

/// Read side of the duplex transport.
#[async_trait]
pub trait TransportReader: Send {
    /// Reads up to `buffer.len()` bytes of the current incoming message.
    ///
    /// Returns `Ok(None)` once the remote end closed the transport, which
    /// is the receive loop's only normal exit.
    async fn receive_frame(&mut self, buffer: &mut [u8]) -> Result<Option<FrameRead>>;
}

/// Write side of the duplex transport.
#[async_trait]
pub trait TransportWriter: Send {
    /// Sends one text frame. `end_of_message` marks the final frame of the
    /// current logical message.
    async fn send_frame(&mut self, payload: &[u8], end_of_message: bool) -> Result<()>;

    /// Performs the transport-level close handshake.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// WsReader
// ============================================================================

/// Reader over the stream half of a split WebSocket connection.
///
/// tungstenite reassembles fragmented messages, so one `Message::Text` is
/// one logical message; a pending cursor lets callers drain it through
/// arbitrarily small buffers (down to the 1-byte packet discriminator).
pub struct WsReader {
    inner: SplitStream<WsStream>,
    pending: Option<Pending>,
    closed: bool,
}

struct Pending {
    data: Bytes,
    offset: usize,
}

impl WsReader {
    /// Wraps the read half of a split WebSocket stream.
    pub fn new(inner: SplitStream<WsStream>) -> Self {
        Self {
            inner,
            pending: None,
            closed: false,
        }
    }

    fn drain_pending(&mut self, buffer: &mut [u8]) -> FrameRead {
        let pending = self.pending.as_mut().unwrap_or_else(|| unreachable!());
        let remaining = pending.data.len() - pending.offset;
        let count = remaining.min(buffer.len());
        buffer[..count].copy_from_slice(&pending.data[pending.offset..pending.offset + count]);
        pending.offset += count;

        let end_of_message = pending.offset == pending.data.len();
        if end_of_message {
            self.pending = None;
        }
        FrameRead {
            count,
            end_of_message,
        }
    }
}

#[async_trait]
impl TransportReader for WsReader {
    async fn receive_frame(&mut self, buffer: &mut [u8]) -> Result<Option<FrameRead>> {
        if self.closed {
            return Ok(None);
        }
        if self.pending.is_some() {
            return Ok(Some(self.drain_pending(buffer)));
        }

        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.pending = Some(Pending {
                        data: Bytes::from(text),
                        offset: 0,
                    });
                    return Ok(Some(self.drain_pending(buffer)));
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(Error::protocol("binary messages are not supported"));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Transport-level keepalive, distinct from the framing
                    // layer's ping/pong packets.
                    trace!("websocket control frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {
                    return Err(Error::protocol("unexpected raw frame"));
                }
                Some(Err(e)) => return Err(Error::Transport(e)),
            }
        }
    }
}

// ============================================================================
// WsWriter
// ============================================================================

/// Writer over the sink half of a split WebSocket connection.
///
/// Final frames of unfragmented messages go out as plain text messages;
/// a non-final frame opens a fragmented message that continuation frames
/// extend until one carries the final flag.
pub struct WsWriter {
    inner: SplitSink<WsStream, Message>,
    continuation: bool,
}

impl WsWriter {
    /// Wraps the write half of a split WebSocket stream.
    pub fn new(inner: SplitSink<WsStream, Message>) -> Self {
        Self {
            inner,
            continuation: false,
        }
    }
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send_frame(&mut self, payload: &[u8], end_of_message: bool) -> Result<()> {
        if !self.continuation && end_of_message {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|_| Error::protocol("outgoing text frame is not valid UTF-8"))?;
            self.inner.send(Message::Text(text.into())).await?;
            return Ok(());
        }

        let opcode = if self.continuation {
            OpCode::Data(Data::Continue)
        } else {
            OpCode::Data(Data::Text)
        };
        self.continuation = !end_of_message;

        let frame = Frame::message(Bytes::copy_from_slice(payload), opcode, end_of_message);
        self.inner.send(Message::Frame(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.send(Message::Close(None)).await?;
        self.inner.close().await?;
        Ok(())
    }
}
