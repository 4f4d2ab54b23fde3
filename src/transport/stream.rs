//! Chunked message stream over the duplex transport.
//!
//! The event codec serializes JSON of unbounded size; the transport deals
//! in frames. [`MessageWriter`] buffers outgoing bytes into fixed-size
//! chunks, flushing full chunks as non-final frames so a caller can stream
//! a message without knowing frame boundaries, and [`MessageReader`]
//! presents one incoming logical message as a bounded byte stream
//! terminated by a zero-length read.
//!
//! # Write contract
//!
//! One logical message is written inside a [`MessageWrite`] scope obtained
//! from [`MessageWriter::begin_message`]; the exclusive borrow is the
//! buffer rent. [`MessageWrite::finish`] flushes whatever remains as the
//! final frame — including an empty final frame when the payload landed
//! exactly on a chunk boundary.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::transport::duplex::{TransportReader, TransportWriter};

// ============================================================================
// Constants
// ============================================================================

/// Default write chunk size, matching the transport's frame granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

// ============================================================================
// MessageWriter
// ============================================================================

/// Chunking writer for outgoing logical messages.
///
/// The chunk buffer is allocated once and reused across messages.
pub struct MessageWriter<W> {
    transport: W,
    buffer: Vec<u8>,
    chunk_size: usize,
}

impl<W: TransportWriter> MessageWriter<W> {
    /// Creates a writer with the default chunk size.
    pub fn new(transport: W) -> Self {
        Self::with_chunk_size(transport, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a writer with a custom chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn with_chunk_size(transport: W, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            transport,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Starts one outgoing logical message.
    ///
    /// The returned scope holds the chunk buffer for the whole message; the
    /// exclusive borrow guarantees a single active writer section.
    pub fn begin_message(&mut self) -> MessageWrite<'_, W> {
        self.buffer.clear();
        MessageWrite { owner: self }
    }

    /// Sends a small control packet as a single final frame.
    pub async fn send_control(&mut self, payload: &[u8]) -> Result<()> {
        self.transport.send_frame(payload, true).await
    }

    /// Performs the transport-level close handshake.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Consumes the writer, returning the transport half.
    pub fn into_inner(self) -> W {
        self.transport
    }
}

// ============================================================================
// MessageWrite
// ============================================================================

/// Scope for writing one logical message; see [`MessageWriter::begin_message`].
pub struct MessageWrite<'a, W: TransportWriter> {
    owner: &'a mut MessageWriter<W>,
}

impl<W: TransportWriter> MessageWrite<'_, W> {
    /// Appends bytes to the message, flushing full chunks as non-final
    /// frames.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let space = self.owner.chunk_size - self.owner.buffer.len();
            let take = space.min(data.len());
            self.owner.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.owner.buffer.len() == self.owner.chunk_size {
                self.owner
                    .transport
                    .send_frame(&self.owner.buffer, false)
                    .await?;
                self.owner.buffer.clear();
            }
        }
        Ok(())
    }

    /// Flushes the remaining buffered bytes as the final frame, ending the
    /// message.
    pub async fn finish(self) -> Result<()> {
        self.owner
            .transport
            .send_frame(&self.owner.buffer, true)
            .await?;
        self.owner.buffer.clear();
        Ok(())
    }
}

// ============================================================================
// MessageReader
// ============================================================================

/// Bounded-message reader over the transport's receive primitive.
///
/// Once the transport reports end-of-message, the next [`read`] returns
/// zero bytes and resets the flag, so one logical message reads like a
/// stream with a definite end even when the transport delivered it in
/// several frames.
///
/// [`read`]: MessageReader::read
pub struct MessageReader<R> {
    transport: R,
    end_of_message: bool,
}

impl<R: TransportReader> MessageReader<R> {
    /// Wraps the read half of the transport.
    pub fn new(transport: R) -> Self {
        Self {
            transport,
            end_of_message: false,
        }
    }

    /// Reads up to `buffer.len()` bytes of the current message.
    ///
    /// Returns `Ok(Some(0))` exactly once at the end of each message, and
    /// `Ok(None)` once the transport is closed.
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<Option<usize>> {
        if self.end_of_message {
            self.end_of_message = false;
            return Ok(Some(0));
        }

        match self.transport.receive_frame(buffer).await? {
            None => Ok(None),
            Some(frame) => {
                if frame.end_of_message {
                    self.end_of_message = true;
                }
                Ok(Some(frame.count))
            }
        }
    }

    /// Fills `buffer` from the current message.
    ///
    /// Fails with a protocol violation if the message ends early, and with
    /// [`Error::ConnectionClosed`] if the transport closes mid-message.
    pub async fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.read(&mut buffer[filled..]).await? {
                None => return Err(Error::ConnectionClosed),
                Some(0) => return Err(Error::protocol("message ended before expected length")),
                Some(n) => filled += n,
            }
        }
        Ok(())
    }

    /// Reads the rest of the current message into `out`.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.read(&mut chunk).await? {
                None => return Err(Error::ConnectionClosed),
                Some(0) => return Ok(()),
                Some(n) => out.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Requires the current message to be fully consumed.
    pub async fn expect_message_end(&mut self) -> Result<()> {
        let mut probe = [0u8; 1];
        match self.read(&mut probe).await? {
            None | Some(0) => Ok(()),
            Some(_) => Err(Error::protocol("trailing bytes after packet")),
        }
    }

    /// Whether the last read drained the current message.
    #[inline]
    #[must_use]
    pub fn at_message_end(&self) -> bool {
        self.end_of_message
    }

    /// Consumes the reader, returning the transport half.
    pub fn into_inner(self) -> R {
        self.transport
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReader, MockWriter};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_small_payload_single_final_frame() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 8);
        let mut message = writer.begin_message();
        message.write(b"abc").await.unwrap();
        message.finish().await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(mock.frames, vec![(b"abc".to_vec(), true)]);
    }

    #[tokio::test]
    async fn test_payload_larger_than_chunk() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 4);
        let mut message = writer.begin_message();
        message.write(b"0123456789").await.unwrap();
        message.finish().await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(
            mock.frames,
            vec![
                (b"0123".to_vec(), false),
                (b"4567".to_vec(), false),
                (b"89".to_vec(), true),
            ]
        );
        assert_eq!(mock.written(), b"0123456789");
    }

    #[tokio::test]
    async fn test_exact_boundary_sends_empty_final_frame() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 4);
        let mut message = writer.begin_message();
        message.write(b"01234567").await.unwrap();
        message.finish().await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(
            mock.frames,
            vec![
                (b"0123".to_vec(), false),
                (b"4567".to_vec(), false),
                (Vec::new(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_writes_accumulate_across_calls() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 6);
        let mut message = writer.begin_message();
        message.write(b"ab").await.unwrap();
        message.write(b"cd").await.unwrap();
        message.write(b"efgh").await.unwrap();
        message.finish().await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(
            mock.frames,
            vec![(b"abcdef".to_vec(), false), (b"gh".to_vec(), true)]
        );
    }

    #[tokio::test]
    async fn test_buffer_reused_across_messages() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 8);

        let mut first = writer.begin_message();
        first.write(b"first").await.unwrap();
        first.finish().await.unwrap();

        let mut second = writer.begin_message();
        second.write(b"second").await.unwrap();
        second.finish().await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(
            mock.frames,
            vec![(b"first".to_vec(), true), (b"second".to_vec(), true)]
        );
    }

    #[tokio::test]
    async fn test_send_control_is_one_final_frame() {
        let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), 8);
        writer.send_control(b"2").await.unwrap();

        let mock = writer.into_inner();
        assert_eq!(mock.frames, vec![(b"2".to_vec(), true)]);
    }

    #[tokio::test]
    async fn test_reader_end_of_message_resets() {
        let mut reader = MessageReader::new(MockReader::new([b"0123456789".to_vec()]));
        let mut buf = [0u8; 4];

        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"0123");
        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"4567");
        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(2));
        assert_eq!(&buf[..2], b"89");
        assert!(reader.at_message_end());

        // Zero-length read terminates the logical message and resets.
        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(0));
        assert!(!reader.at_message_end());

        // No further message: transport reports closed.
        assert_eq!(reader.read(&mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_read_exact_and_to_end() {
        let mut reader = MessageReader::new(MockReader::new([b"3probe".to_vec()]));

        let mut head = [0u8; 1];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"3");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"probe");
        assert!(!reader.at_message_end());
    }

    #[tokio::test]
    async fn test_reader_read_exact_fails_on_short_message() {
        let mut reader = MessageReader::new(MockReader::new([b"40".to_vec()]));
        let mut buf = [0u8; 5];
        let err = reader.read_exact(&mut buf).await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_expect_message_end_rejects_trailing_bytes() {
        let mut reader = MessageReader::new(MockReader::new([b"3x".to_vec()]));
        let mut head = [0u8; 1];
        reader.read_exact(&mut head).await.unwrap();

        let err = reader.expect_message_end().await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    proptest! {
        /// Writing any payload yields `len / chunk` full non-final frames,
        /// one final frame, and a byte-identical concatenation.
        #[test]
        fn prop_chunked_write_shape(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk in 1usize..128,
        ) {
            let expected = payload.clone();
            let frames = tokio_test::block_on(async move {
                let mut writer = MessageWriter::with_chunk_size(MockWriter::new(), chunk);
                let mut message = writer.begin_message();
                message.write(&payload).await.unwrap();
                message.finish().await.unwrap();
                writer.into_inner().frames
            });

            let (finals, non_finals): (Vec<_>, Vec<_>) =
                frames.iter().partition(|(_, fin)| *fin);

            prop_assert_eq!(non_finals.len(), expected.len() / chunk);
            prop_assert_eq!(finals.len(), 1);
            prop_assert!(non_finals.iter().all(|(p, _)| p.len() == chunk));
            prop_assert!(frames.last().map(|(_, fin)| *fin).unwrap_or(false));

            let concat: Vec<u8> = frames.into_iter().flat_map(|(p, _)| p).collect();
            prop_assert_eq!(concat, expected);
        }
    }
}
