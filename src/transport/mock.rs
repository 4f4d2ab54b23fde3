//! In-memory transport halves for tests.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::transport::duplex::{FrameRead, TransportReader, TransportWriter};

/// Collects written frames as `(payload, end_of_message)` pairs.
#[derive(Default)]
pub(crate) struct MockWriter {
    pub frames: Vec<(Vec<u8>, bool)>,
    pub closed: bool,
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenation of every frame payload written so far.
    pub fn written(&self) -> Vec<u8> {
        self.frames.iter().flat_map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send_frame(&mut self, payload: &[u8], end_of_message: bool) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.frames.push((payload.to_vec(), end_of_message));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Serves queued messages, splitting each across reads to fit the caller's
/// buffer the way the live reader does.
pub(crate) struct MockReader {
    messages: VecDeque<Vec<u8>>,
    pending: Option<(Vec<u8>, usize)>,
}

impl MockReader {
    pub fn new(messages: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            pending: None,
        }
    }
}

#[async_trait]
impl TransportReader for MockReader {
    async fn receive_frame(&mut self, buffer: &mut [u8]) -> Result<Option<FrameRead>> {
        if self.pending.is_none() {
            match self.messages.pop_front() {
                Some(message) => self.pending = Some((message, 0)),
                None => return Ok(None),
            }
        }

        let (data, offset) = self.pending.as_mut().unwrap_or_else(|| unreachable!());
        let count = (data.len() - *offset).min(buffer.len());
        buffer[..count].copy_from_slice(&data[*offset..*offset + count]);
        *offset += count;

        let end_of_message = *offset == data.len();
        if end_of_message {
            self.pending = None;
        }
        Ok(Some(FrameRead {
            count,
            end_of_message,
        }))
    }
}
