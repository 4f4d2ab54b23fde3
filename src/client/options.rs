//! Client configuration.

use std::time::Duration;

use crate::transport::stream::DEFAULT_CHUNK_SIZE;

/// Connection options.
///
/// The default bootstrap is poll-then-upgrade: an HTTP polling request
/// fetches the session parameters, then the connection upgrades to a
/// WebSocket and probes it before use. Enabling `direct_upgrade` skips the
/// polling step and opens the WebSocket immediately, receiving the session
/// parameters over it.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Connect over a WebSocket directly instead of polling first.
    pub direct_upgrade: bool,
    /// Outgoing frame size for chunked message writes.
    pub chunk_size: usize,
    /// Deadline for the whole connection bootstrap.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            direct_upgrade: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect over a WebSocket directly, skipping the polling bootstrap.
    #[must_use]
    pub fn with_direct_upgrade(mut self, direct: bool) -> Self {
        self.direct_upgrade = direct;
        self
    }

    /// Sets the outgoing frame size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the bootstrap deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert!(!options.direct_upgrade);
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let options = ClientOptions::new()
            .with_direct_upgrade(true)
            .with_chunk_size(512)
            .with_connect_timeout(Duration::from_secs(5));
        assert!(options.direct_upgrade);
        assert_eq!(options.chunk_size, 512);
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    #[should_panic(expected = "chunk size must be non-zero")]
    fn test_zero_chunk_size_panics() {
        let _ = ClientOptions::new().with_chunk_size(0);
    }
}
