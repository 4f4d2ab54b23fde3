//! Connection engine and public client surface.
//!
//! [`SocketIoClient`] owns the connection lifecycle: bootstrap (polling or
//! direct), the upgrade probe, the send/receive/keepalive tasks, and
//! shutdown. Incoming events are either dispatched to a registered handler
//! from the receive task, or pulled one at a time with
//! [`receive`](SocketIoClient::receive) on the direct path when no handler
//! is registered.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Connection options |
//! | `engine` | Send, receive, and keepalive loops |

// ============================================================================
// Submodules
// ============================================================================

/// Connection options.
pub mod options;

/// Send, receive, and keepalive loops.
pub(crate) mod engine;

pub use options::ClientOptions;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::engine::{
    read_next_event, run_keepalive, run_receive_loop, run_send_loop, OutgoingPacket,
};
use crate::error::{Error, Result};
use crate::protocol::event::Event;
use crate::protocol::handshake::{parse_bootstrap_payload, parse_open_frame, ConnectionInfo};
use crate::protocol::packet::{read_framing_packet, wire, FramingPacket};
use crate::protocol::registry::TypeRegistry;
use crate::transport::duplex::{WsReader, WsWriter};
use crate::transport::stream::{MessageReader, MessageWriter};
use crate::transport::upgrade;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Disconnected,
    /// Bootstrap in progress.
    Connecting,
    /// WebSocket open, probe exchange in progress.
    ProbingUpgrade,
    /// Connected and exchanging messaging packets.
    Connected,
    /// Shutdown in progress.
    Closing,
}

// ============================================================================
// Handlers
// ============================================================================

/// Callback invoked once the connection is established.
pub type ConnectedHandler = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;
/// Callback invoked for every incoming event.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;
/// Callback invoked when a background task fails.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    connected: Mutex<Option<ConnectedHandler>>,
    event: Mutex<Option<EventHandler>>,
    error: Mutex<Option<ErrorHandler>>,
}

// Each dispatch clones the handler out of its mutex before invoking it, so
// a callback may register or replace handlers without deadlocking.
impl Handlers {
    fn dispatch_connected(&self, info: &ConnectionInfo) {
        let handler = self.connected.lock().clone();
        if let Some(handler) = handler {
            handler(info);
        }
    }

    fn dispatch_event(&self, event: Event) {
        let handler = self.event.lock().clone();
        match handler {
            Some(handler) => handler(event),
            None => debug!(name = event.name(), "no event handler, event dropped"),
        }
    }

    fn dispatch_error(&self, error: &Error) {
        let handler = self.error.lock().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }

    fn has_event_handler(&self) -> bool {
        self.event.lock().is_some()
    }
}

// ============================================================================
// Active Connection
// ============================================================================

type SharedReader = Arc<tokio::sync::Mutex<MessageReader<WsReader>>>;

struct Active {
    info: ConnectionInfo,
    queue: mpsc::UnboundedSender<OutgoingPacket>,
    send_task: JoinHandle<Option<MessageWriter<WsWriter>>>,
    keepalive_task: JoinHandle<()>,
    receive_task: Option<JoinHandle<()>>,
    /// Present only in pull mode (direct path, no event handler).
    reader: Option<SharedReader>,
}

// ============================================================================
// SocketIoClient
// ============================================================================

/// Asynchronous Socket.IO client.
///
/// # Example
///
/// ```no_run
/// use socketio_client::{ClientOptions, SocketIoClient};
///
/// # async fn run() -> socketio_client::Result<()> {
/// let client = SocketIoClient::new("http://localhost:3000/", ClientOptions::default())?;
/// client.on_event(|event| println!("{}: {:?}", event.name(), event.arguments()));
/// client.connect().await?;
/// client.emit("chat", serde_json::json!({ "text": "hello" }))?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SocketIoClient {
    base_url: Url,
    options: ClientOptions,
    http: reqwest::Client,
    registry: Arc<TypeRegistry>,
    state: Arc<Mutex<ConnectionState>>,
    handlers: Arc<Handlers>,
    inner: Mutex<Option<Active>>,
}

impl SocketIoClient {
    /// Creates a client for the given server base URL (`http://`, `https://`
    /// or `ws://`).
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL {base_url:?}: {e}")))?;
        match base_url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(Error::config(format!(
                    "unsupported URL scheme {other:?}, expected http(s) or ws(s)"
                )))
            }
        }

        Ok(Self {
            base_url,
            options,
            http: reqwest::Client::new(),
            registry: Arc::new(TypeRegistry::new()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            handlers: Arc::new(Handlers::default()),
            inner: Mutex::new(None),
        })
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers `T` as the argument type for events named `event_name`.
    pub fn register_event_type<T>(&self, event_name: impl Into<String>)
    where
        T: DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        self.registry.register::<T>(event_name);
    }

    /// The client's argument type registry.
    #[must_use]
    pub fn registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sets the handler invoked once the connection is established.
    pub fn on_connected(&self, handler: impl Fn(&ConnectionInfo) + Send + Sync + 'static) {
        *self.handlers.connected.lock() = Some(Arc::new(handler));
    }

    /// Sets the handler invoked for every incoming event.
    ///
    /// Must be set before [`connect`](Self::connect) to take effect for
    /// that connection.
    pub fn on_event(&self, handler: impl Fn(Event) + Send + Sync + 'static) {
        *self.handlers.event.lock() = Some(Arc::new(handler));
    }

    /// Sets the handler invoked when a background task fails.
    pub fn on_error(&self, handler: impl Fn(&Error) + Send + Sync + 'static) {
        *self.handlers.error.lock() = Some(Arc::new(handler));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the client is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Session parameters of the active connection.
    #[must_use]
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.inner.lock().as_ref().map(|active| active.info.clone())
    }

    /// Establishes the connection, bounded by the configured timeout.
    ///
    /// The default path polls the server for the session parameters, then
    /// upgrades to a WebSocket and probes it. With
    /// [`direct_upgrade`](ClientOptions::direct_upgrade) the WebSocket is
    /// opened immediately and the session parameters arrive over it.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Disconnected {
                return Err(Error::config("client is already connected"));
            }
            *state = ConnectionState::Connecting;
        }

        let timeout = self.options.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.connect_inner()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("connect", timeout.as_millis() as u64)),
        };
        if result.is_err() {
            *self.state.lock() = ConnectionState::Disconnected;
        }
        result
    }

    async fn connect_inner(&self) -> Result<()> {
        let (info, reader, writer) = if self.options.direct_upgrade {
            self.bootstrap_direct().await?
        } else {
            self.bootstrap_polling().await?
        };

        info!(
            sid = %info.socket_id,
            ping_interval_ms = info.ping_interval.as_millis() as u64,
            "connected"
        );

        let (queue, outgoing) = mpsc::unbounded_channel();

        let send_task = {
            let handlers = Arc::clone(&self.handlers);
            tokio::spawn(async move {
                match run_send_loop(writer, outgoing).await {
                    Ok(writer) => Some(writer),
                    Err(err) => {
                        error!(%err, "send loop failed");
                        handlers.dispatch_error(&err);
                        None
                    }
                }
            })
        };

        let keepalive_task = tokio::spawn(run_keepalive(queue.clone(), info.ping_interval));

        // Pull mode keeps the reader available for receive(); it only makes
        // sense on the direct path, where no probe traffic precedes the
        // first event.
        let pull_mode = self.options.direct_upgrade && !self.handlers.has_event_handler();
        let (receive_task, shared_reader) = if pull_mode {
            (None, Some(Arc::new(tokio::sync::Mutex::new(reader))))
        } else {
            let registry = Arc::clone(&self.registry);
            let handlers = Arc::clone(&self.handlers);
            let state = Arc::clone(&self.state);
            let task = tokio::spawn(async move {
                let result =
                    run_receive_loop(reader, registry, |event| handlers.dispatch_event(event))
                        .await;
                if let Err(err) = result {
                    error!(%err, "receive loop failed");
                    handlers.dispatch_error(&err);
                }
                *state.lock() = ConnectionState::Disconnected;
            });
            (Some(task), None)
        };

        *self.inner.lock() = Some(Active {
            info: info.clone(),
            queue,
            send_task,
            keepalive_task,
            receive_task,
            reader: shared_reader,
        });
        *self.state.lock() = ConnectionState::Connected;
        self.handlers.dispatch_connected(&info);
        Ok(())
    }

    /// Sends the messaging disconnect, closes the transport, and stops the
    /// background tasks.
    pub async fn close(&self) -> Result<()> {
        let active = self.inner.lock().take().ok_or(Error::NotConnected)?;
        *self.state.lock() = ConnectionState::Closing;

        // The send loop may already be gone after a transport error.
        let _ = active.queue.send(OutgoingPacket::Disconnect);
        active.keepalive_task.abort();

        match active.send_task.await {
            Ok(Some(mut writer)) => {
                if let Err(err) = writer.close().await {
                    warn!(%err, "transport close failed");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "send task ended abnormally"),
        }

        // The receive loop exits on its own once the close handshake lands;
        // waiting here lets in-flight event dispatches complete.
        if let Some(task) = active.receive_task {
            if let Err(err) = task.await {
                warn!(%err, "receive task ended abnormally");
            }
        }
        drop(active.reader);

        *self.state.lock() = ConnectionState::Disconnected;
        info!("disconnected");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Queues an event for sending.
    pub fn send(&self, event: Event) -> Result<()> {
        let inner = self.inner.lock();
        let active = inner.as_ref().ok_or(Error::NotConnected)?;
        active
            .queue
            .send(OutgoingPacket::Event(event))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Queues an event with a single serializable argument.
    pub fn emit(&self, name: impl Into<String>, argument: impl Serialize) -> Result<()> {
        self.send(Event::with_argument(name, argument)?)
    }

    /// Queues an event with several serializable arguments.
    pub fn emit_many<I, T>(&self, name: impl Into<String>, arguments: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        self.send(Event::with_arguments(name, arguments)?)
    }

    /// Pulls the next incoming event.
    ///
    /// Available only on the direct path with no event handler registered;
    /// otherwise the receive task owns the read half.
    pub async fn receive(&self) -> Result<Event> {
        let reader = {
            let inner = self.inner.lock();
            let active = inner.as_ref().ok_or(Error::NotConnected)?;
            active.reader.clone().ok_or_else(|| {
                Error::config("receive() requires the direct path with no event handler")
            })?
        };

        let mut reader = reader.lock().await;
        match read_next_event(&mut reader, &self.registry).await? {
            Some(event) => Ok(event),
            None => Err(Error::ConnectionClosed),
        }
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    async fn bootstrap_polling(
        &self,
    ) -> Result<(
        ConnectionInfo,
        MessageReader<WsReader>,
        MessageWriter<WsWriter>,
    )> {
        let url = self.polling_url()?;
        debug!(%url, "polling bootstrap");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::handshake_rejected(format!(
                "bootstrap request returned status {status}"
            )));
        }
        let body = response.bytes().await?;
        let info = parse_bootstrap_payload(&body)?;
        if !info.supports_websocket() {
            return Err(Error::handshake_rejected(
                "session does not allow the websocket upgrade",
            ));
        }

        *self.state.lock() = ConnectionState::ProbingUpgrade;
        let ws_url = self.websocket_url(Some(&info.socket_id))?;
        debug!(%ws_url, "upgrading to websocket");
        let (stream, _response) = connect_async(ws_url.as_str()).await?;
        let (sink, source) = stream.split();
        let mut writer =
            MessageWriter::with_chunk_size(WsWriter::new(sink), self.options.chunk_size);
        let mut reader = MessageReader::new(WsReader::new(source));

        writer.send_control(wire::PING_PROBE).await?;
        match read_framing_packet(&mut reader).await? {
            Some(FramingPacket::PongProbe) => {}
            Some(other) => {
                return Err(Error::protocol(format!(
                    "expected probe pong, got {:?}",
                    other.kind()
                )))
            }
            None => return Err(Error::ConnectionClosed),
        }
        writer.send_control(&[wire::UPGRADE]).await?;
        debug!(sid = %info.socket_id, "upgrade probe complete");

        Ok((info, reader, writer))
    }

    async fn bootstrap_direct(
        &self,
    ) -> Result<(
        ConnectionInfo,
        MessageReader<WsReader>,
        MessageWriter<WsWriter>,
    )> {
        let url = self.websocket_url(None)?;
        debug!(%url, "direct websocket bootstrap");

        let stream = upgrade::connect_direct(&url).await?;
        let (sink, source) = stream.split();
        let writer = MessageWriter::with_chunk_size(WsWriter::new(sink), self.options.chunk_size);
        let mut reader = MessageReader::new(WsReader::new(source));

        let mut body = Vec::new();
        reader.read_to_end(&mut body).await?;
        let info = parse_open_frame(&body)?;

        let mut ack = [0u8; 2];
        reader.read_exact(&mut ack).await?;
        if ack != *wire::CONNECT_ACK {
            return Err(Error::protocol("expected connect acknowledgement"));
        }
        reader.expect_message_end().await?;

        Ok((info, reader, writer))
    }

    // ------------------------------------------------------------------
    // URLs
    // ------------------------------------------------------------------

    fn polling_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "http" | "https" => None,
            "ws" => Some("http"),
            _ => Some("https"),
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::config("base URL scheme cannot be mapped to HTTP"))?;
        }
        url.set_path("/socket.io/");

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "3")
            .append_pair("transport", "polling")
            .append_pair("b64", "1")
            .append_pair("t", &timestamp.to_string());
        Ok(url)
    }

    fn websocket_url(&self, socket_id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "ws" | "wss" => None,
            "http" => Some("ws"),
            _ => Some("wss"),
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::config("base URL scheme cannot be mapped to websocket"))?;
        }
        url.set_path("/socket.io/");

        let mut pairs = url.query_pairs_mut();
        pairs
            .clear()
            .append_pair("EIO", "3")
            .append_pair("transport", "websocket");
        if let Some(socket_id) = socket_id {
            pairs.append_pair("sid", socket_id);
        }
        drop(pairs);
        Ok(url)
    }
}

impl Drop for SocketIoClient {
    fn drop(&mut self) {
        if let Some(active) = self.inner.lock().take() {
            active.send_task.abort();
            active.keepalive_task.abort();
            if let Some(task) = active.receive_task {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for SocketIoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoClient")
            .field("base_url", &self.base_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
