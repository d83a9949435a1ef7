//! Multiplexed connection.
//!
//! A [`Connection`] owns one transport stream. It runs the startup handshake
//! (OPTIONS, STARTUP, optional CREDENTIALS and REGISTER) on the reserved
//! stream id and then multiplexes up to 127 concurrent requests, routing
//! each RESULT or ERROR back to the caller that owns its stream id.
//!
//! Reads and writes happen on a background task. Callbacks run on that task
//! and must not block.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::protocol::header::FLAG_TRACING;
use crate::protocol::{
    Authenticate, Compression, Consistency, Envelope, ErrorCode, ErrorMessage, Event, Execute,
    Frame, FrameCodec, Message, Prepare, ProtocolError, Query, QueryResult, Register, Startup,
    Supported,
};

use super::config::{ConnectionConfig, ServerAddress};
use super::error::{DriverError, DriverResult};
use super::events::{EventHub, EventStream, DEFAULT_EVENT_BUFFER};
use super::log::Logger;
use super::stream_id::{StreamIdAllocator, MAX_STREAMS, RESERVED_STREAM_ID};
use super::transport::{BoxedStream, TcpTransport, Transport};

/// Process-unique connection id.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Called once the handshake completes.
pub type ReadyCallback = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// Called when the connection becomes defunct.
pub type ErrorCallback = Arc<dyn Fn(ConnectionId, &DriverError) + Send + Sync>;

/// Called for every server-pushed event.
pub type EventCallback = Arc<dyn Fn(ConnectionId, &Event) + Send + Sync>;

// ============================================================================
// Response
// ============================================================================

/// Successful answer to a QUERY, PREPARE or EXECUTE.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Stream id the request travelled on
    pub stream: i8,
    /// Tracing session, when tracing was requested
    pub tracing_id: Option<Uuid>,
    pub result: QueryResult,
}

impl Response {
    pub fn into_result(self) -> QueryResult {
        self.result
    }
}

/// Resolves to the response of one request.
///
/// Resolves to [`DriverError::ConnectionClosed`] if the connection goes
/// away first.
pub struct ResponseFuture {
    rx: oneshot::Receiver<DriverResult<Response>>,
}

impl Future for ResponseFuture {
    type Output = DriverResult<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DriverError::ConnectionClosed)))
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

enum ResponseHandler {
    Callback(Box<dyn FnOnce(DriverResult<Response>) + Send>),
    Channel(oneshot::Sender<DriverResult<Response>>),
}

impl ResponseHandler {
    fn complete(self, result: DriverResult<Response>) {
        match self {
            ResponseHandler::Callback(callback) => callback(result),
            ResponseHandler::Channel(tx) => {
                let _ = tx.send(result);
            }
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Resolving the host name
    Resolving,
    /// Opening the transport stream
    Connecting,
    /// TLS handshake in progress
    Handshaking,
    /// OPTIONS sent
    AwaitingSupported,
    /// STARTUP (or CREDENTIALS / REGISTER) sent
    AwaitingReady,
    /// Accepting requests
    Ready,
    /// `close` in progress
    Closing,
    /// Closed for good
    Closed,
}

#[derive(Debug, Clone)]
enum Readiness {
    Pending,
    Ready,
    Failed(DriverError),
}

#[derive(Clone, Default)]
struct Callbacks {
    ready: Option<ReadyCallback>,
    error: Option<ErrorCallback>,
    event: Option<EventCallback>,
}

/// State guarded by the connection lock.
struct Shared {
    state: ConnectionState,
    defunct: bool,
    closing: bool,
    registered: bool,
    /// Bumped on every connect, reconnect and close; io from an older
    /// generation is ignored
    generation: u64,
    address: Option<ServerAddress>,
    streams: StreamIdAllocator,
    handlers: Vec<Option<ResponseHandler>>,
    writer: Option<mpsc::UnboundedSender<Frame>>,
    io_task: Option<JoinHandle<()>>,
    compression: Option<Compression>,
    supported: Option<Supported>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            defunct: false,
            closing: false,
            registered: false,
            generation: 0,
            address: None,
            streams: StreamIdAllocator::new(),
            handlers: (0..MAX_STREAMS).map(|_| None).collect(),
            writer: None,
            io_task: None,
            compression: None,
            supported: None,
        }
    }

    /// Take every pending handler and free all stream ids.
    fn drain(&mut self) -> Vec<ResponseHandler> {
        self.streams.reset();
        self.handlers.iter_mut().filter_map(Option::take).collect()
    }

    /// Stop the io task and forget the session.
    fn detach(&mut self) -> Vec<ResponseHandler> {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.writer = None;
        self.registered = false;
        self.compression = None;
        self.supported = None;
        self.drain()
    }

    fn send(&self, frame: Frame) -> bool {
        self.writer
            .as_ref()
            .map(|writer| writer.send(frame).is_ok())
            .unwrap_or(false)
    }
}

// ============================================================================
// Connection
// ============================================================================

struct ConnectionInner {
    id: ConnectionId,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    logger: Logger,
    callbacks: RwLock<Callbacks>,
    shared: Mutex<Shared>,
    readiness: watch::Sender<Readiness>,
    events: EventHub,
}

/// A multiplexed connection to one server.
///
/// Cheap to clone; clones share the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create an unconnected connection over `transport`.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (readiness, _) = watch::channel(Readiness::Pending);
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                logger: Logger::new(id, config.log_sink.clone()),
                config,
                transport,
                callbacks: RwLock::new(Callbacks::default()),
                shared: Mutex::new(Shared::new()),
                readiness,
                events: EventHub::default(),
            }),
        }
    }

    /// Create an unconnected plain TCP connection.
    pub fn tcp(config: ConnectionConfig) -> Self {
        Self::new(config, Arc::new(TcpTransport))
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Handshake complete and no fatal error since.
    pub fn is_ready(&self) -> bool {
        let shared = self.inner.shared.lock();
        shared.state == ConnectionState::Ready && !shared.defunct
    }

    /// A transport or handshake error made the connection unusable.
    pub fn is_defunct(&self) -> bool {
        self.inner.shared.lock().defunct
    }

    pub fn is_closing(&self) -> bool {
        self.inner.shared.lock().closing
    }

    /// Address given to the last `connect`.
    pub fn address(&self) -> Option<ServerAddress> {
        self.inner.shared.lock().address.clone()
    }

    /// Requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.inner.shared.lock().streams.in_flight()
    }

    /// Options advertised by the server in SUPPORTED.
    pub fn supported(&self) -> Option<Supported> {
        self.inner.shared.lock().supported.clone()
    }

    /// Compression in effect, if any was negotiated.
    pub fn compression(&self) -> Option<Compression> {
        self.inner.shared.lock().compression
    }

    pub fn on_ready(&self, callback: impl Fn(ConnectionId) + Send + Sync + 'static) {
        self.inner.callbacks.write().ready = Some(Arc::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(ConnectionId, &DriverError) + Send + Sync + 'static) {
        self.inner.callbacks.write().error = Some(Arc::new(callback));
    }

    pub fn on_event(&self, callback: impl Fn(ConnectionId, &Event) + Send + Sync + 'static) {
        self.inner.callbacks.write().event = Some(Arc::new(callback));
    }

    /// Subscribe to server events (requires `events` in the config).
    pub fn event_stream(&self) -> EventStream {
        self.inner.events.subscribe(DEFAULT_EVENT_BUFFER)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the transport and start the handshake.
    ///
    /// Returns once the stream is open and OPTIONS is queued. Readiness is
    /// signalled through [`on_ready`](Self::on_ready) or
    /// [`wait_ready`](Self::wait_ready). Failures are also reported to the
    /// error callback.
    pub async fn connect(&self, host: &str, port: u16) -> DriverResult<()> {
        let generation = self.inner.begin_connect(ServerAddress::new(host, port))?;
        self.inner.establish(generation, host, port).await
    }

    /// Drop the current session and connect again to the same address.
    pub async fn reconnect(&self) -> DriverResult<()> {
        let address = self.inner.reset()?;
        self.inner
            .logger
            .info(format!("Reconnecting to {}", address));
        self.connect(&address.host, address.port).await
    }

    /// Wait until the handshake completes or fails.
    pub async fn wait_ready(&self) -> DriverResult<()> {
        let mut rx = self.inner.readiness.subscribe();
        let readiness = match rx
            .wait_for(|r| !matches!(r, Readiness::Pending))
            .await
        {
            Ok(r) => r.clone(),
            Err(_) => return Err(DriverError::ConnectionClosed),
        };
        match readiness {
            Readiness::Ready => Ok(()),
            Readiness::Failed(err) => Err(err),
            Readiness::Pending => Err(DriverError::not_ready("handshake pending")),
        }
    }

    /// Close the socket and fail pending requests with
    /// [`DriverError::ConnectionClosed`]. The error callback is not invoked.
    pub fn close(&self) {
        self.inner.close();
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Run a statement.
    pub fn query(
        &self,
        query: impl Into<String>,
        consistency: Consistency,
    ) -> DriverResult<(i8, ResponseFuture)> {
        self.request(Message::Query(Query::new(query, consistency)), 0)
    }

    /// Run a statement with tracing; the response carries the tracing id.
    pub fn query_traced(
        &self,
        query: impl Into<String>,
        consistency: Consistency,
    ) -> DriverResult<(i8, ResponseFuture)> {
        self.request(Message::Query(Query::new(query, consistency)), FLAG_TRACING)
    }

    /// Run a statement and hand the outcome to `callback`.
    ///
    /// If the request cannot be sent, `callback` receives the error before
    /// this returns it.
    pub fn query_with(
        &self,
        query: impl Into<String>,
        consistency: Consistency,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<i8> {
        self.inner.submit(
            Message::Query(Query::new(query, consistency)),
            0,
            ResponseHandler::Callback(Box::new(callback)),
        )
    }

    /// Prepare a statement.
    pub fn prepare(&self, query: impl Into<String>) -> DriverResult<(i8, ResponseFuture)> {
        self.request(Message::Prepare(Prepare::new(query)), 0)
    }

    pub fn prepare_with(
        &self,
        query: impl Into<String>,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<i8> {
        self.inner.submit(
            Message::Prepare(Prepare::new(query)),
            0,
            ResponseHandler::Callback(Box::new(callback)),
        )
    }

    /// Execute a prepared statement with already serialized values.
    pub fn execute(
        &self,
        id: impl Into<Bytes>,
        values: Vec<Option<Bytes>>,
        consistency: Consistency,
    ) -> DriverResult<(i8, ResponseFuture)> {
        self.request(
            Message::Execute(Execute::new(id.into(), values, consistency)),
            0,
        )
    }

    pub fn execute_with(
        &self,
        id: impl Into<Bytes>,
        values: Vec<Option<Bytes>>,
        consistency: Consistency,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<i8> {
        self.inner.submit(
            Message::Execute(Execute::new(id.into(), values, consistency)),
            0,
            ResponseHandler::Callback(Box::new(callback)),
        )
    }

    fn request(&self, message: Message, flags: u8) -> DriverResult<(i8, ResponseFuture)> {
        let (tx, rx) = oneshot::channel();
        let stream = self
            .inner
            .submit(message, flags, ResponseHandler::Channel(tx))?;
        Ok((stream, ResponseFuture { rx }))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("address", &shared.address)
            .field("state", &shared.state)
            .field("defunct", &shared.defunct)
            .field("in_flight", &shared.streams.in_flight())
            .finish()
    }
}

// ============================================================================
// Internals
// ============================================================================

impl ConnectionInner {
    fn submit(&self, message: Message, flags: u8, handler: ResponseHandler) -> DriverResult<i8> {
        let outcome = {
            let mut shared = self.shared.lock();
            Self::enqueue(&mut shared, &message, flags, self.config.max_frame_size, handler)
        };
        match outcome {
            Ok(stream) => Ok(stream),
            Err((err, handler)) => {
                self.logger
                    .debug(format!("{} not sent: {}", message.name(), err));
                handler.complete(Err(err.clone()));
                Err(err)
            }
        }
    }

    fn enqueue(
        shared: &mut Shared,
        message: &Message,
        flags: u8,
        max_frame_size: usize,
        handler: ResponseHandler,
    ) -> Result<i8, (DriverError, ResponseHandler)> {
        if shared.closing {
            return Err((DriverError::ConnectionClosed, handler));
        }
        if shared.defunct {
            return Err((DriverError::not_ready("connection is defunct"), handler));
        }
        if shared.state != ConnectionState::Ready {
            return Err((
                DriverError::not_ready(format!("connection is {:?}", shared.state)),
                handler,
            ));
        }
        // The writer treats an oversized frame as fatal; refuse it here.
        let mut frame = message.to_frame(RESERVED_STREAM_ID, shared.compression);
        if frame.body.len() > max_frame_size {
            let err = ProtocolError::FrameTooLarge {
                size: frame.body.len(),
                max: max_frame_size,
            };
            return Err((err.into(), handler));
        }
        let Some(stream) = shared.streams.allocate() else {
            return Err((DriverError::StreamExhaustion, handler));
        };
        frame.header.stream = stream;
        frame.header = frame.header.with_flags(flags);
        // The response cannot be dispatched before the lock is released.
        if !shared.send(frame) {
            shared.streams.release(stream);
            return Err((DriverError::ConnectionClosed, handler));
        }
        shared.handlers[stream as usize] = Some(handler);
        Ok(stream)
    }

    fn begin_connect(&self, address: ServerAddress) -> DriverResult<u64> {
        let (generation, pending) = {
            let mut shared = self.shared.lock();
            if shared.closing {
                return Err(DriverError::ConnectionClosed);
            }
            if shared.state != ConnectionState::Disconnected && !shared.defunct {
                return Err(DriverError::not_ready(format!(
                    "connect while {:?}",
                    shared.state
                )));
            }
            shared.generation += 1;
            let pending = shared.detach();
            shared.defunct = false;
            shared.state = ConnectionState::Resolving;
            shared.address = Some(address);
            (shared.generation, pending)
        };
        self.readiness.send_replace(Readiness::Pending);
        for handler in pending {
            handler.complete(Err(DriverError::ConnectionClosed));
        }
        Ok(generation)
    }

    fn reset(&self) -> DriverResult<ServerAddress> {
        let (address, pending) = {
            let mut shared = self.shared.lock();
            if shared.closing {
                return Err(DriverError::ConnectionClosed);
            }
            let address = shared
                .address
                .clone()
                .ok_or_else(|| DriverError::configuration("reconnect before connect"))?;
            shared.generation += 1;
            let pending = shared.detach();
            shared.defunct = false;
            shared.state = ConnectionState::Disconnected;
            (address, pending)
        };
        for handler in pending {
            handler.complete(Err(DriverError::ConnectionClosed));
        }
        Ok(address)
    }

    async fn establish(self: &Arc<Self>, generation: u64, host: &str, port: u16) -> DriverResult<()> {
        let timeout = self.config.connect_timeout;
        let opened = match tokio::time::timeout(timeout, self.open(generation, host, port)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout(format!(
                "connecting to {}:{} took longer than {:?}",
                host, port, timeout
            ))),
        };
        let result = opened.and_then(|stream| self.start(generation, stream));
        if let Err(err) = &result {
            self.fail(generation, err.clone());
        }
        result
    }

    async fn open(&self, generation: u64, host: &str, port: u16) -> DriverResult<BoxedStream> {
        let addrs = self.transport.resolve(host, port).await?;
        self.set_state(generation, ConnectionState::Connecting);

        let mut stream = self.connect_any(&addrs).await?;
        if self.transport.is_tls() {
            self.set_state(generation, ConnectionState::Handshaking);
            stream = self.transport.handshake(stream, host).await?;
        }
        Ok(stream)
    }

    async fn connect_any(&self, addrs: &[SocketAddr]) -> DriverResult<BoxedStream> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for addr in addrs {
            match self.transport.connect(*addr).await {
                Ok(stream) => {
                    self.logger.debug(format!("Connected to {}", addr));
                    return Ok(stream);
                }
                Err(err) => {
                    self.logger
                        .debug(format!("Connecting to {} failed: {}", addr, err));
                    last_err = err;
                }
            }
        }
        Err(last_err.into())
    }

    fn start(self: &Arc<Self>, generation: u64, stream: BoxedStream) -> DriverResult<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.lock();
        if shared.generation != generation || shared.closing {
            return Err(DriverError::ConnectionClosed);
        }
        // OPTIONS goes first; the io task drains it once spawned.
        let _ = tx.send(Message::Options.to_frame(RESERVED_STREAM_ID, None));
        shared.writer = Some(tx);
        shared.state = ConnectionState::AwaitingSupported;
        shared.io_task = Some(tokio::spawn(run_io(
            Arc::downgrade(self),
            generation,
            stream,
            rx,
            self.config.max_frame_size,
        )));
        Ok(())
    }

    fn set_state(&self, generation: u64, state: ConnectionState) {
        let mut shared = self.shared.lock();
        if shared.generation == generation && !shared.defunct {
            shared.state = state;
        }
    }

    fn close(&self) {
        let pending = {
            let mut shared = self.shared.lock();
            if shared.state == ConnectionState::Closed {
                return;
            }
            shared.closing = true;
            shared.state = ConnectionState::Closing;
            shared.generation += 1;
            let pending = shared.detach();
            shared.state = ConnectionState::Closed;
            pending
        };
        self.readiness
            .send_replace(Readiness::Failed(DriverError::ConnectionClosed));
        self.logger.info("Connection closed");
        for handler in pending {
            handler.complete(Err(DriverError::ConnectionClosed));
        }
    }

    /// Mark the connection defunct after a fatal error.
    ///
    /// Every pending request fails with `ConnectionClosed`; the error
    /// callback fires unless the connection is closing. Errors from a stale
    /// generation are ignored.
    fn fail(&self, generation: u64, err: DriverError) {
        let (pending, notify) = {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.defunct {
                return;
            }
            shared.defunct = true;
            shared.writer = None;
            // Detached, not aborted: this may run on the io task itself.
            shared.io_task = None;
            (shared.drain(), !shared.closing)
        };

        self.readiness.send_replace(Readiness::Failed(err.clone()));
        match &err {
            DriverError::Protocol(_) => self
                .logger
                .critical(format!("Connection defunct, framing lost: {}", err)),
            _ => self.logger.error(format!("Connection defunct: {}", err)),
        }
        for handler in pending {
            handler.complete(Err(DriverError::ConnectionClosed));
        }
        if notify {
            let callback = self.callbacks.read().error.clone();
            if let Some(callback) = callback {
                callback(self.id, &err);
            }
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn dispatch(&self, generation: u64, frame: Frame) {
        let stream = frame.header.stream;
        let Some(opcode) = frame.header.opcode() else {
            self.logger.error(format!(
                "Skipping frame with unknown opcode 0x{:02X} on stream {}",
                frame.header.opcode, stream
            ));
            return;
        };

        let compression = {
            let shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.compression
        };

        let envelope = match Envelope::from_frame(frame, compression) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.logger.error(format!(
                    "Failed to decode {} body on stream {}: {}",
                    opcode, stream, err
                ));
                if stream > RESERVED_STREAM_ID {
                    self.complete(stream, Err(err.into()));
                } else if stream == RESERVED_STREAM_ID {
                    self.fail(generation, err.into());
                }
                return;
            }
        };

        let Envelope {
            stream,
            tracing_id,
            message,
        } = envelope;
        match message {
            Message::Result(result) if stream > RESERVED_STREAM_ID => self.complete(
                stream,
                Ok(Response {
                    stream,
                    tracing_id,
                    result,
                }),
            ),
            Message::Error(err) if stream > RESERVED_STREAM_ID => self.complete(stream, Err(err.into())),
            Message::Event(event) => self.on_event(event),
            Message::Supported(supported) if stream == RESERVED_STREAM_ID => {
                self.on_supported(generation, supported)
            }
            Message::Authenticate(auth) if stream == RESERVED_STREAM_ID => {
                self.on_authenticate(generation, auth)
            }
            Message::Ready if stream == RESERVED_STREAM_ID => self.on_ready(generation),
            Message::Error(err) if stream == RESERVED_STREAM_ID => {
                self.fail(generation, handshake_error(err))
            }
            other => self.logger.error(format!(
                "Ignoring unexpected {} on stream {}",
                other.name(),
                stream
            )),
        }
    }

    /// Hand a response to the owner of `stream` and free the id.
    fn complete(&self, stream: i8, result: DriverResult<Response>) {
        let handler = {
            let mut shared = self.shared.lock();
            let handler = shared
                .handlers
                .get_mut(stream as usize)
                .and_then(Option::take);
            if handler.is_some() {
                shared.streams.release(stream);
            }
            handler
        };
        match handler {
            Some(handler) => handler.complete(result),
            None => self
                .logger
                .error(format!("Dropping response for unknown stream {}", stream)),
        }
    }

    fn send_control(&self, generation: u64, message: Message) {
        let shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        let frame = message.to_frame(RESERVED_STREAM_ID, shared.compression);
        if !shared.send(frame) {
            self.logger
                .debug(format!("{} dropped: writer gone", message.name()));
        }
    }

    fn on_supported(&self, generation: u64, supported: Supported) {
        let compression = match self.config.compression {
            Some(c)
                if supported
                    .compression()
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(c.as_str())) =>
            {
                Some(c)
            }
            Some(c) => {
                self.logger.info(format!(
                    "Server does not offer {} compression, continuing without",
                    c.as_str()
                ));
                None
            }
            None => None,
        };

        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.supported = Some(supported);
            shared.state = ConnectionState::AwaitingReady;
        }
        self.send_control(
            generation,
            Message::Startup(Startup::new(&self.config.cql_version, compression)),
        );
        // Everything after STARTUP may be compressed.
        let mut shared = self.shared.lock();
        if shared.generation == generation {
            shared.compression = compression;
        }
    }

    fn on_authenticate(&self, generation: u64, auth: Authenticate) {
        match &self.config.credentials {
            Some(credentials) => {
                self.logger.debug(format!(
                    "Sending credentials for {}",
                    auth.authenticator
                ));
                self.send_control(generation, Message::Credentials(credentials.clone()));
            }
            None => self.fail(
                generation,
                DriverError::authentication(format!(
                    "server requires {} but no credentials are configured",
                    auth.authenticator
                )),
            ),
        }
    }

    fn on_ready(&self, generation: u64) {
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.defunct {
                return;
            }
            if !self.config.events.is_empty() && !shared.registered {
                shared.registered = true;
                let frame = Message::Register(Register::new(self.config.events.clone()))
                    .to_frame(RESERVED_STREAM_ID, shared.compression);
                shared.send(frame);
                return;
            }
            shared.state = ConnectionState::Ready;
        }

        self.readiness.send_replace(Readiness::Ready);
        self.logger.info("Connection ready");
        let callback = self.callbacks.read().ready.clone();
        if let Some(callback) = callback {
            callback(self.id);
        }
    }

    fn on_event(&self, event: Event) {
        self.logger
            .debug(format!("Received {} event", event.event_type().as_str()));
        let callback = self.callbacks.read().event.clone();
        if let Some(callback) = callback {
            callback(self.id, &event);
        }
        let missed = self.events.publish(&event);
        if missed > 0 {
            self.logger.error(format!(
                "{} event subscriber(s) lagging, event dropped",
                missed
            ));
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(task) = self.shared.get_mut().io_task.take() {
            task.abort();
        }
    }
}

fn handshake_error(err: ErrorMessage) -> DriverError {
    match err.code {
        ErrorCode::BadCredentials => DriverError::authentication(err.message),
        _ => err.into(),
    }
}

fn codec_error(err: ProtocolError) -> DriverError {
    match err {
        ProtocolError::Io { kind, message } => DriverError::Transport { kind, message },
        other => DriverError::Protocol(other),
    }
}

// ============================================================================
// IO Task
// ============================================================================

async fn run_io(
    inner: Weak<ConnectionInner>,
    generation: u64,
    stream: BoxedStream,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    max_frame_size: usize,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, FrameCodec::with_max_size(max_frame_size));
    let mut writer = FramedWrite::new(write_half, FrameCodec::with_max_size(max_frame_size));

    let result = tokio::select! {
        r = read_loop(&inner, generation, &mut reader) => r,
        r = write_loop(&mut writer, &mut rx) => r,
    };

    if let Err(err) = result {
        if let Some(inner) = inner.upgrade() {
            inner.fail(generation, err);
        }
    }
}

async fn read_loop(
    inner: &Weak<ConnectionInner>,
    generation: u64,
    reader: &mut FramedRead<ReadHalf<BoxedStream>, FrameCodec>,
) -> DriverResult<()> {
    while let Some(frame) = reader.next().await {
        let frame = frame.map_err(codec_error)?;
        match inner.upgrade() {
            Some(inner) => inner.dispatch(generation, frame),
            None => return Ok(()),
        }
    }
    Err(DriverError::transport_msg(
        io::ErrorKind::UnexpectedEof,
        "connection closed by server",
    ))
}

/// Ends cleanly once every sender is dropped.
async fn write_loop(
    writer: &mut FramedWrite<WriteHalf<BoxedStream>, FrameCodec>,
    rx: &mut mpsc::UnboundedReceiver<Frame>,
) -> DriverResult<()> {
    while let Some(frame) = rx.recv().await {
        writer.send(frame).await.map_err(codec_error)?;
    }
    Ok(())
}
