//! Connection Pool
//!
//! Owns a set of [`Connection`]s behind one logical client.
//!
//! - Requests round-robin over the connections that are ready
//! - A failing connection is reconnected after `reconnect_delay`
//! - After more than `reconnect_limit` consecutive errors it is evicted
//! - The pool is ready once any connection is ready and defunct once the
//!   last connection has been evicted

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::protocol::{Consistency, Event};

use super::config::{ConnectionConfig, PoolConfig};
use super::connection::{Connection, ConnectionId, ErrorCallback, Response, ResponseFuture};
use super::error::{DriverError, DriverResult};
use super::events::{EventHub, EventStream, DEFAULT_EVENT_BUFFER};
use super::transport::{TcpTransport, Transport};

/// Builds the connections added by [`ConnectionPool::add_client`].
pub type ConnectionFactory = Arc<dyn Fn(ConnectionConfig) -> Connection + Send + Sync>;

/// Pool-level notification without arguments.
pub type PoolCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// PoolMetrics
// ============================================================================

/// Pool metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Connections currently owned
    pub size: usize,
    /// Connections that are ready
    pub ready: usize,
    pub defunct: bool,
    /// Connections created by `add_client`
    pub total_created: u64,
    /// Connections evicted after exceeding the reconnect limit
    pub total_evictions: u64,
    /// Reconnects scheduled by the pool
    pub total_reconnects: u64,
}

// ============================================================================
// ConnectionPool
// ============================================================================

struct PoolEntry {
    connection: Connection,
    /// Errors since the last successful handshake
    errors: usize,
}

#[derive(Default)]
struct PoolState {
    entries: Vec<PoolEntry>,
    /// Round-robin cursor
    next: usize,
    ready: bool,
    defunct: bool,
    closed: bool,
}

#[derive(Clone, Default)]
struct PoolCallbacks {
    ready: Option<PoolCallback>,
    defunct: Option<PoolCallback>,
    connection_error: Option<ErrorCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolReadiness {
    Pending,
    Ready,
    Defunct,
}

struct PoolInner {
    config: PoolConfig,
    factory: ConnectionFactory,
    state: Mutex<PoolState>,
    callbacks: RwLock<PoolCallbacks>,
    readiness: watch::Sender<PoolReadiness>,
    events: EventHub,
    total_created: AtomicU64,
    total_evictions: AtomicU64,
    total_reconnects: AtomicU64,
}

/// Connection pool.
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Pool of plain TCP connections.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_transport(config, Arc::new(TcpTransport))
    }

    /// Pool whose connections all use `transport`.
    pub fn with_transport(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_factory(
            config,
            Arc::new(move |connection: ConnectionConfig| {
                Connection::new(connection, transport.clone())
            }),
        )
    }

    /// Pool with a custom connection factory.
    pub fn with_factory(config: PoolConfig, factory: ConnectionFactory) -> Self {
        let (readiness, _) = watch::channel(PoolReadiness::Pending);
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                state: Mutex::new(PoolState::default()),
                callbacks: RwLock::new(PoolCallbacks::default()),
                readiness,
                events: EventHub::default(),
                total_created: AtomicU64::new(0),
                total_evictions: AtomicU64::new(0),
                total_reconnects: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Called when the pool becomes ready.
    pub fn on_ready(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.callbacks.write().ready = Some(Arc::new(callback));
    }

    /// Called when the last connection is evicted.
    pub fn on_defunct(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.callbacks.write().defunct = Some(Arc::new(callback));
    }

    /// Called with the last error of every evicted connection.
    pub fn on_connection_error(
        &self,
        callback: impl Fn(ConnectionId, &DriverError) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.write().connection_error = Some(Arc::new(callback));
    }

    /// Events from every connection in the pool.
    pub fn event_stream(&self) -> EventStream {
        self.inner.events.subscribe(DEFAULT_EVENT_BUFFER)
    }

    /// Add a connection built from the pool's connection config and start
    /// connecting it in the background.
    pub fn add_client(&self, host: &str, port: u16) -> DriverResult<ConnectionId> {
        self.add_client_with(host, port, self.inner.config.connection.clone())
    }

    /// Like [`add_client`](Self::add_client) with a per-connection config,
    /// for example different events or credentials.
    pub fn add_client_with(
        &self,
        host: &str,
        port: u16,
        config: ConnectionConfig,
    ) -> DriverResult<ConnectionId> {
        let connection = (self.inner.factory)(config);
        let id = connection.id();
        self.wire(&connection);

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(DriverError::pool_exhausted("pool is closed"));
            }
            state.entries.push(PoolEntry {
                connection: connection.clone(),
                errors: 0,
            });
        }
        self.inner.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection = id, "Adding {}:{} to pool", host, port);

        let host = host.to_string();
        tokio::spawn(async move {
            // Failures arrive through the error callback.
            if let Err(err) = connection.connect(&host, port).await {
                tracing::debug!(connection = id, "Connect to {}:{} failed: {}", host, port, err);
            }
        });
        Ok(id)
    }

    fn wire(&self, connection: &Connection) {
        let weak = Arc::downgrade(&self.inner);
        connection.on_ready(move |id| {
            if let Some(pool) = weak.upgrade() {
                pool.handle_ready(id);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        connection.on_error(move |id, err| {
            if let Some(pool) = weak.upgrade() {
                pool.handle_error(id, err);
            }
        });

        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        connection.on_event(move |_, event| {
            if let Some(pool) = weak.upgrade() {
                pool.handle_event(event);
            }
        });
    }

    /// Wait until the pool is ready, or fail once it is defunct.
    pub async fn wait_ready(&self) -> DriverResult<()> {
        let mut rx = self.inner.readiness.subscribe();
        let readiness = match rx.wait_for(|r| *r != PoolReadiness::Pending).await {
            Ok(r) => *r,
            Err(_) => return Err(DriverError::pool_exhausted("pool dropped")),
        };
        match readiness {
            PoolReadiness::Ready => Ok(()),
            _ => Err(DriverError::pool_exhausted("pool is defunct")),
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Run a statement on the next ready connection.
    pub fn query(
        &self,
        query: impl Into<String>,
        consistency: Consistency,
    ) -> DriverResult<(ConnectionId, i8, ResponseFuture)> {
        let query = query.into();
        self.inner
            .route(|conn| conn.query(query.as_str(), consistency))
    }

    /// Run a statement and hand the outcome to `callback`.
    ///
    /// If no connection accepts the request, `callback` receives the error
    /// before this returns it.
    pub fn query_with(
        &self,
        query: impl Into<String>,
        consistency: Consistency,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<ConnectionId> {
        let routed = self.query(query, consistency);
        forward(routed, callback)
    }

    pub fn prepare(&self, query: impl Into<String>) -> DriverResult<(ConnectionId, i8, ResponseFuture)> {
        let query = query.into();
        self.inner.route(|conn| conn.prepare(query.as_str()))
    }

    pub fn prepare_with(
        &self,
        query: impl Into<String>,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<ConnectionId> {
        let routed = self.prepare(query);
        forward(routed, callback)
    }

    /// Execute a prepared statement on the next ready connection.
    ///
    /// Prepared ids are per server; callers using several nodes must prepare
    /// on each.
    pub fn execute(
        &self,
        id: impl Into<Bytes>,
        values: Vec<Option<Bytes>>,
        consistency: Consistency,
    ) -> DriverResult<(ConnectionId, i8, ResponseFuture)> {
        let id = id.into();
        self.inner
            .route(|conn| conn.execute(id.clone(), values.clone(), consistency))
    }

    pub fn execute_with(
        &self,
        id: impl Into<Bytes>,
        values: Vec<Option<Bytes>>,
        consistency: Consistency,
        callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
    ) -> DriverResult<ConnectionId> {
        let routed = self.execute(id, values, consistency);
        forward(routed, callback)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Ready and not defunct.
    pub fn is_ready(&self) -> bool {
        let state = self.inner.state.lock();
        state.ready && !state.defunct
    }

    pub fn is_defunct(&self) -> bool {
        self.inner.state.lock().defunct
    }

    /// Connections currently owned.
    pub fn size(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Owned connections, in round-robin order.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| e.connection.clone())
            .collect()
    }

    /// Consecutive error count of a connection, if the pool owns it.
    pub fn error_count(&self, id: ConnectionId) -> Option<usize> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .find(|e| e.connection.id() == id)
            .map(|e| e.errors)
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        PoolMetrics {
            size: state.entries.len(),
            ready: state
                .entries
                .iter()
                .filter(|e| e.connection.is_ready())
                .count(),
            defunct: state.defunct,
            total_created: self.inner.total_created.load(Ordering::Relaxed),
            total_evictions: self.inner.total_evictions.load(Ordering::Relaxed),
            total_reconnects: self.inner.total_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Close every connection. Pending requests fail with
    /// [`DriverError::ConnectionClosed`]; no callbacks fire.
    pub fn close(&self) {
        let entries = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.ready = false;
            std::mem::take(&mut state.entries)
        };
        for entry in entries {
            entry.connection.close();
        }
        tracing::info!("Pool closed");
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionPool")
            .field("size", &state.entries.len())
            .field("ready", &state.ready)
            .field("defunct", &state.defunct)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Await a routed request on a background task and hand its outcome over.
fn forward(
    routed: DriverResult<(ConnectionId, i8, ResponseFuture)>,
    callback: impl FnOnce(DriverResult<Response>) + Send + 'static,
) -> DriverResult<ConnectionId> {
    match routed {
        Ok((id, _, response)) => {
            tokio::spawn(async move { callback(response.await) });
            Ok(id)
        }
        Err(err) => {
            callback(Err(err.clone()));
            Err(err)
        }
    }
}

// ============================================================================
// Internals
// ============================================================================

impl PoolInner {
    /// Send through the next connection that accepts the request.
    ///
    /// Each connection is tried at most once, starting at the round-robin
    /// cursor. Connections that are not ready or have no free stream id are
    /// skipped.
    fn route<F>(&self, send: F) -> DriverResult<(ConnectionId, i8, ResponseFuture)>
    where
        F: Fn(&Connection) -> DriverResult<(i8, ResponseFuture)>,
    {
        let candidates = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DriverError::pool_exhausted("pool is closed"));
            }
            if !state.ready || state.defunct || state.entries.is_empty() {
                return Err(DriverError::pool_exhausted("no ready connection"));
            }
            let len = state.entries.len();
            let start = state.next % len;
            state.next = (start + 1) % len;
            (0..len)
                .map(|offset| state.entries[(start + offset) % len].connection.clone())
                .collect::<Vec<_>>()
        };

        let mut last_err = None;
        for connection in candidates {
            match send(&connection) {
                Ok((stream, response)) => return Ok((connection.id(), stream, response)),
                Err(
                    err @ (DriverError::NotReady(_)
                    | DriverError::StreamExhaustion
                    | DriverError::ConnectionClosed),
                ) => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(DriverError::pool_exhausted(match last_err {
            Some(err) => format!("no connection accepted the request: {}", err),
            None => "no ready connection".to_string(),
        }))
    }

    fn handle_ready(&self, id: ConnectionId) {
        let became_ready = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if let Some(entry) = state.entries.iter_mut().find(|e| e.connection.id() == id) {
                entry.errors = 0;
            }
            state.defunct = false;
            !std::mem::replace(&mut state.ready, true)
        };

        self.readiness.send_replace(PoolReadiness::Ready);
        tracing::debug!(connection = id, "Pool connection ready");
        if became_ready {
            tracing::info!("Pool ready");
            let callback = self.callbacks.read().ready.clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn handle_error(&self, id: ConnectionId, err: &DriverError) {
        enum Action {
            Reconnect(Connection, usize),
            Evict(Connection, bool),
        }

        let action = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let Some(pos) = state.entries.iter().position(|e| e.connection.id() == id) else {
                return;
            };
            state.entries[pos].errors += 1;
            let errors = state.entries[pos].errors;
            if errors > self.config.reconnect_limit {
                let entry = state.entries.remove(pos);
                if state.next >= state.entries.len() {
                    state.next = 0;
                }
                let empty = state.entries.is_empty();
                if empty {
                    state.defunct = true;
                    state.ready = false;
                }
                Action::Evict(entry.connection, empty)
            } else {
                Action::Reconnect(state.entries[pos].connection.clone(), errors)
            }
        };

        match action {
            Action::Evict(connection, empty) => {
                self.total_evictions.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    connection = id,
                    "Evicting connection after {} errors: {}",
                    self.config.reconnect_limit + 1,
                    err
                );
                let callback = self.callbacks.read().connection_error.clone();
                if let Some(callback) = callback {
                    callback(id, err);
                }
                connection.close();

                if empty {
                    self.readiness.send_replace(PoolReadiness::Defunct);
                    tracing::error!("Pool defunct: no connections left");
                    let callback = self.callbacks.read().defunct.clone();
                    if let Some(callback) = callback {
                        callback();
                    }
                }
            }
            Action::Reconnect(connection, errors) => {
                self.total_reconnects.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    connection = id,
                    "Reconnecting ({}/{}) after: {}",
                    errors,
                    self.config.reconnect_limit,
                    err
                );
                let delay = self.config.reconnect_delay;
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if let Err(err) = connection.reconnect().await {
                        tracing::debug!(connection = id, "Reconnect failed: {}", err);
                    }
                });
            }
        }
    }

    fn handle_event(&self, event: &Event) {
        let missed = self.events.publish(event);
        if missed > 0 {
            tracing::error!("{} pool event subscriber(s) lagging, event dropped", missed);
        }
    }
}
