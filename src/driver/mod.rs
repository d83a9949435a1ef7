//! Driver Module
//!
//! Connections, connection pooling and the ambient pieces they share.
//!
//! # Components
//!
//! - [`Connection`]: one multiplexed socket with its handshake state machine
//! - [`ConnectionPool`]: round-robin over connections with reconnect and eviction
//! - [`StreamIdAllocator`]: stream id bookkeeping for one connection
//! - [`Transport`]: TCP, or TLS with the `tls` feature
//!
//! # Example
//!
//! ```no_run
//! use cql_driver::driver::{Connection, ConnectionConfig};
//! use cql_driver::protocol::Consistency;
//!
//! # async fn example() -> Result<(), cql_driver::DriverError> {
//! let conn = Connection::tcp(ConnectionConfig::default());
//! conn.connect("127.0.0.1", 9042).await?;
//! conn.wait_ready().await?;
//!
//! let (_, response) = conn.query("SELECT * FROM km.test_cf", Consistency::One)?;
//! if let Some(rows) = response.await?.result.rows() {
//!     for row in rows {
//!         println!("{:?}", row.get_string(0)?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Pool Example
//!
//! ```no_run
//! use cql_driver::driver::{ConnectionPool, PoolConfig};
//! use cql_driver::protocol::Consistency;
//!
//! # async fn example() -> Result<(), cql_driver::DriverError> {
//! let pool = ConnectionPool::new(PoolConfig::builder().reconnect_limit(3).build());
//! pool.on_defunct(|| eprintln!("all nodes gone"));
//! pool.add_client("10.0.0.1", 9042)?;
//! pool.add_client("10.0.0.2", 9042)?;
//! pool.wait_ready().await?;
//!
//! let (_, _, response) = pool.query("SELECT * FROM km.test_cf", Consistency::Quorum)?;
//! let response = response.await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod events;
mod log;
mod pool;
mod stream_id;
mod transport;

// Re-exports
pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, PoolConfig, PoolConfigBuilder, ServerAddress,
    DEFAULT_PORT,
};
pub use connection::{
    Connection, ConnectionId, ConnectionState, ErrorCallback, EventCallback, ReadyCallback,
    Response, ResponseFuture,
};
pub use error::{DriverError, DriverResult};
pub use events::{EventStream, DEFAULT_EVENT_BUFFER};
pub use log::{LogLevel, LogSink};
pub use pool::{ConnectionFactory, ConnectionPool, PoolCallback, PoolMetrics};
pub use stream_id::{StreamIdAllocator, MAX_STREAMS, RESERVED_STREAM_ID};
pub use transport::{AsyncStream, BoxedStream, TcpTransport, Transport};

#[cfg(feature = "tls")]
pub use transport::TlsTransport;
