//! # CQL Driver
//!
//! An async client driver for the CQL binary protocol, version 1.
//!
//! ## Features
//!
//! - **Binary codec** - Frame headers, every request and response body, and
//!   all scalar and collection cell types
//! - **Multiplexing** - Up to 127 concurrent requests per connection, routed
//!   back to their callers by stream id
//! - **Handshake** - OPTIONS / STARTUP / AUTHENTICATE / REGISTER handled for you
//! - **Connection Pooling** - Round-robin routing with bounded reconnects and
//!   eviction of failing nodes
//! - **Typed rows** - Zero-copy row and collection views over the received frame
//! - **Compression** - LZ4 frame bodies when the server offers it
//! - **TLS** - rustls transport behind the `tls` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cql_driver::{Connection, ConnectionConfig, Consistency};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::builder()
//!         .password_auth("cassandra", "cassandra")
//!         .build();
//!     let conn = Connection::tcp(config);
//!     conn.connect("127.0.0.1", 9042).await?;
//!     conn.wait_ready().await?;
//!
//!     let (_, response) = conn.query("SELECT key, value FROM km.test_cf", Consistency::One)?;
//!     let response = response.await?;
//!     if let Some(rows) = response.result.rows() {
//!         for row in rows {
//!             let key: &str = row.get(0)?;
//!             let value: Option<i32> = row.get_opt(1)?;
//!             println!("{} = {:?}", key, value);
//!         }
//!     }
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Prepared Statements
//!
//! ```rust,no_run
//! # use cql_driver::{Connection, Consistency, ToCql};
//! # async fn example(conn: Connection) -> Result<(), Box<dyn std::error::Error>> {
//! let (_, prepared) = conn.prepare("INSERT INTO km.test_cf (key, value) VALUES (?, ?)")?;
//! let prepared = prepared.await?;
//! let id = prepared.result.prepared().map(|p| p.id.clone()).ok_or("not prepared")?;
//!
//! let values = vec![Some("k1".to_cql()), Some(42i32.to_cql())];
//! let (_, done) = conn.execute(id, values, Consistency::Quorum)?;
//! done.await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Server Events
//!
//! ```rust,no_run
//! use cql_driver::{Connection, ConnectionConfig, EventType};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectionConfig::builder()
//!     .events(vec![EventType::TopologyChange, EventType::StatusChange])
//!     .build();
//! let conn = Connection::tcp(config);
//! let mut events = conn.event_stream();
//! conn.connect("127.0.0.1", 9042).await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Wire codec, messages and result views
//! - [`driver`] - Connections, pool, transports and configuration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;
pub mod protocol;

// Re-exports for convenience
pub use driver::{
    Connection, ConnectionConfig, ConnectionId, ConnectionPool, ConnectionState, DriverError,
    DriverResult, EventStream, LogLevel, PoolConfig, PoolMetrics, Response, ResponseFuture,
    ServerAddress, TcpTransport, Transport,
};

pub use protocol::{
    ColumnType, Compression, Consistency, ErrorCode, Event, EventType, FromCql, QueryResult,
    Row, Rows, ToCql,
};
