//! Connection and pool configuration.

use std::fmt;
use std::time::Duration;

use crate::protocol::message::DEFAULT_CQL_VERSION;
use crate::protocol::{Compression, Credentials, EventType, DEFAULT_MAX_FRAME_SIZE};

use super::error::{DriverError, DriverResult};
use super::log::LogSink;

/// Default native protocol port.
pub const DEFAULT_PORT: u16 = 9042;

// ============================================================================
// ServerAddress
// ============================================================================

/// Server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Unclosed '[' in {}", s)))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                t => parse_port(t.strip_prefix(':').ok_or_else(|| {
                    DriverError::configuration(format!("Invalid server address: {}", s))
                })?)?,
            };
            return Ok(Self::new(host, port));
        }

        match s.split_once(':') {
            None => Ok(Self::new(s, DEFAULT_PORT)),
            Some((host, port)) if !port.contains(':') => Ok(Self::new(host, parse_port(port)?)),
            // Bare IPv6 without brackets
            Some(_) => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

fn parse_port(s: &str) -> DriverResult<u16> {
    s.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port: {}", s)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Per-connection settings.
///
/// # Fields
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `cql_version` | `"3.0.0"` | STARTUP `CQL_VERSION` |
/// | `compression` | none | `snappy` or `lz4`, used only if SUPPORTED offers it |
/// | `credentials` | none | answer to AUTHENTICATE |
/// | `events` | none | REGISTERed after READY |
/// | `connect_timeout` | 30s | resolve + connect + TLS handshake |
/// | `max_frame_size` | 256 MiB | largest body sent or accepted |
/// | `log_sink` | none | extra diagnostics receiver |
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Sent as STARTUP `CQL_VERSION`
    pub cql_version: String,
    /// Body compression requested in STARTUP
    pub compression: Option<Compression>,
    /// Answer to AUTHENTICATE
    pub credentials: Option<Credentials>,
    /// Events to REGISTER for after READY
    pub events: Vec<EventType>,
    /// Bound on resolve + connect + TLS handshake
    pub connect_timeout: Duration,
    /// Largest frame body sent or accepted
    pub max_frame_size: usize,
    /// Receives every diagnostic
    pub log_sink: Option<LogSink>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cql_version: DEFAULT_CQL_VERSION.to_string(),
            compression: None,
            credentials: None,
            events: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            log_sink: None,
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("cql_version", &self.cql_version)
            .field("compression", &self.compression)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("events", &self.events)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_frame_size", &self.max_frame_size)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Connection config builder.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn cql_version(mut self, version: impl Into<String>) -> Self {
        self.config.cql_version = version.into();
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = Some(compression);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Username/password for the password authenticator.
    pub fn password_auth(self, username: &str, password: &str) -> Self {
        self.credentials(Credentials::password(username, password))
    }

    pub fn events(mut self, events: Vec<EventType>) -> Self {
        self.config.events = events;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.config.log_sink = Some(sink);
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Pool settings.
///
/// # Fields
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `reconnect_limit` | 3 | consecutive errors before eviction |
/// | `reconnect_delay` | 0 | pause before a pool-driven reconnect |
/// | `connection` | `ConnectionConfig::default()` | template for `add_client` |
///
/// # Example
///
/// ```rust,ignore
/// let config = PoolConfig::builder()
///     .reconnect_limit(5)
///     .reconnect_delay(Duration::from_millis(500))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Consecutive errors tolerated before a connection is evicted
    pub reconnect_limit: usize,
    /// Pause before each pool-driven reconnect
    pub reconnect_delay: Duration,
    /// Template for connections created by `add_client`
    pub connection: ConnectionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reconnect_limit: 3,
            reconnect_delay: Duration::ZERO,
            connection: ConnectionConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// Pool config builder.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn reconnect_limit(mut self, limit: usize) -> Self {
        self.config.reconnect_limit = limit;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.config.connection = connection;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}
