//! Driver Error Types
//!
//! High-level error taxonomy delivered to callers, callbacks and pool hooks.

use std::io;

use thiserror::Error;

use crate::protocol::{AccessError, ErrorCode, ErrorDetail, ErrorMessage, ProtocolError};

// ============================================================================
// DriverError
// ============================================================================

/// Driver error.
///
/// Clonable so one failure can be delivered to every pending request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// DNS, connect, handshake, read or write failure
    #[error("Transport error ({kind:?}): {message}")]
    Transport { kind: io::ErrorKind, message: String },

    /// Malformed or truncated frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// ERROR frame returned for a request
    #[error("Server error {code}: {message}")]
    Server {
        code: ErrorCode,
        message: String,
        detail: ErrorDetail,
    },

    /// All usable stream ids are in flight
    #[error("Too many in-flight requests: no free stream id")]
    StreamExhaustion,

    /// No ready connection in the pool
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// Connection has not finished its handshake
    #[error("Connection not ready: {0}")]
    NotReady(String),

    /// Connection went away with the request pending
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Null value in column {0}")]
    NullValue(usize),

    #[error("Index {index} out of range (len: {len})")]
    OutOfRange { index: usize, len: usize },

    /// Server asked for credentials that were rejected or not configured
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl DriverError {
    /// Transport error from an I/O error.
    pub fn transport(err: &io::Error) -> Self {
        Self::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Transport error with an explicit kind.
    pub fn transport_msg(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: msg.into(),
        }
    }

    pub fn pool_exhausted(msg: impl Into<String>) -> Self {
        Self::PoolExhausted(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Whether this came from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ConnectionClosed)
    }

    /// Whether a retry (possibly on another connection) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::ConnectionClosed
            | Self::StreamExhaustion
            | Self::PoolExhausted(_)
            | Self::NotReady(_)
            | Self::Timeout(_) => true,
            Self::Server { code, .. } => code.is_transient(),
            _ => false,
        }
    }

    /// Server error code, if this is a server error.
    pub fn server_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        Self::transport(&err)
    }
}

impl From<ErrorMessage> for DriverError {
    fn from(err: ErrorMessage) -> Self {
        Self::Server {
            code: err.code,
            message: err.message,
            detail: err.detail,
        }
    }
}

impl From<AccessError> for DriverError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::UnknownColumn(name) => Self::UnknownColumn(name),
            AccessError::NoGlobalTableSpec => {
                Self::UnknownColumn("no global keyspace/table for name lookup".to_string())
            }
            AccessError::OutOfRange { index, len } => Self::OutOfRange { index, len },
            AccessError::TypeMismatch { expected, actual } => Self::TypeMismatch { expected, actual },
            AccessError::NullValue(column) => Self::NullValue(column),
            AccessError::Malformed(e) => Self::Protocol(e),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// Driver result type.
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::transport_msg(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(err.to_string(), "Transport error (ConnectionRefused): refused");
        assert_eq!(
            DriverError::StreamExhaustion.to_string(),
            "Too many in-flight requests: no free stream id"
        );
    }

    #[test]
    fn test_from_io() {
        let err: DriverError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(
            err,
            DriverError::Transport {
                kind: io::ErrorKind::BrokenPipe,
                ..
            }
        ));
        assert!(err.is_transport());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_server_error() {
        let err: DriverError = ErrorMessage::new(ErrorCode::Overloaded, "busy").into();
        assert_eq!(err.server_code(), Some(ErrorCode::Overloaded));
        assert!(err.is_retryable());

        let err: DriverError = ErrorMessage::new(ErrorCode::SyntaxError, "bad").into();
        assert!(!err.is_retryable());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_from_access_error() {
        assert_eq!(
            DriverError::from(AccessError::NullValue(3)),
            DriverError::NullValue(3)
        );
        assert!(matches!(
            DriverError::from(AccessError::NoGlobalTableSpec),
            DriverError::UnknownColumn(_)
        ));
        assert!(matches!(
            DriverError::from(AccessError::Malformed(ProtocolError::invalid("x"))),
            DriverError::Protocol(_)
        ));
    }
}
