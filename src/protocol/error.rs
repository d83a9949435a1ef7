//! Protocol-level error types.

use std::fmt;
use std::io;

/// Result type for wire-level operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input ended before a declared length was satisfied
    TruncatedFrame { needed: usize, available: usize },

    /// A string field was not valid UTF-8
    InvalidUtf8(String),

    /// Opcode byte outside the known set
    UnknownOpcode(u8),

    /// RESULT kind outside the known set
    UnknownResultKind(i32),

    /// Column type id outside the known set
    UnknownColumnType(u16),

    /// Consistency value outside the known set
    UnknownConsistency(u16),

    /// Structurally invalid value (bad length, bad enum string, ...)
    InvalidValue(String),

    /// Frame body larger than the configured maximum
    FrameTooLarge { size: usize, max: usize },

    /// Body compression or decompression failed
    Compression(String),

    /// I/O failure surfaced through the frame codec
    Io { kind: io::ErrorKind, message: String },
}

impl ProtocolError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        ProtocolError::TruncatedFrame { needed, available }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidValue(msg.into())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TruncatedFrame { needed, available } => write!(
                f,
                "Truncated frame: needed {} bytes, {} available",
                needed, available
            ),
            ProtocolError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            ProtocolError::UnknownOpcode(op) => write!(f, "Unknown opcode: 0x{:02X}", op),
            ProtocolError::UnknownResultKind(k) => write!(f, "Unknown result kind: 0x{:04X}", k),
            ProtocolError::UnknownColumnType(t) => write!(f, "Unknown column type: 0x{:04X}", t),
            ProtocolError::UnknownConsistency(c) => {
                write!(f, "Unknown consistency level: 0x{:04X}", c)
            }
            ProtocolError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            ProtocolError::FrameTooLarge { size, max } => {
                write!(f, "Frame too large: {} bytes (max: {})", size, max)
            }
            ProtocolError::Compression(msg) => write!(f, "Compression error: {}", msg),
            ProtocolError::Io { message, .. } => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors raised by metadata lookups and row/collection accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No column with this name
    UnknownColumn(String),

    /// Single-name lookup on metadata without a global keyspace/table
    NoGlobalTableSpec,

    /// Column or element index past the end
    OutOfRange { index: usize, len: usize },

    /// Accessor does not match the declared type
    TypeMismatch { expected: String, actual: String },

    /// Cell is null
    NullValue(usize),

    /// Cell bytes do not form a valid value of the declared type
    Malformed(ProtocolError),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::UnknownColumn(name) => write!(f, "Unknown column: {}", name),
            AccessError::NoGlobalTableSpec => {
                write!(f, "Metadata has no global keyspace/table")
            }
            AccessError::OutOfRange { index, len } => {
                write!(f, "Index {} out of range (len: {})", index, len)
            }
            AccessError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, column is {}", expected, actual)
            }
            AccessError::NullValue(index) => write!(f, "Value at index {} is null", index),
            AccessError::Malformed(e) => write!(f, "Malformed value: {}", e),
        }
    }
}

impl std::error::Error for AccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AccessError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for AccessError {
    fn from(err: ProtocolError) -> Self {
        AccessError::Malformed(err)
    }
}

/// Result type for accessors.
pub type AccessResult<T> = Result<T, AccessError>;

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        ProtocolError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = ProtocolError::truncated(8, 3);
        assert_eq!(err.to_string(), "Truncated frame: needed 8 bytes, 3 available");
    }

    #[test]
    fn test_unknown_opcode_display() {
        let err = ProtocolError::UnknownOpcode(0x42);
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_from_io_keeps_kind() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, ProtocolError::Io { kind: io::ErrorKind::ConnectionReset, .. }));
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = ProtocolError::FrameTooLarge { size: 200, max: 100 };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("100"));
    }
}
