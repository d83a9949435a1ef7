//! Protocol enumerations: consistency levels, column types, result kinds,
//! error codes and event types.

use std::fmt;

use bytes::BytesMut;

use super::error::{ProtocolError, ProtocolResult};
use super::wire::{self, WireReader};

// ============================================================================
// Consistency
// ============================================================================

/// Consistency level sent with QUERY and EXECUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    #[default]
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
}

impl Consistency {
    /// Wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value.
    pub fn from_u16(value: u16) -> ProtocolResult<Self> {
        Ok(match value {
            0x0000 => Consistency::Any,
            0x0001 => Consistency::One,
            0x0002 => Consistency::Two,
            0x0003 => Consistency::Three,
            0x0004 => Consistency::Quorum,
            0x0005 => Consistency::All,
            0x0006 => Consistency::LocalQuorum,
            0x0007 => Consistency::EachQuorum,
            other => return Err(ProtocolError::UnknownConsistency(other)),
        })
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ColumnType
// ============================================================================

/// Column type ids as they appear in an `option`.
pub mod type_id {
    pub const CUSTOM: u16 = 0x0000;
    pub const ASCII: u16 = 0x0001;
    pub const BIGINT: u16 = 0x0002;
    pub const BLOB: u16 = 0x0003;
    pub const BOOLEAN: u16 = 0x0004;
    pub const COUNTER: u16 = 0x0005;
    pub const DECIMAL: u16 = 0x0006;
    pub const DOUBLE: u16 = 0x0007;
    pub const FLOAT: u16 = 0x0008;
    pub const INT: u16 = 0x0009;
    pub const TEXT: u16 = 0x000A;
    pub const TIMESTAMP: u16 = 0x000B;
    pub const UUID: u16 = 0x000C;
    pub const VARCHAR: u16 = 0x000D;
    pub const VARINT: u16 = 0x000E;
    pub const TIMEUUID: u16 = 0x000F;
    pub const INET: u16 = 0x0010;
    pub const LIST: u16 = 0x0020;
    pub const MAP: u16 = 0x0021;
    pub const SET: u16 = 0x0022;
}

/// Declared type of a column, including collection element types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Custom(String),
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Text,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    List(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Set(Box<ColumnType>),
}

impl ColumnType {
    /// Wire type id.
    pub fn id(&self) -> u16 {
        match self {
            ColumnType::Custom(_) => type_id::CUSTOM,
            ColumnType::Ascii => type_id::ASCII,
            ColumnType::BigInt => type_id::BIGINT,
            ColumnType::Blob => type_id::BLOB,
            ColumnType::Boolean => type_id::BOOLEAN,
            ColumnType::Counter => type_id::COUNTER,
            ColumnType::Decimal => type_id::DECIMAL,
            ColumnType::Double => type_id::DOUBLE,
            ColumnType::Float => type_id::FLOAT,
            ColumnType::Int => type_id::INT,
            ColumnType::Text => type_id::TEXT,
            ColumnType::Timestamp => type_id::TIMESTAMP,
            ColumnType::Uuid => type_id::UUID,
            ColumnType::Varchar => type_id::VARCHAR,
            ColumnType::Varint => type_id::VARINT,
            ColumnType::Timeuuid => type_id::TIMEUUID,
            ColumnType::Inet => type_id::INET,
            ColumnType::List(_) => type_id::LIST,
            ColumnType::Map(_, _) => type_id::MAP,
            ColumnType::Set(_) => type_id::SET,
        }
    }

    /// Class name of a custom type.
    pub fn custom_class(&self) -> Option<&str> {
        match self {
            ColumnType::Custom(class) => Some(class),
            _ => None,
        }
    }

    /// Element type of a list or set, key type of a map.
    pub fn primary(&self) -> Option<&ColumnType> {
        match self {
            ColumnType::List(t) | ColumnType::Set(t) | ColumnType::Map(t, _) => Some(t),
            _ => None,
        }
    }

    /// Value type of a map.
    pub fn secondary(&self) -> Option<&ColumnType> {
        match self {
            ColumnType::Map(_, v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is a list, set or map.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ColumnType::List(_) | ColumnType::Map(_, _) | ColumnType::Set(_)
        )
    }

    /// Read an `option` tree.
    pub fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let (id, class) = reader.read_option()?;
        Ok(match id {
            type_id::CUSTOM => ColumnType::Custom(class.unwrap_or_default().to_string()),
            type_id::ASCII => ColumnType::Ascii,
            type_id::BIGINT => ColumnType::BigInt,
            type_id::BLOB => ColumnType::Blob,
            type_id::BOOLEAN => ColumnType::Boolean,
            type_id::COUNTER => ColumnType::Counter,
            type_id::DECIMAL => ColumnType::Decimal,
            type_id::DOUBLE => ColumnType::Double,
            type_id::FLOAT => ColumnType::Float,
            type_id::INT => ColumnType::Int,
            type_id::TEXT => ColumnType::Text,
            type_id::TIMESTAMP => ColumnType::Timestamp,
            type_id::UUID => ColumnType::Uuid,
            type_id::VARCHAR => ColumnType::Varchar,
            type_id::VARINT => ColumnType::Varint,
            type_id::TIMEUUID => ColumnType::Timeuuid,
            type_id::INET => ColumnType::Inet,
            type_id::LIST => ColumnType::List(Box::new(Self::decode(reader)?)),
            type_id::SET => ColumnType::Set(Box::new(Self::decode(reader)?)),
            type_id::MAP => {
                let key = Self::decode(reader)?;
                let value = Self::decode(reader)?;
                ColumnType::Map(Box::new(key), Box::new(value))
            }
            other => return Err(ProtocolError::UnknownColumnType(other)),
        })
    }

    /// Write as an `option` tree.
    pub fn encode(&self, dst: &mut BytesMut) {
        wire::encode_option(dst, self.id(), self.custom_class());
        match self {
            ColumnType::List(t) | ColumnType::Set(t) => t.encode(dst),
            ColumnType::Map(k, v) => {
                k.encode(dst);
                v.encode(dst);
            }
            _ => {}
        }
    }

    /// Serialized size of the option tree.
    pub fn size(&self) -> usize {
        let own = match self {
            ColumnType::Custom(class) => 2 + wire::string_size(class),
            _ => 2,
        };
        own + match self {
            ColumnType::List(t) | ColumnType::Set(t) => t.size(),
            ColumnType::Map(k, v) => k.size() + v.size(),
            _ => 0,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Custom(class) => write!(f, "'{}'", class),
            ColumnType::Ascii => f.write_str("ascii"),
            ColumnType::BigInt => f.write_str("bigint"),
            ColumnType::Blob => f.write_str("blob"),
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Counter => f.write_str("counter"),
            ColumnType::Decimal => f.write_str("decimal"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Int => f.write_str("int"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Uuid => f.write_str("uuid"),
            ColumnType::Varchar => f.write_str("varchar"),
            ColumnType::Varint => f.write_str("varint"),
            ColumnType::Timeuuid => f.write_str("timeuuid"),
            ColumnType::Inet => f.write_str("inet"),
            ColumnType::List(t) => write!(f, "list<{}>", t),
            ColumnType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            ColumnType::Set(t) => write!(f, "set<{}>", t),
        }
    }
}

// ============================================================================
// ResultKind
// ============================================================================

/// Kind tag at the start of a RESULT body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResultKind {
    Void = 0x0001,
    Rows = 0x0002,
    SetKeyspace = 0x0003,
    Prepared = 0x0004,
    SchemaChange = 0x0005,
}

impl ResultKind {
    /// Parse a wire value.
    pub fn from_i32(value: i32) -> ProtocolResult<Self> {
        Ok(match value {
            0x0001 => ResultKind::Void,
            0x0002 => ResultKind::Rows,
            0x0003 => ResultKind::SetKeyspace,
            0x0004 => ResultKind::Prepared,
            0x0005 => ResultKind::SchemaChange,
            other => return Err(ProtocolError::UnknownResultKind(other)),
        })
    }
}

// ============================================================================
// ErrorCode
// ============================================================================

/// Error code carried by an ERROR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ServerError,
    ProtocolError,
    BadCredentials,
    Unavailable,
    Overloaded,
    IsBootstrapping,
    TruncateError,
    WriteTimeout,
    ReadTimeout,
    SyntaxError,
    Unauthorized,
    Invalid,
    ConfigError,
    AlreadyExists,
    Unprepared,
    /// Code not defined by protocol v1
    Other(i32),
}

impl ErrorCode {
    pub fn from_i32(code: i32) -> Self {
        match code {
            0x0000 => ErrorCode::ServerError,
            0x000A => ErrorCode::ProtocolError,
            0x0100 => ErrorCode::BadCredentials,
            0x1000 => ErrorCode::Unavailable,
            0x1001 => ErrorCode::Overloaded,
            0x1002 => ErrorCode::IsBootstrapping,
            0x1003 => ErrorCode::TruncateError,
            0x1100 => ErrorCode::WriteTimeout,
            0x1200 => ErrorCode::ReadTimeout,
            0x2000 => ErrorCode::SyntaxError,
            0x2100 => ErrorCode::Unauthorized,
            0x2200 => ErrorCode::Invalid,
            0x2300 => ErrorCode::ConfigError,
            0x2400 => ErrorCode::AlreadyExists,
            0x2500 => ErrorCode::Unprepared,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::ServerError => 0x0000,
            ErrorCode::ProtocolError => 0x000A,
            ErrorCode::BadCredentials => 0x0100,
            ErrorCode::Unavailable => 0x1000,
            ErrorCode::Overloaded => 0x1001,
            ErrorCode::IsBootstrapping => 0x1002,
            ErrorCode::TruncateError => 0x1003,
            ErrorCode::WriteTimeout => 0x1100,
            ErrorCode::ReadTimeout => 0x1200,
            ErrorCode::SyntaxError => 0x2000,
            ErrorCode::Unauthorized => 0x2100,
            ErrorCode::Invalid => 0x2200,
            ErrorCode::ConfigError => 0x2300,
            ErrorCode::AlreadyExists => 0x2400,
            ErrorCode::Unprepared => 0x2500,
            ErrorCode::Other(code) => code,
        }
    }

    /// Transient server-side conditions where a retry may succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCode::Unavailable
                | ErrorCode::Overloaded
                | ErrorCode::IsBootstrapping
                | ErrorCode::WriteTimeout
                | ErrorCode::ReadTimeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.as_i32())
    }
}

// ============================================================================
// EventType
// ============================================================================

/// Event classes a client can REGISTER for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TopologyChange,
    StatusChange,
    SchemaChange,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TopologyChange => "TOPOLOGY_CHANGE",
            EventType::StatusChange => "STATUS_CHANGE",
            EventType::SchemaChange => "SCHEMA_CHANGE",
        }
    }

    pub fn parse(s: &str) -> ProtocolResult<Self> {
        match s {
            "TOPOLOGY_CHANGE" => Ok(EventType::TopologyChange),
            "STATUS_CHANGE" => Ok(EventType::StatusChange),
            "SCHEMA_CHANGE" => Ok(EventType::SchemaChange),
            other => Err(ProtocolError::invalid(format!("unknown event type '{}'", other))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
