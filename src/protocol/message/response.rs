//! ERROR, AUTHENTICATE and SUPPORTED bodies.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::protocol::error::ProtocolResult;
use crate::protocol::types::{Consistency, ErrorCode};
use crate::protocol::wire::{self, StringMultimap, WireReader};

use super::request::{COMPRESSION, CQL_VERSION};

/// ERROR - The server rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    pub detail: ErrorDetail,
}

/// Code-specific fields following the message string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    #[default]
    None,
    Unavailable {
        consistency: Consistency,
        required: i32,
        alive: i32,
    },
    WriteTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        write_type: String,
    },
    ReadTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    AlreadyExists {
        keyspace: String,
        table: String,
    },
    Unprepared {
        id: Bytes,
    },
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: ErrorDetail::None,
        }
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = detail;
        self
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_int(dst, self.code.as_i32());
        wire::encode_string(dst, &self.message);
        match &self.detail {
            ErrorDetail::None => {}
            ErrorDetail::Unavailable {
                consistency,
                required,
                alive,
            } => {
                wire::encode_short(dst, consistency.as_u16());
                wire::encode_int(dst, *required);
                wire::encode_int(dst, *alive);
            }
            ErrorDetail::WriteTimeout {
                consistency,
                received,
                block_for,
                write_type,
            } => {
                wire::encode_short(dst, consistency.as_u16());
                wire::encode_int(dst, *received);
                wire::encode_int(dst, *block_for);
                wire::encode_string(dst, write_type);
            }
            ErrorDetail::ReadTimeout {
                consistency,
                received,
                block_for,
                data_present,
            } => {
                wire::encode_short(dst, consistency.as_u16());
                wire::encode_int(dst, *received);
                wire::encode_int(dst, *block_for);
                wire::encode_bool(dst, *data_present);
            }
            ErrorDetail::AlreadyExists { keyspace, table } => {
                wire::encode_string(dst, keyspace);
                wire::encode_string(dst, table);
            }
            ErrorDetail::Unprepared { id } => wire::encode_short_bytes(dst, id),
        }
    }

    pub(super) fn size(&self) -> usize {
        4 + wire::string_size(&self.message)
            + match &self.detail {
                ErrorDetail::None => 0,
                ErrorDetail::Unavailable { .. } => 2 + 4 + 4,
                ErrorDetail::WriteTimeout { write_type, .. } => {
                    2 + 4 + 4 + wire::string_size(write_type)
                }
                ErrorDetail::ReadTimeout { .. } => 2 + 4 + 4 + 1,
                ErrorDetail::AlreadyExists { keyspace, table } => {
                    wire::string_size(keyspace) + wire::string_size(table)
                }
                ErrorDetail::Unprepared { id } => wire::short_bytes_size(id),
            }
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let code = ErrorCode::from_i32(reader.read_int()?);
        let message = reader.read_string()?.to_string();
        let detail = match code {
            ErrorCode::Unavailable => ErrorDetail::Unavailable {
                consistency: Consistency::from_u16(reader.read_short()?)?,
                required: reader.read_int()?,
                alive: reader.read_int()?,
            },
            ErrorCode::WriteTimeout => ErrorDetail::WriteTimeout {
                consistency: Consistency::from_u16(reader.read_short()?)?,
                received: reader.read_int()?,
                block_for: reader.read_int()?,
                write_type: reader.read_string()?.to_string(),
            },
            ErrorCode::ReadTimeout => ErrorDetail::ReadTimeout {
                consistency: Consistency::from_u16(reader.read_short()?)?,
                received: reader.read_int()?,
                block_for: reader.read_int()?,
                data_present: reader.read_bool()?,
            },
            ErrorCode::AlreadyExists => ErrorDetail::AlreadyExists {
                keyspace: reader.read_string()?.to_string(),
                table: reader.read_string()?.to_string(),
            },
            ErrorCode::Unprepared => ErrorDetail::Unprepared {
                id: Bytes::copy_from_slice(reader.read_short_bytes()?),
            },
            _ => ErrorDetail::None,
        };
        Ok(Self {
            code,
            message,
            detail,
        })
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// AUTHENTICATE - The server requires credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    /// Class name of the server authenticator
    pub authenticator: String,
}

impl Authenticate {
    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string(dst, &self.authenticator);
    }

    pub(super) fn size(&self) -> usize {
        wire::string_size(&self.authenticator)
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            authenticator: reader.read_string()?.to_string(),
        })
    }
}

/// SUPPORTED - Answer to OPTIONS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Supported {
    pub options: StringMultimap,
}

impl Supported {
    pub fn new(options: StringMultimap) -> Self {
        Self { options }
    }

    /// Values advertised for `key`.
    pub fn get(&self, key: &str) -> &[String] {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn cql_versions(&self) -> &[String] {
        self.get(CQL_VERSION)
    }

    pub fn compression(&self) -> &[String] {
        self.get(COMPRESSION)
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string_multimap(dst, &self.options);
    }

    pub(super) fn size(&self) -> usize {
        wire::string_multimap_size(&self.options)
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            options: reader.read_string_multimap()?,
        })
    }
}
