//! # CQL Binary Protocol v1
//!
//! Low-level codec for the CQL binary protocol, version 1.
//!
//! ## Overview
//!
//! Every message travels in a frame: a fixed 8-byte header (version,
//! flags, stream id, opcode, body length) followed by the body. This
//! module provides:
//!
//! - **Wire primitives** - `[short]`, `[string]`, `[bytes]`, maps, options, inet
//! - **Frame header and codec** - Async framing for Tokio
//! - **Messages** - STARTUP, QUERY, RESULT, EVENT and the rest
//! - **Result views** - Metadata, rows and lazy collection views over the
//!   received buffer
//!
//! ## Submodules
//!
//! - [`wire`] - Primitive encode/decode
//! - [`header`] - Frame header and opcodes
//! - [`frame`] - Tokio codec
//! - [`message`] - Message bodies
//! - [`metadata`] - Result column metadata
//! - [`rows`] / [`collection`] - Row and collection views
//! - [`value`] - Cell value conversions
//! - [`compression`] - Body compression
//!
//! ## Note
//!
//! Most users should use [`crate::driver`] instead of this module directly.

pub mod collection;
pub mod compression;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod metadata;
pub mod rows;
pub mod types;
pub mod value;
pub mod wire;

pub use collection::{ListView, MapView, SetView};
pub use compression::Compression;
pub use error::{AccessError, AccessResult, ProtocolError, ProtocolResult};
pub use frame::{Frame, FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use header::{FrameHeader, Opcode, EVENT_STREAM_ID, HEADER_SIZE};
pub use message::{
    Authenticate, Credentials, Envelope, ErrorDetail, ErrorMessage, Event, Execute, Message,
    Prepare, Prepared, Query, QueryResult, Register, SchemaChange, Startup, Supported,
};
pub use metadata::{ColumnSpec, ResultMetadata};
pub use rows::{Row, Rows};
pub use types::{ColumnType, Consistency, ErrorCode, EventType, ResultKind};
pub use value::{FromCql, ToCql, Varint};
