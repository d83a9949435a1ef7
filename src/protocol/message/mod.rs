//! Protocol messages.
//!
//! [`Message`] is a closed sum over the thirteen opcodes. Each variant
//! knows its opcode, its serialized body size and how to encode/decode
//! its body. [`Envelope`] adds the per-frame data (stream id, tracing id)
//! and handles body compression.

pub mod event;
pub mod request;
pub mod response;
pub mod result;

pub use event::*;
pub use request::*;
pub use response::*;
pub use result::*;

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::compression::Compression;
use super::error::{ProtocolError, ProtocolResult};
use super::frame::Frame;
use super::header::{FrameHeader, Opcode, FLAG_COMPRESSION, FLAG_TRACING};
use super::wire::WireReader;

/// All protocol messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// ERROR - Request failed
    Error(ErrorMessage),
    /// STARTUP - Initialize the connection
    Startup(Startup),
    /// READY - Connection is ready for queries
    Ready,
    /// AUTHENTICATE - Credentials are required
    Authenticate(Authenticate),
    /// CREDENTIALS - Answer to AUTHENTICATE
    Credentials(Credentials),
    /// OPTIONS - Ask for supported startup options
    Options,
    /// SUPPORTED - Answer to OPTIONS
    Supported(Supported),
    /// QUERY - Run a statement
    Query(Query),
    /// RESULT - Answer to QUERY, PREPARE or EXECUTE
    Result(QueryResult),
    /// PREPARE - Prepare a statement
    Prepare(Prepare),
    /// EXECUTE - Run a prepared statement
    Execute(Execute),
    /// REGISTER - Subscribe to events
    Register(Register),
    /// EVENT - Server push
    Event(Event),
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Error(_) => Opcode::Error,
            Message::Startup(_) => Opcode::Startup,
            Message::Ready => Opcode::Ready,
            Message::Authenticate(_) => Opcode::Authenticate,
            Message::Credentials(_) => Opcode::Credentials,
            Message::Options => Opcode::Options,
            Message::Supported(_) => Opcode::Supported,
            Message::Query(_) => Opcode::Query,
            Message::Result(_) => Opcode::Result,
            Message::Prepare(_) => Opcode::Prepare,
            Message::Execute(_) => Opcode::Execute,
            Message::Register(_) => Opcode::Register,
            Message::Event(_) => Opcode::Event,
        }
    }

    /// Message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Error(_) => "ERROR",
            Message::Startup(_) => "STARTUP",
            Message::Ready => "READY",
            Message::Authenticate(_) => "AUTHENTICATE",
            Message::Credentials(_) => "CREDENTIALS",
            Message::Options => "OPTIONS",
            Message::Supported(_) => "SUPPORTED",
            Message::Query(_) => "QUERY",
            Message::Result(_) => "RESULT",
            Message::Prepare(_) => "PREPARE",
            Message::Execute(_) => "EXECUTE",
            Message::Register(_) => "REGISTER",
            Message::Event(_) => "EVENT",
        }
    }

    pub fn is_request(&self) -> bool {
        self.opcode().is_request()
    }

    /// Serialized body size.
    pub fn size(&self) -> usize {
        match self {
            Message::Error(m) => m.size(),
            Message::Startup(m) => m.size(),
            Message::Ready | Message::Options => 0,
            Message::Authenticate(m) => m.size(),
            Message::Credentials(m) => m.size(),
            Message::Supported(m) => m.size(),
            Message::Query(m) => m.size(),
            Message::Result(m) => m.size(),
            Message::Prepare(m) => m.size(),
            Message::Execute(m) => m.size(),
            Message::Register(m) => m.size(),
            Message::Event(m) => m.size(),
        }
    }

    /// Append the body to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Message::Error(m) => m.encode(dst),
            Message::Startup(m) => m.encode(dst),
            Message::Ready | Message::Options => {}
            Message::Authenticate(m) => m.encode(dst),
            Message::Credentials(m) => m.encode(dst),
            Message::Supported(m) => m.encode(dst),
            Message::Query(m) => m.encode(dst),
            Message::Result(m) => m.encode(dst),
            Message::Prepare(m) => m.encode(dst),
            Message::Execute(m) => m.encode(dst),
            Message::Register(m) => m.encode(dst),
            Message::Event(m) => m.encode(dst),
        }
    }

    /// Body as a standalone buffer.
    pub fn to_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a body for `opcode`. The whole body must be consumed.
    pub fn decode(opcode: Opcode, body: Bytes) -> ProtocolResult<Self> {
        let mut reader = WireReader::new(&body);
        let message = match opcode {
            Opcode::Error => Message::Error(ErrorMessage::decode(&mut reader)?),
            Opcode::Startup => Message::Startup(Startup::decode(&mut reader)?),
            Opcode::Ready => Message::Ready,
            Opcode::Authenticate => Message::Authenticate(Authenticate::decode(&mut reader)?),
            Opcode::Credentials => Message::Credentials(Credentials::decode(&mut reader)?),
            Opcode::Options => Message::Options,
            Opcode::Supported => Message::Supported(Supported::decode(&mut reader)?),
            Opcode::Query => Message::Query(Query::decode(&mut reader)?),
            Opcode::Prepare => Message::Prepare(Prepare::decode(&mut reader)?),
            Opcode::Execute => Message::Execute(Execute::decode(&mut reader)?),
            Opcode::Register => Message::Register(Register::decode(&mut reader)?),
            Opcode::Event => Message::Event(Event::decode(&mut reader)?),
            Opcode::Result => return QueryResult::decode(body.clone()).map(Message::Result),
        };
        if reader.remaining() > 0 {
            return Err(ProtocolError::invalid(format!(
                "{} trailing bytes after {} body",
                reader.remaining(),
                message.name()
            )));
        }
        Ok(message)
    }

    /// Build a frame on `stream`, compressing the body when requested.
    ///
    /// STARTUP and OPTIONS are never compressed since they precede the
    /// compression agreement.
    pub fn to_frame(&self, stream: i8, compression: Option<Compression>) -> Frame {
        let opcode = self.opcode();
        let mut header = if opcode.is_request() {
            FrameHeader::request(stream, opcode, 0)
        } else {
            FrameHeader::response(stream, opcode, 0)
        };
        let mut body = self.to_body();
        if let Some(c) = compression {
            if !matches!(opcode, Opcode::Startup | Opcode::Options) && !body.is_empty() {
                // A body the algorithm rejects goes out uncompressed.
                if let Ok(compressed) = c.compress(&body) {
                    body = compressed;
                    header = header.with_flags(FLAG_COMPRESSION);
                }
            }
        }
        Frame::new(header, body)
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub stream: i8,
    /// Tracing session of a traced request
    pub tracing_id: Option<Uuid>,
    pub message: Message,
}

impl Envelope {
    /// Decode a frame, decompressing and stripping the tracing id first.
    pub fn from_frame(frame: Frame, compression: Option<Compression>) -> ProtocolResult<Self> {
        let header = frame.header;
        let opcode = header
            .opcode()
            .ok_or(ProtocolError::UnknownOpcode(header.opcode))?;

        let mut body = frame.body;
        if header.is_compressed() {
            let c = compression.ok_or_else(|| {
                ProtocolError::Compression("compressed frame but no compression negotiated".into())
            })?;
            body = c.decompress(&body)?;
        }

        let tracing_id = if header.is_tracing() && header.is_response() {
            let id: [u8; 16] = body
                .get(..16)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| ProtocolError::truncated(16, body.len()))?;
            body = body.slice(16..);
            Some(Uuid::from_bytes(id))
        } else {
            None
        };

        Ok(Self {
            stream: header.stream,
            tracing_id,
            message: Message::decode(opcode, body)?,
        })
    }

    /// Build a traced response frame (the tracing id precedes the body).
    pub fn to_frame(&self, compression: Option<Compression>) -> Frame {
        let Some(tracing_id) = self.tracing_id else {
            return self.message.to_frame(self.stream, compression);
        };
        let plain = self.message.to_frame(self.stream, None);
        let mut body = BytesMut::with_capacity(16 + plain.body.len());
        body.extend_from_slice(tracing_id.as_bytes());
        body.extend_from_slice(&plain.body);
        let mut body = body.freeze();
        let mut header = plain.header.with_flags(FLAG_TRACING);
        if let Some(Ok(compressed)) = compression.map(|c| c.compress(&body)) {
            body = compressed;
            header = header.with_flags(FLAG_COMPRESSION);
        }
        Frame::new(header, body)
    }
}
