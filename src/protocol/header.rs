//! Fixed 8-byte frame header.
//!
//! ```text
//! 0         8        16        24        32
//! +---------+---------+---------+---------+
//! | version |  flags  | stream  | opcode  |
//! +---------+---------+---------+---------+
//! |                length                 |
//! +---------+---------+---------+---------+
//! ```

use std::fmt;

use super::error::{ProtocolError, ProtocolResult};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Version byte of requests (protocol v1).
pub const REQUEST_VERSION: u8 = 0x01;

/// Version byte of responses (protocol v1, direction bit set).
pub const RESPONSE_VERSION: u8 = 0x81;

/// Mask selecting the direction bit of the version byte.
pub const DIRECTION_MASK: u8 = 0x80;

/// Header flag: body is compressed.
pub const FLAG_COMPRESSION: u8 = 0x01;

/// Header flag: tracing requested / tracing id present.
pub const FLAG_TRACING: u8 = 0x02;

/// Stream id used by the server for unsolicited EVENT frames.
pub const EVENT_STREAM_ID: i8 = -1;

/// Message opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Credentials = 0x04,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
}

impl Opcode {
    /// Map a raw byte to an opcode; `None` for bytes outside the closed set.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Opcode::Error,
            0x01 => Opcode::Startup,
            0x02 => Opcode::Ready,
            0x03 => Opcode::Authenticate,
            0x04 => Opcode::Credentials,
            0x05 => Opcode::Options,
            0x06 => Opcode::Supported,
            0x07 => Opcode::Query,
            0x08 => Opcode::Result,
            0x09 => Opcode::Prepare,
            0x0A => Opcode::Execute,
            0x0B => Opcode::Register,
            0x0C => Opcode::Event,
            _ => return None,
        })
    }

    /// Raw byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether clients send this opcode.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Opcode::Startup
                | Opcode::Credentials
                | Opcode::Options
                | Opcode::Query
                | Opcode::Prepare
                | Opcode::Execute
                | Opcode::Register
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Error => "ERROR",
            Opcode::Startup => "STARTUP",
            Opcode::Ready => "READY",
            Opcode::Authenticate => "AUTHENTICATE",
            Opcode::Credentials => "CREDENTIALS",
            Opcode::Options => "OPTIONS",
            Opcode::Supported => "SUPPORTED",
            Opcode::Query => "QUERY",
            Opcode::Result => "RESULT",
            Opcode::Prepare => "PREPARE",
            Opcode::Execute => "EXECUTE",
            Opcode::Register => "REGISTER",
            Opcode::Event => "EVENT",
        };
        f.write_str(name)
    }
}

/// Frame header.
///
/// The opcode is kept as a raw byte so frames with unknown opcodes can still
/// be framed and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: u8,
    pub stream: i8,
    pub opcode: u8,
    pub length: u32,
}

impl FrameHeader {
    /// Header for a client request.
    pub fn request(stream: i8, opcode: Opcode, length: u32) -> Self {
        Self {
            version: REQUEST_VERSION,
            flags: 0,
            stream,
            opcode: opcode.as_u8(),
            length,
        }
    }

    /// Header for a server response.
    pub fn response(stream: i8, opcode: Opcode, length: u32) -> Self {
        Self {
            version: RESPONSE_VERSION,
            flags: 0,
            stream,
            opcode: opcode.as_u8(),
            length,
        }
    }

    /// Set additional flag bits.
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    /// Known opcode, if any.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Whether the direction bit marks this as a response.
    pub fn is_response(&self) -> bool {
        self.version & DIRECTION_MASK != 0
    }

    /// Protocol version without the direction bit.
    pub fn protocol_version(&self) -> u8 {
        self.version & !DIRECTION_MASK
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSION != 0
    }

    pub fn is_tracing(&self) -> bool {
        self.flags & FLAG_TRACING != 0
    }

    /// Serialize into a fixed buffer.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_be_bytes();
        [
            self.version,
            self.flags,
            self.stream as u8,
            self.opcode,
            len[0],
            len[1],
            len[2],
            len[3],
        ]
    }

    /// Deserialize from a fixed buffer.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            version: buf[0],
            flags: buf[1],
            stream: buf[2] as i8,
            opcode: buf[3],
            length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// Deserialize from the start of a slice.
    pub fn decode_slice(buf: &[u8]) -> ProtocolResult<Self> {
        let fixed: &[u8; HEADER_SIZE] = buf
            .get(..HEADER_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ProtocolError::truncated(HEADER_SIZE, buf.len()))?;
        Ok(Self::decode(fixed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        for stream in [i8::MIN, -1, 0, 1, 64, i8::MAX] {
            for length in [0u32, 1, 8, 65_536, u32::MAX] {
                let header = FrameHeader {
                    version: 0x81,
                    flags: 0x03,
                    stream,
                    opcode: 0x08,
                    length,
                };
                let bytes = header.encode();
                assert_eq!(bytes.len(), HEADER_SIZE);
                assert_eq!(FrameHeader::decode(&bytes), header);
            }
        }
    }

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::request(5, Opcode::Query, 0x0102_0304);
        assert_eq!(header.encode(), [0x01, 0x00, 0x05, 0x07, 0x01, 0x02, 0x03, 0x04]);
        assert!(!header.is_response());

        let header = FrameHeader::response(-1, Opcode::Event, 0);
        assert_eq!(header.encode()[2], 0xFF);
        assert!(header.is_response());
        assert_eq!(header.protocol_version(), 1);
    }

    #[test]
    fn test_opcode_closed_set() {
        for raw in 0x00u8..=0x0C {
            let op = Opcode::from_u8(raw).unwrap();
            assert_eq!(op.as_u8(), raw);
        }
        assert!(Opcode::from_u8(0x0D).is_none());
        assert!(Opcode::from_u8(0xFF).is_none());
        assert!(Opcode::Query.is_request());
        assert!(!Opcode::Result.is_request());
    }

    #[test]
    fn test_unknown_opcode_header_still_decodes() {
        let bytes = [0x81, 0x00, 0x02, 0x42, 0x00, 0x00, 0x00, 0x04];
        let header = FrameHeader::decode(&bytes);
        assert_eq!(header.opcode(), None);
        assert_eq!(header.length, 4);
    }

    #[test]
    fn test_flags() {
        let header = FrameHeader::request(1, Opcode::Query, 0).with_flags(FLAG_TRACING);
        assert!(header.is_tracing());
        assert!(!header.is_compressed());
    }

    #[test]
    fn test_decode_slice_truncated() {
        assert!(matches!(
            FrameHeader::decode_slice(&[0x81, 0x00]),
            Err(ProtocolError::TruncatedFrame { needed: 8, available: 2 })
        ));
    }
}
