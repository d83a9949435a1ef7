//! Frame codec for tokio_util.
//!
//! A frame is the 8-byte [`FrameHeader`] followed by exactly `length` body
//! bytes. The decoder never interprets the opcode, so frames with unknown
//! opcodes are still consumed whole and the stream stays framed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::ProtocolError;
use super::header::{FrameHeader, HEADER_SIZE};

/// Default upper bound on a frame body (256 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// One protocol message: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Build a frame, fixing the header length to the body size.
    pub fn new(mut header: FrameHeader, body: Bytes) -> Self {
        header.length = body.len() as u32;
        Self { header, body }
    }

    /// Total size on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Frame codec.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
    /// Header read ahead of its body
    pending: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a codec with the default size limit.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom size limit.
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            pending: None,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending {
            Some(header) => header,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = FrameHeader::decode_slice(&src[..HEADER_SIZE])?;
                let size = header.length as usize;
                if size > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size,
                        max: self.max_frame_size,
                    });
                }
                src.advance(HEADER_SIZE);
                self.pending = Some(header);
                header
            }
        };

        let size = header.length as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        self.pending = None;
        let body = src.split_to(size).freeze();
        Ok(Some(Frame { header, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.body.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: item.body.len(),
                max: self.max_frame_size,
            });
        }
        let mut header = item.header;
        header.length = item.body.len() as u32;
        dst.reserve(HEADER_SIZE + item.body.len());
        dst.put_slice(&header.encode());
        dst.put_slice(&item.body);
        Ok(())
    }
}
