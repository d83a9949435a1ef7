//! Frame body compression.
//!
//! | Algorithm | STARTUP name | Body layout                                 |
//! |-----------|--------------|---------------------------------------------|
//! | Snappy    | `snappy`     | raw snappy block (length is self-described) |
//! | LZ4       | `lz4`        | `[int uncompressed_length][lz4 block]`      |

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::error::{ProtocolError, ProtocolResult};

/// Body compression algorithm negotiated in STARTUP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Snappy,
    Lz4,
}

impl Compression {
    /// Value of the STARTUP `COMPRESSION` option.
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
        }
    }

    /// Algorithm advertised under `name`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        [Compression::Snappy, Compression::Lz4]
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Compress a body.
    pub fn compress(self, body: &[u8]) -> ProtocolResult<Bytes> {
        match self {
            Compression::Snappy => snap::raw::Encoder::new()
                .compress_vec(body)
                .map(Bytes::from)
                .map_err(|e| ProtocolError::Compression(e.to_string())),
            Compression::Lz4 => {
                let block = lz4_flex::block::compress(body);
                let mut out = BytesMut::with_capacity(4 + block.len());
                out.put_i32(body.len() as i32);
                out.put_slice(&block);
                Ok(out.freeze())
            }
        }
    }

    /// Decompress a body.
    pub fn decompress(self, body: &[u8]) -> ProtocolResult<Bytes> {
        match self {
            Compression::Snappy => snap::raw::Decoder::new()
                .decompress_vec(body)
                .map(Bytes::from)
                .map_err(|e| ProtocolError::Compression(e.to_string())),
            Compression::Lz4 => {
                if body.len() < 4 {
                    return Err(ProtocolError::truncated(4, body.len()));
                }
                let len = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                if len < 0 {
                    return Err(ProtocolError::Compression(format!(
                        "negative uncompressed length {}",
                        len
                    )));
                }
                lz4_flex::block::decompress(&body[4..], len as usize)
                    .map(Bytes::from)
                    .map_err(|e| ProtocolError::Compression(e.to_string()))
            }
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_roundtrip() {
        let body = b"SELECT * FROM test_cf WHERE id = 1; ".repeat(20);
        let compressed = Compression::Lz4.compress(&body).unwrap();
        assert!(compressed.len() < body.len());
        let restored = Compression::Lz4.decompress(&compressed).unwrap();
        assert_eq!(&restored[..], &body[..]);
    }

    #[test]
    fn test_snappy_roundtrip() {
        let body = b"SELECT * FROM test_cf WHERE id = 1; ".repeat(20);
        let compressed = Compression::Snappy.compress(&body).unwrap();
        assert!(compressed.len() < body.len());
        let restored = Compression::Snappy.decompress(&compressed).unwrap();
        assert_eq!(&restored[..], &body[..]);
    }

    #[test]
    fn test_snappy_corrupt() {
        let err = Compression::Snappy.decompress(&[0x05]).unwrap_err();
        assert!(matches!(err, ProtocolError::Compression(_)));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Compression::from_name("snappy"), Some(Compression::Snappy));
        assert_eq!(Compression::from_name("LZ4"), Some(Compression::Lz4));
        assert_eq!(Compression::from_name("deflate"), None);
        assert_eq!(Compression::Snappy.to_string(), "snappy");
    }

    #[test]
    fn test_lz4_truncated() {
        assert!(matches!(
            Compression::Lz4.decompress(&[0, 0]),
            Err(ProtocolError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn test_lz4_corrupt() {
        let err = Compression::Lz4.decompress(&[0, 0, 0, 50, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, ProtocolError::Compression(_)));
    }
}
