//! Wire primitives.
//!
//! Every primitive of the protocol has an `encode_*` function writing into a
//! [`BytesMut`] and a `decode_*` function reading from an immutable slice.
//! Decoders return the value together with the number of bytes consumed and
//! never keep state between calls, so the same buffer can be decoded any
//! number of times. All integers are big-endian.
//!
//! | Primitive         | Layout                                      |
//! |-------------------|---------------------------------------------|
//! | `bool`            | 1 byte, `0x00` / `0x01`                     |
//! | `short`           | 2 bytes, unsigned                           |
//! | `int`             | 4 bytes, signed                             |
//! | `bigint`/`double` | 8 bytes                                     |
//! | `string`          | `short` length + UTF-8                      |
//! | `long string`     | `int` length + UTF-8                        |
//! | `bytes`           | `int` length (negative = null) + payload    |
//! | `short bytes`     | `short` length + payload                    |
//! | `string list`     | `short` count + `string`*                   |
//! | `string map`      | `short` count + (`string`, `string`)*       |
//! | `string multimap` | `short` count + (`string`, `string list`)*  |
//! | `inet`            | `string` (textual address) + `int` (port)   |

use std::net::{IpAddr, SocketAddr};

use bytes::{BufMut, BytesMut};

use super::error::{ProtocolError, ProtocolResult};

/// Ordered `(key, value)` pairs as they appear on the wire.
pub type StringMap = Vec<(String, String)>;

/// Ordered `(key, values)` pairs as they appear on the wire.
pub type StringMultimap = Vec<(String, Vec<String>)>;

// ============================================================================
// Encoding
// ============================================================================

/// Encode a bool.
pub fn encode_bool(dst: &mut BytesMut, value: bool) {
    dst.put_u8(if value { 0x01 } else { 0x00 });
}

/// Encode a short.
pub fn encode_short(dst: &mut BytesMut, value: u16) {
    dst.put_u16(value);
}

/// Encode an int.
pub fn encode_int(dst: &mut BytesMut, value: i32) {
    dst.put_i32(value);
}

/// Encode a bigint.
pub fn encode_bigint(dst: &mut BytesMut, value: i64) {
    dst.put_i64(value);
}

/// Encode a float.
pub fn encode_float(dst: &mut BytesMut, value: f32) {
    dst.put_f32(value);
}

/// Encode a double.
pub fn encode_double(dst: &mut BytesMut, value: f64) {
    dst.put_f64(value);
}

/// Longest `string` / `short bytes` payload and largest `short` count.
pub const MAX_SHORT_LEN: usize = u16::MAX as usize;

/// Encode a string.
///
/// Payloads longer than [`MAX_SHORT_LEN`] bytes are cut back to the last
/// character boundary that fits, so the result always decodes.
pub fn encode_string(dst: &mut BytesMut, value: &str) {
    let mut len = value.len().min(MAX_SHORT_LEN);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    dst.put_u16(len as u16);
    dst.put_slice(&value.as_bytes()[..len]);
}

/// Encode a long string.
pub fn encode_long_string(dst: &mut BytesMut, value: &str) {
    dst.put_i32(value.len() as i32);
    dst.put_slice(value.as_bytes());
}

/// Encode bytes; `None` is written as length -1.
pub fn encode_bytes(dst: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            dst.put_i32(bytes.len() as i32);
            dst.put_slice(bytes);
        }
        None => dst.put_i32(-1),
    }
}

/// Encode short bytes. Payloads longer than [`MAX_SHORT_LEN`] bytes are
/// truncated.
pub fn encode_short_bytes(dst: &mut BytesMut, value: &[u8]) {
    debug_assert!(value.len() <= MAX_SHORT_LEN, "short bytes too long");
    let len = value.len().min(MAX_SHORT_LEN);
    dst.put_u16(len as u16);
    dst.put_slice(&value[..len]);
}

/// Count written in front of a collection; entries past it are not encoded.
fn put_count(dst: &mut BytesMut, len: usize) -> usize {
    debug_assert!(len <= MAX_SHORT_LEN, "{} entries exceed a short count", len);
    let count = len.min(MAX_SHORT_LEN);
    dst.put_u16(count as u16);
    count
}

/// Encode a string list. At most [`MAX_SHORT_LEN`] entries are written.
pub fn encode_string_list<S: AsRef<str>>(dst: &mut BytesMut, values: &[S]) {
    let count = put_count(dst, values.len());
    for value in &values[..count] {
        encode_string(dst, value.as_ref());
    }
}

/// Encode a string map in the given order.
pub fn encode_string_map(dst: &mut BytesMut, map: &[(String, String)]) {
    let count = put_count(dst, map.len());
    for (key, value) in &map[..count] {
        encode_string(dst, key);
        encode_string(dst, value);
    }
}

/// Encode a string multimap in the given order.
pub fn encode_string_multimap(dst: &mut BytesMut, map: &[(String, Vec<String>)]) {
    let count = put_count(dst, map.len());
    for (key, values) in &map[..count] {
        encode_string(dst, key);
        encode_string_list(dst, values);
    }
}

/// Encode an option: type id, followed by the class name for custom types.
pub fn encode_option(dst: &mut BytesMut, id: u16, custom_class: Option<&str>) {
    dst.put_u16(id);
    if id == 0x0000 {
        encode_string(dst, custom_class.unwrap_or(""));
    }
}

/// Encode an inet as textual address plus port.
pub fn encode_inet(dst: &mut BytesMut, addr: &SocketAddr) {
    encode_string(dst, &addr.ip().to_string());
    dst.put_i32(addr.port() as i32);
}

// ============================================================================
// Size helpers
// ============================================================================

/// Serialized size of a string.
pub fn string_size(value: &str) -> usize {
    2 + value.len().min(u16::MAX as usize)
}

/// Serialized size of a long string.
pub fn long_string_size(value: &str) -> usize {
    4 + value.len()
}

/// Serialized size of bytes.
pub fn bytes_size(value: Option<&[u8]>) -> usize {
    4 + value.map_or(0, |b| b.len())
}

/// Serialized size of short bytes.
pub fn short_bytes_size(value: &[u8]) -> usize {
    2 + value.len().min(u16::MAX as usize)
}

/// Serialized size of a string list.
pub fn string_list_size<S: AsRef<str>>(values: &[S]) -> usize {
    2 + values.iter().map(|v| string_size(v.as_ref())).sum::<usize>()
}

/// Serialized size of a string map.
pub fn string_map_size(map: &[(String, String)]) -> usize {
    2 + map
        .iter()
        .map(|(k, v)| string_size(k) + string_size(v))
        .sum::<usize>()
}

/// Serialized size of a string multimap.
pub fn string_multimap_size(map: &[(String, Vec<String>)]) -> usize {
    2 + map
        .iter()
        .map(|(k, v)| string_size(k) + string_list_size(v))
        .sum::<usize>()
}

/// Serialized size of an inet.
pub fn inet_size(addr: &SocketAddr) -> usize {
    string_size(&addr.ip().to_string()) + 4
}

// ============================================================================
// Decoding
// ============================================================================

fn take(buf: &[u8], len: usize) -> ProtocolResult<&[u8]> {
    buf.get(..len)
        .ok_or_else(|| ProtocolError::truncated(len, buf.len()))
}

fn take_array<const N: usize>(buf: &[u8]) -> ProtocolResult<[u8; N]> {
    let slice = take(buf, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn utf8(bytes: &[u8]) -> ProtocolResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))
}

/// Decode a bool.
pub fn decode_bool(buf: &[u8]) -> ProtocolResult<(bool, usize)> {
    let [b] = take_array::<1>(buf)?;
    Ok((b != 0, 1))
}

/// Decode a short.
pub fn decode_short(buf: &[u8]) -> ProtocolResult<(u16, usize)> {
    Ok((u16::from_be_bytes(take_array(buf)?), 2))
}

/// Decode an int.
pub fn decode_int(buf: &[u8]) -> ProtocolResult<(i32, usize)> {
    Ok((i32::from_be_bytes(take_array(buf)?), 4))
}

/// Decode a bigint.
pub fn decode_bigint(buf: &[u8]) -> ProtocolResult<(i64, usize)> {
    Ok((i64::from_be_bytes(take_array(buf)?), 8))
}

/// Decode a float.
pub fn decode_float(buf: &[u8]) -> ProtocolResult<(f32, usize)> {
    Ok((f32::from_be_bytes(take_array(buf)?), 4))
}

/// Decode a double.
pub fn decode_double(buf: &[u8]) -> ProtocolResult<(f64, usize)> {
    Ok((f64::from_be_bytes(take_array(buf)?), 8))
}

/// Decode a string, borrowing from the input.
pub fn decode_string(buf: &[u8]) -> ProtocolResult<(&str, usize)> {
    let (len, n) = decode_short(buf)?;
    let payload = take(&buf[n..], len as usize)?;
    Ok((utf8(payload)?, n + len as usize))
}

/// Decode a long string, borrowing from the input.
pub fn decode_long_string(buf: &[u8]) -> ProtocolResult<(&str, usize)> {
    let (len, n) = decode_int(buf)?;
    if len < 0 {
        return Err(ProtocolError::invalid(format!("negative long string length {}", len)));
    }
    let payload = take(&buf[n..], len as usize)?;
    Ok((utf8(payload)?, n + len as usize))
}

/// Decode bytes; a negative length yields `None`.
pub fn decode_bytes(buf: &[u8]) -> ProtocolResult<(Option<&[u8]>, usize)> {
    let (len, n) = decode_int(buf)?;
    if len < 0 {
        return Ok((None, n));
    }
    let payload = take(&buf[n..], len as usize)?;
    Ok((Some(payload), n + len as usize))
}

/// Decode short bytes.
pub fn decode_short_bytes(buf: &[u8]) -> ProtocolResult<(&[u8], usize)> {
    let (len, n) = decode_short(buf)?;
    let payload = take(&buf[n..], len as usize)?;
    Ok((payload, n + len as usize))
}

/// Decode a string list.
pub fn decode_string_list(buf: &[u8]) -> ProtocolResult<(Vec<String>, usize)> {
    let (count, mut pos) = decode_short(buf)?;
    let mut values = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let (s, n) = decode_string(&buf[pos..])?;
        values.push(s.to_string());
        pos += n;
    }
    Ok((values, pos))
}

/// Decode a string map, preserving wire order.
pub fn decode_string_map(buf: &[u8]) -> ProtocolResult<(StringMap, usize)> {
    let (count, mut pos) = decode_short(buf)?;
    let mut map = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let (key, n) = decode_string(&buf[pos..])?;
        pos += n;
        let (value, n) = decode_string(&buf[pos..])?;
        pos += n;
        map.push((key.to_string(), value.to_string()));
    }
    Ok((map, pos))
}

/// Decode a string multimap, preserving wire order.
pub fn decode_string_multimap(buf: &[u8]) -> ProtocolResult<(StringMultimap, usize)> {
    let (count, mut pos) = decode_short(buf)?;
    let mut map = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let (key, n) = decode_string(&buf[pos..])?;
        pos += n;
        let (values, n) = decode_string_list(&buf[pos..])?;
        pos += n;
        map.push((key.to_string(), values));
    }
    Ok((map, pos))
}

/// Decode an option header: type id plus custom class name when id is CUSTOM.
pub fn decode_option(buf: &[u8]) -> ProtocolResult<((u16, Option<&str>), usize)> {
    let (id, mut pos) = decode_short(buf)?;
    if id == 0x0000 {
        let (class, n) = decode_string(&buf[pos..])?;
        pos += n;
        return Ok(((id, Some(class)), pos));
    }
    Ok(((id, None), pos))
}

/// Decode an inet written as textual address plus port.
pub fn decode_inet(buf: &[u8]) -> ProtocolResult<(SocketAddr, usize)> {
    let (text, n) = decode_string(buf)?;
    let (port, m) = decode_int(&buf[n..])?;
    let ip: IpAddr = text
        .parse()
        .map_err(|_| ProtocolError::invalid(format!("invalid inet address '{}'", text)))?;
    let port = u16::try_from(port)
        .map_err(|_| ProtocolError::invalid(format!("invalid inet port {}", port)))?;
    Ok((SocketAddr::new(ip, port), n + m))
}

// ============================================================================
// WireReader - cursor over a body
// ============================================================================

/// Cursor that walks a body with the `decode_*` functions.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Unread tail of the input.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn step<T>(&mut self, f: impl FnOnce(&'a [u8]) -> ProtocolResult<(T, usize)>) -> ProtocolResult<T> {
        let (value, n) = f(&self.data[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    /// Read a single raw byte.
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        self.step(|buf| take_array::<1>(buf).map(|[b]| (b, 1)))
    }

    /// Read `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        self.step(|buf| take(buf, len).map(|s| (s, len)))
    }

    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        self.step(decode_bool)
    }

    pub fn read_short(&mut self) -> ProtocolResult<u16> {
        self.step(decode_short)
    }

    pub fn read_int(&mut self) -> ProtocolResult<i32> {
        self.step(decode_int)
    }

    pub fn read_bigint(&mut self) -> ProtocolResult<i64> {
        self.step(decode_bigint)
    }

    pub fn read_string(&mut self) -> ProtocolResult<&'a str> {
        self.step(decode_string)
    }

    pub fn read_long_string(&mut self) -> ProtocolResult<&'a str> {
        self.step(decode_long_string)
    }

    pub fn read_bytes(&mut self) -> ProtocolResult<Option<&'a [u8]>> {
        self.step(decode_bytes)
    }

    pub fn read_short_bytes(&mut self) -> ProtocolResult<&'a [u8]> {
        self.step(decode_short_bytes)
    }

    pub fn read_string_list(&mut self) -> ProtocolResult<Vec<String>> {
        self.step(decode_string_list)
    }

    pub fn read_string_map(&mut self) -> ProtocolResult<StringMap> {
        self.step(decode_string_map)
    }

    pub fn read_string_multimap(&mut self) -> ProtocolResult<StringMultimap> {
        self.step(decode_string_multimap)
    }

    pub fn read_option(&mut self) -> ProtocolResult<(u16, Option<&'a str>)> {
        self.step(decode_option)
    }

    pub fn read_inet(&mut self) -> ProtocolResult<SocketAddr> {
        self.step(decode_inet)
    }
}
