//! Conversions between cell bytes and Rust values.
//!
//! [`FromCql`] reads a value out of a cell after checking the declared
//! column type; [`ToCql`] produces the cell bytes for EXECUTE parameters.

use std::net::IpAddr;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{ProtocolError, ProtocolResult};
use super::types::ColumnType;
use super::wire;

/// A value that can be read from a cell of a matching column type.
pub trait FromCql<'a>: Sized {
    /// Name used in type-mismatch errors.
    const TYPE_NAME: &'static str;

    /// Whether values of this column type can be read as `Self`.
    fn accepts(ty: &ColumnType) -> bool;

    /// Decode non-null cell bytes. `ty` has already passed [`accepts`](Self::accepts).
    fn from_cql(ty: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self>;
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> ProtocolResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        ProtocolError::invalid(format!("{} needs {} bytes, got {}", what, N, bytes.len()))
    })
}

/// Sign-extend a big-endian two's complement integer of up to 8 bytes.
fn varint_to_i64(bytes: &[u8]) -> ProtocolResult<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(ProtocolError::invalid(format!(
            "varint of {} bytes does not fit in i64",
            bytes.len()
        )));
    }
    let negative = bytes[0] & 0x80 != 0;
    let mut buf = if negative { [0xFF; 8] } else { [0; 8] };
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buf))
}

fn i64_to_varint(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign bytes, keeping the sign bit of the next byte intact.
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

impl<'a> FromCql<'a> for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Boolean)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        let [b] = fixed::<1>(bytes, "boolean")?;
        Ok(b != 0)
    }
}

impl<'a> FromCql<'a> for i32 {
    const TYPE_NAME: &'static str = "int";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Int)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(i32::from_be_bytes(fixed(bytes, "int")?))
    }
}

impl<'a> FromCql<'a> for i64 {
    const TYPE_NAME: &'static str = "bigint";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::BigInt | ColumnType::Counter)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(i64::from_be_bytes(fixed(bytes, "bigint")?))
    }
}

impl<'a> FromCql<'a> for f32 {
    const TYPE_NAME: &'static str = "float";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Float)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(f32::from_be_bytes(fixed(bytes, "float")?))
    }
}

impl<'a> FromCql<'a> for f64 {
    const TYPE_NAME: &'static str = "double";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Double)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(f64::from_be_bytes(fixed(bytes, "double")?))
    }
}

impl<'a> FromCql<'a> for &'a str {
    const TYPE_NAME: &'static str = "text";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Ascii | ColumnType::Text | ColumnType::Varchar)
    }

    fn from_cql(ty: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        if matches!(ty, ColumnType::Ascii) && !bytes.is_ascii() {
            return Err(ProtocolError::invalid("non-ASCII bytes in ascii column"));
        }
        std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))
    }
}

impl<'a> FromCql<'a> for String {
    const TYPE_NAME: &'static str = "text";

    fn accepts(ty: &ColumnType) -> bool {
        <&'a str as FromCql<'a>>::accepts(ty)
    }

    fn from_cql(ty: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        <&'a str as FromCql<'a>>::from_cql(ty, bytes).map(str::to_string)
    }
}

impl<'a> FromCql<'a> for &'a [u8] {
    const TYPE_NAME: &'static str = "blob";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Blob | ColumnType::Custom(_))
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(bytes)
    }
}

impl<'a> FromCql<'a> for Vec<u8> {
    const TYPE_NAME: &'static str = "blob";

    fn accepts(ty: &ColumnType) -> bool {
        <&'a [u8] as FromCql<'a>>::accepts(ty)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl<'a> FromCql<'a> for Uuid {
    const TYPE_NAME: &'static str = "uuid";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Uuid | ColumnType::Timeuuid)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        Ok(Uuid::from_bytes(fixed(bytes, "uuid")?))
    }
}

impl<'a> FromCql<'a> for IpAddr {
    const TYPE_NAME: &'static str = "inet";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Inet)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        match bytes.len() {
            4 => Ok(IpAddr::from(fixed::<4>(bytes, "inet")?)),
            16 => Ok(IpAddr::from(fixed::<16>(bytes, "inet")?)),
            n => Err(ProtocolError::invalid(format!("inet of {} bytes", n))),
        }
    }
}

impl<'a> FromCql<'a> for DateTime<Utc> {
    const TYPE_NAME: &'static str = "timestamp";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Timestamp)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        let millis = i64::from_be_bytes(fixed(bytes, "timestamp")?);
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ProtocolError::invalid(format!("timestamp {} out of range", millis)))
    }
}

/// A value that can be sent as a cell, e.g. an EXECUTE parameter or a
/// collection element.
pub trait ToCql {
    /// Cell bytes without the length prefix.
    fn to_cql(&self) -> Bytes;
}

impl<T: ToCql + ?Sized> ToCql for &T {
    fn to_cql(&self) -> Bytes {
        (**self).to_cql()
    }
}

impl ToCql for bool {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(&[*self as u8])
    }
}

impl ToCql for i32 {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl ToCql for i64 {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl ToCql for f32 {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl ToCql for f64 {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl ToCql for str {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToCql for String {
    fn to_cql(&self) -> Bytes {
        self.as_str().to_cql()
    }
}

impl ToCql for [u8] {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToCql for Vec<u8> {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToCql for Uuid {
    fn to_cql(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToCql for IpAddr {
    fn to_cql(&self) -> Bytes {
        match self {
            IpAddr::V4(ip) => Bytes::copy_from_slice(&ip.octets()),
            IpAddr::V6(ip) => Bytes::copy_from_slice(&ip.octets()),
        }
    }
}

impl ToCql for DateTime<Utc> {
    fn to_cql(&self) -> Bytes {
        self.timestamp_millis().to_cql()
    }
}

/// A `varint` cell holding a value that fits in i64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Varint(pub i64);

impl<'a> FromCql<'a> for Varint {
    const TYPE_NAME: &'static str = "varint";

    fn accepts(ty: &ColumnType) -> bool {
        matches!(ty, ColumnType::Varint)
    }

    fn from_cql(_: &ColumnType, bytes: &'a [u8]) -> ProtocolResult<Self> {
        varint_to_i64(bytes).map(Varint)
    }
}

impl ToCql for Varint {
    fn to_cql(&self) -> Bytes {
        Bytes::from(i64_to_varint(self.0))
    }
}

/// Encode `[short n][short len][bytes]...` collection element bytes.
pub fn encode_collection<T: ToCql>(elements: &[T]) -> Bytes {
    debug_assert!(elements.len() <= wire::MAX_SHORT_LEN, "collection too large");
    let mut buf = BytesMut::new();
    buf.put_u16(elements.len() as u16);
    for e in elements {
        put_element(&mut buf, &e.to_cql());
    }
    buf.freeze()
}

/// Encode map cell bytes, `[short n]` followed by key/value element pairs.
pub fn encode_map<K: ToCql, V: ToCql>(entries: &[(K, V)]) -> Bytes {
    debug_assert!(entries.len() <= wire::MAX_SHORT_LEN, "map too large");
    let mut buf = BytesMut::new();
    buf.put_u16(entries.len() as u16);
    for (k, v) in entries {
        put_element(&mut buf, &k.to_cql());
        put_element(&mut buf, &v.to_cql());
    }
    buf.freeze()
}

fn put_element(buf: &mut BytesMut, bytes: &[u8]) {
    wire::encode_short_bytes(buf, bytes);
}
