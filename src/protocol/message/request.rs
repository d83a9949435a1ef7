//! Request message bodies.
//!
//! Requests are sent from the client to the server.

use bytes::{Bytes, BytesMut};

use crate::protocol::compression::Compression;
use crate::protocol::error::ProtocolResult;
use crate::protocol::types::{Consistency, EventType};
use crate::protocol::value::ToCql;
use crate::protocol::wire::{self, StringMap, WireReader};

/// STARTUP option naming the CQL version.
pub const CQL_VERSION: &str = "CQL_VERSION";

/// STARTUP option naming the body compression.
pub const COMPRESSION: &str = "COMPRESSION";

/// CQL version sent when none is configured.
pub const DEFAULT_CQL_VERSION: &str = "3.0.0";

/// STARTUP - Initialize the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    pub options: StringMap,
}

impl Startup {
    pub fn new(cql_version: &str, compression: Option<Compression>) -> Self {
        let mut options = vec![(CQL_VERSION.to_string(), cql_version.to_string())];
        if let Some(c) = compression {
            options.push((COMPRESSION.to_string(), c.as_str().to_string()));
        }
        Self { options }
    }

    fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn cql_version(&self) -> Option<&str> {
        self.option(CQL_VERSION)
    }

    pub fn compression(&self) -> Option<&str> {
        self.option(COMPRESSION)
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string_map(dst, &self.options);
    }

    pub(super) fn size(&self) -> usize {
        wire::string_map_size(&self.options)
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            options: reader.read_string_map()?,
        })
    }
}

impl Default for Startup {
    fn default() -> Self {
        Self::new(DEFAULT_CQL_VERSION, None)
    }
}

/// QUERY - Run a CQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub query: String,
    pub consistency: Consistency,
}

impl Query {
    pub fn new(query: impl Into<String>, consistency: Consistency) -> Self {
        Self {
            query: query.into(),
            consistency,
        }
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_long_string(dst, &self.query);
        wire::encode_short(dst, self.consistency.as_u16());
    }

    pub(super) fn size(&self) -> usize {
        wire::long_string_size(&self.query) + 2
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let query = reader.read_long_string()?.to_string();
        let consistency = Consistency::from_u16(reader.read_short()?)?;
        Ok(Self { query, consistency })
    }
}

/// PREPARE - Prepare a CQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub query: String,
}

impl Prepare {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_long_string(dst, &self.query);
    }

    pub(super) fn size(&self) -> usize {
        wire::long_string_size(&self.query)
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            query: reader.read_long_string()?.to_string(),
        })
    }
}

/// EXECUTE - Run a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execute {
    /// Id returned in the PREPARED result
    pub id: Bytes,
    /// Bound values, `None` for null
    pub values: Vec<Option<Bytes>>,
    pub consistency: Consistency,
}

impl Execute {
    pub fn new(id: Bytes, values: Vec<Option<Bytes>>, consistency: Consistency) -> Self {
        Self {
            id,
            values,
            consistency,
        }
    }

    /// Bind non-null values.
    pub fn with_values<T: ToCql>(id: Bytes, values: &[T], consistency: Consistency) -> Self {
        let values = values.iter().map(|v| Some(v.to_cql())).collect();
        Self::new(id, values, consistency)
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        debug_assert!(self.values.len() <= wire::MAX_SHORT_LEN, "too many bound values");
        wire::encode_short_bytes(dst, &self.id);
        wire::encode_short(dst, self.values.len() as u16);
        for value in &self.values {
            wire::encode_bytes(dst, value.as_deref());
        }
        wire::encode_short(dst, self.consistency.as_u16());
    }

    pub(super) fn size(&self) -> usize {
        let values: usize = self
            .values
            .iter()
            .map(|v| wire::bytes_size(v.as_deref()))
            .sum();
        wire::short_bytes_size(&self.id) + 2 + values + 2
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let id = Bytes::copy_from_slice(reader.read_short_bytes()?);
        let count = reader.read_short()? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(reader.read_bytes()?.map(Bytes::copy_from_slice));
        }
        let consistency = Consistency::from_u16(reader.read_short()?)?;
        Ok(Self {
            id,
            values,
            consistency,
        })
    }
}

/// REGISTER - Subscribe to server events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub events: Vec<EventType>,
}

impl Register {
    pub fn new(events: Vec<EventType>) -> Self {
        Self { events }
    }

    fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.as_str()).collect()
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string_list(dst, &self.names());
    }

    pub(super) fn size(&self) -> usize {
        wire::string_list_size(&self.names())
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let events = reader
            .read_string_list()?
            .iter()
            .map(|s| EventType::parse(s))
            .collect::<ProtocolResult<_>>()?;
        Ok(Self { events })
    }
}

/// CREDENTIALS - Answer an AUTHENTICATE challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub credentials: StringMap,
}

impl Credentials {
    pub fn new(credentials: StringMap) -> Self {
        Self { credentials }
    }

    /// Username/password pair as understood by the password authenticator.
    pub fn password(username: &str, password: &str) -> Self {
        Self::new(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ])
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string_map(dst, &self.credentials);
    }

    pub(super) fn size(&self) -> usize {
        wire::string_map_size(&self.credentials)
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            credentials: reader.read_string_map()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_options() {
        let startup = Startup::new("3.0.0", Some(Compression::Lz4));
        assert_eq!(startup.cql_version(), Some("3.0.0"));
        assert_eq!(startup.compression(), Some("lz4"));
        assert_eq!(Startup::default().compression(), None);
    }

    #[test]
    fn test_query_layout() {
        let q = Query::new("USE ks", Consistency::Quorum);
        let mut buf = BytesMut::new();
        q.encode(&mut buf);
        assert_eq!(buf.len(), q.size());
        assert_eq!(&buf[..4], &[0, 0, 0, 6]);
        assert_eq!(&buf[4..10], b"USE ks");
        assert_eq!(&buf[10..], &[0x00, 0x04]);
    }

    #[test]
    fn test_execute_layout() {
        let e = Execute::new(
            Bytes::from_static(&[0xAB, 0xCD]),
            vec![Some(Bytes::from_static(&[1])), None],
            Consistency::One,
        );
        let mut buf = BytesMut::new();
        e.encode(&mut buf);
        assert_eq!(buf.len(), e.size());
        assert_eq!(
            &buf[..],
            &[
                0x00, 0x02, 0xAB, 0xCD, // id
                0x00, 0x02, // value count
                0x00, 0x00, 0x00, 0x01, 0x01, // value 1
                0xFF, 0xFF, 0xFF, 0xFF, // null
                0x00, 0x01, // ONE
            ]
        );
        let decoded = Execute::decode(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded, e);
    }

    #[test]
    fn test_register_rejects_unknown_event() {
        let mut buf = BytesMut::new();
        wire::encode_string_list(&mut buf, &["NOT_AN_EVENT"]);
        assert!(Register::decode(&mut WireReader::new(&buf)).is_err());
    }
}
