//! RESULT bodies.

use bytes::{Bytes, BytesMut};

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::metadata::ResultMetadata;
use crate::protocol::rows::Rows;
use crate::protocol::types::ResultKind;
use crate::protocol::wire::{self, WireReader};

/// RESULT - Outcome of QUERY, PREPARE or EXECUTE.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Statement produced nothing
    Void,
    /// Rows of a SELECT
    Rows(Rows),
    /// `USE` switched the keyspace
    SetKeyspace(String),
    /// PREPARE succeeded
    Prepared(Prepared),
    /// DDL changed the schema
    SchemaChange(SchemaChange),
}

/// Prepared statement id and bind variable metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub id: Bytes,
    pub metadata: ResultMetadata,
}

/// Schema change reported by a RESULT or an EVENT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    /// `CREATED`, `UPDATED` or `DROPPED`
    pub change: String,
    pub keyspace: String,
    /// Empty when the keyspace itself changed
    pub table: String,
}

impl SchemaChange {
    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string(dst, &self.change);
        wire::encode_string(dst, &self.keyspace);
        wire::encode_string(dst, &self.table);
    }

    pub(crate) fn size(&self) -> usize {
        wire::string_size(&self.change)
            + wire::string_size(&self.keyspace)
            + wire::string_size(&self.table)
    }

    pub(crate) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            change: reader.read_string()?.to_string(),
            keyspace: reader.read_string()?.to_string(),
            table: reader.read_string()?.to_string(),
        })
    }
}

impl QueryResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            QueryResult::Void => ResultKind::Void,
            QueryResult::Rows(_) => ResultKind::Rows,
            QueryResult::SetKeyspace(_) => ResultKind::SetKeyspace,
            QueryResult::Prepared(_) => ResultKind::Prepared,
            QueryResult::SchemaChange(_) => ResultKind::SchemaChange,
        }
    }

    /// Rows, if this is a ROWS result.
    pub fn rows(&self) -> Option<&Rows> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Rows> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn prepared(&self) -> Option<&Prepared> {
        match self {
            QueryResult::Prepared(p) => Some(p),
            _ => None,
        }
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_int(dst, self.kind() as i32);
        match self {
            QueryResult::Void => {}
            QueryResult::Rows(rows) => rows.encode(dst),
            QueryResult::SetKeyspace(ks) => wire::encode_string(dst, ks),
            QueryResult::Prepared(p) => {
                wire::encode_short_bytes(dst, &p.id);
                p.metadata.encode(dst);
            }
            QueryResult::SchemaChange(change) => change.encode(dst),
        }
    }

    pub(super) fn size(&self) -> usize {
        4 + match self {
            QueryResult::Void => 0,
            QueryResult::Rows(rows) => rows.size(),
            QueryResult::SetKeyspace(ks) => wire::string_size(ks),
            QueryResult::Prepared(p) => wire::short_bytes_size(&p.id) + p.metadata.size(),
            QueryResult::SchemaChange(change) => change.size(),
        }
    }

    /// Decode a RESULT body. Row cells keep referencing `body`.
    pub fn decode(body: Bytes) -> ProtocolResult<Self> {
        let (kind, n) = wire::decode_int(&body)?;
        let kind = ResultKind::from_i32(kind)?;
        let mut reader = WireReader::new(&body[n..]);
        let result = match kind {
            ResultKind::Void => QueryResult::Void,
            ResultKind::Rows => return Ok(QueryResult::Rows(Rows::decode(body.slice(n..))?)),
            ResultKind::SetKeyspace => {
                QueryResult::SetKeyspace(reader.read_string()?.to_string())
            }
            ResultKind::Prepared => {
                let id = Bytes::copy_from_slice(reader.read_short_bytes()?);
                let metadata = ResultMetadata::read(&mut reader)?;
                QueryResult::Prepared(Prepared { id, metadata })
            }
            ResultKind::SchemaChange => QueryResult::SchemaChange(SchemaChange::decode(&mut reader)?),
        };
        if reader.remaining() > 0 {
            return Err(ProtocolError::invalid(format!(
                "{} trailing bytes after {:?} result",
                reader.remaining(),
                kind
            )));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::metadata::ColumnSpec;
    use crate::protocol::types::ColumnType;

    fn roundtrip(result: &QueryResult) -> QueryResult {
        let mut buf = BytesMut::new();
        result.encode(&mut buf);
        assert_eq!(buf.len(), result.size());
        QueryResult::decode(buf.freeze()).unwrap()
    }

    #[test]
    fn test_simple_results() {
        for result in [
            QueryResult::Void,
            QueryResult::SetKeyspace("km".into()),
            QueryResult::SchemaChange(SchemaChange {
                change: "CREATED".into(),
                keyspace: "km".into(),
                table: "".into(),
            }),
        ] {
            assert_eq!(roundtrip(&result), result);
        }
    }

    #[test]
    fn test_prepared_result() {
        let metadata = ResultMetadata::new(
            Some(("km".into(), "test_cf".into())),
            vec![ColumnSpec::new("km", "test_cf", "key", ColumnType::Varchar)],
        );
        let result = QueryResult::Prepared(Prepared {
            id: Bytes::from_static(&[0xCA, 0xFE]),
            metadata,
        });
        let decoded = roundtrip(&result);
        let prepared = decoded.prepared().unwrap();
        assert_eq!(prepared.id.as_ref(), &[0xCA, 0xFE]);
        assert_eq!(prepared.metadata.column_index("key").unwrap(), 0);
    }

    #[test]
    fn test_void_layout() {
        let mut buf = BytesMut::new();
        QueryResult::Void.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_unknown_kind() {
        let body = Bytes::from_static(&[0, 0, 0, 9]);
        assert_eq!(
            QueryResult::decode(body),
            Err(ProtocolError::UnknownResultKind(9))
        );
    }
}
