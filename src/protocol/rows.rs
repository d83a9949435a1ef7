//! ROWS result payload and borrowed row views.
//!
//! The body is kept as one shared [`Bytes`] buffer; decoding only records
//! the offset of every cell. A [`Row`] borrows the [`Rows`] it came from,
//! so values returned by its accessors cannot outlive the result.

use std::net::IpAddr;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::collection::{ListView, MapView, SetView};
use super::error::{AccessError, AccessResult, ProtocolError, ProtocolResult};
use super::metadata::ResultMetadata;
use super::types::ColumnType;
use super::value::{FromCql, Varint};
use super::wire::{self, WireReader};

/// Decoded ROWS result: metadata plus a row-major table of cell offsets
/// into the response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    metadata: ResultMetadata,
    rows_count: usize,
    body: Bytes,
    /// `(offset, len)` into `body`, `None` for null cells.
    cells: Vec<Option<(usize, usize)>>,
}

impl Rows {
    /// Decode a ROWS payload (everything after the result kind).
    ///
    /// A cell whose length is zero or negative is null.
    pub fn decode(body: Bytes) -> ProtocolResult<Self> {
        let mut reader = WireReader::new(&body);
        let metadata = ResultMetadata::read(&mut reader)?;
        let rows_count = reader.read_int()?;
        if rows_count < 0 {
            return Err(ProtocolError::invalid(format!("negative rows count {}", rows_count)));
        }
        let rows_count = rows_count as usize;

        let total = rows_count
            .checked_mul(metadata.column_count())
            .ok_or_else(|| ProtocolError::invalid("rows count overflow"))?;
        // Each cell takes at least 4 bytes, so cap the reservation by what is left.
        let mut cells = Vec::with_capacity(total.min(reader.remaining() / 4));
        for _ in 0..total {
            let len = reader.read_int()?;
            if len <= 0 {
                cells.push(None);
            } else {
                let start = reader.position();
                reader.read_raw(len as usize)?;
                cells.push(Some((start, len as usize)));
            }
        }

        if reader.remaining() > 0 {
            tracing::debug!(trailing = reader.remaining(), "trailing bytes after rows");
        }

        Ok(Self {
            metadata,
            rows_count,
            body,
            cells,
        })
    }

    /// Build a ROWS payload from cell values, e.g. to serve a result.
    pub fn from_cells(metadata: ResultMetadata, rows: &[Vec<Option<Bytes>>]) -> ProtocolResult<Self> {
        let columns = metadata.column_count();
        let mut buf = BytesMut::new();
        metadata.encode(&mut buf);
        wire::encode_int(&mut buf, rows.len() as i32);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(ProtocolError::invalid(format!(
                    "row {} has {} cells, metadata has {} columns",
                    i,
                    row.len(),
                    columns
                )));
            }
            for cell in row {
                wire::encode_bytes(&mut buf, cell.as_deref());
            }
        }
        Self::decode(buf.freeze())
    }

    /// Write the payload (metadata, count and cells).
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.extend_from_slice(&self.body);
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn rows_count(&self) -> usize {
        self.rows_count
    }

    pub fn column_count(&self) -> usize {
        self.metadata.column_count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows_count == 0
    }

    /// Row `index`.
    pub fn row(&self, index: usize) -> AccessResult<Row<'_>> {
        if index >= self.rows_count {
            return Err(AccessError::OutOfRange {
                index,
                len: self.rows_count,
            });
        }
        Ok(Row { rows: self, index })
    }

    /// All rows in order.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows_count).map(move |index| Row { rows: self, index })
    }

    fn cell(&self, row: usize, column: usize) -> Option<&[u8]> {
        let columns = self.metadata.column_count();
        self.cells[row * columns + column].map(|(start, len)| &self.body[start..start + len])
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = Row<'a>;
    type IntoIter = Box<dyn Iterator<Item = Row<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// One row of a [`Rows`] result.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    rows: &'a Rows,
    index: usize,
}

impl<'a> Row<'a> {
    /// Position of this row in the result.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn column_count(&self) -> usize {
        self.rows.column_count()
    }

    pub fn metadata(&self) -> &'a ResultMetadata {
        &self.rows.metadata
    }

    fn column_type(&self, column: usize) -> AccessResult<&'a ColumnType> {
        Ok(&self.rows.metadata.column(column)?.column_type)
    }

    /// Cell bytes, `None` when null.
    pub fn raw(&self, column: usize) -> AccessResult<Option<&'a [u8]>> {
        self.column_type(column)?;
        Ok(self.rows.cell(self.index, column))
    }

    pub fn is_null(&self, column: usize) -> AccessResult<bool> {
        Ok(self.raw(column)?.is_none())
    }

    fn non_null(&self, column: usize) -> AccessResult<&'a [u8]> {
        self.rows
            .cell(self.index, column)
            .ok_or(AccessError::NullValue(column))
    }

    /// Value of `column` as `T`.
    ///
    /// Fails if the column does not exist, its declared type cannot be
    /// read as `T`, or the cell is null.
    pub fn get<T: FromCql<'a>>(&self, column: usize) -> AccessResult<T> {
        let ty = self.column_type(column)?;
        if !T::accepts(ty) {
            return Err(mismatch(T::TYPE_NAME, ty));
        }
        Ok(T::from_cql(ty, self.non_null(column)?)?)
    }

    /// Like [`get`](Self::get) but a null cell yields `None`.
    pub fn get_opt<T: FromCql<'a>>(&self, column: usize) -> AccessResult<Option<T>> {
        match self.get(column) {
            Ok(v) => Ok(Some(v)),
            Err(AccessError::NullValue(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Value of the column called `name` in the global keyspace/table.
    pub fn get_by_name<T: FromCql<'a>>(&self, name: &str) -> AccessResult<T> {
        let column = self.rows.metadata.column_index(name)?;
        self.get(column)
    }

    pub fn get_bool(&self, column: usize) -> AccessResult<bool> {
        self.get(column)
    }

    pub fn get_int(&self, column: usize) -> AccessResult<i32> {
        self.get(column)
    }

    /// bigint and counter columns.
    pub fn get_bigint(&self, column: usize) -> AccessResult<i64> {
        self.get(column)
    }

    pub fn get_float(&self, column: usize) -> AccessResult<f32> {
        self.get(column)
    }

    pub fn get_double(&self, column: usize) -> AccessResult<f64> {
        self.get(column)
    }

    /// ascii, text and varchar columns.
    pub fn get_string(&self, column: usize) -> AccessResult<&'a str> {
        self.get(column)
    }

    pub fn get_blob(&self, column: usize) -> AccessResult<&'a [u8]> {
        self.get(column)
    }

    /// uuid and timeuuid columns.
    pub fn get_uuid(&self, column: usize) -> AccessResult<Uuid> {
        self.get(column)
    }

    pub fn get_inet(&self, column: usize) -> AccessResult<IpAddr> {
        self.get(column)
    }

    pub fn get_timestamp(&self, column: usize) -> AccessResult<DateTime<Utc>> {
        self.get(column)
    }

    /// A varint column whose value fits in i64.
    pub fn get_varint(&self, column: usize) -> AccessResult<i64> {
        self.get::<Varint>(column).map(|v| v.0)
    }

    /// Decimal column as `(scale, unscaled)`; value is `unscaled * 10^-scale`.
    pub fn get_decimal(&self, column: usize) -> AccessResult<(i32, i64)> {
        match self.column_type(column)? {
            ColumnType::Decimal => {
                let mut reader = WireReader::new(self.non_null(column)?);
                let scale = reader.read_int()?;
                let Varint(unscaled) = Varint::from_cql(&ColumnType::Varint, reader.rest())?;
                Ok((scale, unscaled))
            }
            other => Err(mismatch("decimal", other)),
        }
    }

    pub fn get_list(&self, column: usize) -> AccessResult<ListView<'a>> {
        match self.column_type(column)? {
            ColumnType::List(element) => Ok(ListView::new(element, self.non_null(column)?)?),
            other => Err(mismatch("list", other)),
        }
    }

    pub fn get_set(&self, column: usize) -> AccessResult<SetView<'a>> {
        match self.column_type(column)? {
            ColumnType::Set(element) => Ok(SetView::new(element, self.non_null(column)?)?),
            other => Err(mismatch("set", other)),
        }
    }

    pub fn get_map(&self, column: usize) -> AccessResult<MapView<'a>> {
        match self.column_type(column)? {
            ColumnType::Map(key, value) => {
                Ok(MapView::new(key, value, self.non_null(column)?)?)
            }
            other => Err(mismatch("map", other)),
        }
    }
}

fn mismatch(expected: &str, actual: &ColumnType) -> AccessError {
    AccessError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
