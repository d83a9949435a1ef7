//! Column metadata of ROWS and PREPARED results.

use std::collections::HashMap;

use bytes::BytesMut;

use super::error::{AccessError, AccessResult, ProtocolError, ProtocolResult};
use super::types::ColumnType;
use super::wire::{self, WireReader};

/// Metadata flag: keyspace and table are given once for all columns.
pub const FLAG_GLOBAL_TABLES_SPEC: i32 = 0x0001;

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            name: name.into(),
            column_type,
        }
    }

    pub fn type_id(&self) -> u16 {
        self.column_type.id()
    }

    pub fn custom_class(&self) -> Option<&str> {
        self.column_type.custom_class()
    }

    /// Element type (list/set) or key type (map).
    pub fn primary_type(&self) -> Option<&ColumnType> {
        self.column_type.primary()
    }

    /// Value type (map).
    pub fn secondary_type(&self) -> Option<&ColumnType> {
        self.column_type.secondary()
    }
}

type ColumnKey = (String, String, String);

/// Parsed result metadata with an O(1) name index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultMetadata {
    flags: i32,
    global: Option<(String, String)>,
    columns: Vec<ColumnSpec>,
    index: HashMap<ColumnKey, usize>,
}

impl ResultMetadata {
    /// Build metadata from columns. When `global` is set every column must
    /// belong to that keyspace/table.
    pub fn new(global: Option<(String, String)>, columns: Vec<ColumnSpec>) -> Self {
        let flags = if global.is_some() { FLAG_GLOBAL_TABLES_SPEC } else { 0 };
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            index
                .entry((col.keyspace.clone(), col.table.clone(), col.name.clone()))
                .or_insert(i);
        }
        Self {
            flags,
            global,
            columns,
            index,
        }
    }

    /// Decode metadata from the start of `buf`, returning bytes consumed.
    pub fn decode(buf: &[u8]) -> ProtocolResult<(Self, usize)> {
        let mut reader = WireReader::new(buf);
        let metadata = Self::read(&mut reader)?;
        Ok((metadata, reader.position()))
    }

    /// Decode metadata from a reader.
    pub fn read(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let flags = reader.read_int()?;
        let count = reader.read_int()?;
        if count < 0 {
            return Err(ProtocolError::invalid(format!("negative column count {}", count)));
        }
        let count = count as usize;

        let global = if flags & FLAG_GLOBAL_TABLES_SPEC != 0 {
            let keyspace = reader.read_string()?.to_string();
            let table = reader.read_string()?.to_string();
            Some((keyspace, table))
        } else {
            None
        };

        let mut columns = Vec::with_capacity(count.min(1024));
        let mut index = HashMap::with_capacity(count.min(1024));
        for i in 0..count {
            let (keyspace, table) = match &global {
                Some((ks, table)) => (ks.clone(), table.clone()),
                None => {
                    let ks = reader.read_string()?.to_string();
                    let table = reader.read_string()?.to_string();
                    (ks, table)
                }
            };
            let name = reader.read_string()?.to_string();
            let column_type = ColumnType::decode(reader)?;
            index
                .entry((keyspace.clone(), table.clone(), name.clone()))
                .or_insert(i);
            columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                column_type,
            });
        }

        Ok(Self {
            flags,
            global,
            columns,
            index,
        })
    }

    /// Encode in wire layout.
    pub fn encode(&self, dst: &mut BytesMut) {
        wire::encode_int(dst, self.flags);
        wire::encode_int(dst, self.columns.len() as i32);
        if let Some((ks, table)) = &self.global {
            wire::encode_string(dst, ks);
            wire::encode_string(dst, table);
        }
        for col in &self.columns {
            if self.global.is_none() {
                wire::encode_string(dst, &col.keyspace);
                wire::encode_string(dst, &col.table);
            }
            wire::encode_string(dst, &col.name);
            col.column_type.encode(dst);
        }
    }

    /// Serialized size.
    pub fn size(&self) -> usize {
        let mut size = 8;
        if let Some((ks, table)) = &self.global {
            size += wire::string_size(ks) + wire::string_size(table);
        }
        for col in &self.columns {
            if self.global.is_none() {
                size += wire::string_size(&col.keyspace) + wire::string_size(&col.table);
            }
            size += wire::string_size(&col.name) + col.column_type.size();
        }
        size
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_global_tables_spec(&self) -> bool {
        self.global.is_some()
    }

    pub fn global_keyspace(&self) -> Option<&str> {
        self.global.as_ref().map(|(ks, _)| ks.as_str())
    }

    pub fn global_table(&self) -> Option<&str> {
        self.global.as_ref().map(|(_, table)| table.as_str())
    }

    /// Columns in result order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> AccessResult<&ColumnSpec> {
        self.columns.get(index).ok_or(AccessError::OutOfRange {
            index,
            len: self.columns.len(),
        })
    }

    /// Index of `keyspace.table.name`.
    pub fn column_index_in(&self, keyspace: &str, table: &str, name: &str) -> AccessResult<usize> {
        self.index
            .get(&(keyspace.to_string(), table.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| AccessError::UnknownColumn(format!("{}.{}.{}", keyspace, table, name)))
    }

    /// Index of `name` within the global keyspace/table.
    pub fn column_index(&self, name: &str) -> AccessResult<usize> {
        let (ks, table) = self.global.as_ref().ok_or(AccessError::NoGlobalTableSpec)?;
        self.column_index_in(ks, table, name)
    }

    /// Declared type of `keyspace.table.name`.
    pub fn column_type_in(&self, keyspace: &str, table: &str, name: &str) -> AccessResult<&ColumnType> {
        let i = self.column_index_in(keyspace, table, name)?;
        Ok(&self.columns[i].column_type)
    }

    /// Declared type of `name` within the global keyspace/table.
    pub fn column_type(&self, name: &str) -> AccessResult<&ColumnType> {
        let i = self.column_index(name)?;
        Ok(&self.columns[i].column_type)
    }

    /// Custom class of `keyspace.table.name`; `None` for non-custom columns.
    pub fn column_class_in(&self, keyspace: &str, table: &str, name: &str) -> AccessResult<Option<&str>> {
        let i = self.column_index_in(keyspace, table, name)?;
        Ok(self.columns[i].custom_class())
    }

    /// Custom class of `name` within the global keyspace/table.
    pub fn column_class(&self, name: &str) -> AccessResult<Option<&str>> {
        let i = self.column_index(name)?;
        Ok(self.columns[i].custom_class())
    }
}
