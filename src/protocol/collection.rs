//! Lazy views over list, set and map cells.
//!
//! A collection cell is `[short n]` followed by `n` elements (or `n`
//! key/value pairs for maps), each element being `[short len][bytes]`.
//! Only the count is read up front; elements are decoded as they are
//! visited.

use super::error::{AccessError, AccessResult, ProtocolError, ProtocolResult};
use super::types::ColumnType;
use super::value::FromCql;

/// Walks `[short len][bytes]` elements.
#[derive(Debug, Clone)]
struct Elements<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Elements<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_element(&mut self) -> ProtocolResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        if rest.len() < 2 {
            return Err(ProtocolError::truncated(2, rest.len()));
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        if rest.len() < 2 + len {
            return Err(ProtocolError::truncated(2 + len, rest.len()));
        }
        self.pos += 2 + len;
        Ok(&rest[2..2 + len])
    }
}

fn read_count(data: &[u8]) -> ProtocolResult<(usize, &[u8])> {
    if data.len() < 2 {
        return Err(ProtocolError::truncated(2, data.len()));
    }
    Ok((u16::from_be_bytes([data[0], data[1]]) as usize, &data[2..]))
}

fn decode_as<'a, T: FromCql<'a>>(ty: &ColumnType, bytes: &'a [u8]) -> AccessResult<T> {
    if !T::accepts(ty) {
        return Err(AccessError::TypeMismatch {
            expected: T::TYPE_NAME.to_string(),
            actual: ty.to_string(),
        });
    }
    Ok(T::from_cql(ty, bytes)?)
}

// ============================================================================
// ListView / SetView
// ============================================================================

/// View over a `list<T>` cell.
#[derive(Debug, Clone)]
pub struct ListView<'a> {
    element_type: &'a ColumnType,
    len: usize,
    body: &'a [u8],
}

impl<'a> ListView<'a> {
    /// Create a view over cell bytes. Only the element count is read.
    pub fn new(element_type: &'a ColumnType, cell: &'a [u8]) -> ProtocolResult<Self> {
        let (len, body) = read_count(cell)?;
        Ok(Self {
            element_type,
            len,
            body,
        })
    }

    /// Declared element type.
    pub fn element_type(&self) -> &'a ColumnType {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw bytes of each element.
    pub fn iter_raw(&self) -> RawIter<'a> {
        RawIter {
            elements: Elements::new(self.body),
            remaining: self.len,
        }
    }

    /// Raw bytes of element `index`.
    pub fn raw(&self, index: usize) -> AccessResult<&'a [u8]> {
        if index >= self.len {
            return Err(AccessError::OutOfRange {
                index,
                len: self.len,
            });
        }
        let mut elements = Elements::new(self.body);
        for _ in 0..index {
            elements.next_element()?;
        }
        Ok(elements.next_element()?)
    }

    /// Element `index` as `T`.
    pub fn get<T: FromCql<'a>>(&self, index: usize) -> AccessResult<T> {
        let bytes = self.raw(index)?;
        decode_as(self.element_type, bytes)
    }

    /// Elements as `T`, decoded one at a time.
    pub fn iter<T: FromCql<'a> + 'a>(&self) -> impl Iterator<Item = AccessResult<T>> + 'a {
        let ty = self.element_type;
        self.iter_raw()
            .map(move |raw| raw.map_err(AccessError::from).and_then(|b| decode_as(ty, b)))
    }

    /// Decode every element into a `Vec`.
    pub fn to_vec<T: FromCql<'a> + 'a>(&self) -> AccessResult<Vec<T>> {
        self.iter().collect()
    }
}

/// View over a `set<T>` cell. Element order is the order on the wire.
#[derive(Debug, Clone)]
pub struct SetView<'a>(ListView<'a>);

impl<'a> SetView<'a> {
    pub fn new(element_type: &'a ColumnType, cell: &'a [u8]) -> ProtocolResult<Self> {
        ListView::new(element_type, cell).map(SetView)
    }

    pub fn element_type(&self) -> &'a ColumnType {
        self.0.element_type()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter_raw(&self) -> RawIter<'a> {
        self.0.iter_raw()
    }

    pub fn iter<T: FromCql<'a> + 'a>(&self) -> impl Iterator<Item = AccessResult<T>> + 'a {
        self.0.iter()
    }

    pub fn to_vec<T: FromCql<'a> + 'a>(&self) -> AccessResult<Vec<T>> {
        self.0.to_vec()
    }

    /// Whether an element equal to `value` is present.
    pub fn contains<T: FromCql<'a> + PartialEq + 'a>(&self, value: &T) -> AccessResult<bool> {
        for item in self.iter::<T>() {
            if &item? == value {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Iterator over raw element bytes of a list or set.
#[derive(Debug, Clone)]
pub struct RawIter<'a> {
    elements: Elements<'a>,
    remaining: usize,
}

impl<'a> Iterator for RawIter<'a> {
    type Item = ProtocolResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = self.elements.next_element();
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

// ============================================================================
// MapView
// ============================================================================

/// View over a `map<K, V>` cell.
#[derive(Debug, Clone)]
pub struct MapView<'a> {
    key_type: &'a ColumnType,
    value_type: &'a ColumnType,
    len: usize,
    body: &'a [u8],
}

impl<'a> MapView<'a> {
    pub fn new(
        key_type: &'a ColumnType,
        value_type: &'a ColumnType,
        cell: &'a [u8],
    ) -> ProtocolResult<Self> {
        let (len, body) = read_count(cell)?;
        Ok(Self {
            key_type,
            value_type,
            len,
            body,
        })
    }

    pub fn key_type(&self) -> &'a ColumnType {
        self.key_type
    }

    pub fn value_type(&self) -> &'a ColumnType {
        self.value_type
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw key and value bytes of each entry.
    pub fn iter_raw(&self) -> RawEntries<'a> {
        RawEntries {
            elements: Elements::new(self.body),
            remaining: self.len,
        }
    }

    /// Entries as `(K, V)`, decoded one at a time.
    pub fn iter<K, V>(&self) -> impl Iterator<Item = AccessResult<(K, V)>> + 'a
    where
        K: FromCql<'a> + 'a,
        V: FromCql<'a> + 'a,
    {
        let (kt, vt) = (self.key_type, self.value_type);
        self.iter_raw().map(move |entry| {
            let (k, v) = entry?;
            Ok((decode_as(kt, k)?, decode_as(vt, v)?))
        })
    }

    /// Value of the first entry whose key equals `key`.
    pub fn get<K, V>(&self, key: &K) -> AccessResult<Option<V>>
    where
        K: FromCql<'a> + PartialEq,
        V: FromCql<'a>,
    {
        for entry in self.iter_raw() {
            let (k, v) = entry?;
            if &decode_as::<K>(self.key_type, k)? == key {
                return decode_as(self.value_type, v).map(Some);
            }
        }
        Ok(None)
    }

    /// Decode every entry into a `Vec`, preserving wire order.
    pub fn to_vec<K, V>(&self) -> AccessResult<Vec<(K, V)>>
    where
        K: FromCql<'a> + 'a,
        V: FromCql<'a> + 'a,
    {
        self.iter().collect()
    }
}

/// Iterator over raw `(key, value)` bytes of a map.
#[derive(Debug, Clone)]
pub struct RawEntries<'a> {
    elements: Elements<'a>,
    remaining: usize,
}

impl<'a> Iterator for RawEntries<'a> {
    type Item = ProtocolResult<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self
            .elements
            .next_element()
            .and_then(|k| self.elements.next_element().map(|v| (k, v)));
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::{encode_collection, encode_map};

    #[test]
    fn test_list_view() {
        let cell = encode_collection(&[10i32, 20, 30]);
        let ty = ColumnType::Int;
        let list = ListView::new(&ty, &cell).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get::<i32>(1).unwrap(), 20);
        assert_eq!(list.to_vec::<i32>().unwrap(), vec![10, 20, 30]);
        assert!(matches!(
            list.get::<i32>(3),
            Err(AccessError::OutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            list.get::<&str>(0),
            Err(AccessError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_list() {
        let cell = encode_collection::<i32>(&[]);
        let ty = ColumnType::Int;
        let list = ListView::new(&ty, &cell).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.iter::<i32>().count(), 0);
    }

    #[test]
    fn test_set_view() {
        let cell = encode_collection(&["a", "b"]);
        let ty = ColumnType::Ascii;
        let set = SetView::new(&ty, &cell).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"b").unwrap());
        assert!(!set.contains(&"c").unwrap());
        assert_eq!(set.to_vec::<String>().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_map_view() {
        let cell = encode_map(&[("one", 1i64), ("two", 2i64)]);
        let (kt, vt) = (ColumnType::Varchar, ColumnType::BigInt);
        let map = MapView::new(&kt, &vt, &cell).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get::<&str, i64>(&"two").unwrap(), Some(2));
        assert_eq!(map.get::<&str, i64>(&"three").unwrap(), None);
        assert_eq!(
            map.to_vec::<&str, i64>().unwrap(),
            vec![("one", 1), ("two", 2)]
        );
    }

    #[test]
    fn test_truncated_element_is_reported_lazily() {
        // count says 2, only one complete element follows
        let cell = [0u8, 2, 0, 4, 0, 0, 0, 1, 0, 4, 0];
        let ty = ColumnType::Int;
        let list = ListView::new(&ty, &cell).unwrap();
        assert_eq!(list.get::<i32>(0).unwrap(), 1);
        assert!(matches!(
            list.get::<i32>(1),
            Err(AccessError::Malformed(ProtocolError::TruncatedFrame { .. }))
        ));
        let items: Vec<_> = list.iter::<i32>().collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[test]
    fn test_missing_count() {
        let ty = ColumnType::Int;
        assert!(ListView::new(&ty, &[0]).is_err());
    }
}
