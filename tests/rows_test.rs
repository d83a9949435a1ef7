//! Decoding a wide row of every cell type, as served for `km.test_cf`.

mod common;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use cql_driver::protocol::value::{encode_collection, encode_map};
use cql_driver::protocol::{ColumnSpec, Message, QueryResult, ResultMetadata, Rows, Varint};
use cql_driver::{ColumnType, Connection, ConnectionConfig, Consistency, DriverError, ToCql};

use common::{MockTransport, Node};

const UUID: u128 = 0x550e_8400_e29b_41d4_a716_4466_5544_0000;

/// RESULT body for `SELECT * FROM km.test_cf`, one row, written out by hand.
const TEST_CF_RESULT: [u8; 458] = [
    // kind: ROWS
    0x00, 0x00, 0x00, 0x02,
    // flags: global tables spec
    0x00, 0x00, 0x00, 0x01,
    // column count: 17
    0x00, 0x00, 0x00, 0x11,
    // "km"
    0x00, 0x02, 0x6B, 0x6D,
    // "test_cf"
    0x00, 0x07, 0x74, 0x65, 0x73, 0x74, 0x5F, 0x63, 0x66,
    // "key" varchar
    0x00, 0x03, 0x6B, 0x65, 0x79, 0x00, 0x0D,
    // "ascii_col" ascii
    0x00, 0x09, 0x61, 0x73, 0x63, 0x69, 0x69, 0x5F, 0x63, 0x6F, 0x6C, 0x00,
    0x01,
    // "bigint_col" bigint
    0x00, 0x0A, 0x62, 0x69, 0x67, 0x69, 0x6E, 0x74, 0x5F, 0x63, 0x6F, 0x6C,
    0x00, 0x02,
    // "blob_col" blob
    0x00, 0x08, 0x62, 0x6C, 0x6F, 0x62, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x03,
    // "boolean_col" boolean
    0x00, 0x0B, 0x62, 0x6F, 0x6F, 0x6C, 0x65, 0x61, 0x6E, 0x5F, 0x63, 0x6F,
    0x6C, 0x00, 0x04,
    // "decimal_col" decimal
    0x00, 0x0B, 0x64, 0x65, 0x63, 0x69, 0x6D, 0x61, 0x6C, 0x5F, 0x63, 0x6F,
    0x6C, 0x00, 0x06,
    // "double_col" double
    0x00, 0x0A, 0x64, 0x6F, 0x75, 0x62, 0x6C, 0x65, 0x5F, 0x63, 0x6F, 0x6C,
    0x00, 0x07,
    // "float_col" float
    0x00, 0x09, 0x66, 0x6C, 0x6F, 0x61, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00,
    0x08,
    // "inet_col" inet
    0x00, 0x08, 0x69, 0x6E, 0x65, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x10,
    // "int_col" int
    0x00, 0x07, 0x69, 0x6E, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x09,
    // "text_col" text
    0x00, 0x08, 0x74, 0x65, 0x78, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x0A,
    // "timestamp_col" timestamp
    0x00, 0x0D, 0x74, 0x69, 0x6D, 0x65, 0x73, 0x74, 0x61, 0x6D, 0x70, 0x5F,
    0x63, 0x6F, 0x6C, 0x00, 0x0B,
    // "uuid_col" uuid
    0x00, 0x08, 0x75, 0x75, 0x69, 0x64, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x0C,
    // "varint_col" varint
    0x00, 0x0A, 0x76, 0x61, 0x72, 0x69, 0x6E, 0x74, 0x5F, 0x63, 0x6F, 0x6C,
    0x00, 0x0E,
    // "list_col" list<int>
    0x00, 0x08, 0x6C, 0x69, 0x73, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x20,
    0x00, 0x09,
    // "set_col" set<varchar>
    0x00, 0x07, 0x73, 0x65, 0x74, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x22, 0x00,
    0x0D,
    // "map_col" map<varchar, int>
    0x00, 0x07, 0x6D, 0x61, 0x70, 0x5F, 0x63, 0x6F, 0x6C, 0x00, 0x21, 0x00,
    0x0D, 0x00, 0x09,
    // rows count: 1
    0x00, 0x00, 0x00, 0x01,
    // "row1"
    0x00, 0x00, 0x00, 0x04, 0x72, 0x6F, 0x77, 0x31,
    // "ascii"
    0x00, 0x00, 0x00, 0x05, 0x61, 0x73, 0x63, 0x69, 0x69,
    // i64::MAX
    0x00, 0x00, 0x00, 0x08, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // DEADBEEF
    0x00, 0x00, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF,
    // true
    0x00, 0x00, 0x00, 0x01, 0x01,
    // scale 2, unscaled 31415
    0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x02, 0x7A, 0xB7,
    // 2.718281828
    0x00, 0x00, 0x00, 0x08, 0x40, 0x05, 0xBF, 0x0A, 0x8B, 0x04, 0x91, 0x9B,
    // 1.5
    0x00, 0x00, 0x00, 0x04, 0x3F, 0xC0, 0x00, 0x00,
    // 127.0.0.1
    0x00, 0x00, 0x00, 0x04, 0x7F, 0x00, 0x00, 0x01,
    // -42
    0x00, 0x00, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xD6,
    // "unicode \u{00e9}\u{00e8}"
    0x00, 0x00, 0x00, 0x0C, 0x75, 0x6E, 0x69, 0x63, 0x6F, 0x64, 0x65, 0x20,
    0xC3, 0xA9, 0xC3, 0xA8,
    // 2013-01-01T00:26:40Z
    0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x01, 0x3B, 0xF3, 0x80, 0xC2, 0x00,
    // 550e8400-e29b-41d4-a716-446655440000
    0x00, 0x00, 0x00, 0x10, 0x55, 0x0E, 0x84, 0x00, 0xE2, 0x9B, 0x41, 0xD4,
    0xA7, 0x16, 0x44, 0x66, 0x55, 0x44, 0x00, 0x00,
    // -129
    0x00, 0x00, 0x00, 0x02, 0xFF, 0x7F,
    // [1, 2, 3]
    0x00, 0x00, 0x00, 0x14, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01,
    0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x03,
    // {"a", "b"}
    0x00, 0x00, 0x00, 0x08, 0x00, 0x02, 0x00, 0x01, 0x61, 0x00, 0x01, 0x62,
    // {"one": 1, "two": 2}
    0x00, 0x00, 0x00, 0x18, 0x00, 0x04, 0x00, 0x03, 0x6F, 0x6E, 0x65, 0x00,
    0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 0x74, 0x77, 0x6F, 0x00, 0x04,
    0x00, 0x00, 0x00, 0x02,
];

fn columns() -> Vec<ColumnSpec> {
    let col = |name: &str, ty: ColumnType| ColumnSpec::new("km", "test_cf", name, ty);
    vec![
        col("key", ColumnType::Varchar),
        col("ascii_col", ColumnType::Ascii),
        col("bigint_col", ColumnType::BigInt),
        col("blob_col", ColumnType::Blob),
        col("boolean_col", ColumnType::Boolean),
        col("decimal_col", ColumnType::Decimal),
        col("double_col", ColumnType::Double),
        col("float_col", ColumnType::Float),
        col("inet_col", ColumnType::Inet),
        col("int_col", ColumnType::Int),
        col("text_col", ColumnType::Text),
        col("timestamp_col", ColumnType::Timestamp),
        col("uuid_col", ColumnType::Uuid),
        col("varint_col", ColumnType::Varint),
        col("list_col", ColumnType::List(Box::new(ColumnType::Int))),
        col("set_col", ColumnType::Set(Box::new(ColumnType::Varchar))),
        col(
            "map_col",
            ColumnType::Map(Box::new(ColumnType::Varchar), Box::new(ColumnType::Int)),
        ),
    ]
}

/// `decimal` cell: `[int scale][varint unscaled]`.
fn decimal(scale: i32, unscaled: i64) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_i32(scale);
    buf.put_slice(&Varint(unscaled).to_cql());
    buf.freeze()
}

fn fixture() -> Rows {
    let metadata = ResultMetadata::new(Some(("km".into(), "test_cf".into())), columns());
    let timestamp = Utc.timestamp_millis_opt(1_357_000_000_000).unwrap();
    let full = vec![
        Some("row1".to_cql()),
        Some("ascii".to_cql()),
        Some(9_223_372_036_854_775_807i64.to_cql()),
        Some(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])),
        Some(true.to_cql()),
        Some(decimal(2, 31_415)),
        Some(2.718_281_828f64.to_cql()),
        Some(1.5f32.to_cql()),
        Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)).to_cql()),
        Some((-42i32).to_cql()),
        Some("unicode \u{00e9}\u{00e8}".to_cql()),
        Some(timestamp.to_cql()),
        Some(Uuid::from_u128(UUID).to_cql()),
        Some(Varint(-129).to_cql()),
        Some(encode_collection(&[1i32, 2, 3])),
        Some(encode_collection(&["a", "b"])),
        Some(encode_map(&[("one", 1i32), ("two", 2)])),
    ];
    let mut sparse = vec![None; 17];
    sparse[0] = Some("row2".to_cql());
    sparse[8] = Some(IpAddr::V6(Ipv6Addr::LOCALHOST).to_cql());
    Rows::from_cells(metadata, &[full, sparse]).unwrap()
}

fn check(rows: &Rows) -> Result<(), DriverError> {
    assert_eq!(rows.rows_count(), 2);
    assert_eq!(rows.column_count(), 17);
    let meta = rows.metadata();
    assert_eq!(meta.global_keyspace(), Some("km"));
    assert_eq!(meta.global_table(), Some("test_cf"));
    assert_eq!(meta.column_index("map_col")?, 16);
    assert!(matches!(meta.column_index("nope"), Err(_)));

    let row = rows.row(0)?;
    assert_eq!(row.get_string(0)?, "row1");
    assert_eq!(row.get::<&str>(1)?, "ascii");
    assert_eq!(row.get_bigint(2)?, i64::MAX);
    assert_eq!(row.get_blob(3)?, &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(row.get_bool(4)?);
    assert_eq!(row.get_decimal(5)?, (2, 31_415));
    assert_eq!(row.get_double(6)?, 2.718_281_828);
    assert_eq!(row.get_float(7)?, 1.5);
    assert_eq!(row.get_inet(8)?, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    assert_eq!(row.get_int(9)?, -42);
    assert_eq!(row.get_string(10)?, "unicode \u{00e9}\u{00e8}");
    assert_eq!(row.get_timestamp(11)?.timestamp_millis(), 1_357_000_000_000);
    assert_eq!(row.get_uuid(12)?, Uuid::from_u128(UUID));
    assert_eq!(row.get_varint(13)?, -129);

    let list = row.get_list(14)?;
    assert_eq!(list.len(), 3);
    assert_eq!(list.to_vec::<i32>()?, vec![1, 2, 3]);

    let set = row.get_set(15)?;
    assert!(set.contains(&"b")?);
    assert!(!set.contains(&"c")?);

    let map = row.get_map(16)?;
    assert_eq!(map.get::<&str, i32>(&"two")?, Some(2));
    assert_eq!(map.to_vec::<String, i32>()?, vec![("one".into(), 1), ("two".into(), 2)]);

    // Name lookup through the global table spec
    assert_eq!(row.get_by_name::<i32>("int_col")?, -42);

    // Type and null misuse
    assert!(matches!(
        row.get_int(0).map_err(DriverError::from),
        Err(DriverError::TypeMismatch { .. })
    ));
    let sparse = rows.row(1)?;
    assert_eq!(sparse.get_string(0)?, "row2");
    assert!(sparse.is_null(9)?);
    assert_eq!(sparse.get_opt::<i32>(9)?, None);
    assert!(matches!(
        sparse.get_int(9).map_err(DriverError::from),
        Err(DriverError::NullValue(9))
    ));
    assert_eq!(sparse.get_inet(8)?, IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert!(matches!(
        rows.row(2).map_err(DriverError::from),
        Err(DriverError::OutOfRange { index: 2, len: 2 })
    ));
    Ok(())
}

#[test]
fn test_fixture_decodes_locally() {
    let rows = fixture();
    let mut body = BytesMut::new();
    rows.encode(&mut body);
    let decoded = Rows::decode(body.freeze()).unwrap();
    check(&decoded).unwrap();
}

#[tokio::test]
async fn test_fixture_over_connection() {
    let node = Node::responding(|_, request| match request {
        Message::Query(q) if q.query == "SELECT * FROM km.test_cf" => {
            Some(Message::Result(QueryResult::Rows(fixture())))
        }
        _ => None,
    });
    let transport = MockTransport::new().with_node(9042, node);
    let conn = Connection::new(ConnectionConfig::default(), Arc::new(transport));
    conn.connect("127.0.0.1", 9042).await.unwrap();
    conn.wait_ready().await.unwrap();

    let (_, response) = conn
        .query("SELECT * FROM km.test_cf", Consistency::One)
        .unwrap();
    let response = response.await.unwrap();
    let rows = response.result.rows().expect("rows result");
    check(rows).unwrap();

    let keys: Vec<&str> = rows.iter().map(|r| r.get_string(0).unwrap()).collect();
    assert_eq!(keys, vec!["row1", "row2"]);
}

#[test]
fn test_literal_result_body() {
    let result = QueryResult::decode(Bytes::from_static(&TEST_CF_RESULT)).unwrap();
    let rows = result.rows().expect("rows result");
    assert_eq!(rows.rows_count(), 1);
    assert_eq!(rows.column_count(), 17);

    let meta = rows.metadata();
    assert!(meta.has_global_tables_spec());
    assert_eq!(meta.global_keyspace(), Some("km"));
    assert_eq!(meta.global_table(), Some("test_cf"));
    let names: Vec<&str> = meta.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names[0], "key");
    assert_eq!(names[16], "map_col");
    assert_eq!(meta.column_type("decimal_col").unwrap(), &ColumnType::Decimal);
    assert_eq!(
        meta.column_type("map_col").unwrap(),
        &ColumnType::Map(Box::new(ColumnType::Varchar), Box::new(ColumnType::Int))
    );
    let expected: Vec<ColumnSpec> = columns();
    assert_eq!(meta.columns(), expected.as_slice());

    let row = rows.row(0).unwrap();
    assert_eq!(row.get_string(0).unwrap(), "row1");
    assert_eq!(row.get::<&str>(1).unwrap(), "ascii");
    assert_eq!(row.get_bigint(2).unwrap(), i64::MAX);
    assert_eq!(row.get_blob(3).unwrap(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(row.get_bool(4).unwrap());
    assert_eq!(row.get_decimal(5).unwrap(), (2, 31_415));
    assert_eq!(row.get_double(6).unwrap(), 2.718_281_828);
    assert_eq!(row.get_float(7).unwrap(), 1.5);
    assert_eq!(row.get_inet(8).unwrap(), IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    assert_eq!(row.get_int(9).unwrap(), -42);
    assert_eq!(row.get_string(10).unwrap(), "unicode \u{00e9}\u{00e8}");
    assert_eq!(
        row.get_timestamp(11).unwrap(),
        Utc.with_ymd_and_hms(2013, 1, 1, 0, 26, 40).unwrap()
    );
    assert_eq!(row.get_uuid(12).unwrap(), Uuid::from_u128(UUID));
    assert_eq!(row.get_varint(13).unwrap(), -129);
    assert_eq!(row.get_list(14).unwrap().to_vec::<i32>().unwrap(), vec![1, 2, 3]);
    let set = row.get_set(15).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&"a").unwrap());
    assert!(set.contains(&"b").unwrap());
    assert_eq!(
        row.get_map(16).unwrap().to_vec::<String, i32>().unwrap(),
        vec![("one".into(), 1), ("two".into(), 2)]
    );
    assert_eq!(row.get_by_name::<i64>("bigint_col").unwrap(), i64::MAX);
}

#[test]
fn test_literal_result_body_truncated() {
    let body = Bytes::from_static(&TEST_CF_RESULT[..TEST_CF_RESULT.len() - 1]);
    assert!(QueryResult::decode(body).is_err());
}
