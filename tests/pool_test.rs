//! Pool routing, failover and eviction.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;

use cql_driver::protocol::{Message, QueryResult};
use cql_driver::{
    ConnectionConfig, ConnectionPool, Consistency, DriverError, Event, EventType, PoolConfig,
};

use common::{eventually, MockTransport, Node};

const NODE_A: u16 = 9001;
const NODE_B: u16 = 9002;

/// Answers every QUERY with the node's port as the keyspace.
fn named_node() -> Node {
    Node::responding(|port, request| match request {
        Message::Query(_) => Some(Message::Result(QueryResult::SetKeyspace(format!(
            "node{}",
            port
        )))),
        _ => None,
    })
}

fn pool(transport: &MockTransport, reconnect_limit: usize) -> ConnectionPool {
    ConnectionPool::with_transport(
        PoolConfig::builder()
            .reconnect_limit(reconnect_limit)
            .build(),
        Arc::new(transport.clone()),
    )
}

async fn answering_node(pool: &ConnectionPool) -> String {
    let (_, _, response) = pool.query("SELECT now() FROM system.local", Consistency::One).unwrap();
    match response.await.unwrap().result {
        QueryResult::SetKeyspace(node) => node,
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_pool_ready_and_round_robin() {
    let transport = MockTransport::new()
        .with_node(NODE_A, named_node())
        .with_node(NODE_B, named_node());
    let pool = pool(&transport, 3);
    let ready_calls = Arc::new(AtomicUsize::new(0));
    let captured = ready_calls.clone();
    pool.on_ready(move || {
        captured.fetch_add(1, Ordering::SeqCst);
    });

    pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.add_client("127.0.0.1", NODE_B).unwrap();
    pool.wait_ready().await.unwrap();
    eventually("both connections ready", || pool.metrics().ready == 2).await;

    assert!(pool.is_ready());
    assert_eq!(ready_calls.load(Ordering::SeqCst), 1);

    let mut answered = Vec::new();
    for _ in 0..4 {
        answered.push(answering_node(&pool).await);
    }
    let distinct: HashSet<_> = answered.iter().collect();
    assert_eq!(distinct.len(), 2, "requests should alternate: {:?}", answered);
    assert_ne!(answered[0], answered[1]);
    assert_eq!(answered[0], answered[2]);
}

#[tokio::test]
async fn test_pool_failover_evicts_failing_node() {
    let transport = MockTransport::new()
        .with_node(NODE_A, named_node())
        .with_node(NODE_B, named_node());
    let pool = pool(&transport, 2);
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let captured = evicted.clone();
    pool.on_connection_error(move |id, err| captured.lock().push((id, err.clone())));

    let a = pool.add_client("127.0.0.1", NODE_A).unwrap();
    let b = pool.add_client("127.0.0.1", NODE_B).unwrap();
    eventually("both connections ready", || pool.metrics().ready == 2).await;

    // Node A goes away for good.
    transport.refuse(NODE_A);
    transport.kill(NODE_A);

    eventually("node A evicted", || pool.size() == 1).await;
    assert_eq!(pool.connections()[0].id(), b);
    assert_eq!(pool.error_count(a), None);
    assert_eq!(pool.error_count(b), Some(0));

    let evicted = evicted.lock().clone();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, a);
    assert!(evicted[0].1.is_transport());

    // One connect, then one reconnect per tolerated error.
    assert_eq!(transport.connects(NODE_A), 3);
    let metrics = pool.metrics();
    assert_eq!(metrics.total_evictions, 1);
    assert_eq!(metrics.total_reconnects, 2);
    assert!(!metrics.defunct);

    assert!(pool.is_ready());
    for _ in 0..4 {
        assert_eq!(answering_node(&pool).await, format!("node{}", NODE_B));
    }
}

#[tokio::test]
async fn test_transient_failure_resets_error_count() {
    let transport = MockTransport::new().with_node(NODE_A, named_node());
    let pool = pool(&transport, 1);
    let a = pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.wait_ready().await.unwrap();

    transport.kill(NODE_A);
    eventually("reconnected", || transport.connects(NODE_A) == 2).await;
    eventually("error count reset", || {
        pool.error_count(a) == Some(0) && pool.metrics().ready == 1
    })
    .await;

    // A second crash is again within the limit.
    transport.kill(NODE_A);
    eventually("reconnected again", || transport.connects(NODE_A) == 3).await;
    eventually("ready again", || pool.metrics().ready == 1).await;
    assert_eq!(pool.size(), 1);
    assert_eq!(answering_node(&pool).await, format!("node{}", NODE_A));
}

#[tokio::test]
async fn test_pool_defunct_when_empty() {
    let transport = MockTransport::new().with_node(NODE_A, named_node());
    let pool = pool(&transport, 1);
    let defunct_calls = Arc::new(AtomicUsize::new(0));
    let captured = defunct_calls.clone();
    pool.on_defunct(move || {
        captured.fetch_add(1, Ordering::SeqCst);
    });

    pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.wait_ready().await.unwrap();

    transport.refuse(NODE_A);
    transport.kill(NODE_A);
    eventually("pool defunct", || pool.is_defunct()).await;

    assert_eq!(defunct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(pool.size(), 0);
    assert!(!pool.is_ready());
    assert!(matches!(
        pool.query("SELECT 1", Consistency::One),
        Err(DriverError::PoolExhausted(_))
    ));
}

#[tokio::test]
async fn test_pool_recovers_from_defunct() {
    let transport = MockTransport::new()
        .with_node(NODE_A, named_node())
        .with_node(NODE_B, named_node());
    let pool = pool(&transport, 0);
    pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.wait_ready().await.unwrap();

    transport.refuse(NODE_A);
    transport.kill(NODE_A);
    eventually("pool defunct", || pool.is_defunct()).await;

    pool.add_client("127.0.0.1", NODE_B).unwrap();
    eventually("pool ready again", || pool.is_ready()).await;
    assert!(!pool.is_defunct());
    assert_eq!(answering_node(&pool).await, format!("node{}", NODE_B));
}

#[tokio::test]
async fn test_pool_forwards_events() {
    let event = Event::TopologyChange {
        change: "NEW_NODE".into(),
        address: "10.0.0.3:9042".parse().unwrap(),
    };
    let node = Node {
        events: vec![event.clone()],
        ..named_node()
    };
    let transport = MockTransport::new().with_node(NODE_A, node);
    let pool = ConnectionPool::with_transport(
        PoolConfig::builder()
            .connection(
                ConnectionConfig::builder()
                    .events(vec![EventType::TopologyChange])
                    .build(),
            )
            .build(),
        Arc::new(transport.clone()),
    );
    let mut events = pool.event_stream();

    pool.add_client("127.0.0.1", NODE_A).unwrap();
    assert_eq!(events.next().await, Some(event));
}

#[tokio::test]
async fn test_pool_callback_variant() {
    let transport = MockTransport::new().with_node(NODE_A, named_node());
    let pool = pool(&transport, 3);
    pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.wait_ready().await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    pool.query_with("SELECT 1", Consistency::One, move |result| {
        let _ = tx.send(result);
    })
    .unwrap();
    assert_eq!(
        rx.await.unwrap().unwrap().result,
        QueryResult::SetKeyspace(format!("node{}", NODE_A))
    );
}

#[tokio::test]
async fn test_pool_close() {
    let transport = MockTransport::new().with_node(NODE_A, Node::default());
    let pool = pool(&transport, 3);
    pool.add_client("127.0.0.1", NODE_A).unwrap();
    pool.wait_ready().await.unwrap();

    let (_, _, pending) = pool.query("SELECT 1", Consistency::One).unwrap();
    let connections = pool.connections();
    pool.close();

    assert_eq!(pending.await.unwrap_err(), DriverError::ConnectionClosed);
    assert_eq!(pool.size(), 0);
    assert!(connections.iter().all(|c| c.is_closing()));
    assert!(pool.add_client("127.0.0.1", NODE_A).is_err());
}
