//! In-process mock server for integration tests.
//!
//! [`MockTransport`] hands every connection a `tokio::io::duplex` pipe whose
//! other end is served by a scripted node. The port picks the node, so one
//! transport can stand in for a small cluster.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use cql_driver::driver::BoxedStream;
use cql_driver::protocol::{
    Authenticate, Compression, Credentials, Envelope, ErrorCode, ErrorMessage, Event, FrameCodec,
    Message, Supported, EVENT_STREAM_ID,
};
use cql_driver::Transport;

/// Builds the reply to a QUERY, PREPARE or EXECUTE. `None` holds the
/// request unanswered.
pub type Responder = Arc<dyn Fn(u16, &Message) -> Option<Message> + Send + Sync>;

/// How a node behaves.
#[derive(Clone)]
pub struct Node {
    /// Authenticator class demanded after STARTUP
    pub authenticator: Option<String>,
    /// Accepted username and password
    pub credentials: Option<Credentials>,
    /// Values advertised under COMPRESSION
    pub compression: Vec<String>,
    /// Pushed on the event stream after REGISTER
    pub events: Vec<Event>,
    pub responder: Responder,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            authenticator: None,
            credentials: None,
            compression: Vec::new(),
            events: Vec::new(),
            responder: Arc::new(|_, _| None),
        }
    }
}

impl Node {
    pub fn responding(responder: impl Fn(u16, &Message) -> Option<Message> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Cluster {
    nodes: HashMap<u16, Node>,
    refused: Vec<u16>,
    sessions: HashMap<u16, Vec<JoinHandle<()>>>,
    received: HashMap<u16, Vec<Envelope>>,
    connects: HashMap<u16, usize>,
}

/// Transport connecting to in-process nodes.
#[derive(Clone, Default)]
pub struct MockTransport {
    cluster: Arc<Mutex<Cluster>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, port: u16, node: Node) -> Self {
        self.cluster.lock().nodes.insert(port, node);
        self
    }

    /// Refuse new connections to `port`.
    pub fn refuse(&self, port: u16) {
        self.cluster.lock().refused.push(port);
    }

    /// Drop every open session on `port`, as if the node crashed.
    pub fn kill(&self, port: u16) {
        if let Some(sessions) = self.cluster.lock().sessions.remove(&port) {
            for session in sessions {
                session.abort();
            }
        }
    }

    /// Requests the node on `port` has received, handshake included.
    pub fn received(&self, port: u16) -> Vec<Envelope> {
        self.cluster
            .lock()
            .received
            .get(&port)
            .cloned()
            .unwrap_or_default()
    }

    /// Connection attempts made to `port`.
    pub fn connects(&self, port: u16) -> usize {
        self.cluster.lock().connects.get(&port).copied().unwrap_or(0)
    }

    /// Wait until `port` has received `count` requests matching `pred`.
    pub async fn wait_received(&self, port: u16, count: usize, pred: impl Fn(&Message) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let seen = self
                    .received(port)
                    .iter()
                    .filter(|e| pred(&e.message))
                    .count();
                if seen >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("node did not receive the expected requests");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxedStream> {
        let port = addr.port();
        let mut cluster = self.cluster.lock();
        *cluster.connects.entry(port).or_default() += 1;
        if cluster.refused.contains(&port) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        let Some(node) = cluster.nodes.get(&port).cloned() else {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no such node"));
        };

        let (client, server) = tokio::io::duplex(1024 * 1024);
        let session = tokio::spawn(serve(port, node, server, self.cluster.clone()));
        cluster.sessions.entry(port).or_default().push(session);
        Ok(Box::new(client))
    }
}

async fn serve(port: u16, node: Node, stream: DuplexStream, cluster: Arc<Mutex<Cluster>>) {
    let mut framed = Framed::new(stream, FrameCodec::new());
    let mut compression = None;

    while let Some(Ok(frame)) = framed.next().await {
        let Ok(envelope) = Envelope::from_frame(frame, compression) else {
            break;
        };
        cluster
            .lock()
            .received
            .entry(port)
            .or_default()
            .push(envelope.clone());

        let stream = envelope.stream;
        let mut replies = Vec::new();
        match &envelope.message {
            Message::Options => replies.push((
                stream,
                Message::Supported(Supported::new(vec![
                    ("CQL_VERSION".to_string(), vec!["3.0.0".to_string()]),
                    ("COMPRESSION".to_string(), node.compression.clone()),
                ])),
            )),
            Message::Startup(startup) => {
                compression = startup
                    .compression()
                    .and_then(Compression::from_name)
                    .filter(|c| node.compression.iter().any(|n| n == c.as_str()));
                let reply = match &node.authenticator {
                    Some(authenticator) => Message::Authenticate(Authenticate {
                        authenticator: authenticator.clone(),
                    }),
                    None => Message::Ready,
                };
                replies.push((stream, reply));
            }
            Message::Credentials(credentials) => {
                let reply = if node.credentials.as_ref() == Some(credentials) {
                    Message::Ready
                } else {
                    Message::Error(ErrorMessage::new(
                        ErrorCode::BadCredentials,
                        "Username and/or password are incorrect",
                    ))
                };
                replies.push((stream, reply));
            }
            Message::Register(_) => {
                replies.push((stream, Message::Ready));
                for event in &node.events {
                    replies.push((EVENT_STREAM_ID, Message::Event(event.clone())));
                }
            }
            request => {
                if let Some(reply) = (node.responder)(port, request) {
                    replies.push((stream, reply));
                }
            }
        }

        for (stream, reply) in replies {
            if framed.send(reply.to_frame(stream, compression)).await.is_err() {
                return;
            }
        }
    }
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let ok = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(ok.is_ok(), "timed out waiting for {}", what);
}
