//! Byte-stream transports.
//!
//! A [`Transport`] resolves addresses, opens a stream and optionally
//! performs a TLS handshake on it. The connection drives everything else.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Duplex byte stream usable by a connection.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed stream returned by transports.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens byte streams to servers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve `host:port` to candidate addresses.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }

    /// Open a stream to `addr`.
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxedStream>;

    /// Whether [`handshake`](Self::handshake) must run after connect.
    fn is_tls(&self) -> bool {
        false
    }

    /// Secure an open stream. `host` is used for server name verification.
    async fn handshake(&self, stream: BoxedStream, _host: &str) -> io::Result<BoxedStream> {
        Ok(stream)
    }
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[cfg(feature = "tls")]
pub use tls::TlsTransport;

#[cfg(feature = "tls")]
mod tls {
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::ClientConfig;
    use tokio_rustls::TlsConnector;

    use super::{BoxedStream, TcpTransport, Transport};

    /// TCP followed by a rustls client handshake.
    #[derive(Clone)]
    pub struct TlsTransport {
        connector: TlsConnector,
    }

    impl TlsTransport {
        pub fn new(config: Arc<ClientConfig>) -> Self {
            Self {
                connector: TlsConnector::from(config),
            }
        }
    }

    impl std::fmt::Debug for TlsTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TlsTransport").finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl Transport for TlsTransport {
        async fn connect(&self, addr: SocketAddr) -> io::Result<BoxedStream> {
            TcpTransport.connect(addr).await
        }

        fn is_tls(&self) -> bool {
            true
        }

        async fn handshake(&self, stream: BoxedStream, host: &str) -> io::Result<BoxedStream> {
            let name = ServerName::try_from(host.to_string())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let stream = self.connector.connect(name, stream).await?;
            Ok(Box::new(stream))
        }
    }
}
