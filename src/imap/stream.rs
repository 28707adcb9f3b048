//! Plain / TLS stream handling for IMAP connections.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::SessionError;

/// A connection that is either plaintext or TLS-wrapped.
pub enum ImapStream {
    Plain(TcpStream),
    /// Boxed to keep the enum small.
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Open a plaintext TCP connection.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self, SessionError> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|source| SessionError::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        Ok(Self::Plain(tcp))
    }

    /// Open a connection with implicit TLS.
    pub async fn connect_tls(host: &str, port: u16) -> Result<Self, SessionError> {
        let stream = Self::connect_plain(host, port).await?;
        stream.upgrade_to_tls(host).await
    }

    /// Wrap an existing plaintext connection in TLS (STARTTLS upgrade).
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self, SessionError> {
        match self {
            Self::Plain(tcp) => {
                let connector = tls_connector();
                let server_name =
                    ServerName::try_from(host.to_string()).map_err(|e| SessionError::Tls {
                        host: host.to_string(),
                        reason: e.to_string(),
                    })?;
                let tls = connector.connect(server_name, tcp).await.map_err(|e| {
                    SessionError::Tls {
                        host: host.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(SessionError::Protocol(
                "stream is already TLS-wrapped".into(),
            )),
        }
    }
}

/// TLS connector trusting the webpki root set.
fn tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
