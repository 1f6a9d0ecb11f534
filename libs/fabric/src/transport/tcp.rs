use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::transport::framing::{read_message, write_message};
use crate::transport::{Transport, TransportListener};

/// TCP transport with length-prefix framing
///
/// Messages are sent with a 4-byte big-endian length prefix
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port`
    ///
    /// The host may be a name (`localhost:15566`); resolution happens here.
    pub async fn connect(addr: impl AsRef<str>) -> Result<Self> {
        let stream = TcpStream::connect(addr.as_ref()).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an accepted stream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        write_message(&mut self.stream, bytes).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        read_message(&mut self.stream).await
    }

    async fn readable(&mut self) -> Result<()> {
        self.stream.readable().await.map_err(Into::into)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept an incoming connection along with the peer address
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream), addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(TcpTransport::from_stream(stream))
    }

    /// Tokio's TcpListener has no explicit close; the socket is released on drop.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
