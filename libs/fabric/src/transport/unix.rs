use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;
use crate::transport::framing::{read_message, write_message};
use crate::transport::{Transport, TransportListener};

/// Unix domain socket transport with length-prefix framing
///
/// Same wire layout as the TCP transport.
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
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

/// Unix socket listener; owns the socket file and removes it on close or drop
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path, replacing a stale socket file
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl TransportListener for UnixTransportListener {
    type Transport = UnixTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(UnixTransport::from_stream(stream))
    }

    async fn close(&mut self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
