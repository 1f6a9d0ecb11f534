use crate::error::Result;

pub mod address;
mod framing;
pub mod tcp;
pub mod unix;

pub use self::address::Address;
pub use self::framing::MAX_MESSAGE_LEN;
pub use self::tcp::{TcpTransport, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportListener};

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send bytes over the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive bytes from the transport
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Wait until the connection has bytes to read (or has been closed by the peer)
    ///
    /// Cancel-safe: dropping the future loses no data, unlike `receive`.
    async fn readable(&mut self) -> Result<()>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}

/// Listener side of a transport, accepting one connection per peer
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport;

    /// Accept the next incoming connection
    async fn accept(&self) -> Result<Self::Transport>;

    /// Stop listening
    async fn close(&mut self) -> Result<()>;
}

/// Open a connection to `address` using whichever transport its scheme names
pub async fn connect(address: &Address) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match address {
        Address::Tcp(host) => Box::new(TcpTransport::connect(host).await?),
        Address::Unix(path) => Box::new(UnixTransport::connect(path).await?),
    };
    tracing::trace!(%address, "transport connected");
    Ok(transport)
}
