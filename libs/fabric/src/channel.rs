use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{self, Address, Transport};

/// High-level channel for bidirectional communication
///
/// Combines a transport and codec for persistent connections
pub struct Channel<C> {
    transport: Box<dyn Transport>,
    codec: C,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing transport
    pub fn from_transport(transport: impl Transport + 'static, codec: C) -> Self {
        Self {
            transport: Box::new(transport),
            codec,
        }
    }

    /// Open a channel to any supported address
    pub async fn connect(address: &Address, codec: C) -> Result<Self> {
        let transport = transport::connect(address).await?;
        Ok(Self { transport, codec })
    }

    /// Send a message over the channel
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.transport.send(&bytes).await
    }

    /// Receive a message from the channel
    pub async fn receive<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T> {
        let bytes = self.transport.receive().await?;
        self.codec.decode(&bytes)
    }

    /// Wait until a message (or EOF) is ready; safe to race against a timeout
    pub async fn readable(&mut self) -> Result<()> {
        self.transport.readable().await
    }

    /// Close the channel
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}
