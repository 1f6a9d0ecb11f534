//! Messenger Fabric - Low-level transport and codec layer
//!
//! Provides transport abstractions (TCP, Unix sockets), addresses in
//! `tcp://host:port` / `ipc:///path` form, and codecs (bincode, JSON) used by
//! the messenger endpoint to talk to the hub.
//!
//! # Example
//!
//! ```no_run
//! use messenger_fabric::{Address, Channel, codec::BincodeCodec, push::push};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let address: Address = "tcp://127.0.0.1:15567".parse()?;
//!
//! // One-off delivery on a transient connection
//! push(&address, &[vec!["SYNC".to_string()]], BincodeCodec).await?;
//!
//! // Or keep a channel open
//! let mut channel = Channel::connect(&address, BincodeCodec).await?;
//! channel.send(&vec!["SYNC".to_string()]).await?;
//! let reply: Vec<String> = channel.receive().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod push;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use codec::CodecKind;
pub use error::{Error, Result};
pub use transport::Address;
