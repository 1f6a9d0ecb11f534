use serde::Serialize;

use crate::channel::Channel;
use crate::codec::Codec;
use crate::error::Result;
use crate::transport::Address;

/// Fire-and-forget delivery of a batch of messages on a fresh connection
///
/// Connects, writes every message in order, then closes. Nothing is shared
/// between calls, so concurrent callers never contend on a connection; the
/// price is one connection setup per call.
pub async fn push<T, C>(address: &Address, messages: &[T], codec: C) -> Result<()>
where
    T: Serialize,
    C: Codec,
{
    let mut channel = Channel::connect(address, codec).await?;
    for message in messages {
        channel.send(message).await?;
    }
    channel.close().await?;
    tracing::trace!(%address, count = messages.len(), "pushed messages");
    Ok(())
}
