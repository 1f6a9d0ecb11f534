//! In-test stand-in for the hub: one listener endpoints subscribe to, one
//! they push frames into.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use messenger_endpoint::{BoxError, Callback, DispatchMessage, Frame, TransceiverConfig};
use messenger_fabric::codec::CodecKind;
use messenger_fabric::transport::TcpTransportListener;
use messenger_fabric::{Channel, Error as FabricError};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(3);

pub struct FakeHub {
    pub publish: TcpTransportListener,
    pub collect: TcpTransportListener,
    pub codec: CodecKind,
}

impl FakeHub {
    pub async fn bind() -> Self {
        Self::bind_with(CodecKind::Bincode).await
    }

    pub async fn bind_with(codec: CodecKind) -> Self {
        let any = "127.0.0.1:0".parse().unwrap();
        Self {
            publish: TcpTransportListener::bind(any).await.unwrap(),
            collect: TcpTransportListener::bind(any).await.unwrap(),
            codec,
        }
    }

    pub fn config(&self, idle_timeout_ms: u64) -> TransceiverConfig {
        TransceiverConfig {
            incoming: format!("tcp://{}", self.publish.local_addr().unwrap()),
            outgoing: format!("tcp://{}", self.collect.local_addr().unwrap()),
            idle_timeout: idle_timeout_ms,
            codec: self.codec,
        }
    }

    /// Wait for an endpoint's receive loop to connect
    pub async fn accept_subscriber(&self) -> Channel<CodecKind> {
        let (transport, _) = tokio::time::timeout(WAIT, self.publish.accept())
            .await
            .expect("endpoint never connected")
            .unwrap();
        Channel::from_transport(transport, self.codec)
    }

    /// Accept one pushed connection and read frames until the sender closes
    pub async fn collect_push(&self) -> Vec<Frame> {
        let (transport, _) = tokio::time::timeout(WAIT, self.collect.accept())
            .await
            .expect("nothing was pushed")
            .unwrap();
        let mut channel = Channel::from_transport(transport, self.codec);
        let mut frames = Vec::new();
        loop {
            match channel.receive::<Frame>().await {
                Ok(frame) => frames.push(frame),
                Err(FabricError::ConnectionClosed) => return frames,
                Err(e) => panic!("hub failed reading pushed frame: {e}"),
            }
        }
    }
}

/// Callback forwarding every delivery into a channel
pub fn forwarding_callback() -> (Callback, mpsc::UnboundedReceiver<DispatchMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Callback = Arc::new(move |message: &DispatchMessage| -> Result<(), BoxError> {
        tx.send(message.clone())?;
        Ok(())
    });
    (callback, rx)
}

pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<DispatchMessage>) -> DispatchMessage {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no delivery")
        .expect("callback dropped")
}
