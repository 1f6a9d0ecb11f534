//! Network side of an endpoint
//!
//! The transceiver keeps one long-lived inbound connection to the hub's
//! publish address, read by a background task, and opens a short-lived
//! outbound connection to the hub's collect address for every send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use messenger_fabric::push::push;
use messenger_fabric::{Address, Channel, CodecKind};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::TransceiverConfig;
use crate::error::{guarded, BoxError, Error, Result};
use crate::frame::Frame;

/// Receives every frame read off the inbound connection
///
/// Runs on the receive-loop task; a slow handler delays later frames.
pub trait FrameHandler: Send + Sync {
    fn handle_frame(&self, frame: Frame) -> std::result::Result<(), BoxError>;
}

impl<F> FrameHandler for F
where
    F: Fn(Frame) -> std::result::Result<(), BoxError> + Send + Sync,
{
    fn handle_frame(&self, frame: Frame) -> std::result::Result<(), BoxError> {
        self(frame)
    }
}

/// Receive loop lifecycle: Idle → Running → Stopping → Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

pub struct Transceiver {
    incoming: Address,
    outgoing: Address,
    idle_timeout: Duration,
    codec: CodecKind,
    handler: Option<Arc<dyn FrameHandler>>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<LoopState>>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Transceiver {
    /// Build a transceiver without a handler; inbound frames are logged and discarded
    pub fn new(config: &TransceiverConfig) -> Result<Self> {
        config.validate()?;
        let incoming = config.incoming_address()?;
        let outgoing = config.outgoing_address()?;

        info!(%incoming, "receiving on");
        info!(%outgoing, "sending on");
        info!(idle_timeout_ms = config.idle_timeout, "idle timeout");

        let (state, _) = watch::channel(LoopState::Idle);

        Ok(Self {
            incoming,
            outgoing,
            idle_timeout: config.idle_timeout(),
            codec: config.codec,
            handler: None,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub fn with_handler(config: &TransceiverConfig, handler: Arc<dyn FrameHandler>) -> Result<Self> {
        let mut transceiver = Self::new(config)?;
        transceiver.set_handler(handler);
        Ok(transceiver)
    }

    /// Replace the frame handler; only takes effect if called before `start`
    pub fn set_handler(&mut self, handler: Arc<dyn FrameHandler>) {
        self.handler = Some(handler);
    }

    pub fn incoming(&self) -> &Address {
        &self.incoming
    }

    pub fn outgoing(&self) -> &Address {
        &self.outgoing
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Whether `start` has succeeded on this transceiver
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawn the receive loop on the current tokio runtime and return immediately
    ///
    /// A transceiver runs at most one loop in its lifetime; later calls fail
    /// with `Error::AlreadyStarted`, including after `stop`.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let receiver = ReceiveLoop {
            incoming: self.incoming.clone(),
            idle_timeout: self.idle_timeout,
            codec: self.codec,
            handler: self.handler.clone(),
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
        };
        *self.task.lock() = Some(runtime.spawn(receiver.run()));
        Ok(())
    }

    /// Ask the receive loop to stop
    ///
    /// Returns without waiting. The loop notices at its next poll boundary,
    /// closes the inbound connection and dispatches nothing further. Use
    /// `shutdown` or `state` to wait for it.
    pub fn stop(&self) {
        info!("shutting down messaging");
        self.cancel.cancel();
    }

    /// `stop`, then wait for the receive loop to finish
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "receive loop task failed");
            }
        }
    }

    /// Watch the receive loop's lifecycle
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Send one frame to the hub on a transient connection
    ///
    /// A `SYNC` frame goes out first to prime the hub's routing for the
    /// fresh connection. Every call pays for a connect and a close; nothing
    /// is shared between concurrent senders. No timeout is applied.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        validate_outbound(frame)?;

        let sync = Frame::sync();
        push(&self.outgoing, &[&sync, frame], self.codec).await?;
        trace!(outgoing = %self.outgoing, %frame, "frame sent");
        Ok(())
    }

    /// Hand a received frame to the installed handler, inside an error boundary
    pub fn deliver(&self, frame: Frame) {
        deliver(self.handler.as_deref(), frame);
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn validate_outbound(frame: &Frame) -> Result<()> {
    match frame.command() {
        None => Err(Error::OutboundMessage(
            "the message must contain at least a command field".to_string(),
        )),
        Some(command) if command.trim().is_empty() => Err(Error::OutboundMessage(
            "the command field must not be blank".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

fn deliver(handler: Option<&dyn FrameHandler>, frame: Frame) {
    let Some(handler) = handler else {
        debug!(%frame, "no handler installed, frame discarded");
        return;
    };

    debug!(%frame, "frame received");
    if let Err(e) = guarded(|| handler.handle_frame(frame)) {
        error!(error = %e, "error handling received frame");
    }
}

/// Outcome of one poll of the inbound connection
enum Poll {
    Idle,
    Frame(Frame),
    Dropped,
    Disconnected,
    Interrupted,
    Cancelled,
}

struct ReceiveLoop {
    incoming: Address,
    idle_timeout: Duration,
    codec: CodecKind,
    handler: Option<Arc<dyn FrameHandler>>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<LoopState>>,
}

impl ReceiveLoop {
    async fn run(self) {
        self.state.send_replace(LoopState::Running);
        debug!(incoming = %self.incoming, "receive loop running");

        let mut channel: Option<Channel<CodecKind>> = None;
        loop {
            if channel.is_none() {
                match self.connect().await {
                    Some(connected) => channel = Some(connected),
                    None => break,
                }
            }
            let Some(current) = channel.as_mut() else {
                break;
            };

            match self.poll(current).await {
                Poll::Idle => trace!("idle"),
                Poll::Frame(frame) => {
                    if self.cancel.is_cancelled() {
                        debug!(%frame, "stop requested, frame not dispatched");
                        break;
                    }
                    deliver(self.handler.as_deref(), frame);
                }
                Poll::Dropped => {}
                Poll::Disconnected => channel = None,
                Poll::Interrupted | Poll::Cancelled => break,
            }
        }

        self.state.send_replace(LoopState::Stopping);
        if let Some(channel) = channel.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "closing inbound connection");
            }
        }
        self.state.send_replace(LoopState::Terminated);
        info!("receive loop terminated");
    }

    /// Connect to the hub, retrying once per idle timeout; `None` once cancelled
    async fn connect(&self) -> Option<Channel<CodecKind>> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                attempt = Channel::connect(&self.incoming, self.codec) => attempt,
            };

            match attempt {
                Ok(channel) => {
                    info!(incoming = %self.incoming, "connected to hub");
                    return Some(channel);
                }
                Err(e) => {
                    warn!(incoming = %self.incoming, error = %e, "hub unreachable, retrying");
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(self.idle_timeout) => {}
                    }
                }
            }
        }
    }

    async fn poll(&self, channel: &mut Channel<CodecKind>) -> Poll {
        let ready = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Poll::Cancelled,
            ready = tokio::time::timeout(self.idle_timeout, channel.readable()) => ready,
        };

        match ready {
            Err(_elapsed) => return Poll::Idle,
            Ok(Err(e)) if e.is_interrupted() => {
                info!(error = %e, "poll interrupted, leaving receive loop");
                return Poll::Interrupted;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "poll failed, reconnecting");
                return Poll::Disconnected;
            }
            Ok(Ok(())) => {}
        }

        let received = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Poll::Cancelled,
            received = channel.receive::<Frame>() => received,
        };

        match received {
            Ok(frame) => Poll::Frame(frame),
            Err(e) if e.is_interrupted() => {
                info!(error = %e, "receive interrupted, leaving receive loop");
                Poll::Interrupted
            }
            Err(e) if e.is_disconnect() => {
                warn!(incoming = %self.incoming, "hub connection lost, reconnecting");
                Poll::Disconnected
            }
            Err(messenger_fabric::Error::Codec(reason)) => {
                warn!(%reason, "undecodable message dropped");
                Poll::Dropped
            }
            Err(e) => {
                warn!(error = %e, "receive failed, reconnecting");
                Poll::Disconnected
            }
        }
    }
}
