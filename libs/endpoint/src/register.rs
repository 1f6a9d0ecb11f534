//! Signal registry: subscriptions, inbound protocol handling, publishing

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::config::TransceiverConfig;
use crate::error::{guarded, BoxError, Error, Result};
use crate::frame::{DispatchMessage, Frame, HubPresentMessage, Message};
use crate::signal::Signal;
use crate::transceiver::{FrameHandler, LoopState, Transceiver};

/// Subscriber callback, invoked with each matching DISPATCH
///
/// Identity is the `Arc` allocation: keep a clone to `unsubscribe` later.
pub type Callback = Arc<dyn Fn(&DispatchMessage) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Observer for HUB_PRESENT beacons
pub type HubPresentHook = Arc<dyn Fn(&HubPresentMessage) + Send + Sync>;

/// Wrap a closure as a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&DispatchMessage) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Local publish/subscribe endpoint relaying signals through the hub
///
/// Subscribe first, then `start`. Callbacks run on the receive-loop task,
/// one after another in subscription order.
pub struct Register {
    registry: Arc<Registry>,
    transceiver: Transceiver,
}

impl Register {
    pub fn new(config: &TransceiverConfig) -> Result<Self> {
        Self::with_transceiver(Transceiver::new(config)?)
    }

    /// Use an existing transceiver; its frame handler is replaced by this registry
    ///
    /// A started transceiver's loop already owns its handler, so it is
    /// rejected with `Error::AlreadyStarted`.
    pub fn with_transceiver(mut transceiver: Transceiver) -> Result<Self> {
        if transceiver.is_started() {
            return Err(Error::AlreadyStarted);
        }

        let registry = Arc::new(Registry::new());
        transceiver.set_handler(registry.clone());
        debug!(endpoint_id = %registry.endpoint_id, "register created");
        Ok(Self {
            registry,
            transceiver,
        })
    }

    /// Normalize a signal name, rejecting blank ones
    pub fn validate_signal(signal: &str) -> Result<Signal> {
        Signal::parse(signal)
    }

    /// This endpoint's id, stamped on every outbound DISPATCH
    pub fn endpoint_id(&self) -> &str {
        &self.registry.endpoint_id
    }

    pub fn transceiver(&self) -> &Transceiver {
        &self.transceiver
    }

    pub fn start(&self) -> Result<()> {
        self.transceiver.start()
    }

    pub fn stop(&self) {
        self.transceiver.stop()
    }

    pub async fn shutdown(&self) {
        self.transceiver.shutdown().await
    }

    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.transceiver.state()
    }

    /// Add `callback` to `signal`'s subscribers
    ///
    /// Subscribing the same callback twice to one signal is ignored.
    pub fn subscribe(&self, signal: &str, callback: Callback) -> Result<()> {
        let signal = Signal::parse(signal)?;
        let mut subscriptions = self.registry.subscriptions.write();
        let subscribers = subscriptions.entry(signal.clone()).or_default();

        if subscribers.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            warn!(%signal, "callback already subscribed, ignoring request");
        } else {
            subscribers.push(callback);
            debug!(%signal, count = subscribers.len(), "subscribed");
        }
        Ok(())
    }

    /// Remove `callback` from `signal`'s subscribers
    ///
    /// Matches by identity. The signal entry goes away with its last
    /// subscriber. Returns whether anything was removed.
    pub fn unsubscribe(&self, signal: &str, callback: &Callback) -> Result<bool> {
        let signal = Signal::parse(signal)?;
        let mut subscriptions = self.registry.subscriptions.write();
        let Some(subscribers) = subscriptions.get_mut(&signal) else {
            return Ok(false);
        };

        let before = subscribers.len();
        subscribers.retain(|existing| !Arc::ptr_eq(existing, callback));
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            subscriptions.remove(&signal);
        }
        debug!(%signal, removed, "unsubscribe");
        Ok(removed)
    }

    pub fn subscriber_count(&self, signal: &str) -> usize {
        let Ok(signal) = Signal::parse(signal) else {
            return 0;
        };
        self.registry
            .subscriptions
            .read()
            .get(&signal)
            .map_or(0, Vec::len)
    }

    /// Observe HUB_PRESENT beacons; replaces any previous hook
    pub fn on_hub_present(&self, hook: HubPresentHook) {
        *self.registry.hub_present.write() = Some(hook);
    }

    /// Publish `signal` with `data` to every endpoint on the hub, this one included
    pub async fn publish<T>(&self, signal: &str, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send_dispatch(signal, data, None).await
    }

    /// Publish, asking subscribers to reply to `reply_to`
    pub async fn publish_with_reply<T>(&self, signal: &str, data: &T, reply_to: &str) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send_dispatch(signal, data, Some(reply_to)).await
    }

    /// Interpret one inbound frame; the receive loop calls this for every frame
    pub fn handle_frame(&self, frame: &Frame) {
        self.registry.interpret(frame);
    }

    async fn send_dispatch<T>(&self, signal: &str, data: &T, reply_to: Option<&str>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let signal = Signal::parse(signal)?;
        let frame = Frame::dispatch(self.endpoint_id(), signal.as_str(), data, reply_to)?;
        trace!(%signal, "publishing");
        self.transceiver.send(&frame).await
    }
}

/// State shared between the caller side and the receive loop
struct Registry {
    endpoint_id: String,
    subscriptions: RwLock<HashMap<Signal, Vec<Callback>>>,
    hub_present: RwLock<Option<HubPresentHook>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            endpoint_id: Uuid::new_v4().to_string(),
            subscriptions: RwLock::new(HashMap::new()),
            hub_present: RwLock::new(None),
        }
    }

    /// Malformed and unknown frames are logged and dropped
    fn interpret(&self, frame: &Frame) {
        match Message::decode(frame) {
            Ok(Message::Dispatch(message)) => self.dispatch(&message),
            Ok(Message::HubPresent(message)) => self.hub_present(&message),
            Ok(Message::Sync) => trace!("sync ignored"),
            Err(Error::UnknownCommand(command)) => {
                error!(%command, "unknown command, no action taken")
            }
            Err(e) => error!(error = %e, %frame, "dropping invalid frame"),
        }
    }

    fn dispatch(&self, message: &DispatchMessage) {
        let signal = match Signal::parse(&message.signal) {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, origin = %message.origin, "dropping dispatch");
                return;
            }
        };

        // Snapshot so callbacks may (un)subscribe without deadlocking
        let subscribers = match self.subscriptions.read().get(&signal) {
            Some(subscribers) => subscribers.clone(),
            None => return,
        };

        for (position, subscriber) in subscribers.iter().enumerate() {
            if let Err(e) = guarded(|| subscriber(message)) {
                error!(
                    %signal,
                    position,
                    origin = %message.origin,
                    error = %e,
                    "subscriber callback failed"
                );
            }
        }
    }

    fn hub_present(&self, message: &HubPresentMessage) {
        debug!(version = message.version(), "hub present");
        let hook = self.hub_present.read().clone();
        if let Some(hook) = hook {
            if let Err(e) = guarded(|| {
                hook(message);
                Ok(())
            }) {
                error!(error = %e, "hub present hook failed");
            }
        }
    }
}

impl FrameHandler for Registry {
    fn handle_frame(&self, frame: Frame) -> std::result::Result<(), BoxError> {
        self.interpret(&frame);
        Ok(())
    }
}
