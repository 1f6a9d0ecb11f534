use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// `send` was handed something that is not a command frame
    #[error("Outbound message error: {0}")]
    OutboundMessage(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown command <{0}>")]
    UnknownCommand(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] messenger_fabric::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transceiver already started")]
    AlreadyStarted,

    #[error("Transceiver must be started from within a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by subscriber callbacks and frame handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a guarded invocation (subscriber callback or frame handler) failed
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("returned an error: {0}")]
    Failed(BoxError),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Run `f` inside an error boundary that also contains panics
///
/// The receive loop calls user code through this so that one bad callback
/// never takes the loop, or its siblings, down with it.
pub fn guarded<F>(f: F) -> std::result::Result<(), InvocationError>
where
    F: FnOnce() -> std::result::Result<(), BoxError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(InvocationError::Failed(e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(InvocationError::Panicked(message))
        }
    }
}
