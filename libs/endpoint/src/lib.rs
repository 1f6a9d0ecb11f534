//! Messenger Endpoint - process-local side of the signal bus
//!
//! Components subscribe callbacks to named signals and publish signals with
//! JSON data. Everything published is pushed to the hub, which fans it back
//! out to every connected endpoint, so a signal raised in one process reaches
//! subscribers in all of them.
//!
//! # Example
//!
//! ```no_run
//! use messenger_endpoint::{callback, Register, TransceiverConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let register = Register::new(&TransceiverConfig::default())?;
//!
//! register.subscribe("tea_time", callback(|message| {
//!     println!("{} says {}", message.origin, message.data);
//!     Ok(())
//! }))?;
//! register.start()?;
//!
//! register.publish("tea_time", &json!({"cups": 2})).await?;
//!
//! register.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod register;
pub mod signal;
pub mod transceiver;

pub use config::{EndpointConfig, TransceiverConfig};
pub use error::{BoxError, Error, InvocationError, Result};
pub use frame::{Command, DispatchMessage, Frame, HubPresentMessage, Message};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use register::{callback, Callback, HubPresentHook, Register};
pub use signal::Signal;
pub use transceiver::{FrameHandler, LoopState, Transceiver};
