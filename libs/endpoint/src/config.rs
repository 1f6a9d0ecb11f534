use std::path::Path;
use std::time::Duration;

use messenger_fabric::{Address, CodecKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;

pub const DEFAULT_INCOMING: &str = "tcp://127.0.0.1:15566";
pub const DEFAULT_OUTGOING: &str = "tcp://127.0.0.1:15567";
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 2000;

/// Root endpoint configuration, usually read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub transceiver: TransceiverConfig,
    pub logging: LoggingConfig,
}

// ── Transceiver ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransceiverConfig {
    /// Address the hub publishes on; the endpoint connects and listens.
    pub incoming: String,
    /// Address the hub collects pushed frames on.
    pub outgoing: String,
    /// Poll timeout in milliseconds. Also bounds shutdown latency and the
    /// delay between reconnect attempts.
    pub idle_timeout: u64,
    /// Wire codec, "bincode" or "json". Must match the hub.
    pub codec: CodecKind,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            incoming: DEFAULT_INCOMING.into(),
            outgoing: DEFAULT_OUTGOING.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT_MS,
            codec: CodecKind::default(),
        }
    }
}

impl TransceiverConfig {
    pub fn incoming_address(&self) -> Result<Address> {
        parse_address("incoming", &self.incoming)
    }

    pub fn outgoing_address(&self) -> Result<Address> {
        parse_address("outgoing", &self.outgoing)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        self.incoming_address()?;
        self.outgoing_address()?;
        if self.idle_timeout == 0 {
            return Err(Error::Config("idle_timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    raw.parse()
        .map_err(|e| Error::Config(format!("{field}: {e}")))
}

// ── Loading ────────────────────────────────────────────────────

impl EndpointConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from disk, falling back to defaults when the file is absent,
    /// then apply `MESSENGER_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            info!(?path, "loading endpoint configuration");
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
            toml::from_str::<Self>(&raw).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            warn!(?path, "config file not found, using defaults");
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.transceiver.validate()
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MESSENGER_INCOMING") {
            self.transceiver.incoming = v;
        }
        if let Ok(v) = std::env::var("MESSENGER_OUTGOING") {
            self.transceiver.outgoing = v;
        }
        if let Ok(v) = std::env::var("MESSENGER_IDLE_TIMEOUT") {
            match v.parse() {
                Ok(ms) => self.transceiver.idle_timeout = ms,
                Err(_) => warn!(value = %v, "ignoring non-numeric MESSENGER_IDLE_TIMEOUT"),
            }
        }
        if let Ok(v) = std::env::var("MESSENGER_LOG_LEVEL") {
            self.logging.level = v;
        }
        self
    }
}
