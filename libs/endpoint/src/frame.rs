//! Wire frames exchanged with the hub
//!
//! A frame is an ordered list of UTF-8 string fields. The first field names
//! the command, the rest are its arguments:
//!
//! | Command       | Arguments                                    |
//! |---------------|----------------------------------------------|
//! | `SYNC`        | none                                         |
//! | `DISPATCH`    | origin id, signal, JSON data, reply-to / `0` |
//! | `HUB_PRESENT` | JSON version info                            |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Wire value of the reply-to field when no reply is wanted
pub const NO_REPLY: &str = "0";

/// Ordered sequence of string fields; the first is the command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame(Vec<String>);

impl Frame {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// `["SYNC"]`, sent ahead of a payload to prime a fresh connection
    pub fn sync() -> Self {
        Self(vec![Command::Sync.as_str().to_string()])
    }

    /// `["DISPATCH", origin, signal, json(data), reply_to | "0"]`
    ///
    /// A blank `reply_to` is sent as the sentinel.
    pub fn dispatch<T>(origin: &str, signal: &str, data: &T, reply_to: Option<&str>) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let reply_to = reply_to
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(NO_REPLY);

        Ok(Self(vec![
            Command::Dispatch.as_str().to_string(),
            origin.to_string(),
            signal.to_string(),
            serde_json::to_string(data)?,
            reply_to.to_string(),
        ]))
    }

    /// `["HUB_PRESENT", json(info)]`
    pub fn hub_present<T>(info: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self(vec![
            Command::HubPresent.as_str().to_string(),
            serde_json::to_string(info)?,
        ]))
    }

    /// Raw command field, as received
    pub fn command(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Everything after the command field
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Frame {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Commands understood by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sync,
    Dispatch,
    HubPresent,
}

impl Command {
    /// Case-insensitive, whitespace-tolerant match
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SYNC" => Some(Command::Sync),
            "DISPATCH" => Some(Command::Dispatch),
            "HUB_PRESENT" => Some(Command::HubPresent),
            _ => None,
        }
    }

    /// Canonical upper-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Sync => "SYNC",
            Command::Dispatch => "DISPATCH",
            Command::HubPresent => "HUB_PRESENT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded DISPATCH payload, handed to subscriber callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchMessage {
    /// Endpoint id of the publisher
    pub origin: String,
    /// Signal exactly as it arrived; normalization happens at lookup
    pub signal: String,
    pub data: Value,
    /// `None` when the publisher sent the `"0"` sentinel
    pub reply_to: Option<String>,
}

/// Decoded HUB_PRESENT payload, e.g. `{"version": "1.2.3"}`
#[derive(Debug, Clone, PartialEq)]
pub struct HubPresentMessage {
    pub info: Value,
}

impl HubPresentMessage {
    pub fn version(&self) -> Option<&str> {
        self.info.get("version").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Sync,
    Dispatch(DispatchMessage),
    HubPresent(HubPresentMessage),
}

impl Message {
    /// Interpret a raw frame
    ///
    /// Wrong arity and undecodable JSON are `MalformedFrame`; an unrecognised
    /// command is `UnknownCommand`.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let raw_command = frame
            .command()
            .ok_or_else(|| Error::MalformedFrame("empty frame".to_string()))?;
        let command = Command::parse(raw_command)
            .ok_or_else(|| Error::UnknownCommand(raw_command.trim().to_string()))?;
        let args = frame.args();

        match command {
            Command::Sync => Ok(Message::Sync),
            Command::Dispatch => {
                let [origin, signal, data, reply_to] = args else {
                    return Err(Error::MalformedFrame(format!(
                        "DISPATCH expects 4 fields, got {}",
                        args.len()
                    )));
                };
                Ok(Message::Dispatch(DispatchMessage {
                    origin: origin.clone(),
                    signal: signal.clone(),
                    data: decode_json(data, "DISPATCH data")?,
                    reply_to: (reply_to != NO_REPLY).then(|| reply_to.clone()),
                }))
            }
            Command::HubPresent => {
                let info = args.first().ok_or_else(|| {
                    Error::MalformedFrame("HUB_PRESENT carries no version data".to_string())
                })?;
                Ok(Message::HubPresent(HubPresentMessage {
                    info: decode_json(info, "HUB_PRESENT version data")?,
                }))
            }
        }
    }
}

fn decode_json(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| Error::MalformedFrame(format!("{what} is not JSON: {e}")))
}
