use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

/// A normalized signal name: trimmed and upper-cased
///
/// `" tea_time "` and `"TEA_TIME"` are the same signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signal(String);

impl Signal {
    /// Validate and normalize a raw signal name
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(Error::InvalidSignal(
                "the signal must not be an empty string".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Signal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Signal {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Signal {
    type Error = Error;

    fn try_from(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}
