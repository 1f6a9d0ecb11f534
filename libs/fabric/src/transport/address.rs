use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Where a transport connects to or listens on
///
/// Written as `tcp://host:port` or `ipc:///path/to/socket`
/// (`unix://` is accepted as an alias for `ipc://`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::InvalidAddress(format!("missing scheme in <{s}>")))?;

        match scheme.to_ascii_lowercase().as_str() {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| Error::InvalidAddress(format!("missing port in <{s}>")))?;
                if host.is_empty() {
                    return Err(Error::InvalidAddress(format!("missing host in <{s}>")));
                }
                port.parse::<u16>()
                    .map_err(|_| Error::InvalidAddress(format!("bad port in <{s}>")))?;
                Ok(Address::Tcp(rest.to_string()))
            }
            "ipc" | "unix" => {
                if rest.is_empty() {
                    return Err(Error::InvalidAddress(format!("missing path in <{s}>")));
                }
                Ok(Address::Unix(PathBuf::from(rest)))
            }
            other => Err(Error::InvalidAddress(format!(
                "unsupported scheme <{other}> in <{s}>"
            ))),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(host) => write!(f, "tcp://{host}"),
            Address::Unix(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

impl From<std::net::SocketAddr> for Address {
    fn from(addr: std::net::SocketAddr) -> Self {
        Address::Tcp(addr.to_string())
    }
}
