use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// True for interrupt-class I/O failures (e.g. a signal landing mid-syscall)
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::Interrupted)
    }

    /// True when the peer went away and the connection should be re-established
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
