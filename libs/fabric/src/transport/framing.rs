use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Largest message accepted on the wire (100MB)
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Write one length-prefixed message (4-byte big-endian length, then payload)
pub(crate) async fn write_message<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_MESSAGE_LEN {
        return Err(Error::InvalidFrame(format!(
            "Message too large: {} bytes",
            bytes.len()
        )));
    }

    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
///
/// A clean EOF before or inside a message maps to `Error::ConnectionClosed`.
pub(crate) async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await.map_err(eof_as_closed)? as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(Error::InvalidFrame(format!(
            "Message too large: {} bytes",
            len
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(eof_as_closed)?;
    Ok(buf)
}

fn eof_as_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}
