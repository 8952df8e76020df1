//! Length-prefixed framing shared by the replay server and viewer
//!
//! Every message is `[u32 little-endian length][bincode body]`. Frames of
//! large boards are big, so the limit is generous.

use std::io;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, encode, DecodeError, EncodeError};

/// Length prefix size on the wire
const PREFIX_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn check_len(len: usize) -> Result<(), FramingError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::TooLarge {
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// `read_exact`, with end of stream reported as a closed connection
async fn fill<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<(), FramingError> {
    stream.read_exact(buf).await.map(|_| ()).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FramingError::ConnectionClosed
        } else {
            FramingError::Io(e)
        }
    })
}

/// Read one message body
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut prefix = [0u8; PREFIX_LEN];
    fill(stream, &mut prefix).await?;

    let len = u32::from_le_bytes(prefix) as usize;
    check_len(len)?;

    let mut body = vec![0u8; len];
    if len > 0 {
        fill(stream, &mut body).await?;
    }
    Ok(body)
}

/// Write one message body and flush it
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    body: &[u8],
) -> Result<(), FramingError> {
    check_len(body.len())?;

    stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
    stream.write_all(body).await?;
    // Requests are tiny; don't let them sit in a buffer
    stream.flush().await?;
    Ok(())
}

/// Read and decode one protocol message
pub async fn recv<T: DeserializeOwned, R: AsyncRead + Unpin>(stream: &mut R) -> Result<T, FramingError> {
    let body = read_message(stream).await?;
    Ok(decode(&body)?)
}

/// Encode and write one protocol message. Returns the bytes put on the wire.
pub async fn send<T: Serialize, W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &T,
) -> Result<usize, FramingError> {
    let body = encode(message)?;
    write_message(stream, &body).await?;
    Ok(body.len() + PREFIX_LEN)
}
