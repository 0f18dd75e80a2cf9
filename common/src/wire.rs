//! One JSON message per connection.
//!
//! The sender writes a single JSON document and may half-close its side; the
//! receiver stops reading as soon as a complete document has arrived, so
//! peers that keep the socket open while waiting for a reply still work.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::MAX_MESSAGE_BYTES;
use crate::error::ApiError;

const READ_CHUNK: usize = 4096;

pub async fn read_message<T, R>(reader: &mut R) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if buf.len() > MAX_MESSAGE_BYTES {
            return Err(ApiError::Protocol(format!(
                "message exceeds {MAX_MESSAGE_BYTES} bytes"
            )));
        }

        match serde_json::from_slice::<T>(&buf) {
            Ok(msg) => return Ok(msg),
            Err(e) if e.is_eof() => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if buf.is_empty() {
        return Err(ApiError::Protocol("connection closed before a message arrived".into()));
    }

    Ok(serde_json::from_slice::<T>(&buf)?)
}

pub async fn write_message<T, W>(writer: &mut W, msg: &T) -> Result<(), ApiError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(msg).map_err(|e| ApiError::Any(e.into()))?;
    if body.len() > MAX_MESSAGE_BYTES {
        return Err(ApiError::Protocol(format!(
            "message exceeds {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
