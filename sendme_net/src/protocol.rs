use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sendme_core::{BlobFormat, BlobHash, Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// ALPN protocol identifier for blob transfer
pub const ALPN: &[u8] = b"sendme/blobs/0";

/// Upper bound for a request frame
pub const MAX_REQUEST_SIZE: u64 = 64 * 1024;

/// Sent by the receiver as the first frame of every stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get { hash: BlobHash, format: BlobFormat },
}

/// Sent by the sender in reply to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Followed by exactly `size` raw bytes.
    Blob { size: u64 },
    /// Followed by the raw bytes of every listed blob, in order.
    HashSeq { hashes: Vec<BlobHash>, sizes: Vec<u64> },
    NotFound { hash: BlobHash },
    Error { message: String },
}

/// Send a length-prefixed JSON frame
pub async fn send_msg<W, T>(send: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)?;
    let len = u32::try_from(json.len()).map_err(|_| Error::FrameTooLarge {
        len: json.len() as u64,
        limit: u32::MAX as u64,
    })?;
    send.write_all(&len.to_be_bytes()).await?;
    send.write_all(&json).await?;
    Ok(())
}

/// Receive a length-prefixed JSON frame no longer than `limit` bytes.
///
/// The length is checked before the frame buffer is allocated.
pub async fn recv_msg<R, T>(recv: &mut R, limit: u64) -> Result<T>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    recv.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as u64;
    if len > limit {
        return Err(Error::FrameTooLarge { len, limit });
    }

    let mut buf = vec![0u8; len as usize];
    recv.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| Error::Protocol(format!("malformed frame: {e}")))
}
