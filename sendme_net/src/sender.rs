use std::time::Duration;

use sendme_core::constants::{BUFFER_SIZE, MAX_HASH_SEQ_SIZE};
use sendme_core::hash::parse_hash_seq;
use sendme_core::{BlobFormat, BlobHash, ContentStore, Error, Result, Settings};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connector::PeerConnection;
use crate::protocol::{MAX_REQUEST_SIZE, Request, Response, recv_msg, send_msg};

/// Settings for the sending side
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// A session with no new request for this long is closed
    pub idle_timeout: Duration,
    /// How long shutdown waits for in-flight sessions
    pub grace_period: Duration,
    pub max_hash_seq_size: u64,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            grace_period: Duration::from_secs(5),
            max_hash_seq_size: MAX_HASH_SEQ_SIZE,
        }
    }
}

impl ServeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            idle_timeout: settings.idle_timeout(),
            max_hash_seq_size: settings.max_hash_seq_size,
            ..Self::default()
        }
    }
}

/// Serve requests on one connection until the peer goes away or the session
/// idles out. Returns the number of payload bytes sent.
pub async fn serve_connection(
    peer: &PeerConnection,
    store: &ContentStore,
    options: &ServeOptions,
) -> Result<u64> {
    let remote = peer.remote_id();
    let mut total = 0u64;
    loop {
        let (mut send, mut recv) = match timeout(options.idle_timeout, peer.connection().accept_bi()).await {
            Ok(Ok(streams)) => streams,
            Ok(Err(e)) => {
                debug!(peer = %remote, reason = %e, "peer closed session");
                break;
            }
            Err(_) => {
                info!(peer = %remote, idle = ?options.idle_timeout, "session idle, closing");
                break;
            }
        };
        total += serve_request(&mut recv, &mut send, store, options.max_hash_seq_size).await?;
    }
    info!(peer = %remote, bytes = total, "session finished");
    Ok(total)
}

/// Answer a single request read from `recv`.
pub async fn serve_request<R, W>(
    recv: &mut R,
    send: &mut W,
    store: &ContentStore,
    max_hash_seq_size: u64,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let request: Request = recv_msg(recv, MAX_REQUEST_SIZE).await?;
    let sent = match request {
        Request::Get { hash, format } => {
            debug!(hash = %hash, format = %format, "get request");
            match format {
                BlobFormat::Raw => send_raw(send, store, hash).await?,
                BlobFormat::HashSeq => send_hash_seq(send, store, hash, max_hash_seq_size).await?,
            }
        }
    };
    send.shutdown().await?;
    Ok(sent)
}

async fn send_raw<W>(send: &mut W, store: &ContentStore, hash: BlobHash) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let Some(size) = store.size(&hash) else {
        send_msg(send, &Response::NotFound { hash }).await?;
        return Ok(0);
    };
    send_msg(send, &Response::Blob { size }).await?;
    copy_blob(send, store, hash).await
}

async fn send_hash_seq<W>(
    send: &mut W,
    store: &ContentStore,
    root: BlobHash,
    max_hash_seq_size: u64,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = match store.read_to_bytes(&root, max_hash_seq_size).await {
        Ok(bytes) => bytes,
        Err(Error::NotFound { hash }) => {
            send_msg(send, &Response::NotFound { hash }).await?;
            return Ok(0);
        }
        Err(e) => {
            send_msg(send, &Response::Error { message: e.to_string() }).await?;
            return Err(e);
        }
    };
    let Some(hashes) = parse_hash_seq(&bytes) else {
        let message = format!("{root} is not a hash sequence");
        send_msg(send, &Response::Error { message: message.clone() }).await?;
        return Err(Error::Protocol(message));
    };

    let mut sizes = Vec::with_capacity(hashes.len());
    for hash in &hashes {
        match store.size(hash) {
            Some(size) => sizes.push(size),
            None => {
                send_msg(send, &Response::NotFound { hash: *hash }).await?;
                return Ok(0);
            }
        }
    }

    send_msg(send, &Response::HashSeq { hashes: hashes.clone(), sizes }).await?;
    let mut total = 0u64;
    for hash in hashes {
        total += copy_blob(send, store, hash).await?;
    }
    Ok(total)
}

async fn copy_blob<W>(send: &mut W, store: &ContentStore, hash: BlobHash) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (mut file, size) = store.reader(&hash).await?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut sent = 0u64;
    while sent < size {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            warn!(hash = %hash, sent, size, "blob shorter than indexed size");
            return Err(Error::SizeMismatch {
                hash,
                expected: size,
                actual: sent,
            });
        }
        let n = std::cmp::min(n as u64, size - sent) as usize;
        send.write_all(&buffer[..n]).await?;
        sent += n as u64;
    }
    debug!(hash = %hash, bytes = sent, "sent blob");
    Ok(sent)
}
