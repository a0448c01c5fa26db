use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sendme_core::constants::MAX_HASH_SEQ_SIZE;
use sendme_core::hash::encode_hash_seq;
use sendme_core::{
    BlobFormat, BlobHash, Collection, ContentStore, Error, ProgressEvent,
    ProgressSender, Result, Settings, TempTag,
};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::connector::PeerConnection;
use crate::protocol::{Request, Response, recv_msg, send_msg};

/// Settings for the receiving side
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound for the hash sequence and the collection manifest
    pub max_hash_seq_size: u64,
    /// Fail with `AlreadyExists` as soon as the manifest names a destination
    /// that exists below this directory, before any payload is read
    pub export_dir: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_hash_seq_size: MAX_HASH_SEQ_SIZE,
            export_dir: None,
        }
    }
}

impl FetchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_hash_seq_size: settings.max_hash_seq_size,
            export_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub bytes_read: u64,
    pub blobs: u64,
    pub elapsed: Duration,
}

/// Content fetched into the local store, still protected by `tag`.
#[derive(Debug)]
pub struct Fetched {
    pub tag: TempTag,
    pub stats: FetchStats,
    /// Present for hash sequence roots
    pub collection: Option<Collection>,
}

/// Result of a complete receive.
#[derive(Debug)]
pub struct Received {
    pub stats: FetchStats,
    pub collection: Option<Collection>,
    /// Files written, in collection order
    pub files: Vec<PathBuf>,
}

/// Fetch `hash` over one new stream of `peer` into `store`.
pub async fn fetch(
    peer: &PeerConnection,
    store: &ContentStore,
    hash: BlobHash,
    format: BlobFormat,
    options: &FetchOptions,
    progress: &ProgressSender,
) -> Result<Fetched> {
    let (mut send, mut recv) = peer
        .connection()
        .open_bi()
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    fetch_stream(&mut send, &mut recv, store, hash, format, options, progress).await
}

/// Request `hash` on an already open stream pair and verify everything read.
pub async fn fetch_stream<W, R>(
    send: &mut W,
    recv: &mut R,
    store: &ContentStore,
    hash: BlobHash,
    format: BlobFormat,
    options: &FetchOptions,
    progress: &ProgressSender,
) -> Result<Fetched>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let start = Instant::now();
    send_msg(send, &Request::Get { hash, format }).await?;
    send.shutdown().await?;

    let response: Response = recv_msg(recv, options.max_hash_seq_size).await?;
    let fetched = match (format, response) {
        (_, Response::NotFound { hash }) => return Err(Error::NotFound { hash }),
        (_, Response::Error { message }) => return Err(Error::Remote(message)),
        (BlobFormat::Raw, Response::Blob { size }) => {
            progress.send(ProgressEvent::SizeKnown { bytes: size }).await;
            let (tag, bytes_read) = store.verify_and_store(hash, recv, size, progress).await?;
            Fetched {
                tag,
                stats: FetchStats {
                    bytes_read,
                    blobs: 1,
                    elapsed: start.elapsed(),
                },
                collection: None,
            }
        }
        (BlobFormat::HashSeq, Response::HashSeq { hashes, sizes }) => {
            fetch_hash_seq(recv, store, hash, hashes, sizes, options, progress, start).await?
        }
        (format, other) => {
            return Err(Error::Protocol(format!(
                "unexpected response to {format} request: {other:?}"
            )));
        }
    };
    progress.send(ProgressEvent::Done).await;
    info!(
        hash = %hash,
        bytes = fetched.stats.bytes_read,
        blobs = fetched.stats.blobs,
        elapsed = ?fetched.stats.elapsed,
        "fetch complete"
    );
    Ok(fetched)
}

#[allow(clippy::too_many_arguments)]
async fn fetch_hash_seq<R>(
    recv: &mut R,
    store: &ContentStore,
    root: BlobHash,
    hashes: Vec<BlobHash>,
    sizes: Vec<u64>,
    options: &FetchOptions,
    progress: &ProgressSender,
    start: Instant,
) -> Result<Fetched>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if hashes.is_empty() || hashes.len() != sizes.len() {
        return Err(Error::Protocol(format!(
            "hash sequence lists {} hashes and {} sizes",
            hashes.len(),
            sizes.len()
        )));
    }
    let seq = encode_hash_seq(&hashes);
    let actual = BlobHash::new(&seq);
    if actual != root {
        return Err(Error::Integrity { hash: root, actual });
    }
    let tag = store.import_bytes(&seq, BlobFormat::HashSeq).await?;

    let total = sizes
        .iter()
        .try_fold(0u64, |acc, &size| acc.checked_add(size))
        .ok_or_else(|| Error::Protocol("hash sequence sizes overflow".to_string()))?;
    progress.send(ProgressEvent::SizeKnown { bytes: total }).await;

    let manifest_size = sizes[0];
    if manifest_size > options.max_hash_seq_size {
        return Err(Error::FrameTooLarge {
            len: manifest_size,
            limit: options.max_hash_seq_size,
        });
    }

    let mut bytes_read = 0u64;
    let mut collection = None;
    for (i, (hash, size)) in hashes.iter().zip(&sizes).enumerate() {
        // children stay protected by the hash sequence tag
        let (_, n) = store.verify_and_store(*hash, recv, *size, progress).await?;
        bytes_read += n;
        if i == 0 {
            // the manifest arrived first: validate the collection before the payload
            let loaded = Collection::load_with_limit(store, root, options.max_hash_seq_size).await?;
            if let Some(dir) = &options.export_dir {
                plan_export(&loaded, dir).await?;
            }
            for (name, _) in loaded.iter() {
                progress.send(ProgressEvent::Found { name: name.to_string() }).await;
            }
            collection = Some(loaded);
        } else {
            debug!(hash = %hash, index = i, bytes = size, "blob received");
        }
    }

    Ok(Fetched {
        tag,
        stats: FetchStats {
            bytes_read,
            blobs: hashes.len() as u64,
            elapsed: start.elapsed(),
        },
        collection,
    })
}

/// Destination of every entry, failing if any of them already exists.
pub async fn plan_export(collection: &Collection, target_dir: &Path) -> Result<Vec<(PathBuf, BlobHash)>> {
    let mut plan = Vec::with_capacity(collection.len());
    for (name, hash) in collection.iter() {
        let path = Collection::name_to_path(target_dir, name)?;
        if fs::symlink_metadata(&path).await.is_ok() {
            return Err(Error::AlreadyExists { path });
        }
        plan.push((path, hash));
    }
    Ok(plan)
}

/// Export every entry of `collection` below `target_dir`.
///
/// Nothing is written if any destination exists. If an export fails midway,
/// the files already written by this call are removed again.
pub async fn export_collection(
    store: &ContentStore,
    collection: &Collection,
    target_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let plan = plan_export(collection, target_dir).await?;
    let mut written: Vec<PathBuf> = Vec::with_capacity(plan.len());
    for (path, hash) in plan {
        if let Err(e) = store.export(hash, &path).await {
            error!(path = %path.display(), error = %e, "export failed, rolling back");
            for done in &written {
                if let Err(e) = fs::remove_file(done).await {
                    warn!(path = %done.display(), error = %e, "rollback failed");
                }
            }
            return Err(e);
        }
        written.push(path);
    }
    Ok(written)
}

/// Fetch the content named by `hash`/`format` and write it below `target_dir`.
///
/// Collections are exported entry by entry; a raw blob is written to a file
/// named by its hex hash.
pub async fn receive(
    peer: &PeerConnection,
    store: &ContentStore,
    hash: BlobHash,
    format: BlobFormat,
    target_dir: &Path,
    options: &FetchOptions,
    progress: &ProgressSender,
) -> Result<Received> {
    if format.is_raw() {
        let target = target_dir.join(hash.to_hex());
        if fs::symlink_metadata(&target).await.is_ok() {
            return Err(Error::AlreadyExists { path: target });
        }
    }

    let options = FetchOptions {
        export_dir: Some(target_dir.to_path_buf()),
        ..options.clone()
    };
    let fetched = fetch(peer, store, hash, format, &options, progress).await?;
    let files = match &fetched.collection {
        Some(collection) => export_collection(store, collection, target_dir).await?,
        None => {
            let target = target_dir.join(hash.to_hex());
            store.export(hash, &target).await?;
            vec![target]
        }
    };
    info!(hash = %hash, files = files.len(), target = %target_dir.display(), "receive complete");

    Ok(Received {
        stats: fetched.stats,
        collection: fetched.collection,
        files,
    })
}
