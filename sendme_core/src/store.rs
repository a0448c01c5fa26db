//! Content-addressed blob store.
//!
//! Layout under the store root:
//!
//! ```text
//! blobs/<hex>.data          complete, verified blobs
//! partial/<hex>-<uuid>.part in-flight writes
//! ```
//!
//! A blob only ever appears under `blobs/` by renaming a fully hashed and
//! verified partial file, so nothing unverified is readable under its hash.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use blake3::Hasher;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::BUFFER_SIZE;
use crate::error::{Error, Result};
use crate::hash::{BlobFormat, BlobHash, HashAndFormat, parse_hash_seq};
use crate::progress::ProgressSender;

const BLOBS_DIR: &str = "blobs";
const PARTIAL_DIR: &str = "partial";

#[derive(Debug, Default)]
struct State {
    /// Complete blobs and their sizes
    blobs: BTreeMap<BlobHash, u64>,
    /// Live tag counts
    tags: HashMap<HashAndFormat, usize>,
    /// Children of hash sequences imported in this process
    hash_seqs: HashMap<BlobHash, Vec<BlobHash>>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    /// In-memory index. Never held across `.await` or file system calls.
    state: Mutex<State>,
    /// Serializes renames into `blobs/` with gc unlinks.
    fs_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // State is only mutated by short non-panicking sections
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn blob_path(&self, hash: &BlobHash) -> PathBuf {
        self.root.join(BLOBS_DIR).join(format!("{}.data", hash.to_hex()))
    }

    fn partial_path(&self, hash: &BlobHash) -> PathBuf {
        self.root
            .join(PARTIAL_DIR)
            .join(format!("{}-{}.part", hash.to_hex(), Uuid::new_v4()))
    }

    fn untag(&self, haf: &HashAndFormat) {
        let mut state = self.state();
        if let Some(count) = state.tags.get_mut(haf) {
            *count -= 1;
            if *count == 0 {
                state.tags.remove(haf);
            }
        }
    }
}

/// Liveness handle for a blob (or a hash sequence and everything it references).
///
/// The protected content stays in the store until the tag is released, either
/// explicitly with [`TempTag::release`] or by dropping it.
#[derive(Debug)]
pub struct TempTag {
    haf: HashAndFormat,
    store: Option<Weak<Inner>>,
}

impl TempTag {
    pub fn hash(&self) -> BlobHash {
        self.haf.hash
    }

    pub fn format(&self) -> BlobFormat {
        self.haf.format
    }

    pub fn hash_and_format(&self) -> HashAndFormat {
        self.haf
    }

    /// Stop protecting the content.
    pub fn release(mut self) {
        self.untag();
    }

    fn untag(&mut self) {
        if let Some(inner) = self.store.take().and_then(|w| w.upgrade()) {
            inner.untag(&self.haf);
        }
    }
}

impl Drop for TempTag {
    fn drop(&mut self) {
        self.untag();
    }
}

/// A persistent, deduplicating content store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ContentStore {
    inner: Arc<Inner>,
}

impl ContentStore {
    /// Open the store at `dir`, creating it if needed.
    ///
    /// Rebuilds the index from `blobs/` and discards stale partial files.
    pub async fn persistent(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let blobs_dir = root.join(BLOBS_DIR);
        let partial_dir = root.join(PARTIAL_DIR);
        fs::create_dir_all(&blobs_dir).await?;
        fs::create_dir_all(&partial_dir).await?;

        let mut entries = fs::read_dir(&partial_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            warn!(path = %entry.path().display(), "removing stale partial file");
            fs::remove_file(entry.path()).await?;
        }

        let mut blobs = BTreeMap::new();
        let mut entries = fs::read_dir(&blobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let hash = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(".data"))
                .and_then(|hex| hex.parse::<BlobHash>().ok());
            match hash {
                Some(hash) => {
                    let size = entry.metadata().await?.len();
                    blobs.insert(hash, size);
                }
                None => warn!(path = %entry.path().display(), "ignoring unknown file in store"),
            }
        }

        info!(root = %root.display(), blobs = blobs.len(), "opened content store");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                state: Mutex::new(State {
                    blobs,
                    ..Default::default()
                }),
                fs_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Store `bytes` and return a tag protecting them in the given format.
    pub async fn import_bytes(&self, bytes: impl AsRef<[u8]>, format: BlobFormat) -> Result<TempTag> {
        let bytes = bytes.as_ref();
        let hash = BlobHash::new(bytes);
        let children = match format {
            BlobFormat::Raw => None,
            BlobFormat::HashSeq => Some(
                parse_hash_seq(bytes)
                    .ok_or_else(|| Error::corrupt(hash, "hash sequence length is not a multiple of 32"))?,
            ),
        };

        let haf = HashAndFormat::new(hash, format);
        {
            let mut state = self.inner.state();
            if state.blobs.contains_key(&hash) {
                return Ok(self.tag_locked(&mut state, haf, children));
            }
        }

        let partial = self.inner.partial_path(&hash);
        fs::write(&partial, bytes).await?;
        self.commit(haf, bytes.len() as u64, &partial, children).await
    }

    /// Stream a regular file into the store, returning a raw tag and its size.
    pub async fn import_file(&self, path: impl AsRef<Path>, progress: &ProgressSender) -> Result<(TempTag, u64)> {
        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let partial = self
            .inner
            .root
            .join(PARTIAL_DIR)
            .join(format!("import-{}.part", Uuid::new_v4()));

        let result = async {
            let mut out = File::create(&partial).await?;
            let mut hasher = Hasher::new();
            let mut buffer = vec![0u8; BUFFER_SIZE];
            let mut size = 0u64;
            loop {
                let n = file.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
                out.write_all(&buffer[..n]).await?;
                size += n as u64;
                progress.advance(n as u64).await;
            }
            out.flush().await?;
            out.sync_all().await?;
            Ok::<_, Error>((BlobHash::from(hasher.finalize()), size))
        }
        .await;

        let (hash, size) = match result {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        debug!(path = %path.display(), hash = %hash, bytes = size, "imported file");
        let tag = self.commit(HashAndFormat::raw(hash), size, &partial, None).await?;
        Ok((tag, size))
    }

    /// Read exactly `size` bytes for the claimed `hash` from `reader` and store
    /// them if, and only if, they hash to `hash`.
    ///
    /// A stream that ends early, or whose bytes hash to anything else, leaves no
    /// trace in the store. On success the blob is returned already tagged.
    pub async fn verify_and_store<R>(
        &self,
        hash: BlobHash,
        reader: &mut R,
        size: u64,
        progress: &ProgressSender,
    ) -> Result<(TempTag, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let partial = self.inner.partial_path(&hash);
        let result = async {
            let mut out = File::create(&partial).await?;
            let mut hasher = Hasher::new();
            let mut buffer = vec![0u8; BUFFER_SIZE];
            let mut received = 0u64;
            while received < size {
                let to_read = std::cmp::min(BUFFER_SIZE as u64, size - received) as usize;
                let n = reader.read(&mut buffer[..to_read]).await?;
                if n == 0 {
                    return Err(Error::SizeMismatch {
                        hash,
                        expected: size,
                        actual: received,
                    });
                }
                hasher.update(&buffer[..n]);
                out.write_all(&buffer[..n]).await?;
                received += n as u64;
                progress.advance(n as u64).await;
            }
            out.flush().await?;
            out.sync_all().await?;

            let actual = BlobHash::from(hasher.finalize());
            if actual != hash {
                return Err(Error::Integrity { hash, actual });
            }
            Ok(received)
        }
        .await;

        match result {
            Ok(received) => {
                let tag = self.commit(HashAndFormat::raw(hash), received, &partial, None).await?;
                debug!(hash = %hash, bytes = received, "verified blob");
                Ok((tag, received))
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                warn!(hash = %hash, error = %e, "discarding unverified blob");
                Err(e)
            }
        }
    }

    /// Copy a blob to `target`, verifying it on the way.
    ///
    /// Never overwrites: fails with [`Error::AlreadyExists`] if `target` exists.
    pub async fn export(&self, hash: BlobHash, target: impl AsRef<Path>) -> Result<()> {
        let target = target.as_ref();
        if fs::symlink_metadata(target).await.is_ok() {
            return Err(Error::AlreadyExists {
                path: target.to_path_buf(),
            });
        }
        let file_name = target.file_name().ok_or_else(|| Error::InvalidPath {
            path: target.to_path_buf(),
            reason: "export target has no file name".to_string(),
        })?;
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).await?;

        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".sendme-{}.tmp", Uuid::new_v4()));
        let tmp = parent.join(tmp_name);

        let result = async {
            let (mut blob, _) = self.reader(&hash).await?;
            let mut out = crate::validation::open_secure_file(&tmp).await?;
            let mut hasher = Hasher::new();
            let mut buffer = vec![0u8; BUFFER_SIZE];
            loop {
                let n = blob.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
                out.write_all(&buffer[..n]).await?;
            }
            out.flush().await?;
            out.sync_all().await?;

            let actual = BlobHash::from(hasher.finalize());
            if actual != hash {
                return Err(Error::Integrity { hash, actual });
            }
            if fs::symlink_metadata(target).await.is_ok() {
                return Err(Error::AlreadyExists {
                    path: target.to_path_buf(),
                });
            }
            fs::rename(&tmp, target).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        } else {
            debug!(hash = %hash, target = %target.display(), "exported blob");
        }
        result
    }

    /// Open a complete blob for reading, returning the file and its size.
    pub async fn reader(&self, hash: &BlobHash) -> Result<(File, u64)> {
        let size = self.size(hash).ok_or(Error::NotFound { hash: *hash })?;
        let file = File::open(self.inner.blob_path(hash)).await?;
        Ok((file, size))
    }

    /// Read a whole blob into memory, refusing blobs larger than `limit`.
    pub async fn read_to_bytes(&self, hash: &BlobHash, limit: u64) -> Result<Vec<u8>> {
        let size = self.size(hash).ok_or(Error::NotFound { hash: *hash })?;
        if size > limit {
            return Err(Error::FrameTooLarge { len: size, limit });
        }
        Ok(fs::read(self.inner.blob_path(hash)).await?)
    }

    pub fn contains(&self, hash: &BlobHash) -> bool {
        self.inner.state().blobs.contains_key(hash)
    }

    pub fn size(&self, hash: &BlobHash) -> Option<u64> {
        self.inner.state().blobs.get(hash).copied()
    }

    /// All complete blobs with their sizes.
    pub fn blobs(&self) -> Vec<(BlobHash, u64)> {
        self.inner
            .state()
            .blobs
            .iter()
            .map(|(h, s)| (*h, *s))
            .collect()
    }

    /// Number of live tags for `haf`.
    pub fn live_tags(&self, haf: &HashAndFormat) -> usize {
        self.inner.state().tags.get(haf).copied().unwrap_or(0)
    }

    /// Create an additional tag for content already in the store.
    pub async fn temp_tag(&self, haf: HashAndFormat) -> Result<TempTag> {
        {
            let mut state = self.inner.state();
            if !state.blobs.contains_key(&haf.hash) {
                return Err(Error::NotFound { hash: haf.hash });
            }
            if haf.format.is_raw() || state.hash_seqs.contains_key(&haf.hash) {
                return Ok(self.tag_locked(&mut state, haf, None));
            }
        }

        // children unknown to this process: read them without holding the index
        let bytes = fs::read(self.inner.blob_path(&haf.hash))
            .await
            .map_err(|_| Error::NotFound { hash: haf.hash })?;
        let children = parse_hash_seq(&bytes)
            .ok_or_else(|| Error::corrupt(haf.hash, "hash sequence length is not a multiple of 32"))?;

        let mut state = self.inner.state();
        if !state.blobs.contains_key(&haf.hash) {
            return Err(Error::NotFound { hash: haf.hash });
        }
        Ok(self.tag_locked(&mut state, haf, Some(children)))
    }

    /// Remove every blob not protected by a live tag.
    ///
    /// A live `HashSeq` tag also protects every blob its sequence references.
    /// The index is updated atomically with the tag check; files are unlinked
    /// afterwards while no import can move a blob into place.
    pub async fn gc(&self) -> Result<Vec<BlobHash>> {
        let _fs = self.inner.fs_lock.lock().await;
        let removable: Vec<BlobHash> = {
            let mut state = self.inner.state();
            let mut protected = BTreeSet::new();
            for haf in state.tags.keys() {
                protected.insert(haf.hash);
                if haf.format == BlobFormat::HashSeq {
                    if let Some(children) = state.hash_seqs.get(&haf.hash) {
                        protected.extend(children.iter().copied());
                    }
                }
            }
            let removable: Vec<BlobHash> = state
                .blobs
                .keys()
                .filter(|h| !protected.contains(h))
                .copied()
                .collect();
            for hash in &removable {
                state.blobs.remove(hash);
                state.hash_seqs.remove(hash);
            }
            removable
        };

        for hash in &removable {
            match fs::remove_file(self.inner.blob_path(hash)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(hash = %hash, error = %e, "failed to remove collected blob"),
            }
        }

        if !removable.is_empty() {
            info!(removed = removable.len(), "garbage collected blobs");
        }
        Ok(removable)
    }

    /// Move a fully written partial file into place, or drop it if the blob
    /// is already present, and tag the result in the same index update.
    async fn commit(
        &self,
        haf: HashAndFormat,
        size: u64,
        partial: &Path,
        mut children: Option<Vec<BlobHash>>,
    ) -> Result<TempTag> {
        let hash = haf.hash;
        let _fs = self.inner.fs_lock.lock().await;
        {
            let existing = {
                let mut state = self.inner.state();
                if state.blobs.contains_key(&hash) {
                    Some(self.tag_locked(&mut state, haf, children.take()))
                } else {
                    None
                }
            };
            if let Some(tag) = existing {
                let _ = fs::remove_file(partial).await;
                debug!(hash = %hash, "blob already present");
                return Ok(tag);
            }
        }
        if let Err(e) = fs::rename(partial, self.inner.blob_path(&hash)).await {
            let _ = fs::remove_file(partial).await;
            return Err(e.into());
        }
        let mut state = self.inner.state();
        state.blobs.insert(hash, size);
        Ok(self.tag_locked(&mut state, haf, children))
    }

    fn tag_locked(&self, state: &mut State, haf: HashAndFormat, children: Option<Vec<BlobHash>>) -> TempTag {
        if let Some(children) = children {
            state.hash_seqs.insert(haf.hash, children);
        }
        *state.tags.entry(haf).or_insert(0) += 1;
        TempTag {
            haf,
            store: Some(Arc::downgrade(&self.inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::encode_hash_seq;

    #[tokio::test]
    async fn test_import_bytes_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();

        let a = store.import_bytes(b"same", BlobFormat::Raw).await.unwrap();
        let b = store.import_bytes(b"same", BlobFormat::Raw).await.unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(store.blobs().len(), 1);
        assert_eq!(store.live_tags(&a.hash_and_format()), 2);

        a.release();
        assert_eq!(store.live_tags(&b.hash_and_format()), 1);
        drop(b);
        assert_eq!(store.live_tags(&HashAndFormat::raw(BlobHash::new(b"same"))), 0);
    }

    #[tokio::test]
    async fn test_verify_and_store_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let claimed = BlobHash::new(b"expected content");
        let mut reader: &[u8] = b"tampered content";

        let err = store
            .verify_and_store(claimed, &mut reader, 16, &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!store.contains(&claimed));
        assert!(store.reader(&claimed).await.is_err());

        let partials = std::fs::read_dir(dir.path().join(PARTIAL_DIR)).unwrap().count();
        assert_eq!(partials, 0);
    }

    #[tokio::test]
    async fn test_verify_and_store_short_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let hash = BlobHash::new(b"hello world");
        let mut reader: &[u8] = b"hello";

        let err = store
            .verify_and_store(hash, &mut reader, 11, &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 11,
                actual: 5,
                ..
            }
        ));
        assert!(!store.contains(&hash));
    }

    #[tokio::test]
    async fn test_verify_and_store_reads_only_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let hash = BlobHash::new(b"first");
        let mut reader: &[u8] = b"firstsecond";

        let (tag, n) = store
            .verify_and_store(hash, &mut reader, 5, &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(tag.hash(), hash);
        assert_eq!(store.live_tags(&HashAndFormat::raw(hash)), 1);
        assert_eq!(reader, b"second");
        assert_eq!(store.read_to_bytes(&hash, 1024).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_gc_respects_hash_seq_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();

        let child = store.import_bytes(b"child", BlobFormat::Raw).await.unwrap();
        let loose = store.import_bytes(b"loose", BlobFormat::Raw).await.unwrap();
        let seq = encode_hash_seq(&[child.hash()]);
        let root = store.import_bytes(&seq, BlobFormat::HashSeq).await.unwrap();

        let child_hash = child.hash();
        let loose_hash = loose.hash();
        child.release();
        loose.release();

        let removed = store.gc().await.unwrap();
        assert_eq!(removed, vec![loose_hash]);
        assert!(store.contains(&child_hash));
        assert!(!store.contains(&loose_hash));

        let root_hash = root.hash();
        drop(root);
        let mut removed = store.gc().await.unwrap();
        removed.sort();
        let mut expected = vec![child_hash, root_hash];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(store.blobs().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gc_never_collects_fresh_imports() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let collector = {
            let store = store.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut rounds = 0u32;
                while !stop.load(Ordering::SeqCst) {
                    store.gc().await.unwrap();
                    rounds += 1;
                    tokio::task::yield_now().await;
                }
                rounds
            })
        };

        for i in 0..200 {
            let data = format!("imported {i}");
            let tag = store.import_bytes(&data, BlobFormat::Raw).await.unwrap();
            assert_eq!(
                store.read_to_bytes(&tag.hash(), 1024).await.unwrap(),
                data.as_bytes()
            );

            let streamed = format!("streamed {i}");
            let hash = BlobHash::new(&streamed);
            let mut reader = streamed.as_bytes();
            let (tag, _) = store
                .verify_and_store(hash, &mut reader, streamed.len() as u64, &ProgressSender::noop())
                .await
                .unwrap();
            assert_eq!(tag.hash(), hash);
            assert_eq!(
                store.read_to_bytes(&hash, 1024).await.unwrap(),
                streamed.as_bytes()
            );
        }

        stop.store(true, Ordering::SeqCst);
        assert!(collector.await.unwrap() > 0);
        store.gc().await.unwrap();
        assert!(store.blobs().is_empty());
        assert_eq!(std::fs::read_dir(dir.path().join(BLOBS_DIR)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index_and_drops_partials() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let store = ContentStore::persistent(dir.path()).await.unwrap();
            let tag = store.import_bytes(b"persisted", BlobFormat::Raw).await.unwrap();
            tag.hash()
        };
        std::fs::write(dir.path().join(PARTIAL_DIR).join("junk.part"), b"x").unwrap();

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        assert_eq!(store.size(&hash), Some(9));
        assert_eq!(std::fs::read_dir(dir.path().join(PARTIAL_DIR)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_temp_tag_after_reopen_protects_children() {
        let dir = tempfile::tempdir().unwrap();
        let (root, child) = {
            let store = ContentStore::persistent(dir.path()).await.unwrap();
            let child = store.import_bytes(b"child", BlobFormat::Raw).await.unwrap();
            let seq = encode_hash_seq(&[child.hash()]);
            let root = store.import_bytes(&seq, BlobFormat::HashSeq).await.unwrap();
            (root.hash(), child.hash())
        };

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let missing = store.temp_tag(HashAndFormat::raw(BlobHash::new(b"nope"))).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));

        let tag = store.temp_tag(HashAndFormat::hash_seq(root)).await.unwrap();
        assert!(store.gc().await.unwrap().is_empty());
        assert!(store.contains(&child));

        drop(tag);
        assert_eq!(store.gc().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let tag = store.import_bytes(b"new data", BlobFormat::Raw).await.unwrap();

        let target = out.path().join("existing.txt");
        std::fs::write(&target, b"keep me").unwrap();
        let err = store.export(tag.hash(), &target).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");

        let fresh = out.path().join("nested/fresh.txt");
        store.export(tag.hash(), &fresh).await.unwrap();
        assert_eq!(std::fs::read(&fresh).unwrap(), b"new data");
    }
}
