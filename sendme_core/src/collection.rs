//! Named, ordered sets of blobs.
//!
//! On the wire a collection is a hash sequence whose first entry is a JSON
//! manifest (names and sizes) and whose remaining entries are the member blobs
//! in declared order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::MAX_HASH_SEQ_SIZE;
use crate::error::{Error, Result};
use crate::hash::{BlobFormat, BlobHash, encode_hash_seq, parse_hash_seq};
use crate::store::{ContentStore, TempTag};
use crate::validation::{self, validate_name};

const MANIFEST_HEADER: &str = "sendme-collection/0";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    header: String,
    names: Vec<String>,
    sizes: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    entries: Vec<(String, BlobHash)>,
}

impl Collection {
    /// Build a collection, validating every name and rejecting duplicates.
    pub fn build<I, S>(named_hashes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, BlobHash)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (name, hash) in named_hashes {
            let name = name.into();
            validate_name(&name)?;
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateName(name));
            }
            entries.push((name, hash));
        }
        Ok(Self { entries })
    }

    /// Write the manifest and hash sequence, returning a tag over the root.
    pub async fn store(&self, store: &ContentStore) -> Result<TempTag> {
        let sizes = self
            .entries
            .iter()
            .map(|(_, hash)| store.size(hash).ok_or(Error::NotFound { hash: *hash }))
            .collect::<Result<Vec<_>>>()?;
        let manifest = Manifest {
            header: MANIFEST_HEADER.to_string(),
            names: self.entries.iter().map(|(n, _)| n.clone()).collect(),
            sizes,
        };
        let manifest_tag = store
            .import_bytes(serde_json::to_vec(&manifest)?, BlobFormat::Raw)
            .await?;

        let manifest_hash = manifest_tag.hash();
        let seq = encode_hash_seq(
            std::iter::once(&manifest_hash).chain(self.entries.iter().map(|(_, h)| h)),
        );
        let tag = store.import_bytes(seq, BlobFormat::HashSeq).await?;
        debug!(root = %tag.hash(), entries = self.entries.len(), "stored collection");
        Ok(tag)
    }

    /// Load the collection rooted at `root` from the store.
    pub async fn load(store: &ContentStore, root: BlobHash) -> Result<Self> {
        Self::load_with_limit(store, root, MAX_HASH_SEQ_SIZE).await
    }

    /// Like [`Collection::load`], refusing a hash sequence or manifest larger
    /// than `limit` bytes.
    pub async fn load_with_limit(store: &ContentStore, root: BlobHash, limit: u64) -> Result<Self> {
        let seq = store.read_to_bytes(&root, limit).await?;
        let hashes = parse_hash_seq(&seq)
            .ok_or_else(|| Error::corrupt(root, "hash sequence length is not a multiple of 32"))?;
        let (manifest_hash, members) = hashes
            .split_first()
            .ok_or_else(|| Error::corrupt(root, "empty hash sequence"))?;

        let manifest_bytes = store
            .read_to_bytes(manifest_hash, limit)
            .await?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| Error::corrupt(root, format!("unreadable manifest: {e}")))?;
        if manifest.header != MANIFEST_HEADER {
            return Err(Error::corrupt(
                root,
                format!("unexpected manifest header {:?}", manifest.header),
            ));
        }
        if manifest.names.len() != members.len() || manifest.sizes.len() != members.len() {
            return Err(Error::corrupt(
                root,
                format!(
                    "manifest lists {} names and {} sizes for {} blobs",
                    manifest.names.len(),
                    manifest.sizes.len(),
                    members.len()
                ),
            ));
        }

        Self::build(manifest.names.into_iter().zip(members.iter().copied()))
            .map_err(|e| Error::corrupt(root, e.to_string()))
    }

    /// Entries in stored order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, BlobHash)> + Clone + '_ {
        self.entries.iter().map(|(n, h)| (n.as_str(), *h))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destination path for `name` below `root`.
    pub fn name_to_path(root: &Path, name: &str) -> Result<PathBuf> {
        validation::name_to_path(root, name)
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a (String, BlobHash);
    type IntoIter = std::slice::Iter<'a, (String, BlobHash)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_build_rejects_bad_names() {
        let h = BlobHash::new(b"x");
        assert!(matches!(
            Collection::build([("../etc/passwd", h)]),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            Collection::build([("a", h), ("a", h)]),
            Err(Error::DuplicateName(_))
        ));
    }

    #[tokio::test]
    async fn test_store_load_preserves_order() {
        let (_dir, store) = store().await;
        let a = store.import_bytes(b"hello", BlobFormat::Raw).await.unwrap();
        let b = store.import_bytes(b"world", BlobFormat::Raw).await.unwrap();

        let collection = Collection::build([("z.txt", a.hash()), ("b/c.txt", b.hash())]).unwrap();
        let tag = collection.store(&store).await.unwrap();
        assert_eq!(tag.format(), BlobFormat::HashSeq);

        let loaded = Collection::load(&store, tag.hash()).await.unwrap();
        assert_eq!(loaded, collection);
        let names: Vec<_> = loaded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["z.txt", "b/c.txt"]);
        // restartable
        assert_eq!(loaded.iter().count(), loaded.iter().count());
    }

    #[tokio::test]
    async fn test_load_honours_caller_limit() {
        let (_dir, store) = store().await;
        let a = store.import_bytes(b"payload", BlobFormat::Raw).await.unwrap();
        let collection = Collection::build([("a-rather-long-file-name.txt", a.hash())]).unwrap();
        let tag = collection.store(&store).await.unwrap();

        // the two-entry hash sequence fits, the manifest does not
        let err = Collection::load_with_limit(&store, tag.hash(), 64).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { limit: 64, .. }));

        let loaded = Collection::load_with_limit(&store, tag.hash(), 1024).await.unwrap();
        assert_eq!(loaded, collection);
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_hash_seq() {
        let (_dir, store) = store().await;
        let bogus = store.import_bytes(vec![7u8; 40], BlobFormat::Raw).await.unwrap();
        let err = Collection::load(&store, bogus.hash()).await.unwrap_err();
        assert!(matches!(err, Error::CorruptCollection { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_count_mismatch() {
        let (_dir, store) = store().await;
        let manifest = serde_json::to_vec(&Manifest {
            header: MANIFEST_HEADER.to_string(),
            names: vec!["a".into(), "b".into()],
            sizes: vec![1, 1],
        })
        .unwrap();
        let manifest = store.import_bytes(manifest, BlobFormat::Raw).await.unwrap();
        let only = store.import_bytes(b"a", BlobFormat::Raw).await.unwrap();
        let seq = encode_hash_seq(&[manifest.hash(), only.hash()]);
        let root = store.import_bytes(seq, BlobFormat::HashSeq).await.unwrap();

        let err = Collection::load(&store, root.hash()).await.unwrap_err();
        assert!(matches!(err, Error::CorruptCollection { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_header() {
        let (_dir, store) = store().await;
        let manifest = br#"{"header":"other/1","names":[],"sizes":[]}"#;
        let manifest = store.import_bytes(manifest, BlobFormat::Raw).await.unwrap();
        let seq = encode_hash_seq(&[manifest.hash()]);
        let root = store.import_bytes(seq, BlobFormat::HashSeq).await.unwrap();

        let err = Collection::load(&store, root.hash()).await.unwrap_err();
        assert!(err.to_string().contains("unexpected manifest header"));
    }
}
