//! Importing files and directory trees into a [`ContentStore`].

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::store::{ContentStore, TempTag};

/// A regular file found while walking an import root.
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    path: PathBuf,
    size: u64,
}

impl ContentStore {
    /// Import a file or directory.
    ///
    /// A regular file yields a raw tag over its content. A directory yields a
    /// hash-sequence tag over a [`Collection`] of every regular file below it,
    /// named relative to the directory. Returns the tag and the payload size.
    pub async fn import_path(
        &self,
        path: impl AsRef<Path>,
        progress: &ProgressSender,
    ) -> Result<(TempTag, u64)> {
        let root = canonical_root(path.as_ref()).await?;
        let meta = fs::metadata(&root).await?;
        if meta.is_file() {
            let name = file_name(&root)?;
            progress.send(ProgressEvent::SizeKnown { bytes: meta.len() }).await;
            progress.send(ProgressEvent::Found { name }).await;
            let imported = self.import_file(&root, progress).await?;
            progress.send(ProgressEvent::Done).await;
            return Ok(imported);
        }
        if !meta.is_dir() {
            return Err(Error::UnsupportedEntry { path: root });
        }
        let (tag, size, _) = self.import_dir(&root, progress).await?;
        Ok((tag, size))
    }

    /// Import a path as a collection, even when it is a single file.
    ///
    /// A file becomes a one-entry collection named after the file.
    pub async fn import_collection(
        &self,
        path: impl AsRef<Path>,
        progress: &ProgressSender,
    ) -> Result<(TempTag, u64, Collection)> {
        let root = canonical_root(path.as_ref()).await?;
        let meta = fs::metadata(&root).await?;
        if meta.is_dir() {
            return self.import_dir(&root, progress).await;
        }
        if !meta.is_file() {
            return Err(Error::UnsupportedEntry { path: root });
        }

        let name = file_name(&root)?;
        progress.send(ProgressEvent::SizeKnown { bytes: meta.len() }).await;
        progress.send(ProgressEvent::Found { name: name.clone() }).await;
        let (file_tag, size) = self.import_file(&root, progress).await?;
        let collection = Collection::build([(name, file_tag.hash())])?;
        let tag = collection.store(self).await?;
        file_tag.release();
        progress.send(ProgressEvent::Done).await;
        Ok((tag, size, collection))
    }

    async fn import_dir(
        &self,
        root: &Path,
        progress: &ProgressSender,
    ) -> Result<(TempTag, u64, Collection)> {
        // the store itself may live below the directory being shared
        let store_root = fs::canonicalize(self.root()).await.ok();
        let entries = walk(root, store_root.as_deref()).await?;
        let total: u64 = entries.iter().map(|e| e.size).sum();
        info!(root = %root.display(), files = entries.len(), bytes = total, "importing directory");
        progress.send(ProgressEvent::SizeKnown { bytes: total }).await;

        let mut tags = Vec::with_capacity(entries.len());
        let mut size = 0u64;
        for entry in &entries {
            progress
                .send(ProgressEvent::Found {
                    name: entry.name.clone(),
                })
                .await;
            let (tag, n) = self.import_file(&entry.path, progress).await?;
            size += n;
            tags.push(tag);
        }

        let collection = Collection::build(
            entries
                .iter()
                .zip(&tags)
                .map(|(e, t)| (e.name.clone(), t.hash())),
        )?;
        let tag = collection.store(self).await?;
        // the collection tag now protects every file
        for file_tag in tags {
            file_tag.release();
        }
        progress.send(ProgressEvent::Done).await;
        Ok((tag, size, collection))
    }
}

async fn canonical_root(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).await.map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "file name is not valid UTF-8".to_string(),
        })
}

/// Enumerate every regular file below `root`, sorted by name.
///
/// Symlinks and special files are rejected rather than followed or skipped.
/// The `skip` directory is left out entirely.
async fn walk(root: &Path, skip: Option<&Path>) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            let file_type = dir_entry.file_type().await?;
            if file_type.is_symlink() {
                return Err(Error::UnsupportedEntry { path });
            } else if file_type.is_dir() {
                if skip != Some(path.as_path()) {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                let size = dir_entry.metadata().await?.len();
                let name = relative_name(root, &path)?;
                debug!(name = %name, bytes = size, "found file");
                entries.push(Entry { name, path, size });
            } else {
                return Err(Error::UnsupportedEntry { path });
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// `/`-separated name of `path` relative to `root`.
fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let relative = path
        .strip_prefix(root)
        .map_err(|_| invalid("not below the import root"))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or_else(|| invalid("name is not valid UTF-8"))?)
            }
            _ => return Err(invalid("unexpected path component")),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::BlobFormat;

    #[test]
    fn test_relative_names_use_forward_slash() {
        let root = Path::new("/data/share");
        let name = relative_name(root, &root.join("b").join("c.txt")).unwrap();
        assert_eq!(name, "b/c.txt");
    }

    #[tokio::test]
    async fn test_import_single_file_is_raw() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = src.path().join("one.txt");
        std::fs::write(&file, b"only file").unwrap();

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let (tag, size) = store.import_path(&file, &ProgressSender::noop()).await.unwrap();
        assert_eq!(tag.format(), BlobFormat::Raw);
        assert_eq!(size, 9);
        assert_eq!(tag.hash(), crate::BlobHash::new(b"only file"));
    }

    #[tokio::test]
    async fn test_import_directory_builds_sorted_collection() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(src.path().join("b")).unwrap();
        std::fs::write(src.path().join("b").join("c.txt"), b"world").unwrap();

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let (tag, size) = store.import_path(src.path(), &ProgressSender::noop()).await.unwrap();
        assert_eq!(tag.format(), BlobFormat::HashSeq);
        assert_eq!(size, 10);

        let collection = Collection::load(&store, tag.hash()).await.unwrap();
        let names: Vec<_> = collection.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["a.txt", "b/c.txt"]);

        // file tags were released, the collection tag keeps everything alive
        assert!(store.gc().await.unwrap().is_empty());
        drop(tag);
        assert_eq!(store.gc().await.unwrap().len(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_directory_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(src.path().join("real.txt"), src.path().join("link.txt"))
            .unwrap();

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let err = store
            .import_path(src.path(), &ProgressSender::noop())
            .await
            .unwrap_err();
        match err {
            Error::UnsupportedEntry { path } => assert!(path.ends_with("link.txt")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_path_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let err = store
            .import_path(dir.path().join("nope"), &ProgressSender::noop())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Input);
    }

    #[tokio::test]
    async fn test_store_inside_shared_directory_is_skipped() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello").unwrap();

        let store = ContentStore::persistent(src.path().join(".sendme-send-test"))
            .await
            .unwrap();
        let (tag, _) = store.import_path(src.path(), &ProgressSender::noop()).await.unwrap();
        let collection = Collection::load(&store, tag.hash()).await.unwrap();
        assert_eq!(collection.len(), 1);
    }

    #[tokio::test]
    async fn test_import_collection_wraps_single_file() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = src.path().join("report.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let store = ContentStore::persistent(dir.path()).await.unwrap();
        let (tag, size, collection) = store
            .import_collection(&file, &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(tag.format(), BlobFormat::HashSeq);
        assert_eq!(size, 4);
        assert_eq!(collection.iter().next().unwrap().0, "report.pdf");
    }
}
