use sendme_core::progress::{self, ProgressEvent};
use sendme_core::{BlobFormat, Collection, ContentStore, ProgressSender};

#[tokio::test]
async fn test_import_export_roundtrip() {
    let src = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    // 1. A payload bigger than one copy buffer
    let payload: Vec<u8> = (0..3 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect();
    let file = src.path().join("big.bin");
    std::fs::write(&file, &payload).unwrap();

    // 2. Import
    let store = ContentStore::persistent(store_dir.path()).await.unwrap();
    let (tag, size) = store.import_file(&file, &ProgressSender::noop()).await.unwrap();
    assert_eq!(size, payload.len() as u64);

    // 3. Export reproduces bytes exactly
    let target = out.path().join("copy.bin");
    store.export(tag.hash(), &target).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[tokio::test]
async fn test_identical_content_shares_one_blob() {
    let src = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("one.txt"), b"duplicate").unwrap();
    std::fs::create_dir(src.path().join("sub")).unwrap();
    std::fs::write(src.path().join("sub").join("two.txt"), b"duplicate").unwrap();

    let store = ContentStore::persistent(store_dir.path()).await.unwrap();
    let (tag, size) = store.import_path(src.path(), &ProgressSender::noop()).await.unwrap();
    assert_eq!(size, 18);

    let collection = Collection::load(&store, tag.hash()).await.unwrap();
    let hashes: Vec<_> = collection.iter().map(|(_, h)| h).collect();
    assert_eq!(hashes[0], hashes[1]);

    // manifest + hash sequence + one shared file blob
    assert_eq!(store.blobs().len(), 3);
    let data_files = std::fs::read_dir(store_dir.path().join("blobs")).unwrap().count();
    assert_eq!(data_files, 3);
}

#[tokio::test]
async fn test_import_reports_progress() {
    let src = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("a.txt"), b"hello").unwrap();
    std::fs::write(src.path().join("b.txt"), b"world!").unwrap();

    let store = ContentStore::persistent(store_dir.path()).await.unwrap();
    let (tx, mut rx) = progress::channel(64);
    let (tag, _) = store.import_path(src.path(), &tx).await.unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }

    assert_eq!(events.first(), Some(&ProgressEvent::SizeKnown { bytes: 11 }));
    assert_eq!(events.last(), Some(&ProgressEvent::Done));
    let found: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Found { name } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(found, ["a.txt", "b.txt"]);

    let mut last = 0;
    for ev in &events {
        if let ProgressEvent::Progress { bytes_so_far } = ev {
            assert!(*bytes_so_far >= last);
            last = *bytes_so_far;
        }
    }
    assert_eq!(last, 11);
    assert_eq!(tag.format(), BlobFormat::HashSeq);
}

#[tokio::test]
async fn test_concurrent_imports_share_store() {
    let store_dir = tempfile::tempdir().unwrap();
    let store = ContentStore::persistent(store_dir.path()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            // half of the tasks race on the same content
            let data = vec![i % 2; 4096];
            store.import_bytes(data, BlobFormat::Raw).await.unwrap()
        }));
    }
    let mut tags = Vec::new();
    for handle in handles {
        tags.push(handle.await.unwrap());
    }

    assert_eq!(store.blobs().len(), 2);
    assert_eq!(store.live_tags(&tags[0].hash_and_format()), 4);
    drop(tags);
    assert_eq!(store.gc().await.unwrap().len(), 2);
}
