use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sendme_core::progress::{PROGRESS_CHANNEL_CAPACITY, format_bytes, format_transfer_speed};
use sendme_core::{ContentStore, SessionDir, SessionKind, Settings, Ticket};
use sendme_net::{
    EndpointConfig, FetchOptions, FetchStats, PeerConnection, SendmeEndpoint, export_collection, fetch,
};
use tracing::warn;

use crate::ReceiveArgs;
use crate::display::show_progress;

pub async fn run(args: ReceiveArgs) -> Result<()> {
    let settings = args.common.settings()?;
    let ticket = args.ticket;
    let verbose = args.common.verbose > 0;

    let config = args
        .common
        .endpoint_config(EndpointConfig::receiving(&settings, ticket.node_addr()))?;
    let endpoint = SendmeEndpoint::bind(config)
        .await
        .context("failed to bind endpoint")?;

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let session = SessionDir::create(&cwd, SessionKind::Receive)
        .await
        .context("failed to create session directory")?;

    let result = async {
        let store = ContentStore::persistent(session.path())
            .await
            .context("failed to open store")?;
        let peer = endpoint
            .connect(ticket.node_addr())
            .await
            .context("failed to connect to sender")?;
        let result = download(&store, &peer, &ticket, &cwd, &settings, verbose).await;
        peer.close();
        result
    }
    .await;

    endpoint.close().await;
    let path = session.path().to_path_buf();
    if result.is_err() {
        warn!(path = %path.display(), "receive failed, leaving session directory in place");
    } else if let Err(e) = session.remove().await {
        warn!(path = %path.display(), error = %e, "failed to remove session directory");
    }

    let (stats, files) = result?;
    if verbose {
        let secs = stats.elapsed.as_secs_f64();
        println!(
            "Downloaded {} files, {}. Took {:.2}s ({})",
            files.len(),
            format_bytes(stats.bytes_read),
            secs,
            format_transfer_speed(stats.bytes_read, secs)
        );
    }
    Ok(())
}

/// Fetch into `store`, then write the content below `target`.
async fn download(
    store: &ContentStore,
    peer: &PeerConnection,
    ticket: &Ticket,
    target: &Path,
    settings: &Settings,
    verbose: bool,
) -> Result<(FetchStats, Vec<PathBuf>)> {
    let format = settings.format;
    let hash = ticket.hash();
    let is_collection = !ticket.format().is_raw();
    if !is_collection && target.join(hash.to_hex()).exists() {
        bail!("{} already exists", target.join(hash.to_hex()).display());
    }

    let (progress, rx) = sendme_core::progress::channel(PROGRESS_CHANNEL_CAPACITY);
    let rendered = format.render(&hash);
    let display = tokio::spawn(show_progress(rx, is_collection, move |files, size| {
        if is_collection {
            println!("Getting collection {rendered} {files} files, {}", format_bytes(size));
        } else {
            println!("Getting blob {rendered}, {}", format_bytes(size));
        }
    }));

    let options = FetchOptions {
        export_dir: Some(target.to_path_buf()),
        ..FetchOptions::from_settings(settings)
    };
    let fetched = fetch(peer, store, hash, ticket.format(), &options, &progress).await;
    drop(progress);
    let _ = display.await;
    let fetched = fetched.context("failed to fetch")?;

    let files = match &fetched.collection {
        Some(collection) => {
            if verbose {
                for (name, hash) in collection.iter() {
                    println!("    {} {name}", format.render(&hash));
                }
                if let Some((first, _)) = collection.iter().next() {
                    println!("Downloading to: {first}");
                }
            }
            export_collection(store, collection, target)
                .await
                .context("failed to export")?
        }
        None => {
            let path = target.join(hash.to_hex());
            if verbose {
                println!("Downloading to: {}", path.display());
            }
            store.export(hash, &path).await.context("failed to export")?;
            vec![path]
        }
    };
    Ok((fetched.stats, files))
}
