use anyhow::{Context, Result};
use sendme_core::progress::{PROGRESS_CHANNEL_CAPACITY, format_bytes};
use sendme_core::{ContentStore, SessionDir, SessionKind, Ticket};
use sendme_net::{ConnectionListener, EndpointConfig, SendmeEndpoint, ServeOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::SendArgs;
use crate::display::show_progress;

pub async fn run(args: SendArgs) -> Result<()> {
    let mut settings = args.common.settings()?;
    if let Some(ticket_type) = args.ticket_type {
        settings.ticket_type = ticket_type;
    }
    let verbose = args.common.verbose > 0;

    let config = args.common.endpoint_config(EndpointConfig::sending(&settings))?;
    let endpoint = SendmeEndpoint::bind(config)
        .await
        .context("failed to bind endpoint")?;

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let session = SessionDir::create(&cwd, SessionKind::Send)
        .await
        .context("failed to create session directory")?;
    let store = ContentStore::persistent(session.path())
        .await
        .context("failed to open store")?;

    let (progress, rx) = sendme_core::progress::channel(PROGRESS_CHANNEL_CAPACITY);
    let display = tokio::spawn(show_progress(rx, false, |_, _| {}));
    let imported = store.import_collection(&args.path, &progress).await;
    drop(progress);
    let _ = display.await;
    let (tag, size, collection) = match imported {
        Ok(imported) => imported,
        Err(e) => {
            endpoint.close().await;
            remove_session(session).await;
            return Err(e).with_context(|| format!("failed to import {}", args.path.display()));
        }
    };

    let kind = if args.path.is_dir() { "directory" } else { "file" };
    println!(
        "Imported {kind} {}, {}, hash {}",
        args.path.display(),
        format_bytes(size),
        settings.format.render(&tag.hash())
    );
    if verbose {
        for (name, hash) in collection.iter() {
            let size = store.size(&hash).unwrap_or_default();
            println!("- {name}: {} ({})", format_bytes(size), settings.format.render(&hash));
        }
    }

    let addr = settings.ticket_type.apply(endpoint.node_addr().await);
    let ticket = Ticket::new(addr, tag.hash(), tag.format());
    info!(hash = %tag.hash(), ticket_type = %settings.ticket_type, "ticket minted");
    println!("To get this data, use: sendme receive {ticket}");

    let listener = ConnectionListener::spawn(endpoint, store, ServeOptions::from_settings(&settings));
    wait_for_exit().await;

    listener.shutdown().await.context("failed to shut down")?;
    tag.release();
    remove_session(session).await;
    Ok(())
}

/// Resolves on Ctrl-C or when a line is entered on stdin.
async fn wait_for_exit() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        }
        _ = lines.next_line() => {}
    }
}

async fn remove_session(session: SessionDir) {
    let path = session.path().to_path_buf();
    if let Err(e) = session.remove().await {
        warn!(path = %path.display(), error = %e, "failed to remove session directory");
    }
}
