use iroh::endpoint::Incoming;
use sendme_core::{ContentStore, Result};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::connector::{PeerConnection, SendmeEndpoint};
use crate::sender::{ServeOptions, serve_connection};

/// Accepts inbound connections and serves blob requests from a store.
///
/// Every connection runs in its own session task. A failed session is logged
/// and never stops the accept loop.
pub struct ConnectionListener {
    endpoint: SendmeEndpoint,
    options: ServeOptions,
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept_task: JoinHandle<()>,
}

impl ConnectionListener {
    /// Start accepting on `endpoint`.
    pub fn spawn(endpoint: SendmeEndpoint, store: ContentStore, options: ServeOptions) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            endpoint.clone(),
            store,
            options.clone(),
            cancel.clone(),
            tracker.clone(),
        ));
        info!(endpoint_id = %endpoint.id(), "waiting for incoming connections");
        Self {
            endpoint,
            options,
            cancel,
            tracker,
            accept_task,
        }
    }

    pub fn endpoint(&self) -> &SendmeEndpoint {
        &self.endpoint
    }

    /// Number of sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting, cancel in-flight sessions, wait up to the grace period
    /// for them to finish and close the endpoint.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down listener");
        self.cancel.cancel();
        if let Err(e) = self.accept_task.await {
            warn!(error = %e, "accept loop panicked");
        }

        self.tracker.close();
        if timeout(self.options.grace_period, self.tracker.wait()).await.is_err() {
            warn!(
                sessions = self.tracker.len(),
                grace = ?self.options.grace_period,
                "sessions still running after grace period"
            );
        }
        self.endpoint.close().await;
        Ok(())
    }
}

async fn accept_loop(
    endpoint: SendmeEndpoint,
    store: ContentStore,
    options: ServeOptions,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let incoming = tokio::select! {
            _ = cancel.cancelled() => break,
            incoming = endpoint.endpoint().accept() => incoming,
        };
        let Some(incoming) = incoming else {
            warn!("endpoint closed, stopping listener");
            break;
        };
        debug!("incoming connection, spawning session");
        tracker.spawn(run_session(
            incoming,
            store.clone(),
            options.clone(),
            cancel.child_token(),
        ));
    }
    debug!("accept loop finished");
}

async fn run_session(
    incoming: Incoming,
    store: ContentStore,
    options: ServeOptions,
    cancel: CancellationToken,
) {
    let conn = match incoming.await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "failed to accept connection");
            return;
        }
    };
    let peer = PeerConnection::new(conn);
    let remote = peer.remote_id();
    info!(peer = %remote, "connection accepted");

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(peer = %remote, "session cancelled");
            peer.fail("shutting down");
        }
        result = serve_connection(&peer, &store, &options) => match result {
            Ok(bytes) => {
                debug!(peer = %remote, bytes, "session complete");
                peer.close();
            }
            Err(e) => {
                warn!(peer = %remote, error = %e, "session failed");
                peer.fail("session failed");
            }
        }
    }
}
