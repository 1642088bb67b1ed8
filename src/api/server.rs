//! HTTP server lifecycle.
//!
//! bind → spawn background task → return handle with shutdown channel.
//! A companion task purges dead share links and expired sessions on the
//! configured interval for as long as the server runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Handle to a running server.
pub struct ApiServer {
    pub addr: SocketAddr,
    pub started_at: DateTime<Utc>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Send the shutdown signal without waiting.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Shut down and wait for in-flight requests to drain.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "API server task failed");
        }
    }
}

/// Bind `addr` and serve the API in a background task.
pub async fn start_server(core: Arc<CoreState>, addr: SocketAddr) -> std::io::Result<ApiServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let app = api_router(core.clone());
    let purge_interval = core.config.share_purge_interval;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let purge = spawn_purge_task(core, purge_interval);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        purge.abort();
        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        started_at: Utc::now(),
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

fn spawn_purge_task(core: Arc<CoreState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            purge_once(&core);
        }
    })
}

/// One sweep of share links and sessions that can no longer be used.
pub fn purge_once(core: &CoreState) {
    if let Err(e) = core.shares.purge_inactive() {
        tracing::warn!(error = %e, "Share link purge failed");
    }
    match core.accounts.sessions().purge_expired() {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired sessions"),
        Err(e) => tracing::warn!(error = %e, "Session purge failed"),
    }
}
