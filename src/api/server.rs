//! HTTP server lifecycle: bind, serve in a background task, shut down
//! gracefully on request.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Handle to the running server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("HTTP server shutdown signal sent");
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "HTTP server task ended abnormally");
        }
    }
}

/// Serve on `0.0.0.0:<port>`.
pub async fn start_server(core: Arc<CoreState>, port: u16) -> Result<ApiServer, String> {
    start_server_on(core, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
}

pub async fn start_server_on(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind HTTP server on {addr}: {e}"))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let app = api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("HTTP server received shutdown signal");
        };

        tracing::info!(%addr, "HTTP server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("HTTP server error: {e}");
        }

        tracing::info!("HTTP server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
