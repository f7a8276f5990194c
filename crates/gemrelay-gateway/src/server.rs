//! Gateway server — binds the listener and serves the router

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use gemrelay_core::Dispatcher;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::http::create_router;

pub struct GatewayServer {
    addr: String,
    dispatcher: Arc<Dispatcher>,
}

impl GatewayServer {
    pub fn new(host: &str, port: u16, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            dispatcher,
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr.clone(),
                source,
            })
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            addr = %local.map(|a| a.to_string()).unwrap_or_else(|| self.addr.clone()),
            demo_mode = !self.dispatcher.has_fallback_key(),
            "gemrelay gateway listening"
        );

        axum::serve(listener, create_router(self.dispatcher))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        info!("gemrelay gateway stopped");
        Ok(())
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves so
/// the server keeps running instead of shutting down at once.
async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

async fn wait_for_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl-C handler, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
