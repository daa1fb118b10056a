// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::metrics::MetricsCollector;
use crate::server::handler::RequestHandler;
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::server::conn::Http;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Builder pattern so `main.rs` can inject its gateway handler.
pub struct ServerBuilder {
    addr: SocketAddr,
    handler: Option<RequestHandler>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            metrics: None,
        }
    }

    pub fn with_handler(mut self, handler: RequestHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_tcp(self.addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener. Stops accepting when `shutdown`
    /// resolves; connections already accepted finish on their own tasks.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;
        let local_addr = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", local_addr);

        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            };

            let svc = handler.with_peer(peer);
            let metrics = self.metrics.clone();

            // One Tokio task per connection.
            tokio::spawn(async move {
                if let Some(metrics) = &metrics {
                    metrics.increment_active_connections();
                }

                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }

                if let Some(metrics) = &metrics {
                    metrics.decrement_active_connections();
                }
            });
        }

        Ok(())
    }
}
