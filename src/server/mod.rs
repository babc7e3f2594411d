//! HTTP server implementation
//!
//! Sets up the Axum HTTP server with:
//! - rc dispatch routes (with the request timeout and CORS headers)
//! - Middleware (tracing, compression)
//! - Graceful shutdown

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::routes::{self, AppState};

/// HTTP server for the rc API
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the Axum router with all middleware
    fn build_router(&self) -> Router {
        let timeout = self.config.server.request_timeout();
        routes::create_router(self.state.clone(), timeout).layer(
            ServiceBuilder::new()
                // Add request tracing
                .layer(TraceLayer::new_for_http())
                // Add compression
                .layer(CompressionLayer::new())
                .into_inner(),
        )
    }

    /// Start the server and run until shutdown signal
    pub async fn start<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_address).await?;
        info!(address = %listener.local_addr()?, "Serving remote control");
        if let Some(files) = &self.config.rc.files {
            info!(files = %files.display(), "Serving files");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
