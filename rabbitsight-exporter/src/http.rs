//! HTTP server for Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::client::StatsSource;
use crate::exporter::Exporter;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
struct AppState<S> {
    exporter: Arc<Exporter<S>>,
    metrics_path: Arc<str>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            exporter: Arc::clone(&self.exporter),
            metrics_path: Arc::clone(&self.metrics_path),
        }
    }
}

/// Create the HTTP router.
pub fn create_router<S>(exporter: Arc<Exporter<S>>, metrics_path: &str) -> Router
where
    S: StatsSource + 'static,
{
    let state = AppState {
        exporter,
        metrics_path: Arc::from(metrics_path),
    };

    Router::new()
        .route("/", get(index_handler::<S>))
        .route(metrics_path, get(metrics_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Every request runs one scrape.
async fn metrics_handler<S: StatsSource + 'static>(State(state): State<AppState<S>>) -> Response {
    match state.exporter.render().await {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics\n").into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler<S: StatsSource + 'static>(State(state): State<AppState<S>>) -> Response {
    if state.exporter.last_scrape_ok() {
        (StatusCode::OK, "healthy\n").into_response()
    } else {
        (
            StatusCode::GATEWAY_TIMEOUT,
            "last scrape of RabbitMQ failed\n",
        )
            .into_response()
    }
}

/// Landing page linking to the metrics endpoint.
async fn index_handler<S: StatsSource + 'static>(State(state): State<AppState<S>>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>RabbitMQ Exporter</title></head>\n<body>\n\
         <h1>RabbitMQ Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <p><a href=\"/health\">Health</a></p>\n\
         </body>\n</html>\n",
        path = state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer<S> {
    exporter: Arc<Exporter<S>>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl<S: StatsSource + 'static> HttpServer<S> {
    /// Create a new HTTP server.
    pub fn new(exporter: Arc<Exporter<S>>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            exporter,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
