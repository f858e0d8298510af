//! HTTP server exposing the status gauges.
//!
//! Every request to the telemetry path triggers exactly one status exchange
//! with the target; nothing is cached between scrapes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::client::ProtocolClient;
use crate::collector::StatusCollector;
use crate::config::Config;
use crate::metrics::{MetricsError, MetricsRegistry, CONTENT_TYPE};

/// Listen backlog for the HTTP socket
const LISTEN_BACKLOG: i32 = 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    collector: Arc<StatusCollector>,
    metrics: Arc<MetricsRegistry>,
    telemetry_path: Arc<str>,
}

impl AppState {
    pub fn new(collector: StatusCollector, metrics: MetricsRegistry, telemetry_path: &str) -> Self {
        Self {
            collector: Arc::new(collector),
            metrics: Arc::new(metrics),
            telemetry_path: Arc::from(telemetry_path),
        }
    }
}

/// Build the router serving the telemetry path and a landing page.
pub fn create_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.to_string();
    let mut router = Router::new().route(&telemetry_path, get(metrics_handler));
    if telemetry_path != "/" {
        router = router.route("/", get(landing_page));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.collector.collect().await;

    match state.metrics.render(&snapshot) {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>FAF Gear Exporter</title></head>\n<body>\n\
         <h1>FAF Gear Exporter</h1>\n\
         <p>Target: {}</p>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        state.collector.address(),
        state.telemetry_path,
    ))
}

/// Server instance
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Create a new server instance with its metric registry.
    pub fn new(config: Config) -> Result<Self, MetricsError> {
        let client = ProtocolClient::new(config.fetch_timeout);
        let collector = StatusCollector::new(config.fetch_address.clone(), client);
        let state = AppState::new(collector, MetricsRegistry::new()?, &config.telemetry_path);

        Ok(Server { config, state })
    }

    /// Bind the listen address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = tokio::net::lookup_host(&self.config.listen_address)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address for {}", self.config.listen_address),
                )
            })?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(
            address = %addr,
            path = %self.config.telemetry_path,
            server = %self.config.fetch_address,
            "Server listening"
        );

        axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
