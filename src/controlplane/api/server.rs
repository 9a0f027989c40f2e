//! API Server
//!
//! Serves the REST router with request tracing, a body size limit and an
//! optional request deadline, and shuts down gracefully on signal.
//!
//! Every external call the handlers make is already bounded, so the
//! deadline is off unless configured. When it fires the client still gets
//! the usual response envelope.

use crate::error::{Error, Result};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::rest::RestRouter;
use crate::controlplane::Orchestrator;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Deadline for a whole request, none by default
    pub request_timeout: Option<Duration>,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            request_timeout: None,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server over the orchestrator
pub struct ApiServer {
    config: ApiServerConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            orchestrator,
            shutdown_tx,
        }
    }

    /// Router with the server's layers applied
    pub fn app(&self) -> Router {
        let mut router = RestRouter::new(self.orchestrator.clone())
            .build()
            .layer(DefaultBodyLimit::max(self.config.max_body_size));
        if let Some(limit) = self.config.request_timeout {
            router = router.layer(middleware::from_fn_with_state(limit, request_deadline));
        }
        router.layer(TraceLayer::new_for_http())
    }

    /// Run the API server until shutdown is triggered
    pub async fn run(&self) -> Result<()> {
        info!("Starting API server");
        info!("  REST API: {}", self.config.rest_addr);

        let rest_handle = self.spawn_rest_server();

        match rest_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("REST server task failed: {:?}", e);
                Err(Error::Internal(format!("REST server task failed: {}", e)))
            }
        }
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.rest_addr;
        let app = self.app();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(addr, app, shutdown_rx).await })
    }

    /// Handle for triggering graceful shutdown from another task
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

/// Answer with a timeout envelope once `limit` elapses
async fn request_deadline(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let operation = format!("{} {}", request.method(), request.uri().path());
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => Error::Timeout { operation, limit }.into_response(),
    }
}

/// Run the REST API server
async fn run_rest_server(
    addr: SocketAddr,
    app: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

    info!("REST API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::controlplane::cluster::StaticStatusProvider;
    use crate::controlplane::release::InMemoryReleaseManager;
    use crate::controlplane::testing::{FakeCluster, FakeReleases, FlakyCatalog};
    use crate::controlplane::OrchestratorConfig;
    use crate::domain::record::StorageSpec;
    use crate::metrics::Metrics;
    use axum::body::{to_bytes, Body};
    use serde_json::Value;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    fn standalone_server(config: ApiServerConfig) -> ApiServer {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(InMemoryReleaseManager::new("storage")),
            Arc::new(StaticStatusProvider::new("storage")),
            Arc::new(MemoryCatalog::new()),
            Metrics::new().unwrap(),
        );
        ApiServer::new(config, orchestrator)
    }

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.rest_addr.port(), 8090);
        assert_eq!(config.max_body_size, 1024 * 1024);
        assert!(config.request_timeout.is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = standalone_server(ApiServerConfig {
            max_body_size: 64,
            ..Default::default()
        });
        let body = format!(r#"{{"name":"pg1","values":{{"pad":"{}"}}}}"#, "x".repeat(256));

        let response = server
            .app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/storage")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_standalone_create_round_trip() {
        let server = standalone_server(ApiServerConfig::default());

        let response = server
            .app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/storage")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"pg1","size":"10Gi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_request_deadline_answers_with_envelope() {
        let cluster = Arc::new(FakeCluster::new());
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                call_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            Arc::new(FakeReleases::new()),
            cluster.clone(),
            Arc::new(FlakyCatalog::new()),
            Metrics::new().unwrap(),
        );
        orchestrator
            .create_storage(StorageSpec::named("pg1"))
            .await
            .unwrap();
        *cluster.workload_delay.lock() = Some(Duration::from_millis(500));

        let server = ApiServer::new(
            ApiServerConfig {
                request_timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            orchestrator,
        );
        let response = server
            .app()
            .oneshot(Request::builder().uri("/v1/storage").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 504);
        assert_eq!(body["message"], "Gateway Timeout");
        assert!(body["error"].as_str().unwrap().contains("GET /v1/storage"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let server = standalone_server(ApiServerConfig {
            rest_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        });
        let shutdown = server.shutdown_handle();

        let handle = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown.send(());

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
