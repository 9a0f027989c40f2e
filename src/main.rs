//! Storage Release Operator
//!
//! Serves the storage REST API over a Helm release manager, the Kubernetes
//! status API and a file catalog. `--standalone` swaps all three for
//! in-process implementations so the API can run without a cluster.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_release_operator::{
    ApiServer, ApiServerConfig, CatalogBackend, CatalogFactory, CatalogStoreRef,
    ClusterStatusProviderRef, Error, FileCatalogConfig, HelmConfig, KubeStatusConfig,
    KubeStatusProvider, Metrics, Orchestrator, OrchestratorConfig, ReleaseBackend,
    ReleaseManagerFactory, ReleaseManagerRef, Result, StaticStatusProvider,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Release Operator - provisions storage as chart releases
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Namespace releases are installed into
    #[arg(long, env = "RELEASE_NAMESPACE", default_value = "storage")]
    namespace: String,

    /// Chart used when a request names none
    #[arg(long, env = "DEFAULT_CHART", default_value = "bitnami/postgresql")]
    default_chart: String,

    /// Helm binary
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    helm_bin: String,

    /// kubeconfig context
    #[arg(long, env = "KUBE_CONTEXT")]
    kube_context: Option<String>,

    /// kubeconfig file
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Catalog directory (standalone mode keeps the catalog in memory unless set)
    #[arg(long, env = "CATALOG_DIR")]
    catalog_dir: Option<PathBuf>,

    /// Timeout for each release manager, cluster or catalog call
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value = "30")]
    call_timeout_secs: u64,

    /// Deadline for a whole REST request (unbounded when unset)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Records refreshed concurrently when listing
    #[arg(long, env = "LIST_CONCURRENCY", default_value = "8")]
    list_concurrency: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run in standalone mode (no Kubernetes, no Helm)
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Storage Release Operator");
    info!("  Version: {}", storage_release_operator::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Namespace: {}", args.namespace);
    info!("  Default chart: {}", args.default_chart);
    info!("  Standalone mode: {}", args.standalone);

    let call_timeout = Duration::from_secs(args.call_timeout_secs);
    let (releases, cluster) = build_leaves(&args, call_timeout).await?;
    let catalog = open_catalog(&args).await?;
    let metrics = Metrics::new()?;

    let orch_config = OrchestratorConfig {
        default_chart: args.default_chart.clone(),
        call_timeout,
        // helm gets `call_timeout` and must give up before we do
        install_timeout: call_timeout.saturating_mul(2),
        list_concurrency: args.list_concurrency,
    };
    let orchestrator = Orchestrator::new(orch_config, releases, cluster, catalog, metrics.clone());
    info!("Orchestrator initialized");

    // Start health server
    let health_addr = parse_addr("health server", &args.health_addr)?;
    let health_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr, health_orchestrator).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = parse_addr("metrics server", &args.metrics_addr)?;
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: parse_addr("REST API", &args.api_addr)?,
        request_timeout: args.request_timeout_secs.map(Duration::from_secs),
        ..Default::default()
    };
    let api_server = ApiServer::new(api_config, orchestrator);

    let shutdown = api_server.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown.send(());
    });

    api_server.run().await?;

    info!("Operator shutdown complete");
    Ok(())
}

fn parse_addr(what: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {}: {}", what, addr, e)))
}

/// Release manager and status provider for the selected mode
async fn build_leaves(
    args: &Args,
    call_timeout: Duration,
) -> Result<(ReleaseManagerRef, ClusterStatusProviderRef)> {
    if args.standalone {
        info!("Using in-memory releases and static cluster status");
        let releases = ReleaseManagerFactory::create(ReleaseBackend::InMemory {
            namespace: args.namespace.clone(),
        });
        let cluster: ClusterStatusProviderRef =
            Arc::new(StaticStatusProvider::new(args.namespace.clone()));
        return Ok((releases, cluster));
    }

    let releases = ReleaseManagerFactory::create(ReleaseBackend::Helm(HelmConfig {
        helm_bin: args.helm_bin.clone(),
        namespace: args.namespace.clone(),
        kube_context: args.kube_context.clone(),
        kubeconfig: args.kubeconfig.clone(),
        timeout: Some(format!("{}s", call_timeout.as_secs())),
        ..Default::default()
    }));

    let cluster = KubeStatusProvider::connect(KubeStatusConfig {
        namespace: args.namespace.clone(),
        kube_context: args.kube_context.clone(),
        kubeconfig: args.kubeconfig.clone(),
        ..Default::default()
    })
    .await?;
    info!("Connected to Kubernetes");

    Ok((releases, Arc::new(cluster)))
}

async fn open_catalog(args: &Args) -> Result<CatalogStoreRef> {
    let backend = match (&args.catalog_dir, args.standalone) {
        (Some(dir), _) => CatalogBackend::file(dir),
        (None, true) => CatalogBackend::Memory,
        (None, false) => CatalogBackend::File(FileCatalogConfig::default()),
    };
    info!("Opening catalog: {:?}", backend);
    CatalogFactory::open(backend).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
        _ => "info".to_string(),
    };
    let directives = format!(
        "{},hyper=warn,kube=info,tower=warn,tower_http=info,axum=info",
        level
    );

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .map_err(|e| Error::Configuration(format!("Invalid log filter: {}", e)))?;

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(
    status: hyper::StatusCode,
    body: impl Into<hyper::Body>,
) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: SocketAddr, orchestrator: Arc<Orchestrator>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let orchestrator = orchestrator.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let orchestrator = orchestrator.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
                        "/readyz" => {
                            let components = orchestrator.components_health().await;
                            if components.values().all(|&h| h) {
                                text_response(StatusCode::OK, "ok")
                            } else {
                                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
                            }
                        }
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<()> {
    use hyper::header::CONTENT_TYPE;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = text_response(StatusCode::OK, buffer);
                                if let Ok(value) = content_type.parse() {
                                    response.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                            }
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
