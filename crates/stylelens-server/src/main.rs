//! StyleLens Server
//!
//! Loads the CLIP encoder and the per-gender classifier heads, then serves
//! style predictions over HTTP until interrupted.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{error, info, warn};

use stylelens_classifiers::StylePredictor;
use stylelens_server::{create_router, AppState, Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting StyleLens server");

    // Load configuration
    let config = ServerConfig::load(&cli.config, &cli)?;
    let addr = config.socket_addr()?;
    info!("Configuration loaded successfully");
    info!("Encoder: {} @ {}", config.models.embedder.repo, config.models.embedder.revision);
    info!("Male head: {}", config.models.heads.male.weights.display());
    info!("Female head: {}", config.models.heads.female.weights.display());

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    // Load models off the async executor; failures leave capabilities unavailable
    info!("Loading models...");
    let models = config.models.clone();
    let predictor = tokio::task::spawn_blocking(move || StylePredictor::load(&models)).await?;

    let status = predictor.status();
    match &status.embedder {
        Some(name) => info!("Image encoder: {}", name),
        None => warn!("Image encoder unavailable; /predict will answer 503"),
    }
    for (gender, architecture) in &status.heads {
        match architecture {
            Some(architecture) => info!("{} head: {}", gender, architecture),
            None => warn!("{} head: unavailable", gender),
        }
    }

    let state = AppState::new(config, predictor, metrics_handle);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("stylelens=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stylelens=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("stylelens_requests_total", "Total number of prediction requests");
    metrics::describe_counter!(
        "stylelens_predictions_total",
        "Total number of predictions by gender and label"
    );
    metrics::describe_counter!(
        "stylelens_unavailable_total",
        "Requests for a gender with no loaded classifier head"
    );
    metrics::describe_histogram!(
        "stylelens_inference_latency_us",
        metrics::Unit::Microseconds,
        "Decode, embed, and classify latency in microseconds"
    );
    metrics::describe_counter!("stylelens_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
