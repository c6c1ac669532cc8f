//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use stylelens_classifiers::StylePredictor;

use crate::config::ServerConfig;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Encoder and heads, read-only after startup
    pub predictor: Arc<StylePredictor>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(config: ServerConfig, predictor: StylePredictor, metrics_handle: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            predictor: Arc::new(predictor),
            metrics_handle,
        }
    }
}
