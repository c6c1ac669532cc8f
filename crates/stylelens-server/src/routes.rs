//! HTTP routes and handlers

use axum::{
    extract::{multipart::MultipartError, multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use stylelens_classifiers::PredictOutcome;
use stylelens_core::{unavailable_message, Error, Gender, Prediction};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let status = state.predictor.status();

    let heads: serde_json::Map<String, Value> = status
        .heads
        .iter()
        .map(|(gender, architecture)| {
            (
                gender.as_str().to_string(),
                json!(architecture.map(|a| a.as_str())),
            )
        })
        .collect();

    Json(json!({
        "status": "ok",
        "embedder": status.embedder.is_some(),
        "encoder": status.embedder,
        "heads": heads,
    }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Fields of the `/predict` form
#[derive(Debug)]
struct PredictForm {
    gender: String,
    image: Vec<u8>,
}

/// Successful `/predict` body
#[derive(Debug, Serialize)]
struct PredictResponse {
    result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<Vec<f32>>,
}

impl PredictResponse {
    fn from_prediction(prediction: &Prediction, include_probabilities: bool) -> Self {
        if include_probabilities {
            Self {
                result: prediction.label.clone(),
                confidence: Some(prediction.confidence_percent()),
                probabilities: Some(prediction.probability_percentages()),
            }
        } else {
            Self::result_only(prediction.label.clone())
        }
    }

    fn result_only(result: String) -> Self {
        Self {
            result,
            confidence: None,
            probabilities: None,
        }
    }
}

/// Style prediction handler
async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    handle_predict(state, multipart).instrument(span).await
}

async fn handle_predict(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    metrics::counter!("stylelens_requests_total").increment(1);

    let multipart = multipart.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let form = read_form(multipart).await?;
    debug!("Received {} image bytes for gender '{}'", form.image.len(), form.gender);

    let started = Instant::now();
    let outcome = state
        .predictor
        .clone()
        .predict(form.gender, form.image)
        .await;
    metrics::histogram!("stylelens_inference_latency_us").record(started.elapsed().as_micros() as f64);

    match outcome {
        Ok(PredictOutcome::Predicted(prediction)) => {
            metrics::counter!(
                "stylelens_predictions_total",
                "gender" => prediction.gender.as_str(),
                "label" => prediction.label.clone()
            )
            .increment(1);

            Ok(Json(PredictResponse::from_prediction(
                &prediction,
                state.config.response.include_probabilities,
            )))
        }
        Ok(PredictOutcome::Unavailable { gender_key }) => {
            warn!("No classifier head for gender '{}'", gender_key);
            metrics::counter!("stylelens_unavailable_total", "gender" => unavailable_gender_label(&gender_key))
                .increment(1);

            Ok(Json(PredictResponse::result_only(unavailable_message(&gender_key))))
        }
        Err(Error::Embedding(_)) if state.predictor.status().embedder.is_none() => Err(AppError::EncoderUnavailable),
        Err(e) => Err(AppError::Predict(e)),
    }
}

/// Metric label for a request whose gender has no head; free-form keys share one series
fn unavailable_gender_label(gender_key: &str) -> &'static str {
    gender_key
        .parse::<Gender>()
        .map(|gender| gender.as_str())
        .unwrap_or("unsupported")
}

/// Collect the `gender` and `file` fields; other fields are ignored
async fn read_form(mut multipart: Multipart) -> Result<PredictForm, AppError> {
    let mut gender = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(AppError::Multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "gender" => {
                gender = Some(field.text().await.map_err(AppError::Multipart)?);
            }
            "file" => {
                image = Some(field.bytes().await.map_err(AppError::Multipart)?.to_vec());
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    let gender = gender.ok_or_else(|| AppError::InvalidRequest("missing form field 'gender'".to_string()))?;
    let image = image.ok_or_else(|| AppError::InvalidRequest("missing form field 'file'".to_string()))?;

    Ok(PredictForm { gender, image })
}

/// Error handling
#[derive(Debug)]
enum AppError {
    InvalidRequest(String),
    Multipart(MultipartError),
    EncoderUnavailable,
    Predict(Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Multipart(_) => "multipart",
            AppError::EncoderUnavailable => "embedding",
            AppError::Predict(e) => e.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Multipart(e) => (e.status(), e.body_text()),
            AppError::EncoderUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "image encoder is not loaded".to_string(),
            ),
            AppError::Predict(e @ Error::Image(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Predict(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        if status.is_server_error() {
            warn!("Request failed ({}): {}", status, message);
        } else {
            info!("Request rejected ({}): {}", status, message);
        }
        metrics::counter!("stylelens_errors_total", "kind" => kind).increment(1);

        let body = json!({
            "error": {
                "message": message,
                "type": "invalid_request_error",
            }
        });

        (status, Json(body)).into_response()
    }
}
