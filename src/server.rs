//! HTTP surface for the inference form service.
//!
//! Three interactive modes map onto the routes: manual single-record
//! entry, batch upload with display and CSV export, and a static field
//! reference. Validation and inference run inline in the handler; each
//! request is a single synchronous scoring call.

use crate::error::ServiceResult;
use crate::metrics::ServiceMetrics;
use crate::models::inference::InferenceEngine;
use crate::presenter::{self, FieldInfo};
use crate::schema;
use crate::types::prediction::Prediction;
use crate::types::transaction::TransactionRecord;
use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub metrics: Arc<ServiceMetrics>,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/fields", get(fields))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/predict/batch", post(predict_batch))
        .route("/api/v1/predict/batch/export", post(predict_batch_export))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[derive(Serialize)]
struct FieldsResponse {
    fields: Vec<FieldInfo>,
}

/// Static informational view: field names and semantics, no inputs.
async fn fields() -> Json<FieldsResponse> {
    Json(FieldsResponse {
        fields: presenter::field_reference(),
    })
}

#[derive(Serialize)]
struct PredictResponse {
    prediction: u8,
    fraud_probability: f64,
    message: String,
}

/// Manual entry mode: one JSON object with all 29 fields.
async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ServiceResult<Json<PredictResponse>> {
    let record = schema::record_from_value(payload)?;

    let started = Instant::now();
    let prediction = state.engine.predict(&record)?;

    state.metrics.record_request(
        1,
        prediction.label.is_fraud() as usize,
        started.elapsed(),
    );
    state.metrics.record_probability(prediction.fraud_probability);

    info!(
        prediction = prediction.label.as_u8(),
        fraud_probability = prediction.fraud_probability,
        "Scored manual entry"
    );

    Ok(Json(PredictResponse {
        prediction: prediction.label.as_u8(),
        fraud_probability: prediction.fraud_probability,
        message: presenter::verdict_message(&prediction),
    }))
}

#[derive(Serialize)]
struct ScoredRow {
    #[serde(flatten)]
    record: TransactionRecord,
    #[serde(rename = "Prediction")]
    prediction: u8,
    #[serde(rename = "Fraud Probability")]
    fraud_probability: f64,
}

#[derive(Serialize)]
struct BatchResponse {
    row_count: usize,
    rows: Vec<ScoredRow>,
}

/// Batch mode display action: CSV in, scored table out.
async fn predict_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ServiceResult<Json<BatchResponse>> {
    let (records, predictions) = score_csv(&state, &body)?;

    let rows: Vec<ScoredRow> = records
        .into_iter()
        .zip(predictions)
        .map(|(record, prediction)| ScoredRow {
            record,
            prediction: prediction.label.as_u8(),
            fraud_probability: prediction.fraud_probability,
        })
        .collect();

    Ok(Json(BatchResponse {
        row_count: rows.len(),
        rows,
    }))
}

/// Batch mode download action: CSV in, augmented CSV attachment out.
async fn predict_batch_export(
    State(state): State<AppState>,
    body: Bytes,
) -> ServiceResult<Response> {
    let (records, predictions) = score_csv(&state, &body)?;
    let csv = schema::write_scored_csv(&records, &predictions)?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", presenter::DOWNLOAD_FILENAME),
        ),
    ];

    Ok((headers, csv).into_response())
}

/// Validate an uploaded CSV body and score it, recording metrics.
fn score_csv(
    state: &AppState,
    body: &[u8],
) -> ServiceResult<(Vec<TransactionRecord>, Vec<Prediction>)> {
    let records = schema::read_batch(body)?;

    let started = Instant::now();
    let predictions = state.engine.predict_batch(&records)?;

    let fraud_rows = predictions.iter().filter(|p| p.label.is_fraud()).count();
    state
        .metrics
        .record_request(records.len(), fraud_rows, started.elapsed());
    for prediction in &predictions {
        state.metrics.record_probability(prediction.fraud_probability);
    }

    info!(rows = records.len(), fraud = fraud_rows, "Scored uploaded batch");

    Ok((records, predictions))
}
