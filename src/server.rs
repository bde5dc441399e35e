//! HTTP transport for the detection and report pipeline.
//!
//! Features:
//! - SIMD-JSON request parsing
//! - Detection and rendering on the blocking pool, one fresh pipeline per request
//! - Uniform `{"detail": ...}` 500 response for any pipeline failure
//! - Per-request uuid in the tracing span and the `x-request-id` header
//! - Prometheus metrics

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, Histogram, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::engine::{AnomalyDetector, ingest};
use crate::error::{PipelineError, Result};
use crate::render::ReportRenderer;
use crate::report::{AnomalyReport, CompanyInfo, analysis_period};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================================================
// METRICS
// ============================================================================

pub static REPORTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("cashflow_reports_total", "Total PDF reports generated")
        .expect("valid metric");
    prometheus::register(Box::new(c.clone())).expect("metric registered once");
    c
});

pub static FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("cashflow_failures_total", "Total failed pipeline requests")
        .expect("valid metric");
    prometheus::register(Box::new(c.clone())).expect("metric registered once");
    c
});

pub static ANOMALIES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("cashflow_anomalies_total", "Total anomalies detected")
        .expect("valid metric");
    prometheus::register(Box::new(c.clone())).expect("metric registered once");
    c
});

pub static ROWS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("cashflow_rows_total", "Total observations ingested")
        .expect("valid metric");
    prometheus::register(Box::new(c.clone())).expect("metric registered once");
    c
});

pub static PIPELINE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "cashflow_pipeline_duration_seconds",
        "Histogram of detection and render latency",
    ))
    .expect("valid metric");
    prometheus::register(Box::new(h.clone())).expect("metric registered once");
    h
});

/// Touch every metric so `/metrics` lists them before the first request
pub fn init_metrics() {
    let _ = &*REPORTS_TOTAL;
    let _ = &*FAILURES_TOTAL;
    let _ = &*ANOMALIES_TOTAL;
    let _ = &*ROWS_TOTAL;
    let _ = &*PIPELINE_LATENCY;
}

// ============================================================================
// SIMD-JSON EXTRACTOR
// ============================================================================

pub struct SimdJson<T>(pub T);

impl<T, S> FromRequest<S> for SimdJson<T>
where
    T: for<'de> Deserialize<'de> + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| e.into_response())?;
        let mut bytes_vec = bytes.to_vec();

        let val = simd_json::from_slice::<T>(&mut bytes_vec).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": format!("Invalid JSON: {}", e) })),
            )
                .into_response()
        })?;

        Ok(SimdJson(val))
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
}

fn run_detection(config: &AppConfig, rows: &[JsonValue]) -> Result<AnomalyReport> {
    let server = &config.server;
    let ts = server.timestamp_column.as_deref();
    let report = AnomalyDetector::new(config.detector.clone()).detect_rows(
        rows,
        &server.feature_columns,
        ts,
    )?;
    ROWS_TOTAL.inc_by(rows.len() as f64);
    ANOMALIES_TOTAL.inc_by(report.anomaly_count() as f64);
    Ok(report)
}

fn generate_report(config: &AppConfig, rows: &[JsonValue]) -> Result<Vec<u8>> {
    let server = &config.server;
    let ts = server.timestamp_column.as_deref();
    let batch = ingest(rows, &server.feature_columns, ts)?;
    let report =
        AnomalyDetector::new(config.detector.clone()).detect(&batch, &server.feature_columns, ts)?;
    ROWS_TOTAL.inc_by(batch.len() as f64);
    ANOMALIES_TOTAL.inc_by(report.anomaly_count() as f64);

    let company = CompanyInfo::new(server.company_name.clone(), analysis_period(&batch, ts));
    ReportRenderer::new(config.render.clone()).render(&report, &company)
}

/// Run `job` on the blocking pool, timing it
async fn blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let span = tracing::Span::current();
    let timer = PIPELINE_LATENCY.start_timer();
    let outcome = tokio::task::spawn_blocking(move || span.in_scope(job))
        .await
        .map_err(|e| PipelineError::render(format!("worker failed: {}", e)))?;
    timer.observe_duration();
    outcome
}

fn failure(prefix: &str, e: &PipelineError) -> Response {
    FAILURES_TOTAL.inc();
    error!(error = %e, "{}", prefix);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": format!("{}: {}", prefix, e) })),
    )
        .into_response()
}

fn with_request_id(mut response: Response, id: &Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn generate_pdf(
    State(state): State<AppState>,
    SimdJson(rows): SimdJson<Vec<JsonValue>>,
) -> Response {
    let id = Uuid::new_v4();
    let span = info_span!("generate_pdf", request_id = %id, rows = rows.len());

    let response = async move {
        let config = state.config.clone();
        match blocking(move || generate_report(&config, &rows)).await {
            Ok(pdf) => {
                REPORTS_TOTAL.inc();
                info!(bytes = pdf.len(), "Report generated.");
                let disposition = format!(
                    "attachment; filename={}",
                    state.config.server.attachment_filename
                );
                (
                    [
                        (header::CONTENT_TYPE, "application/pdf".to_string()),
                        (header::CONTENT_DISPOSITION, disposition),
                    ],
                    Bytes::from(pdf),
                )
                    .into_response()
            }
            Err(e) => failure("Report generation failed", &e),
        }
    }
    .instrument(span)
    .await;

    with_request_id(response, &id)
}

async fn detect(
    State(state): State<AppState>,
    SimdJson(rows): SimdJson<Vec<JsonValue>>,
) -> Response {
    let id = Uuid::new_v4();
    let span = info_span!("detect", request_id = %id, rows = rows.len());

    let response = async move {
        let config = state.config.clone();
        match blocking(move || run_detection(&config, &rows)).await {
            Ok(report) => Json(report).into_response(),
            Err(e) => failure("Anomaly detection failed", &e),
        }
    }
    .instrument(span)
    .await;

    with_request_id(response, &id)
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatsResponse {
    pub version: String,
    pub feature_columns: Vec<String>,
    pub timestamp_column: Option<String>,
    pub contamination: f64,
    pub n_estimators: usize,
    pub status: String,
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let config = &state.config;
    Json(StatsResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        feature_columns: config.server.feature_columns.clone(),
        timestamp_column: config.server.timestamp_column.clone(),
        contamination: config.detector.contamination,
        n_estimators: config.detector.n_estimators,
        status: "operational".to_string(),
    })
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(config: AppConfig) -> Router {
    init_metrics();
    let body_limit = config.server.max_body_bytes;
    let state = AppState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/reports/generate-pdf", post(generate_pdf))
        .route("/anomalies/detect", post(detect))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, config: AppConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Report gateway listening.");
    info!("Endpoints:");
    info!("  POST /reports/generate-pdf - Detection + PDF report");
    info!("  POST /anomalies/detect     - Detection result as JSON");
    info!("  GET  /metrics              - Prometheus metrics");
    info!("  GET  /health               - Health check");
    info!("  GET  /stats                - Service configuration");

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await
}
