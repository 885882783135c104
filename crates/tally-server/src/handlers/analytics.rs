//! Advanced analytics handler - conversational queries against a dataset
//!
//! The engine is CPU-bound, so each query runs on the blocking pool.
//! Session history feeds the classifier's continuity bonus.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tally_core::{AnalysisRequest, ChartSpec, Finding, Intent, Turn};
use tracing::{debug, info};

use crate::{AppError, AppState};

/// Request to the analytics engine
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub query: String,
    /// Client-side intent hint (e.g. "forecast"); unknown values are ignored
    #[serde(default)]
    pub analysis_type: Option<String>,
    /// Optional session ID for conversation continuity
    #[serde(default)]
    pub session_id: Option<String>,
    /// Dataset name (defaults to the most recently modified file)
    #[serde(default)]
    pub dataset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    pub intent: Intent,
    pub confidence: f64,
    pub ambiguous: bool,
    pub caveats: Vec<String>,
    pub findings: Vec<Finding>,
    pub dataset: String,
    /// Session ID for follow-up queries
    pub session_id: String,
    pub processing_time_ms: u64,
}

/// POST /api/advanced-analytics - Answer a natural-language query
pub async fn advanced_analytics(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let start = Instant::now();

    let query = payload.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::bad_request("Query must not be empty"));
    }

    let hint = payload
        .analysis_type
        .as_deref()
        .and_then(|t| t.parse::<Intent>().ok());
    let located = state.catalog.locate(payload.dataset.as_deref())?;
    let dataset_name = located.name.clone();

    let session_id = match payload.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => state.sessions.create_session().await,
    };
    let history = state.sessions.history(&session_id).await;

    debug!(
        session_id = %session_id,
        dataset = %dataset_name,
        history_len = history.len(),
        hint = ?hint,
        "Processing analytics query"
    );

    let request = AnalysisRequest::new(query.clone())
        .with_history(history)
        .with_hint(hint);
    let worker = state.clone();
    let response = tokio::task::spawn_blocking(move || {
        let dataset = worker
            .cache
            .get_or_load(&located.cache_key, || worker.catalog.load(&located))?;
        worker.engine.run(&dataset, &request)
    })
    .await?
    .map_err(AppError::from_core)?;

    state
        .sessions
        .record_turn(
            &session_id,
            Turn {
                query,
                intent: response.intent,
            },
        )
        .await;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!(
        dataset = %dataset_name,
        intent = %response.intent,
        findings = response.findings.len(),
        caveats = response.caveats.len(),
        ms = processing_time_ms,
        "Analytics query answered"
    );

    Ok(Json(AnalyticsResponse {
        text: response.text,
        chart: response.chart,
        intent: response.intent,
        confidence: response.confidence,
        ambiguous: response.ambiguous,
        caveats: response.caveats,
        findings: response.findings,
        dataset: dataset_name,
        session_id,
        processing_time_ms,
    }))
}
