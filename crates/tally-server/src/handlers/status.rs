//! System status handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};

/// Feature flags and data files
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub core_system: bool,
    pub smart_intent: bool,
    pub anomaly_detection: bool,
    pub trend_forecast: bool,
    pub segmentation: bool,
    pub recommendations: bool,
    pub data_files: Vec<String>,
    pub cached_datasets: usize,
    pub version: &'static str,
    /// RFC 3339
    pub last_updated: String,
}

/// GET /api/system-status - Report which analytics features are active
pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, AppError> {
    let flags = &state.engine.config().modules;
    let data_files = state
        .catalog
        .list()?
        .into_iter()
        .map(|entry| entry.name)
        .collect();

    Ok(Json(SystemStatus {
        core_system: true,
        smart_intent: true,
        anomaly_detection: flags.anomaly_detection,
        trend_forecast: flags.trend_forecast,
        segmentation: flags.segmentation,
        recommendations: flags.recommendations,
        data_files,
        cached_datasets: state.cache.len(),
        version: env!("CARGO_PKG_VERSION"),
        last_updated: chrono::Utc::now().to_rfc3339(),
    }))
}
