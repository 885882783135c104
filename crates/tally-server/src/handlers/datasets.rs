//! Dataset catalog and per-dataset insights

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tally_core::{profile, DatasetProfile};

use crate::{AppError, AppState, DatasetEntry};

/// GET /api/datasets - List the datasets in the data directory
pub async fn list_datasets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DatasetEntry>>, AppError> {
    Ok(Json(state.catalog.list()?))
}

#[derive(Debug, Serialize)]
pub struct DataInsights {
    pub filename: String,
    pub insights: Vec<String>,
    /// Example queries for this dataset
    pub suggestions: Vec<String>,
    pub analysis_summary: DatasetProfile,
}

/// GET /api/data-insights/:name - Profile one dataset
pub async fn get_data_insights(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DataInsights>, AppError> {
    let located = state.catalog.locate(Some(name.as_str()))?;

    let worker = state.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let dataset = worker
            .cache
            .get_or_load(&located.cache_key, || worker.catalog.load(&located))?;
        Ok::<_, tally_core::Error>(profile(&dataset))
    })
    .await?
    .map_err(AppError::from_core)?;

    Ok(Json(DataInsights {
        filename: summary.name.clone(),
        insights: summary.highlights(),
        suggestions: summary.suggested_queries(),
        analysis_summary: summary,
    }))
}
