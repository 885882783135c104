//! Analyze command implementation

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tally_core::{AnalysisRequest, AnalyticsConfig, AnalyticsEngine, CsvLoader, Intent, Response};
use tracing::debug;

pub fn cmd_analyze(
    config: AnalyticsConfig,
    file: &Path,
    query: &str,
    hint: Option<&str>,
    json: bool,
) -> Result<()> {
    let response = analyze(config, file, query, hint)?;
    println!("{}", render_response(&response, json)?);
    Ok(())
}

/// Load a CSV file and run one query through the engine
pub fn analyze(
    config: AnalyticsConfig,
    file: &Path,
    query: &str,
    hint: Option<&str>,
) -> Result<Response> {
    let hint = hint
        .map(|h| h.parse::<Intent>().map_err(|e| anyhow!(e)))
        .transpose()
        .context("Invalid --hint")?;

    let dataset = CsvLoader::new()
        .load_path(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    debug!(
        dataset = %dataset.name(),
        rows = dataset.row_count(),
        "Loaded dataset"
    );

    let engine = AnalyticsEngine::new(config)?;
    let request = AnalysisRequest::new(query).with_hint(hint);

    engine.run(&dataset, &request).map_err(|err| match err.suggestion() {
        Some(suggestion) => anyhow!("{}\n{}", err, suggestion),
        None => err.into(),
    })
}

pub fn render_response(response: &Response, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(response)?);
    }

    let mut out = response.text.clone();
    out.push_str(&format!(
        "\n\nIntent: {} (confidence {:.2}{})",
        response.intent,
        response.confidence,
        if response.ambiguous { ", ambiguous" } else { "" }
    ));
    if let Some(chart) = &response.chart {
        out.push_str(&format!(
            "\nChart: {} with {} series",
            chart.title,
            chart.series.len()
        ));
    }
    Ok(out)
}
