//! Status command implementation

use std::path::Path;

use anyhow::Result;
use tally_core::{config::default_config_path, AnalyticsConfig};
use tally_server::Catalog;

pub fn cmd_status(config: &AnalyticsConfig, config_path: Option<&Path>, data_dir: &Path) -> Result<()> {
    print!("{}", render_status(config, config_path, data_dir)?);
    Ok(())
}

pub fn render_status(
    config: &AnalyticsConfig,
    config_path: Option<&Path>,
    data_dir: &Path,
) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("\n📊 Tally Status (v{})\n", env!("CARGO_PKG_VERSION")));
    out.push_str("   ─────────────────────────────────────────────────────────────\n");

    let source = match config_path {
        Some(path) => path.display().to_string(),
        None => match default_config_path() {
            Some(path) if path.exists() => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        },
    };
    out.push_str(&format!("   Config: {}\n", source));

    let flags = &config.modules;
    out.push_str("\n   Modules:\n");
    for (name, enabled) in [
        ("Anomaly detection", flags.anomaly_detection),
        ("Trend forecast", flags.trend_forecast),
        ("Segmentation", flags.segmentation),
        ("Recommendations", flags.recommendations),
    ] {
        let mark = if enabled { "✓" } else { "✗" };
        out.push_str(&format!("   {} {}\n", mark, name));
    }

    out.push_str(&format!(
        "\n   Min intent confidence: {:.2}\n   Anomaly z threshold: {:.1}\n   Module timeout: {} ms\n",
        config.classifier.min_confidence,
        config.anomaly.z_threshold,
        config.engine.module_timeout.as_millis()
    ));

    out.push_str(&format!("\n   Data directory: {}\n", data_dir.display()));
    let datasets = Catalog::new(data_dir).list()?;
    if datasets.is_empty() {
        out.push_str("   (no CSV files)\n");
    }
    for entry in datasets {
        out.push_str(&format!(
            "   • {:<24} {:>8.1} KB\n",
            entry.name,
            entry.size_bytes as f64 / 1024.0
        ));
    }
    out.push('\n');
    Ok(out)
}
