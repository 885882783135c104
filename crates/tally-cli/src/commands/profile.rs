//! Profile command implementation

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{profile, CsvLoader, DatasetProfile};

pub fn cmd_profile(file: &Path, json: bool) -> Result<()> {
    let dataset = CsvLoader::new()
        .load_path(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let summary = profile(&dataset);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_profile(&summary));
    }
    Ok(())
}

pub fn render_profile(summary: &DatasetProfile) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n📊 {}\n", summary.name));
    out.push_str("   ─────────────────────────────────────────────────────────────\n");
    for line in summary.highlights() {
        out.push_str(&format!("   {}\n", line));
    }

    if !summary.numeric.is_empty() {
        out.push_str("\n   Numeric columns:\n");
        out.push_str(&format!(
            "   {:<20} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
            "Column", "Mean", "Median", "Min", "Max", "Missing"
        ));
        for stats in &summary.numeric {
            out.push_str(&format!(
                "   {:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>8}\n",
                truncate(&stats.column, 20),
                stats.mean,
                stats.median,
                stats.min,
                stats.max,
                stats.missing
            ));
        }
    }

    if !summary.categorical.is_empty() {
        out.push_str("\n   Categorical columns:\n");
        for stats in &summary.categorical {
            out.push_str(&format!(
                "   {:<20} {} distinct, most frequent {} ({}x)\n",
                truncate(&stats.column, 20),
                stats.unique,
                stats.most_frequent.as_deref().unwrap_or("-"),
                stats.frequency
            ));
        }
    }

    let suggestions = summary.suggested_queries();
    if !suggestions.is_empty() {
        out.push_str("\n   Try asking:\n");
        for query in suggestions {
            out.push_str(&format!("   • {}\n", query));
        }
    }
    out.push('\n');
    out
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
