//! CLI command tests

use std::path::PathBuf;

use clap::Parser;
use tally_core::{AnalyticsConfig, Intent};
use tempfile::TempDir;

use crate::cli::{Cli, Commands};
use crate::commands;

fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn sales_csv(dir: &TempDir) -> PathBuf {
    write_csv(dir, "sales.csv", "sales\n10\n12\n11\n13\n100\n12\n11\n")
}

fn revenue_csv(dir: &TempDir) -> PathBuf {
    let mut csv = String::from("month,revenue,region\n");
    for i in 0..12 {
        let region = if i % 2 == 0 { "north" } else { "south" };
        csv.push_str(&format!("2024-{:02}-01,{},{}\n", i + 1, 100 + 10 * i, region));
    }
    write_csv(dir, "revenue.csv", &csv)
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_analyze() {
    let cli = Cli::try_parse_from([
        "tally",
        "analyze",
        "--file",
        "data.csv",
        "--query",
        "revenue forecast",
        "--hint",
        "forecast",
        "--json",
    ])
    .unwrap();

    match cli.command {
        Commands::Analyze {
            file,
            query,
            hint,
            json,
        } => {
            assert_eq!(file, PathBuf::from("data.csv"));
            assert_eq!(query, "revenue forecast");
            assert_eq!(hint.as_deref(), Some("forecast"));
            assert!(json);
        }
        _ => panic!("expected analyze"),
    }
}

#[test]
fn test_parse_analyze_requires_query() {
    assert!(Cli::try_parse_from(["tally", "analyze", "--file", "data.csv"]).is_err());
}

#[test]
fn test_parse_serve_defaults() {
    let cli = Cli::try_parse_from(["tally", "serve"]).unwrap();
    match cli.command {
        Commands::Serve {
            data_dir,
            host,
            port,
            no_auth,
        } => {
            assert!(data_dir.is_none());
            assert_eq!(host, "127.0.0.1");
            assert_eq!(port, 3000);
            assert!(!no_auth);
        }
        _ => panic!("expected serve"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli =
        Cli::try_parse_from(["tally", "status", "--config", "custom.toml", "--verbose"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    assert!(cli.verbose);
    assert!(matches!(cli.command, Commands::Status { .. }));
}

// ========== Config Tests ==========

#[test]
fn test_load_config_missing_file_errors() {
    let dir = TempDir::new().unwrap();
    let result = commands::load_config(Some(&dir.path().join("missing.toml")));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Config file not found"));
}

#[test]
fn test_load_config_override() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "analytics.toml", "[modules]\nsegmentation = false\n");

    let config = commands::load_config(Some(&path)).unwrap();
    assert!(!config.modules.segmentation);
    assert!(config.modules.anomaly_detection);
}

#[test]
fn test_resolve_data_dir_prefers_flag() {
    let dir = commands::resolve_data_dir(Some(PathBuf::from("/srv/datasets")));
    assert_eq!(dir, PathBuf::from("/srv/datasets"));
}

// ========== Analyze Command Tests ==========

#[test]
fn test_analyze_finds_spike() {
    let dir = TempDir::new().unwrap();
    let file = sales_csv(&dir);

    let response = commands::analyze(
        AnalyticsConfig::default(),
        &file,
        "Anomali tespiti ve kritik içgörüler",
        None,
    )
    .unwrap();

    assert_eq!(response.intent, Intent::Insights);
    assert!(response.text.contains("sales, row 4"));

    let rendered = commands::render_response(&response, false).unwrap();
    assert!(rendered.contains("Intent: insights"));
}

#[test]
fn test_analyze_json_output() {
    let dir = TempDir::new().unwrap();
    let file = revenue_csv(&dir);

    let response =
        commands::analyze(AnalyticsConfig::default(), &file, "forecast revenue", None).unwrap();
    let rendered = commands::render_response(&response, true).unwrap();
    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();

    assert_eq!(json["intent"], "forecast");
    assert_eq!(json["chart"]["type"], "line");
    assert_eq!(json["findings"][0]["column"], "revenue");
}

#[test]
fn test_analyze_invalid_hint() {
    let dir = TempDir::new().unwrap();
    let file = sales_csv(&dir);

    let result = commands::analyze(
        AnalyticsConfig::default(),
        &file,
        "anything",
        Some("astrology"),
    );
    assert!(result.is_err());
}

#[test]
fn test_analyze_unknown_column_includes_suggestion() {
    let dir = TempDir::new().unwrap();
    let file = revenue_csv(&dir);

    let err = commands::analyze(AnalyticsConfig::default(), &file, "forecast `revnue`", None)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown column: revnue"));
    assert!(message.contains("Did you mean 'revenue'?"));
}

#[test]
fn test_analyze_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = commands::analyze(
        AnalyticsConfig::default(),
        &dir.path().join("nope.csv"),
        "overview",
        None,
    );
    assert!(result.is_err());
}

// ========== Profile and Status Tests ==========

#[test]
fn test_cmd_profile() {
    let dir = TempDir::new().unwrap();
    let file = revenue_csv(&dir);
    assert!(commands::cmd_profile(&file, false).is_ok());
    assert!(commands::cmd_profile(&file, true).is_ok());
}

#[test]
fn test_render_profile() {
    let dir = TempDir::new().unwrap();
    let file = revenue_csv(&dir);
    let dataset = tally_core::CsvLoader::new().load_path(&file).unwrap();
    let rendered = commands::render_profile(&tally_core::profile(&dataset));

    assert!(rendered.contains("revenue"));
    assert!(rendered.contains("12 rows and 3 columns"));
    assert!(rendered.contains("Try asking:"));
}

#[test]
fn test_render_status() {
    let dir = TempDir::new().unwrap();
    sales_csv(&dir);
    revenue_csv(&dir);

    let mut config = AnalyticsConfig::default();
    config.modules.recommendations = false;
    let rendered = commands::render_status(&config, None, dir.path()).unwrap();

    assert!(rendered.contains("✓ Anomaly detection"));
    assert!(rendered.contains("✗ Recommendations"));
    assert!(rendered.contains("• revenue"));
    assert!(rendered.contains("• sales"));
}

#[test]
fn test_render_status_empty_data_dir() {
    let dir = TempDir::new().unwrap();
    let rendered =
        commands::render_status(&AnalyticsConfig::default(), None, &dir.path().join("missing"))
            .unwrap();
    assert!(rendered.contains("(no CSV files)"));
}
