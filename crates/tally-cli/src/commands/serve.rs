//! Server command implementation

use std::path::PathBuf;

use anyhow::Result;
use tally_core::AnalyticsConfig;
use tally_server::{parse_api_keys, Catalog, ServerConfig};

use super::API_KEYS_ENV;

pub async fn cmd_serve(
    analytics: AnalyticsConfig,
    data_dir: PathBuf,
    host: &str,
    port: u16,
    no_auth: bool,
) -> Result<()> {
    println!("🚀 Starting Tally web server...");
    println!("   Data directory: {}", data_dir.display());
    println!("   Listening: http://{}:{}", host, port);

    let datasets = Catalog::new(&data_dir).list()?;
    println!("   Datasets: {}", datasets.len());

    let api_keys = parse_api_keys(&std::env::var(API_KEYS_ENV).unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   ❌ Authentication required but {} is not set", API_KEYS_ENV);
        println!("      Every request will be rejected until keys are configured");
    } else {
        println!(
            "   🔑 API keys: {} configured ({})",
            api_keys.len(),
            API_KEYS_ENV
        );
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let engine = tally_core::AnalyticsEngine::new(analytics)?;
    let config = ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        api_keys,
    };

    tally_server::serve_with_config(engine, data_dir, host, port, config).await
}
