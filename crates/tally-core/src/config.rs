//! Analytics configuration
//!
//! Every threshold used by the analytical modules lives here with a
//! documented default. Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/analytics.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/analytics.toml");

/// Intent classifier tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Minimum confidence for a non-fallback classification
    pub min_confidence: f64,
    /// Added to the previous intent when the query looks like a follow-up
    pub continuity_bonus: f64,
    /// Queries with at most this many words count as follow-ups
    pub follow_up_max_words: usize,
    /// Added to the intent named by the client hint
    pub hint_bonus: f64,
    /// Evidence weight at which confidence reaches 0.5
    pub saturation: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            continuity_bonus: 0.3,
            follow_up_max_words: 4,
            hint_bonus: 0.1,
            saturation: 2.0,
        }
    }
}

/// Anomaly detector thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    /// |z| above this is anomalous
    pub z_threshold: f64,
    /// |z| at or above this is medium severity
    pub medium_z: f64,
    /// |z| at or above this is high severity
    pub high_z: f64,
    /// IQR fence multiplier for the robust method
    pub iqr_multiplier: f64,
    /// Columns with fewer non-missing values are skipped
    pub min_samples: usize,
    /// Columns with fewer values use the robust method
    pub robust_min_samples: usize,
    /// |skewness| above this selects the robust method
    pub heavy_tail_skew: f64,
    /// Enable cross-column detection
    pub multivariate: bool,
    /// Standardized joint distance above this is anomalous
    pub multivariate_threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            medium_z: 3.5,
            high_z: 4.0,
            iqr_multiplier: 1.5,
            min_samples: 5,
            robust_min_samples: 12,
            heavy_tail_skew: 2.0,
            multivariate: false,
            multivariate_threshold: 2.5,
        }
    }
}

/// Which model the trend engine extrapolates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendModelChoice {
    Linear,
    Holt,
    Auto,
}

/// Trend & forecast engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    pub min_points: usize,
    /// |t| of the slope below this is "stable"
    pub t_threshold: f64,
    /// Relative change over the series below this is "stable"
    pub min_relative_change: f64,
    pub default_horizon: usize,
    pub max_horizon: usize,
    /// z multiplier for prediction intervals
    pub confidence_z: f64,
    pub model: TrendModelChoice,
    pub holt_alpha: f64,
    pub holt_beta: f64,
    /// Residual lag-1 autocorrelation that switches `auto` to Holt
    pub holt_autocorrelation: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points: 4,
            t_threshold: 2.0,
            min_relative_change: 0.01,
            default_horizon: 3,
            max_horizon: 24,
            confidence_z: 1.96,
            model: TrendModelChoice::Auto,
            holt_alpha: 0.5,
            holt_beta: 0.3,
            holt_autocorrelation: 0.5,
        }
    }
}

/// Segmenter tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub max_iterations: usize,
    /// Number of seeded k-means restarts
    pub n_init: usize,
    pub seed: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            default_k: 3,
            max_k: 10,
            max_iterations: 100,
            n_init: 10,
            seed: 42,
        }
    }
}

/// Engine-level resources
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Per-module deadline
    pub module_timeout: Duration,
    /// Dataset cache capacity (entries)
    pub cache_capacity: usize,
    /// Conversation turns kept per session
    pub history_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            module_timeout: Duration::from_secs(5),
            cache_capacity: 8,
            history_window: 10,
        }
    }
}

/// Feature flags for the analytical modules
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleFlags {
    pub anomaly_detection: bool,
    pub trend_forecast: bool,
    pub segmentation: bool,
    pub recommendations: bool,
}

impl Default for ModuleFlags {
    fn default() -> Self {
        Self {
            anomaly_detection: true,
            trend_forecast: true,
            segmentation: true,
            recommendations: true,
        }
    }
}

/// Complete analytics configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsConfig {
    pub classifier: ClassifierConfig,
    pub anomaly: AnomalyConfig,
    pub trend: TrendConfig,
    pub segment: SegmentConfig,
    pub engine: EngineConfig,
    pub modules: ModuleFlags,
}

impl AnalyticsConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit path (embedded defaults if the file doesn't exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("analytics.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<AnalyticsConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let content = match path {
        Some(p) if p.exists() => {
            tracing::debug!(path = %p.display(), "Loading analytics config override");
            fs::read_to_string(&p)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    classifier: Option<RawClassifier>,
    anomaly: Option<RawAnomaly>,
    trend: Option<RawTrend>,
    segment: Option<RawSegment>,
    engine: Option<RawEngine>,
    modules: Option<RawModules>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    min_confidence: Option<f64>,
    continuity_bonus: Option<f64>,
    follow_up_max_words: Option<usize>,
    hint_bonus: Option<f64>,
    saturation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawAnomaly {
    z_threshold: Option<f64>,
    medium_z: Option<f64>,
    high_z: Option<f64>,
    iqr_multiplier: Option<f64>,
    min_samples: Option<usize>,
    robust_min_samples: Option<usize>,
    heavy_tail_skew: Option<f64>,
    multivariate: Option<bool>,
    multivariate_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTrend {
    min_points: Option<usize>,
    t_threshold: Option<f64>,
    min_relative_change: Option<f64>,
    default_horizon: Option<usize>,
    max_horizon: Option<usize>,
    confidence_z: Option<f64>,
    model: Option<TrendModelChoice>,
    holt_alpha: Option<f64>,
    holt_beta: Option<f64>,
    holt_autocorrelation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    default_k: Option<usize>,
    max_k: Option<usize>,
    max_iterations: Option<usize>,
    n_init: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawEngine {
    module_timeout_ms: Option<u64>,
    cache_capacity: Option<usize>,
    history_window: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawModules {
    anomaly_detection: Option<bool>,
    trend_forecast: Option<bool>,
    segmentation: Option<bool>,
    recommendations: Option<bool>,
}

/// Overwrite `$target` with `$value` when present
macro_rules! apply {
    ($target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
        }
    };
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<AnalyticsConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = AnalyticsConfig::default();

    if let Some(c) = raw.classifier {
        apply!(config.classifier.min_confidence, c.min_confidence);
        apply!(config.classifier.continuity_bonus, c.continuity_bonus);
        apply!(config.classifier.follow_up_max_words, c.follow_up_max_words);
        apply!(config.classifier.hint_bonus, c.hint_bonus);
        apply!(config.classifier.saturation, c.saturation);
    }

    if let Some(a) = raw.anomaly {
        apply!(config.anomaly.z_threshold, a.z_threshold);
        apply!(config.anomaly.medium_z, a.medium_z);
        apply!(config.anomaly.high_z, a.high_z);
        apply!(config.anomaly.iqr_multiplier, a.iqr_multiplier);
        apply!(config.anomaly.min_samples, a.min_samples);
        apply!(config.anomaly.robust_min_samples, a.robust_min_samples);
        apply!(config.anomaly.heavy_tail_skew, a.heavy_tail_skew);
        apply!(config.anomaly.multivariate, a.multivariate);
        apply!(config.anomaly.multivariate_threshold, a.multivariate_threshold);
    }

    if let Some(t) = raw.trend {
        apply!(config.trend.min_points, t.min_points);
        apply!(config.trend.t_threshold, t.t_threshold);
        apply!(config.trend.min_relative_change, t.min_relative_change);
        apply!(config.trend.default_horizon, t.default_horizon);
        apply!(config.trend.max_horizon, t.max_horizon);
        apply!(config.trend.confidence_z, t.confidence_z);
        apply!(config.trend.model, t.model);
        apply!(config.trend.holt_alpha, t.holt_alpha);
        apply!(config.trend.holt_beta, t.holt_beta);
        apply!(config.trend.holt_autocorrelation, t.holt_autocorrelation);
    }

    if let Some(s) = raw.segment {
        apply!(config.segment.default_k, s.default_k);
        apply!(config.segment.max_k, s.max_k);
        apply!(config.segment.max_iterations, s.max_iterations);
        apply!(config.segment.n_init, s.n_init);
        apply!(config.segment.seed, s.seed);
    }

    if let Some(e) = raw.engine {
        apply!(
            config.engine.module_timeout,
            e.module_timeout_ms.map(Duration::from_millis)
        );
        apply!(config.engine.cache_capacity, e.cache_capacity);
        apply!(config.engine.history_window, e.history_window);
    }

    if let Some(m) = raw.modules {
        apply!(config.modules.anomaly_detection, m.anomaly_detection);
        apply!(config.modules.trend_forecast, m.trend_forecast);
        apply!(config.modules.segmentation, m.segmentation);
        apply!(config.modules.recommendations, m.recommendations);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AnalyticsConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&config.classifier.min_confidence) {
        return Err(Error::Config(
            "classifier.min_confidence must be within [0, 1]".to_string(),
        ));
    }
    if config.classifier.saturation <= 0.0 {
        return Err(Error::Config(
            "classifier.saturation must be positive".to_string(),
        ));
    }
    let a = &config.anomaly;
    if !(a.z_threshold <= a.medium_z && a.medium_z <= a.high_z) {
        return Err(Error::Config(
            "anomaly thresholds must satisfy z_threshold <= medium_z <= high_z".to_string(),
        ));
    }
    if config.trend.min_points < 3 {
        return Err(Error::Config("trend.min_points must be at least 3".to_string()));
    }
    let t = &config.trend;
    if t.default_horizon == 0 || t.default_horizon > t.max_horizon {
        return Err(Error::Config(
            "trend.default_horizon must be within 1..=trend.max_horizon".to_string(),
        ));
    }
    if config.segment.default_k == 0 || config.segment.n_init == 0 {
        return Err(Error::Config(
            "segment.default_k and segment.n_init must be positive".to_string(),
        ));
    }
    if config.engine.cache_capacity == 0 {
        return Err(Error::Config(
            "engine.cache_capacity must be positive".to_string(),
        ));
    }
    Ok(())
}
