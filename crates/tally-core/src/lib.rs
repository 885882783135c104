//! Tally Core Library
//!
//! Conversational analytics over in-memory tabular datasets:
//! - Intent classification of free-text queries (Turkish and English)
//! - Anomaly detection, trend fitting with forecasts, and k-means segmentation
//! - Period-over-period comparison and data-quality findings
//! - Rule-table recommendations and template-rendered narratives
//! - Dataset profiling (statistics, data quality, correlations)
//! - CSV loading with type inference and a bounded LRU dataset cache

pub mod aggregate;
pub mod anomaly;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod insight;
pub mod intent;
pub mod loader;
pub mod narrative;
pub mod profile;
pub mod recommend;
pub mod segment;
pub mod stats;
pub mod trend;
pub mod types;

pub use aggregate::{aggregate, ChartSpec, ChartType, Degraded, ModuleOutcome, Response, Series};
pub use anomaly::AnomalyDetector;
pub use cache::DatasetCache;
pub use config::{AnalyticsConfig, ModuleFlags};
pub use dataset::{Column, ColumnData, ColumnKind, Dataset, Schema};
pub use deadline::Deadline;
pub use engine::{modules_for, AnalysisRequest, AnalyticsEngine};
pub use error::{Error, Result};
pub use intent::{Classification, IntentClassifier, QueryParams};
pub use loader::{CsvLoader, DatasetLoader};
pub use profile::{profile, DatasetProfile};
pub use recommend::RecommendationSynthesizer;
pub use segment::Segmenter;
pub use trend::{TrendEngine, TrendReport};
pub use types::{
    AnalysisModule, Anomaly, Finding, FindingKind, Intent, PeriodComparison, PeriodMover,
    QualityIssue, Recommendation, Segment, Severity, TrendDirection, TrendResult, Turn,
};
