//! Core types shared by the classifier, the analytical modules and the aggregator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Full report: profile, anomalies, trends, segments and recommendations
    Comprehensive,
    /// Anomalies and critical insights
    Insights,
    /// Trend and forecast
    Forecast,
    /// Prioritized actions
    Recommendations,
    /// Direct question answered from the dataset profile
    Qa,
}

impl Intent {
    /// Every intent, in tie-break priority order
    pub const ALL: [Intent; 5] = [
        Intent::Insights,
        Intent::Forecast,
        Intent::Recommendations,
        Intent::Comprehensive,
        Intent::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Comprehensive => "comprehensive",
            Intent::Insights => "insights",
            Intent::Forecast => "forecast",
            Intent::Recommendations => "recommendations",
            Intent::Qa => "qa",
        }
    }

    /// Fixed tie-break priority (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            Intent::Insights => 5,
            Intent::Forecast => 4,
            Intent::Recommendations => 3,
            Intent::Comprehensive => 2,
            Intent::Qa => 1,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "comprehensive" => Ok(Intent::Comprehensive),
            "insights" => Ok(Intent::Insights),
            "forecast" => Ok(Intent::Forecast),
            "recommendations" => Ok(Intent::Recommendations),
            "qa" => Ok(Intent::Qa),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Analytical modules the engine can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisModule {
    AnomalyDetection,
    TrendForecast,
    Segmentation,
    Recommendations,
}

impl AnalysisModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisModule::AnomalyDetection => "anomaly_detection",
            AnalysisModule::TrendForecast => "trend_forecast",
            AnalysisModule::Segmentation => "segmentation",
            AnalysisModule::Recommendations => "recommendations",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisModule::AnomalyDetection => "Anomaly detection",
            AnalysisModule::TrendForecast => "Trend forecast",
            AnalysisModule::Segmentation => "Segmentation",
            AnalysisModule::Recommendations => "Recommendations",
        }
    }
}

impl fmt::Display for AnalysisModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One previous conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub intent: Intent,
}

/// Severity tier of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Numeric priority for sorting (higher = more severe)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Reference value an anomaly is measured against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Baseline {
    Mean(f64),
    Median(f64),
    /// Per-column means of a multivariate comparison
    Centroid,
}

/// How far an anomaly lies from its baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Deviation {
    ZScore(f64),
    /// Distance from the nearest quartile, in IQR units
    IqrDistance(f64),
    /// Standardized Euclidean distance across columns
    Joint(f64),
}

impl Deviation {
    pub fn value(&self) -> f64 {
        match *self {
            Deviation::ZScore(v) | Deviation::IqrDistance(v) | Deviation::Joint(v) => v,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Deviation::ZScore(_) => "z-score",
            Deviation::IqrDistance(_) => "IQR distance",
            Deviation::Joint(_) => "joint distance",
        }
    }
}

/// A statistically unusual value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Column the value belongs to (strongest contributor for multivariate)
    pub column: String,
    /// Row position in the dataset
    pub row: usize,
    pub value: f64,
    pub baseline: Baseline,
    pub deviation: Deviation,
    pub severity: Severity,
    pub score: f64,
    /// Columns that drove a multivariate anomaly (empty otherwise)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributing: Vec<String>,
}

impl Anomaly {
    pub fn is_multivariate(&self) -> bool {
        matches!(self.deviation, Deviation::Joint(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model used to extrapolate a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendModel {
    Linear,
    Holt,
}

impl TrendModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendModel::Linear => "linear",
            TrendModel::Holt => "holt",
        }
    }
}

/// One forecast step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Steps past the last observation (1-based)
    pub offset: usize,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Trend of one ordered numeric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub column: String,
    pub direction: TrendDirection,
    /// OLS slope per period
    pub slope: f64,
    /// |t| of the slope (infinite for a perfect non-flat fit)
    pub significance: f64,
    pub model: TrendModel,
    pub mean: f64,
    /// Observed values in series order; `None` where the cell is missing
    pub history: Vec<Option<f64>>,
    pub forecast: Vec<ForecastPoint>,
    pub score: f64,
}

/// Per-dimension summary of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DimensionSummary {
    Numeric {
        column: String,
        mean: f64,
        median: f64,
        std: Option<f64>,
    },
    Categorical {
        column: String,
        mode: Option<String>,
        share: f64,
    },
}

/// A cohort of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position after sorting by size
    pub id: usize,
    pub label: String,
    pub rows: Vec<usize>,
    pub size: usize,
    /// Fraction of all rows in this segment
    pub share: f64,
    pub summaries: Vec<DimensionSummary>,
}

/// A prioritized action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub template_id: String,
    pub text: String,
    pub priority: f64,
    /// Keys of the findings that triggered it
    pub triggers: Vec<String>,
}

/// Dataset-wide data quality below the acceptable level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub dataset: String,
    /// 0-100, as scored by the profiler
    pub quality_score: f64,
    pub missing_percentage: f64,
    /// Numeric cells outside the 1.5 IQR fences
    pub outliers: usize,
}

impl QualityIssue {
    /// How far below a clean dataset the score sits, in [0, 1]
    pub fn strength(&self) -> f64 {
        ((100.0 - self.quality_score) / 50.0).clamp(0.0, 1.0)
    }
}

/// Row whose value moved the most between two periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMover {
    /// Key column value, or "row N" when the dataset has no key column
    pub label: String,
    pub row: usize,
    pub change: f64,
}

/// One measure compared across two period columns ("ciro 2024" vs "ciro 2025")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    /// Earlier period column
    pub from: String,
    /// Later period column
    pub to: String,
    pub from_total: f64,
    pub to_total: f64,
    /// Relative change of the total
    pub growth: f64,
    /// Rows that rose between the periods
    pub improved: usize,
    /// Rows that fell between the periods
    pub declined: usize,
    pub top: PeriodMover,
    pub bottom: PeriodMover,
    pub severity: Severity,
    pub score: f64,
}

/// Kind of a [`Finding`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Anomaly,
    Comparison,
    Quality,
    Trend,
    Segment,
    Recommendation,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Anomaly => "anomaly",
            FindingKind::Comparison => "comparison",
            FindingKind::Quality => "quality",
            FindingKind::Trend => "trend",
            FindingKind::Segment => "segment",
            FindingKind::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of an analytical module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Anomaly(Anomaly),
    Comparison(PeriodComparison),
    Quality(QualityIssue),
    Trend(TrendResult),
    Segment(Segment),
    Recommendation(Recommendation),
}

impl Finding {
    pub fn kind(&self) -> FindingKind {
        match self {
            Finding::Anomaly(_) => FindingKind::Anomaly,
            Finding::Comparison(_) => FindingKind::Comparison,
            Finding::Quality(_) => FindingKind::Quality,
            Finding::Trend(_) => FindingKind::Trend,
            Finding::Segment(_) => FindingKind::Segment,
            Finding::Recommendation(_) => FindingKind::Recommendation,
        }
    }

    /// Strength of the finding in [0, 1]
    pub fn score(&self) -> f64 {
        match self {
            Finding::Anomaly(a) => a.score,
            Finding::Comparison(c) => c.score,
            Finding::Quality(q) => q.strength(),
            Finding::Trend(t) => t.score,
            Finding::Segment(s) => s.share,
            Finding::Recommendation(r) => r.priority,
        }
    }

    /// Stable key for deduplication and trigger references
    /// (e.g., "anomaly:cost:4", "trend:revenue")
    pub fn key(&self) -> String {
        match self {
            Finding::Anomaly(a) if a.is_multivariate() => format!("anomaly:joint:{}", a.row),
            Finding::Anomaly(a) => format!("anomaly:{}:{}", a.column, a.row),
            Finding::Comparison(c) => format!("comparison:{}:{}", c.from, c.to),
            Finding::Quality(q) => format!("quality:{}", q.dataset),
            Finding::Trend(t) => format!("trend:{}", t.column),
            Finding::Segment(s) => format!("segment:{}", s.id),
            Finding::Recommendation(r) => format!("recommendation:{}", r.template_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip_names() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert!("segments".parse::<Intent>().is_err());
        assert_eq!(" Forecast ".parse::<Intent>().unwrap(), Intent::Forecast);
    }

    #[test]
    fn test_intent_priority_order() {
        let priorities: Vec<u8> = Intent::ALL.iter().map(Intent::priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_finding_serializes_with_kind_tag() {
        let finding = Finding::Anomaly(Anomaly {
            column: "sales".to_string(),
            row: 4,
            value: 100.0,
            baseline: Baseline::Median(12.0),
            deviation: Deviation::ZScore(59.4),
            severity: Severity::High,
            score: 1.0,
            contributing: vec![],
        });

        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "anomaly");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["baseline"]["kind"], "median");
        assert_eq!(json["deviation"]["kind"], "z_score");
        assert!(json.get("contributing").is_none());
        assert_eq!(finding.key(), "anomaly:sales:4");
    }
}
