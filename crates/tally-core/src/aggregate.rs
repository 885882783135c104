//! Insight aggregation
//!
//! Composes module findings into a single [`Response`]: the findings the
//! served intent cares about, a narrative rendered from templates, an
//! optional declarative chart spec, and one caveat per degraded module.

use serde::{Deserialize, Serialize};

use crate::insight::QUALITY_THRESHOLD;
use crate::intent::{Classification, QueryParams};
use crate::narrative::{number, percent, render};
use crate::profile::DatasetProfile;
use crate::types::{
    AnalysisModule, Anomaly, Baseline, Finding, FindingKind, ForecastPoint, Intent, PeriodComparison,
    QualityIssue, Recommendation, Segment, Severity, TrendResult,
};

/// At most this many anomalies are listed in the narrative
const MAX_LISTED_ANOMALIES: usize = 5;

/// At most this many anomalies are drawn in a bar chart
const MAX_CHARTED_ANOMALIES: usize = 10;

const AMBIGUOUS_PREFIX: &str =
    "I couldn't tell exactly what you were asking for, so here is a full overview of the data.";

const HEADER: &str = "Dataset {{name}}: {{rows}} rows and {{columns}} columns, data quality {{quality}}/100{{#if missing}}, {{missing}} of cells missing{{/if}}.";

const ANOMALY_HEADLINE: &str =
    "Anomalies: {{count}} unusual values found{{#if high}}, {{high}} of them high severity{{/if}}.";
const ANOMALY_LINE: &str = "- {{column}}, row {{row}}: {{value}} against a {{baseline_kind}} of {{baseline}} ({{measure}} {{deviation}}, {{severity}} severity)";
const JOINT_ANOMALY_LINE: &str =
    "- row {{row}} is unusual across {{columns}} (joint distance {{deviation}}, {{severity}} severity)";
const NO_ANOMALIES: &str = "No anomalies were detected in the numeric columns.";

const COMPARISON_LINE: &str = "Period comparison: the total of {{to}} is {{to_total}} against {{from_total}} in {{from}} ({{growth}}); {{improved}} rows rose and {{declined}} fell. Best: {{top}} ({{top_change}}), worst: {{bottom}} ({{bottom_change}}).";

const QUALITY_LINE: &str = "Data quality is {{score}}/100, below the target of {{threshold}}{{#if missing}}: {{missing}} of cells are missing{{/if}}{{#if outliers}}, {{outliers}} numeric values fall outside the IQR fences{{/if}}.";

const TREND_HEADLINE: &str = "Trends:";
const TREND_LINE: &str = "- {{column}} is {{direction}} ({{slope}} per period, |t| = {{t}}, {{model}} model). Next {{horizon}} periods: {{values}}.";
const NO_TRENDS: &str = "No trend could be fitted.";

const SEGMENT_HEADLINE: &str = "Segments: the rows fall into {{count}} groups.";
const SEGMENT_LINE: &str = "- {{label}}: {{size}} rows ({{share}})";

const RECOMMENDATION_HEADLINE: &str = "Recommendations:";
const RECOMMENDATION_LINE: &str = "{{rank}}. {{text}}";
const NO_RECOMMENDATIONS: &str = "No specific actions stand out from the current findings.";

const QA_NUMERIC: &str = "{{column}}: mean {{mean}}, median {{median}}, min {{min}}, max {{max}} over {{count}} values{{#if missing}} ({{missing}} missing){{/if}}.";
const QA_CATEGORICAL: &str =
    "{{column}} has {{unique}} distinct values; the most frequent is {{mode}} ({{frequency}} rows).";
const QA_DATES: &str = "{{column}} runs from {{start}} to {{end}}.";
const QA_OVERVIEW: &str = "The dataset has {{rows}} rows and {{columns}} columns (data quality {{quality}}/100).{{#if numeric}} Numeric columns: {{numeric}}.{{/if}}";
const QA_NO_PROFILE: &str = "There is no dataset profile to answer the question from.";

const CAVEAT: &str = "{{module}} is unavailable: {{reason}}";

/// A module that failed or timed out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degraded {
    pub module: AnalysisModule,
    /// Error kind (e.g. "insufficient_data", "computation")
    pub kind: String,
    pub reason: String,
}

/// Everything the modules produced for one query
#[derive(Debug, Clone, Default)]
pub struct ModuleOutcome {
    pub findings: Vec<Finding>,
    pub degraded: Vec<Degraded>,
    /// Non-fatal remarks from modules (e.g. skipped columns)
    pub notes: Vec<String>,
    pub profile: Option<DatasetProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Pie,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<Option<f64>>,
}

/// Declarative chart description; rendering is up to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub series: Vec<Series>,
    pub labels: Vec<String>,
}

/// Final answer to one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub intent: Intent,
    pub confidence: f64,
    pub ambiguous: bool,
    pub findings: Vec<Finding>,
    pub text: String,
    pub chart: Option<ChartSpec>,
    pub caveats: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<DatasetProfile>,
}

/// Finding kinds each intent reports
pub fn categories(intent: Intent) -> &'static [FindingKind] {
    match intent {
        Intent::Insights => &[FindingKind::Anomaly, FindingKind::Comparison],
        Intent::Forecast => &[FindingKind::Trend],
        Intent::Recommendations => &[FindingKind::Recommendation],
        Intent::Comprehensive => &[
            FindingKind::Quality,
            FindingKind::Anomaly,
            FindingKind::Comparison,
            FindingKind::Trend,
            FindingKind::Segment,
            FindingKind::Recommendation,
        ],
        Intent::Qa => &[],
    }
}

/// Compose module outcomes into a response; never fails
pub fn aggregate(classification: &Classification, outcome: ModuleOutcome) -> Response {
    let intent = classification.intent;
    let wanted = categories(intent);
    let findings: Vec<Finding> = outcome
        .findings
        .into_iter()
        .filter(|f| wanted.contains(&f.kind()))
        .collect();

    let caveats: Vec<String> = outcome
        .degraded
        .iter()
        .map(|d| {
            render(
                CAVEAT,
                &[("module", d.module.label()), ("reason", d.reason.as_str())],
            )
        })
        .chain(outcome.notes)
        .collect();

    let mut parts: Vec<String> = Vec::new();
    if classification.ambiguous {
        parts.push(AMBIGUOUS_PREFIX.to_string());
    }

    if intent == Intent::Qa {
        parts.push(answer_question(&classification.params, outcome.profile.as_ref()));
    } else {
        if intent == Intent::Comprehensive {
            if let Some(profile) = &outcome.profile {
                parts.push(header(profile));
            }
        }
        for kind in wanted {
            if let Some(section) = section(*kind, &findings, &outcome.degraded) {
                parts.push(section);
            }
        }
    }

    if !caveats.is_empty() {
        let lines: Vec<String> = caveats.iter().map(|c| format!("- {}", c)).collect();
        parts.push(format!("Notes:\n{}", lines.join("\n")));
    }

    let chart = match intent {
        Intent::Qa => None,
        _ => chart(&findings, &classification.params),
    };

    Response {
        intent,
        confidence: classification.confidence,
        ambiguous: classification.ambiguous,
        findings,
        text: parts.join("\n\n"),
        chart,
        caveats,
        profile: outcome.profile,
    }
}

fn header(profile: &DatasetProfile) -> String {
    let missing = if profile.missing_percentage > 0.0 {
        percent(profile.missing_percentage / 100.0)
    } else {
        String::new()
    };
    render(
        HEADER,
        &[
            ("name", profile.name.as_str()),
            ("rows", &profile.rows.to_string()),
            ("columns", &profile.columns.to_string()),
            ("quality", &format!("{:.0}", profile.quality_score)),
            ("missing", &missing),
        ],
    )
}

/// Narrative section for one finding kind; `None` when the producing
/// module degraded (its caveat explains the gap)
fn section(kind: FindingKind, findings: &[Finding], degraded: &[Degraded]) -> Option<String> {
    let module = match kind {
        FindingKind::Anomaly | FindingKind::Comparison | FindingKind::Quality => {
            AnalysisModule::AnomalyDetection
        }
        FindingKind::Trend => AnalysisModule::TrendForecast,
        FindingKind::Segment => AnalysisModule::Segmentation,
        FindingKind::Recommendation => AnalysisModule::Recommendations,
    };
    if degraded.iter().any(|d| d.module == module) {
        return None;
    }

    match kind {
        FindingKind::Anomaly => {
            let anomalies: Vec<&Anomaly> = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::Anomaly(a) => Some(a),
                    _ => None,
                })
                .collect();
            Some(anomaly_section(&anomalies))
        }
        FindingKind::Comparison => {
            let lines: Vec<String> = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::Comparison(c) => Some(comparison_line(c)),
                    _ => None,
                })
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        FindingKind::Quality => findings.iter().find_map(|f| match f {
            Finding::Quality(q) => Some(quality_line(q)),
            _ => None,
        }),
        FindingKind::Trend => {
            let trends: Vec<&TrendResult> = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::Trend(t) => Some(t),
                    _ => None,
                })
                .collect();
            Some(trend_section(&trends))
        }
        FindingKind::Segment => {
            let segments: Vec<&Segment> = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::Segment(s) => Some(s),
                    _ => None,
                })
                .collect();
            (!segments.is_empty()).then(|| segment_section(&segments))
        }
        FindingKind::Recommendation => {
            let recs: Vec<&Recommendation> = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::Recommendation(r) => Some(r),
                    _ => None,
                })
                .collect();
            Some(recommendation_section(&recs))
        }
    }
}

fn anomaly_section(anomalies: &[&Anomaly]) -> String {
    if anomalies.is_empty() {
        return NO_ANOMALIES.to_string();
    }

    let high = anomalies
        .iter()
        .filter(|a| a.severity == Severity::High)
        .count();
    let high = if high > 0 { high.to_string() } else { String::new() };
    let mut lines = vec![render(
        ANOMALY_HEADLINE,
        &[("count", &anomalies.len().to_string()), ("high", &high)],
    )];

    for a in anomalies.iter().take(MAX_LISTED_ANOMALIES) {
        let row = a.row.to_string();
        let deviation = number(a.deviation.value());
        let line = if a.is_multivariate() {
            render(
                JOINT_ANOMALY_LINE,
                &[
                    ("row", &row),
                    ("columns", &a.contributing.join(", ")),
                    ("deviation", &deviation),
                    ("severity", a.severity.as_str()),
                ],
            )
        } else {
            let (baseline_kind, baseline) = match a.baseline {
                Baseline::Mean(v) => ("mean", number(v)),
                Baseline::Median(v) => ("median", number(v)),
                Baseline::Centroid => ("centroid", String::new()),
            };
            render(
                ANOMALY_LINE,
                &[
                    ("column", &a.column),
                    ("row", &row),
                    ("value", &number(a.value)),
                    ("baseline_kind", baseline_kind),
                    ("baseline", &baseline),
                    ("measure", a.deviation.label()),
                    ("deviation", &deviation),
                    ("severity", a.severity.as_str()),
                ],
            )
        };
        lines.push(line);
    }
    if anomalies.len() > MAX_LISTED_ANOMALIES {
        lines.push(format!("- and {} more", anomalies.len() - MAX_LISTED_ANOMALIES));
    }

    lines.join("\n")
}

fn comparison_line(c: &PeriodComparison) -> String {
    render(
        COMPARISON_LINE,
        &[
            ("from", &c.from),
            ("to", &c.to),
            ("from_total", &number(c.from_total)),
            ("to_total", &number(c.to_total)),
            ("growth", &format!("{:+.1}%", c.growth * 100.0)),
            ("improved", &c.improved.to_string()),
            ("declined", &c.declined.to_string()),
            ("top", &c.top.label),
            ("top_change", &signed(c.top.change)),
            ("bottom", &c.bottom.label),
            ("bottom_change", &signed(c.bottom.change)),
        ],
    )
}

fn quality_line(q: &QualityIssue) -> String {
    let missing = if q.missing_percentage > 0.0 {
        percent(q.missing_percentage / 100.0)
    } else {
        String::new()
    };
    let outliers = if q.outliers > 0 { q.outliers.to_string() } else { String::new() };
    render(
        QUALITY_LINE,
        &[
            ("score", &format!("{:.0}", q.quality_score)),
            ("threshold", &format!("{:.0}", QUALITY_THRESHOLD)),
            ("missing", &missing),
            ("outliers", &outliers),
        ],
    )
}

/// A number with an explicit sign ("+30", "-50")
fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", number(value))
    } else {
        number(value)
    }
}

fn trend_section(trends: &[&TrendResult]) -> String {
    if trends.is_empty() {
        return NO_TRENDS.to_string();
    }

    let mut lines = vec![TREND_HEADLINE.to_string()];
    for t in trends {
        let values: Vec<String> = t
            .forecast
            .iter()
            .map(|p| format!("{} [{} to {}]", number(p.predicted), number(p.lower), number(p.upper)))
            .collect();
        lines.push(render(
            TREND_LINE,
            &[
                ("column", &t.column),
                ("direction", t.direction.as_str()),
                ("slope", &number(t.slope)),
                ("t", &number(t.significance)),
                ("model", t.model.as_str()),
                ("horizon", &t.forecast.len().to_string()),
                ("values", &values.join(", ")),
            ],
        ));
    }
    lines.join("\n")
}

fn segment_section(segments: &[&Segment]) -> String {
    let mut lines = vec![render(
        SEGMENT_HEADLINE,
        &[("count", &segments.len().to_string())],
    )];
    for s in segments {
        lines.push(render(
            SEGMENT_LINE,
            &[
                ("label", &s.label),
                ("size", &s.size.to_string()),
                ("share", &percent(s.share)),
            ],
        ));
    }
    lines.join("\n")
}

fn recommendation_section(recs: &[&Recommendation]) -> String {
    if recs.is_empty() {
        return NO_RECOMMENDATIONS.to_string();
    }
    let mut lines = vec![RECOMMENDATION_HEADLINE.to_string()];
    for (i, r) in recs.iter().enumerate() {
        lines.push(render(
            RECOMMENDATION_LINE,
            &[("rank", &(i + 1).to_string()), ("text", &r.text)],
        ));
    }
    lines.join("\n")
}

/// Answer a direct question from the profile
fn answer_question(params: &QueryParams, profile: Option<&DatasetProfile>) -> String {
    let Some(profile) = profile else {
        return QA_NO_PROFILE.to_string();
    };

    let answers: Vec<String> = params
        .columns
        .iter()
        .filter_map(|column| column_answer(column, profile))
        .collect();
    if !answers.is_empty() {
        return answers.join("\n");
    }

    let numeric: Vec<&str> = profile.numeric.iter().map(|s| s.column.as_str()).collect();
    render(
        QA_OVERVIEW,
        &[
            ("rows", &profile.rows.to_string()),
            ("columns", &profile.columns.to_string()),
            ("quality", &format!("{:.0}", profile.quality_score)),
            ("numeric", &numeric.join(", ")),
        ],
    )
}

fn column_answer(column: &str, profile: &DatasetProfile) -> Option<String> {
    if let Some(s) = profile.numeric_stats(column) {
        let missing = if s.missing > 0 { s.missing.to_string() } else { String::new() };
        return Some(render(
            QA_NUMERIC,
            &[
                ("column", column),
                ("mean", &number(s.mean)),
                ("median", &number(s.median)),
                ("min", &number(s.min)),
                ("max", &number(s.max)),
                ("count", &s.count.to_string()),
                ("missing", &missing),
            ],
        ));
    }
    if let Some(s) = profile.categorical_stats(column) {
        return Some(render(
            QA_CATEGORICAL,
            &[
                ("column", column),
                ("unique", &s.unique.to_string()),
                ("mode", s.most_frequent.as_deref().unwrap_or("n/a")),
                ("frequency", &s.frequency.to_string()),
            ],
        ));
    }
    profile.dates.iter().find(|d| d.column == column).map(|d| {
        render(
            QA_DATES,
            &[
                ("column", column),
                ("start", &d.start.date().to_string()),
                ("end", &d.end.date().to_string()),
            ],
        )
    })
}

/// Trends win, then segments, then anomalies
fn chart(findings: &[Finding], params: &QueryParams) -> Option<ChartSpec> {
    let trends: Vec<&TrendResult> = findings
        .iter()
        .filter_map(|f| match f {
            Finding::Trend(t) => Some(t),
            _ => None,
        })
        .collect();
    if !trends.is_empty() {
        let chosen = params
            .columns
            .iter()
            .find_map(|c| trends.iter().find(|t| &t.column == c))
            .unwrap_or(&trends[0]);
        return Some(line_chart(chosen));
    }

    let segments: Vec<&Segment> = findings
        .iter()
        .filter_map(|f| match f {
            Finding::Segment(s) => Some(s),
            _ => None,
        })
        .collect();
    if !segments.is_empty() {
        return Some(ChartSpec {
            chart_type: ChartType::Pie,
            title: "Segment shares".to_string(),
            labels: segments.iter().map(|s| s.label.clone()).collect(),
            series: vec![Series {
                name: "share".to_string(),
                data: segments.iter().map(|s| Some(s.share * 100.0)).collect(),
            }],
        });
    }

    let anomalies: Vec<&Anomaly> = findings
        .iter()
        .filter_map(|f| match f {
            Finding::Anomaly(a) => Some(a),
            _ => None,
        })
        .take(MAX_CHARTED_ANOMALIES)
        .collect();
    if !anomalies.is_empty() {
        return Some(ChartSpec {
            chart_type: ChartType::Bar,
            title: "Anomaly deviations".to_string(),
            labels: anomalies
                .iter()
                .map(|a| format!("{} row {}", a.column, a.row))
                .collect(),
            series: vec![Series {
                name: "deviation".to_string(),
                data: anomalies.iter().map(|a| Some(a.deviation.value())).collect(),
            }],
        });
    }

    None
}

/// History, forecast and interval bounds on one axis
fn line_chart(trend: &TrendResult) -> ChartSpec {
    let n = trend.history.len();
    let h = trend.forecast.len();

    let labels = (1..=n)
        .map(|i| i.to_string())
        .chain(trend.forecast.iter().map(|p| format!("+{}", p.offset)))
        .collect();

    let actual = trend
        .history
        .iter()
        .copied()
        .chain(std::iter::repeat(None).take(h))
        .collect();

    // The forecast line starts at the last observation so the two connect
    let last = trend.history.iter().rposition(Option::is_some);
    let forecast = trend
        .history
        .iter()
        .enumerate()
        .map(|(i, &v)| if Some(i) == last { v } else { None })
        .chain(trend.forecast.iter().map(|p| Some(p.predicted)))
        .collect();

    let bound = |pick: fn(&ForecastPoint) -> f64| -> Vec<Option<f64>> {
        std::iter::repeat(None)
            .take(n)
            .chain(trend.forecast.iter().map(|p| Some(pick(p))))
            .collect()
    };

    ChartSpec {
        chart_type: ChartType::Line,
        title: format!("{} forecast", trend.column),
        labels,
        series: vec![
            Series {
                name: "actual".to_string(),
                data: actual,
            },
            Series {
                name: "forecast".to_string(),
                data: forecast,
            },
            Series {
                name: "lower".to_string(),
                data: bound(|p| p.lower),
            },
            Series {
                name: "upper".to_string(),
                data: bound(|p| p.upper),
            },
        ],
    }
}
