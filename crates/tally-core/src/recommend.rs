//! Recommendation synthesis
//!
//! A static rule table maps finding patterns to recommendation templates.
//! Each template fires at most once per synthesis, aggregating every
//! finding that matched it.

use std::collections::HashMap;

use crate::narrative;
use crate::types::{Finding, Recommendation, Segment, Severity, TrendDirection, TrendResult};

/// Column-name keywords for cost-like measures
const COST_WORDS: &[&str] = &["cost", "expense", "spend", "gider", "maliyet", "masraf", "harcama"];

/// Column-name keywords for revenue-like measures
pub(crate) const REVENUE_WORDS: &[&str] = &["revenue", "sales", "income", "ciro", "satış", "satis", "gelir"];

/// Segments below this share of rows count as small
const SMALL_SEGMENT_SHARE: f64 = 0.15;

/// What a rule matches
enum Pattern {
    Anomaly {
        min_severity: Severity,
        keywords: Option<&'static [&'static str]>,
    },
    JointAnomaly,
    Trend {
        direction: TrendDirection,
        keywords: Option<&'static [&'static str]>,
    },
    SmallSegment,
    LowQuality,
    PeriodDecline,
}

struct Rule {
    id: &'static str,
    pattern: Pattern,
    weight: f64,
    template: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        id: "anomaly_review",
        pattern: Pattern::Anomaly {
            min_severity: Severity::Medium,
            keywords: None,
        },
        weight: 0.6,
        template: "Review the flagged records in {{targets}} for data-entry errors or one-off events before relying on them.",
    },
    Rule {
        id: "cost_investigation",
        pattern: Pattern::Anomaly {
            min_severity: Severity::High,
            keywords: Some(COST_WORDS),
        },
        weight: 1.0,
        template: "Investigate the cost spikes in {{targets}} and confirm whether they are one-off charges or a new run rate.",
    },
    Rule {
        id: "decline_watch",
        pattern: Pattern::Trend {
            direction: TrendDirection::Decreasing,
            keywords: None,
        },
        weight: 0.7,
        template: "Monitor the declining series {{targets}} closely and revisit the forecast next period.",
    },
    Rule {
        id: "growth_capitalize",
        pattern: Pattern::Trend {
            direction: TrendDirection::Increasing,
            keywords: Some(REVENUE_WORDS),
        },
        weight: 0.5,
        template: "{{targets}} is growing; consider reinvesting in the channels that drive the increase.",
    },
    Rule {
        id: "joint_outlier_review",
        pattern: Pattern::JointAnomaly,
        weight: 0.5,
        template: "Some rows are unusual across several columns at once ({{targets}}); review them together.",
    },
    Rule {
        id: "revenue_remediation",
        pattern: Pattern::Trend {
            direction: TrendDirection::Decreasing,
            keywords: Some(REVENUE_WORDS),
        },
        weight: 1.0,
        template: "Revenue is falling in {{targets}}; review pricing, churn and channel performance before the next period.",
    },
    Rule {
        id: "small_segment_review",
        pattern: Pattern::SmallSegment,
        weight: 0.3,
        template: "The small segments {{targets}} may be niche opportunities or data-quality issues; review them separately.",
    },
    Rule {
        id: "data_quality_review",
        pattern: Pattern::LowQuality,
        weight: 0.9,
        template: "Data quality in {{targets}} is below target; trace where the missing values come from and review the outliers before acting on these results.",
    },
    Rule {
        id: "period_decline_review",
        pattern: Pattern::PeriodDecline,
        weight: 0.9,
        template: "{{targets}} fell between periods; start with the weakest performers and check what changed for them.",
    },
];

/// Everything a matched rule needs to render
struct Hit {
    rule: &'static Rule,
    score: f64,
    triggers: Vec<String>,
    targets: Vec<String>,
}

/// Rule-table recommendation synthesizer
#[derive(Debug, Default)]
pub struct RecommendationSynthesizer;

impl RecommendationSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Turn findings into deduplicated recommendations, highest priority first
    pub fn synthesize(&self, findings: &[Finding]) -> Vec<Recommendation> {
        let mut hits: HashMap<&'static str, Hit> = HashMap::new();

        for finding in findings {
            let Some(target) = target_of(finding) else {
                continue;
            };
            for rule in RULES.iter().filter(|r| matches(&r.pattern, finding)) {
                let hit = hits.entry(rule.id).or_insert_with(|| Hit {
                    rule,
                    score: 0.0,
                    triggers: Vec::new(),
                    targets: Vec::new(),
                });
                hit.score = hit.score.max(finding.score());
                hit.triggers.push(finding.key());
                if !hit.targets.contains(&target) {
                    hit.targets.push(target.clone());
                }
            }
        }

        let mut recommendations: Vec<Recommendation> = hits
            .into_values()
            .map(|hit| {
                let targets = hit.targets.join(", ");
                Recommendation {
                    template_id: hit.rule.id.to_string(),
                    text: narrative::render(hit.rule.template, &[("targets", targets.as_str())]),
                    priority: hit.rule.weight * hit.score,
                    triggers: hit.triggers,
                }
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.template_id.cmp(&b.template_id))
        });

        tracing::debug!(count = recommendations.len(), "Recommendations synthesized");
        recommendations
    }
}

/// Name a finding is reported under in recommendation text;
/// recommendations themselves never trigger rules
fn target_of(finding: &Finding) -> Option<String> {
    match finding {
        Finding::Anomaly(a) if a.is_multivariate() => Some(a.contributing.join("+")),
        Finding::Anomaly(a) => Some(a.column.clone()),
        Finding::Comparison(c) => Some(format!("{} vs {}", c.to, c.from)),
        Finding::Quality(q) => Some(q.dataset.clone()),
        Finding::Trend(t) => Some(t.column.clone()),
        Finding::Segment(s) => Some(s.label.clone()),
        Finding::Recommendation(_) => None,
    }
}

fn matches(pattern: &Pattern, finding: &Finding) -> bool {
    match (pattern, finding) {
        (Pattern::Anomaly { min_severity, keywords }, Finding::Anomaly(a)) => {
            !a.is_multivariate()
                && a.severity.priority() >= min_severity.priority()
                && keywords.map_or(true, |k| names_any(&a.column, k))
        }
        (Pattern::JointAnomaly, Finding::Anomaly(a)) => a.is_multivariate(),
        (Pattern::Trend { direction, keywords }, Finding::Trend(t)) => trend_matches(t, *direction, *keywords),
        (Pattern::SmallSegment, Finding::Segment(s)) => is_small(s),
        (Pattern::LowQuality, Finding::Quality(_)) => true,
        (Pattern::PeriodDecline, Finding::Comparison(c)) => c.growth < 0.0,
        _ => false,
    }
}

fn trend_matches(trend: &TrendResult, direction: TrendDirection, keywords: Option<&[&str]>) -> bool {
    trend.direction == direction && keywords.map_or(true, |k| names_any(&trend.column, k))
}

fn is_small(segment: &Segment) -> bool {
    segment.share < SMALL_SEGMENT_SHARE
}

/// Case-insensitive keyword containment on a column name
fn names_any(column: &str, keywords: &[&str]) -> bool {
    let lower = column.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Anomaly, Baseline, Deviation, PeriodComparison, PeriodMover, QualityIssue, TrendModel,
    };

    fn anomaly(column: &str, row: usize, severity: Severity, score: f64) -> Finding {
        Finding::Anomaly(Anomaly {
            column: column.to_string(),
            row,
            value: 100.0,
            baseline: Baseline::Median(10.0),
            deviation: Deviation::ZScore(10.0),
            severity,
            score,
            contributing: vec![],
        })
    }

    fn trend(column: &str, direction: TrendDirection, score: f64) -> Finding {
        Finding::Trend(TrendResult {
            column: column.to_string(),
            direction,
            slope: -1.0,
            significance: 5.0,
            model: TrendModel::Linear,
            mean: 10.0,
            history: vec![],
            forecast: vec![],
            score,
        })
    }

    fn segment(id: usize, share: f64) -> Finding {
        Finding::Segment(Segment {
            id,
            label: format!("Group {}", id),
            rows: vec![id],
            size: 1,
            share,
            summaries: vec![],
        })
    }

    fn comparison(growth: f64) -> Finding {
        let mover = |change| PeriodMover {
            label: "Kadıköy".to_string(),
            row: 0,
            change,
        };
        Finding::Comparison(PeriodComparison {
            from: "ciro 2024".to_string(),
            to: "ciro 2025".to_string(),
            from_total: 1000.0,
            to_total: 1000.0 * (1.0 + growth),
            growth,
            improved: 1,
            declined: 3,
            top: mover(10.0),
            bottom: mover(-90.0),
            severity: Severity::High,
            score: 1.0,
        })
    }

    fn ids(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.template_id.as_str()).collect()
    }

    #[test]
    fn test_cost_spike_prioritized() {
        let recs = RecommendationSynthesizer::new().synthesize(&[anomaly("Maliyet", 3, Severity::High, 0.9)]);
        assert_eq!(ids(&recs), vec!["cost_investigation", "anomaly_review"]);
        assert!((recs[0].priority - 0.9).abs() < 1e-12);
        assert!(recs[0].text.contains("Maliyet"));
        assert_eq!(recs[0].triggers, vec!["anomaly:Maliyet:3"]);
    }

    #[test]
    fn test_low_severity_anomaly_ignored() {
        let recs = RecommendationSynthesizer::new().synthesize(&[anomaly("cost", 1, Severity::Low, 0.55)]);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_declining_revenue() {
        let recs = RecommendationSynthesizer::new().synthesize(&[trend("satış", TrendDirection::Decreasing, 0.8)]);
        assert_eq!(ids(&recs), vec!["revenue_remediation", "decline_watch"]);
    }

    #[test]
    fn test_growing_revenue() {
        let recs = RecommendationSynthesizer::new().synthesize(&[
            trend("revenue", TrendDirection::Increasing, 1.0),
            trend("visits", TrendDirection::Increasing, 1.0),
        ]);
        assert_eq!(ids(&recs), vec!["growth_capitalize"]);
        assert_eq!(recs[0].triggers, vec!["trend:revenue"]);
    }

    #[test]
    fn test_deduplicated_by_template() {
        let recs = RecommendationSynthesizer::new().synthesize(&[
            anomaly("cost", 1, Severity::High, 0.7),
            anomaly("cost", 5, Severity::High, 0.95),
            anomaly("expense", 2, Severity::High, 0.8),
        ]);
        assert_eq!(ids(&recs), vec!["cost_investigation", "anomaly_review"]);

        let cost = &recs[0];
        assert_eq!(cost.triggers.len(), 3);
        assert!((cost.priority - 0.95).abs() < 1e-12);
        assert!(cost.text.contains("cost, expense"));

        let mut unique = ids(&recs);
        unique.dedup();
        assert_eq!(unique.len(), recs.len());
    }

    #[test]
    fn test_ties_broken_by_template_id() {
        let recs = RecommendationSynthesizer::new().synthesize(&[
            trend("visits", TrendDirection::Decreasing, 0.6),
            anomaly("visits", 2, Severity::Medium, 0.7),
        ]);
        // 0.7 * 0.6 == 0.6 * 0.7
        assert_eq!(ids(&recs), vec!["anomaly_review", "decline_watch"]);
    }

    #[test]
    fn test_small_segments() {
        let recs = RecommendationSynthesizer::new().synthesize(&[segment(0, 0.8), segment(1, 0.1)]);
        assert_eq!(ids(&recs), vec!["small_segment_review"]);
        assert!(recs[0].text.contains("Group 1"));
        assert!(!recs[0].text.contains("Group 0"));
    }

    #[test]
    fn test_low_quality_recommends_cleanup() {
        let issue = Finding::Quality(QualityIssue {
            dataset: "stores".to_string(),
            quality_score: 60.0,
            missing_percentage: 40.0,
            outliers: 0,
        });
        let recs = RecommendationSynthesizer::new().synthesize(&[issue]);
        assert_eq!(ids(&recs), vec!["data_quality_review"]);
        assert!((recs[0].priority - 0.72).abs() < 1e-12);
        assert!(recs[0].text.contains("stores"));
        assert_eq!(recs[0].triggers, vec!["quality:stores"]);
    }

    #[test]
    fn test_period_decline_only_when_total_falls() {
        let synth = RecommendationSynthesizer::new();
        let recs = synth.synthesize(&[comparison(-0.2)]);
        assert_eq!(ids(&recs), vec!["period_decline_review"]);
        assert!(recs[0].text.starts_with("ciro 2025 vs ciro 2024 fell"));

        assert!(synth.synthesize(&[comparison(0.05)]).is_empty());
    }

    #[test]
    fn test_recommendations_never_trigger_rules() {
        let synth = RecommendationSynthesizer::new();
        let first = synth.synthesize(&[anomaly("cost", 1, Severity::High, 1.0)]);
        let findings: Vec<Finding> = first.into_iter().map(Finding::Recommendation).collect();
        assert!(synth.synthesize(&findings).is_empty());
    }
}
