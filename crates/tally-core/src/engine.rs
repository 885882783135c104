//! Analytics engine
//!
//! Classifies a query, dispatches the intent's modules in parallel under
//! a per-module deadline (dataset-level insights ride along with anomaly
//! detection), turns module failures into degraded entries and
//! hands everything to the aggregator.

use std::thread;

use crate::aggregate::{aggregate, Degraded, ModuleOutcome, Response};
use crate::anomaly::AnomalyDetector;
use crate::config::AnalyticsConfig;
use crate::dataset::{ColumnKind, Dataset};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::insight::dataset_insights;
use crate::intent::{Classification, IntentClassifier, QueryParams};
use crate::profile::profile;
use crate::recommend::RecommendationSynthesizer;
use crate::segment::Segmenter;
use crate::trend::TrendEngine;
use crate::types::{AnalysisModule, Finding, Intent, Turn};

/// Modules each intent needs; recommendations always run last
pub fn modules_for(intent: Intent) -> &'static [AnalysisModule] {
    use AnalysisModule::*;
    match intent {
        Intent::Insights => &[AnomalyDetection],
        Intent::Forecast => &[TrendForecast],
        Intent::Recommendations | Intent::Comprehensive => {
            &[AnomalyDetection, TrendForecast, Segmentation, Recommendations]
        }
        Intent::Qa => &[],
    }
}

/// One query against a dataset
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub query: String,
    /// Previous turns, oldest first
    pub history: Vec<Turn>,
    /// Client-side intent hint (a bonus, never a decision)
    pub hint: Option<Intent>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_hint(mut self, hint: Option<Intent>) -> Self {
        self.hint = hint;
        self
    }
}

/// What one module produced
#[derive(Default)]
struct ModuleOutput {
    findings: Vec<Finding>,
    notes: Vec<String>,
}

pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    classifier: IntentClassifier,
    detector: AnomalyDetector,
    trends: TrendEngine,
    segmenter: Segmenter,
    synthesizer: RecommendationSynthesizer,
}

impl AnalyticsEngine {
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        Ok(Self {
            classifier: IntentClassifier::new(config.classifier.clone())?,
            detector: AnomalyDetector::new(config.anomaly.clone()),
            trends: TrendEngine::new(config.trend.clone()),
            segmenter: Segmenter::new(config.segment.clone()),
            synthesizer: RecommendationSynthesizer::new(),
            config,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Whether a module is switched on in `[modules]`
    pub fn is_enabled(&self, module: AnalysisModule) -> bool {
        let flags = &self.config.modules;
        match module {
            AnalysisModule::AnomalyDetection => flags.anomaly_detection,
            AnalysisModule::TrendForecast => flags.trend_forecast,
            AnalysisModule::Segmentation => flags.segmentation,
            AnalysisModule::Recommendations => flags.recommendations,
        }
    }

    /// Classify a query against the dataset schema
    pub fn classify(&self, dataset: &Dataset, request: &AnalysisRequest) -> Result<Classification> {
        let window = self.config.engine.history_window;
        let history = &request.history[request.history.len().saturating_sub(window)..];
        self.classifier
            .classify_with_hint(&request.query, history, &dataset.schema(), request.hint)
    }

    /// Answer one query. Only classification errors (e.g. an unknown
    /// column) fail the call; module failures become caveats.
    pub fn run(&self, dataset: &Dataset, request: &AnalysisRequest) -> Result<Response> {
        let classification = self.classify(dataset, request)?;
        tracing::info!(
            dataset = %dataset.name(),
            intent = %classification.intent,
            confidence = classification.confidence,
            ambiguous = classification.ambiguous,
            "Query classified"
        );

        let modules: Vec<AnalysisModule> = modules_for(classification.intent)
            .iter()
            .copied()
            .filter(|m| self.is_enabled(*m))
            .collect();

        let mut outcome = self.run_modules(dataset, &classification.params, &modules)?;
        if matches!(classification.intent, Intent::Comprehensive | Intent::Qa) {
            outcome.profile = Some(profile(dataset));
        }

        Ok(aggregate(&classification, outcome))
    }

    fn run_modules(
        &self,
        dataset: &Dataset,
        params: &QueryParams,
        modules: &[AnalysisModule],
    ) -> Result<ModuleOutcome> {
        let parallel: Vec<AnalysisModule> = modules
            .iter()
            .copied()
            .filter(|m| *m != AnalysisModule::Recommendations)
            .collect();

        let results: Vec<(AnalysisModule, Result<ModuleOutput>)> = thread::scope(|scope| {
            let handles: Vec<_> = parallel
                .iter()
                .map(|&module| (module, scope.spawn(move || self.run_module(module, dataset, params))))
                .collect();

            handles
                .into_iter()
                .map(|(module, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(Error::Computation(format!("{} panicked", module.label())))
                    });
                    (module, result)
                })
                .collect()
        });

        let mut outcome = ModuleOutcome::default();
        for (module, result) in results {
            self.record(&mut outcome, module, result)?;
        }

        if modules.contains(&AnalysisModule::Recommendations) {
            let result = self.recommend(&outcome.findings);
            self.record(&mut outcome, AnalysisModule::Recommendations, result)?;
        }

        Ok(outcome)
    }

    /// Fold one module result into the outcome; unknown columns abort the query
    fn record(
        &self,
        outcome: &mut ModuleOutcome,
        module: AnalysisModule,
        result: Result<ModuleOutput>,
    ) -> Result<()> {
        match result {
            Ok(output) => {
                tracing::debug!(module = %module, findings = output.findings.len(), "Module completed");
                outcome.findings.extend(output.findings);
                outcome.notes.extend(output.notes);
            }
            Err(e @ Error::UnknownColumn { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(module = %module, error = %e, "Module degraded");
                outcome.degraded.push(Degraded {
                    module,
                    kind: e.kind().to_string(),
                    reason: degraded_reason(&e),
                });
            }
        }
        Ok(())
    }

    fn run_module(&self, module: AnalysisModule, dataset: &Dataset, params: &QueryParams) -> Result<ModuleOutput> {
        let deadline = Deadline::after(self.config.engine.module_timeout);
        let numeric = numeric_mentions(dataset, params);

        match module {
            AnalysisModule::AnomalyDetection => {
                let columns = (!numeric.is_empty()).then_some(numeric.as_slice());
                let anomalies = self.detector.detect_with_deadline(dataset, columns, &deadline)?;
                let mut findings: Vec<Finding> = anomalies.into_iter().map(Finding::Anomaly).collect();
                deadline.check("dataset insights")?;
                findings.extend(dataset_insights(dataset));
                Ok(ModuleOutput {
                    findings,
                    notes: Vec::new(),
                })
            }
            AnalysisModule::TrendForecast => {
                let report = self
                    .trends
                    .analyze_all(dataset, &numeric, params.horizon, &deadline)?;
                Ok(ModuleOutput {
                    findings: report.trends.into_iter().map(Finding::Trend).collect(),
                    notes: report.caveats,
                })
            }
            AnalysisModule::Segmentation => {
                let segments = self.segmenter.segment_with_deadline(
                    dataset,
                    &params.columns,
                    params.segments,
                    &deadline,
                )?;
                Ok(ModuleOutput {
                    findings: segments.into_iter().map(Finding::Segment).collect(),
                    notes: Vec::new(),
                })
            }
            AnalysisModule::Recommendations => self.recommend(&[]),
        }
    }

    fn recommend(&self, findings: &[Finding]) -> Result<ModuleOutput> {
        if findings.is_empty() {
            return Err(Error::InsufficientData(
                "no findings to base recommendations on".to_string(),
            ));
        }
        Deadline::after(self.config.engine.module_timeout).check("recommendation synthesis")?;

        let recommendations = self.synthesizer.synthesize(findings);
        Ok(ModuleOutput {
            findings: recommendations
                .into_iter()
                .map(Finding::Recommendation)
                .collect(),
            notes: Vec::new(),
        })
    }
}

/// Mentioned columns that hold numbers
fn numeric_mentions(dataset: &Dataset, params: &QueryParams) -> Vec<String> {
    params
        .columns
        .iter()
        .filter(|c| dataset.column(c).is_some_and(|col| col.kind() == ColumnKind::Numeric))
        .cloned()
        .collect()
}

/// Error text without the kind prefix the Display impl adds
fn degraded_reason(error: &Error) -> String {
    match error {
        Error::InsufficientData(msg) | Error::Computation(msg) | Error::InvalidData(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::types::{FindingKind, Severity, TrendDirection};
    use std::collections::HashSet;
    use std::time::Duration;

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(AnalyticsConfig::default()).unwrap()
    }

    fn shop() -> Dataset {
        let revenue: Vec<f64> = (0..12).map(|i| 100.0 + 5.0 * i as f64).collect();
        let cost = [20.0, 21.0, 19.0, 20.0, 22.0, 21.0, 20.0, 19.0, 21.0, 20.0, 90.0, 20.0];
        Dataset::new(
            "shop",
            vec![Column::from_values("revenue", &revenue), Column::from_values("cost", &cost)],
        )
        .unwrap()
    }

    fn kinds(response: &Response) -> HashSet<FindingKind> {
        response.findings.iter().map(Finding::kind).collect()
    }

    #[test]
    fn test_scenario_a_sales_spike() {
        let ds = Dataset::new(
            "sales",
            vec![Column::from_values("sales", &[10.0, 12.0, 11.0, 13.0, 100.0, 12.0, 11.0])],
        )
        .unwrap();
        let response = engine()
            .run(&ds, &AnalysisRequest::new("Anomali tespiti ve kritik içgörüler"))
            .unwrap();

        assert_eq!(response.intent, Intent::Insights);
        assert!(!response.ambiguous);
        let Finding::Anomaly(anomaly) = &response.findings[0] else {
            panic!("expected an anomaly finding");
        };
        assert_eq!(anomaly.row, 4);
        assert_eq!(anomaly.severity, Severity::High);
        assert!(anomaly.deviation.value() > 3.0);
        assert!(response.text.contains("sales, row 4"));
        assert!(response.caveats.is_empty());
    }

    #[test]
    fn test_scenario_b_revenue_forecast() {
        let revenue: Vec<f64> = (0..12).map(|i| 100.0 * 1.05_f64.powi(i)).collect();
        let ds = Dataset::new("revenue", vec![Column::from_values("revenue", &revenue)]).unwrap();
        let response = engine()
            .run(&ds, &AnalysisRequest::new("Önümüzdeki 3 ay için tahmin"))
            .unwrap();

        assert_eq!(response.intent, Intent::Forecast);
        let Finding::Trend(trend) = &response.findings[0] else {
            panic!("expected a trend finding");
        };
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert_eq!(trend.forecast.len(), 3);
        assert!(trend.forecast.windows(2).all(|w| w[1].width() >= w[0].width()));
        assert_eq!(response.chart.unwrap().chart_type, crate::aggregate::ChartType::Line);
    }

    #[test]
    fn test_calendar_year_is_not_used_as_horizon() {
        let revenue: Vec<f64> = (0..12).map(|i| 100.0 + 4.0 * i as f64).collect();
        let ds = Dataset::new("sales", vec![Column::from_values("satış", &revenue)]).unwrap();
        let response = engine()
            .run(&ds, &AnalysisRequest::new("2025 yılı satış tahmini"))
            .unwrap();

        assert_eq!(response.intent, Intent::Forecast);
        let Finding::Trend(trend) = &response.findings[0] else {
            panic!("expected a trend finding");
        };
        assert_eq!(trend.forecast.len(), 3);
        assert!(response
            .caveats
            .iter()
            .any(|c| c.contains("exceeds the maximum of 24")));
    }

    #[test]
    fn test_scenario_c_empty_dataset_degrades_every_module() {
        let ds = Dataset::new(
            "empty",
            vec![Column::from_values("revenue", &[]), Column::categorical("region", vec![])],
        )
        .unwrap();
        let response = engine().run(&ds, &AnalysisRequest::new("Bu veriye bir bak")).unwrap();

        assert_eq!(response.intent, Intent::Comprehensive);
        assert!(response.findings.is_empty());
        assert_eq!(response.caveats.len(), 4);
        assert!(response.caveats.iter().all(|c| c.contains("is unavailable")));
        assert_eq!(response.profile.unwrap().rows, 0);
    }

    #[test]
    fn test_scenario_d_ambiguous_query_runs_everything() {
        let response = engine().run(&shop(), &AnalysisRequest::new("Bu veriye bir bak")).unwrap();

        assert_eq!(response.intent, Intent::Comprehensive);
        assert!(response.ambiguous);
        let expected: HashSet<FindingKind> = [
            FindingKind::Anomaly,
            FindingKind::Trend,
            FindingKind::Segment,
            FindingKind::Recommendation,
        ]
        .into_iter()
        .collect();
        assert_eq!(kinds(&response), expected);
        assert!(response.caveats.is_empty());
        assert!(response.profile.is_some());
        assert!(response.text.contains("Dataset shop: 12 rows and 2 columns"));
    }

    #[test]
    fn test_cost_spike_drives_recommendation() {
        let response = engine()
            .run(&shop(), &AnalysisRequest::new("What do you recommend?"))
            .unwrap();

        assert_eq!(response.intent, Intent::Recommendations);
        assert_eq!(kinds(&response), [FindingKind::Recommendation].into_iter().collect());
        let Finding::Recommendation(top) = &response.findings[0] else {
            panic!("expected a recommendation");
        };
        assert_eq!(top.template_id, "cost_investigation");
        assert!(top.triggers.contains(&"anomaly:cost:10".to_string()));
    }

    fn stores() -> Dataset {
        let names = ["A", "B", "C", "D", "E", "F"];
        Dataset::new(
            "stores",
            vec![
                Column::categorical("Mağaza", names.iter().map(|n| Some(n.to_string())).collect()),
                Column::from_values("Ciro 2024", &[100.0, 120.0, 140.0, 160.0, 180.0, 200.0]),
                Column::from_values("Ciro 2025", &[90.0, 100.0, 110.0, 120.0, 130.0, 140.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_insights_compare_periods() {
        let response = engine()
            .run(&stores(), &AnalysisRequest::new("Kritik içgörüler neler?"))
            .unwrap();

        assert_eq!(response.intent, Intent::Insights);
        let comparison = response.findings.iter().find_map(|f| match f {
            Finding::Comparison(c) => Some(c),
            _ => None,
        });
        let comparison = comparison.expect("expected a period comparison");
        assert_eq!(comparison.severity, Severity::High);
        assert_eq!(comparison.bottom.label, "F");
        assert!(response.text.contains("Period comparison"));
    }

    #[test]
    fn test_period_decline_drives_recommendation() {
        let response = engine()
            .run(&stores(), &AnalysisRequest::new("What do you recommend?"))
            .unwrap();

        let Finding::Recommendation(top) = &response.findings[0] else {
            panic!("expected a recommendation");
        };
        assert_eq!(top.template_id, "period_decline_review");
        assert_eq!(top.triggers, vec!["comparison:Ciro 2024:Ciro 2025"]);
    }

    #[test]
    fn test_expired_deadline_degrades_modules() {
        let mut config = AnalyticsConfig::default();
        config.engine.module_timeout = Duration::ZERO;
        let engine = AnalyticsEngine::new(config).unwrap();

        let response = engine.run(&shop(), &AnalysisRequest::new("Bu veriye bir bak")).unwrap();
        assert!(response.findings.is_empty());
        assert_eq!(response.caveats.len(), 4);
        assert!(response
            .caveats
            .iter()
            .any(|c| c.contains("deadline exceeded during anomaly detection")));
    }

    #[test]
    fn test_disabled_module_is_skipped() {
        let mut config = AnalyticsConfig::default();
        config.modules.segmentation = false;
        let engine = AnalyticsEngine::new(config).unwrap();

        let response = engine.run(&shop(), &AnalysisRequest::new("Bu veriye bir bak")).unwrap();
        assert!(!kinds(&response).contains(&FindingKind::Segment));
        assert!(response.caveats.is_empty());
    }

    #[test]
    fn test_unknown_column_is_surfaced() {
        let err = engine()
            .run(&shop(), &AnalysisRequest::new("forecast `revnue`"))
            .unwrap_err();
        match err {
            Error::UnknownColumn { column, suggestion } => {
                assert_eq!(column, "revnue");
                assert_eq!(suggestion.as_deref(), Some("revenue"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_qa_answers_from_profile() {
        let response = engine()
            .run(&shop(), &AnalysisRequest::new("What is the average revenue?"))
            .unwrap();

        assert_eq!(response.intent, Intent::Qa);
        assert!(response.findings.is_empty());
        assert!(response.text.contains("revenue: mean 127.50"));
        assert!(response.chart.is_none());
    }

    #[test]
    fn test_history_continues_forecast() {
        let history = vec![Turn {
            query: "revenue forecast".to_string(),
            intent: Intent::Forecast,
        }];
        let request = AnalysisRequest::new("and cost?").with_history(history);
        let response = engine().run(&shop(), &request).unwrap();

        assert_eq!(response.intent, Intent::Forecast);
        let Finding::Trend(trend) = &response.findings[0] else {
            panic!("expected a trend finding");
        };
        assert_eq!(trend.column, "cost");
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(modules_for(Intent::Insights), &[AnalysisModule::AnomalyDetection]);
        assert!(modules_for(Intent::Qa).is_empty());
        assert_eq!(modules_for(Intent::Comprehensive).len(), 4);
    }
}
