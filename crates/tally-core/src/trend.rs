//! Trend detection and forecasting
//!
//! Direction and significance always come from an ordinary least squares
//! fit of value against series position. The forecast uses the same line,
//! or Holt's linear exponential smoothing when the residuals show strong
//! serial correlation (a curved or drifting series).

use crate::config::{TrendConfig, TrendModelChoice};
use crate::dataset::Dataset;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::stats;
use crate::types::{ForecastPoint, TrendDirection, TrendModel, TrendResult};

/// Trends for several columns plus the reasons others were skipped
#[derive(Debug, Clone, Default)]
pub struct TrendReport {
    pub trends: Vec<TrendResult>,
    pub caveats: Vec<String>,
}

/// Least squares line through `(x, y)` points
struct LinearFit {
    slope: f64,
    intercept: f64,
    x_mean: f64,
    sxx: f64,
    /// Residual standard error
    s: f64,
    residuals: Vec<f64>,
}

impl LinearFit {
    fn new(points: &[(f64, f64)]) -> Option<Self> {
        let n = points.len() as f64;
        if points.len() < 3 {
            return None;
        }
        let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
        let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;

        let sxx: f64 = points.iter().map(|p| (p.0 - x_mean).powi(2)).sum();
        if sxx <= f64::EPSILON {
            return None;
        }
        let sxy: f64 = points
            .iter()
            .map(|p| (p.0 - x_mean) * (p.1 - y_mean))
            .sum();

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let residuals: Vec<f64> = points
            .iter()
            .map(|p| p.1 - (intercept + slope * p.0))
            .collect();
        let sse: f64 = residuals.iter().map(|r| r * r).sum();
        let s = (sse / (n - 2.0)).sqrt();

        Some(Self {
            slope,
            intercept,
            x_mean,
            sxx,
            s,
            residuals,
        })
    }

    fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// |t| of the slope; infinite for a perfect non-flat fit
    fn significance(&self) -> f64 {
        let se = self.s / self.sxx.sqrt();
        if se <= 1e-12 * self.slope.abs().max(1.0) {
            if self.slope.abs() > f64::EPSILON {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            (self.slope / se).abs()
        }
    }
}

/// Trend and forecast engine
pub struct TrendEngine {
    config: TrendConfig,
}

impl TrendEngine {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Analyze one numeric column and forecast `horizon` steps ahead
    pub fn analyze(&self, dataset: &Dataset, column: &str, horizon: usize) -> Result<TrendResult> {
        if horizon == 0 || horizon > self.config.max_horizon {
            return Err(Error::InvalidData(format!(
                "horizon must be between 1 and {} periods, got {}",
                self.config.max_horizon, horizon
            )));
        }
        let column_ref = dataset.require_column(column)?;
        let cells = column_ref.as_numeric().ok_or_else(|| {
            Error::InvalidData(format!(
                "Column '{}' is {}, not numeric",
                column,
                column_ref.kind()
            ))
        })?;

        let order = dataset.series_order();
        let history: Vec<Option<f64>> = order
            .iter()
            .map(|&row| cells[row].filter(|v| v.is_finite()))
            .collect();
        let points: Vec<(f64, f64)> = history
            .iter()
            .enumerate()
            .filter_map(|(pos, v)| v.map(|v| (pos as f64, v)))
            .collect();

        if points.len() < self.config.min_points {
            return Err(Error::InsufficientData(format!(
                "'{}' has {} usable points, need at least {}",
                column,
                points.len(),
                self.config.min_points
            )));
        }

        let fit = LinearFit::new(&points).ok_or_else(|| {
            Error::InsufficientData(format!("'{}' has no spread along the series", column))
        })?;

        let values: Vec<f64> = points.iter().map(|p| p.1).collect();
        let mean = stats::mean(&values).unwrap_or(0.0);
        let significance = fit.significance();
        let direction = self.direction(&fit, significance, mean, values.len());

        let model = self.choose_model(&fit, values.len());
        let last_x = order.len().saturating_sub(1) as f64;
        let forecast = match model {
            TrendModel::Linear => self.linear_forecast(&fit, points.len(), last_x, horizon),
            TrendModel::Holt => self.holt_forecast(&values, horizon),
        };

        tracing::debug!(
            column = %column,
            direction = direction.as_str(),
            model = model.as_str(),
            slope = fit.slope,
            "Trend analyzed"
        );

        Ok(TrendResult {
            column: column.to_string(),
            direction,
            slope: fit.slope,
            significance,
            model,
            mean,
            history,
            forecast,
            score: (significance / (2.0 * self.config.t_threshold)).min(1.0),
        })
    }

    /// Analyze the named columns (every numeric column when empty).
    /// Columns that cannot be analyzed become caveats; the call fails
    /// only when no column yields a trend.
    pub fn analyze_all(
        &self,
        dataset: &Dataset,
        columns: &[String],
        horizon: Option<usize>,
        deadline: &Deadline,
    ) -> Result<TrendReport> {
        if dataset.is_empty() {
            return Err(Error::InsufficientData(
                "dataset has no rows to fit a trend".to_string(),
            ));
        }

        let mut report = TrendReport::default();
        let horizon = match horizon {
            Some(h) if h > self.config.max_horizon => {
                tracing::debug!(requested = h, max = self.config.max_horizon, "Horizon rejected");
                report.caveats.push(format!(
                    "Requested horizon of {} periods exceeds the maximum of {}; forecasting {} periods instead",
                    h, self.config.max_horizon, self.config.default_horizon
                ));
                self.config.default_horizon
            }
            Some(h) => h,
            None => self.config.default_horizon,
        };
        let targets: Vec<String> = if columns.is_empty() {
            dataset.numeric_columns().map(|c| c.name.clone()).collect()
        } else {
            columns.to_vec()
        };

        for column in &targets {
            deadline.check("trend analysis")?;
            match self.analyze(dataset, column, horizon) {
                Ok(trend) => report.trends.push(trend),
                Err(e @ (Error::InsufficientData(_) | Error::InvalidData(_))) => {
                    tracing::debug!(column = %column, error = %e, "Trend skipped");
                    report.caveats.push(format!("No trend for '{}': {}", column, e));
                }
                Err(e) => return Err(e),
            }
        }

        if report.trends.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no column has at least {} points for a trend",
                self.config.min_points
            )));
        }

        Ok(report)
    }

    fn direction(&self, fit: &LinearFit, significance: f64, mean: f64, n: usize) -> TrendDirection {
        let relative_change = if mean.abs() > f64::EPSILON {
            fit.slope.abs() * n as f64 / mean.abs()
        } else if fit.slope.abs() > f64::EPSILON {
            f64::INFINITY
        } else {
            0.0
        };

        if significance < self.config.t_threshold
            || relative_change < self.config.min_relative_change
        {
            TrendDirection::Stable
        } else if fit.slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    }

    fn choose_model(&self, fit: &LinearFit, n: usize) -> TrendModel {
        match self.config.model {
            TrendModelChoice::Linear => TrendModel::Linear,
            TrendModelChoice::Holt => TrendModel::Holt,
            TrendModelChoice::Auto => {
                let correlated = stats::autocorrelation_lag1(&fit.residuals)
                    .is_some_and(|r| r > self.config.holt_autocorrelation);
                if correlated && n >= 2 * self.config.min_points {
                    TrendModel::Holt
                } else {
                    TrendModel::Linear
                }
            }
        }
    }

    /// OLS prediction interval: y ± z·s·√(1 + 1/n + (x − x̄)²/Sxx)
    fn linear_forecast(&self, fit: &LinearFit, n: usize, last_x: f64, horizon: usize) -> Vec<ForecastPoint> {
        let z = self.config.confidence_z;
        let points = (1..=horizon).map(|offset| {
            let x = last_x + offset as f64;
            let predicted = fit.predict(x);
            let half = z * fit.s * (1.0 + 1.0 / n as f64 + (x - fit.x_mean).powi(2) / fit.sxx).sqrt();
            (offset, predicted, half)
        });
        widening(points)
    }

    /// Holt interval: y ± z·σ·√(1 + Σⱼ₌₁ʰ⁻¹ (α + jαβ)²)
    fn holt_forecast(&self, values: &[f64], horizon: usize) -> Vec<ForecastPoint> {
        let alpha = self.config.holt_alpha;
        let beta = self.config.holt_beta;

        let mut level = values[0];
        let mut trend = values[1] - values[0];
        let mut sq_errors = 0.0;
        for &y in &values[1..] {
            let expected = level + trend;
            sq_errors += (y - expected).powi(2);
            let prev_level = level;
            level = alpha * y + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        let sigma = (sq_errors / (values.len() - 1) as f64).sqrt();

        let z = self.config.confidence_z;
        let mut accumulated = 1.0;
        let points = (1..=horizon).map(|offset| {
            if offset > 1 {
                let j = (offset - 1) as f64;
                accumulated += (alpha + j * alpha * beta).powi(2);
            }
            let predicted = level + offset as f64 * trend;
            (offset, predicted, z * sigma * accumulated.sqrt())
        });
        widening(points.collect::<Vec<_>>())
    }
}

/// Build forecast points, never letting an interval narrow with the offset
fn widening(points: impl IntoIterator<Item = (usize, f64, f64)>) -> Vec<ForecastPoint> {
    let mut widest = 0.0_f64;
    points
        .into_iter()
        .map(|(offset, predicted, half)| {
            widest = widest.max(half);
            ForecastPoint {
                offset,
                predicted,
                lower: predicted - widest,
                upper: predicted + widest,
            }
        })
        .collect()
}
