//! Anomaly detection over numeric columns
//!
//! Two univariate methods, chosen per column:
//! - mean/std z-scores for well-behaved columns
//! - IQR fences around the median for heavy-tailed or small samples
//!
//! An optional multivariate pass flags rows whose standardized distance
//! across all numeric columns is large even when no single cell is.

use crate::config::AnomalyConfig;
use crate::dataset::{Column, Dataset};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::stats;
use crate::types::{Anomaly, Baseline, Deviation, Severity};

/// Consistency constant turning a MAD into a standard-deviation estimate
const MAD_SCALE: f64 = 0.6745;

/// IQR of a standard normal in units of sigma
const IQR_SIGMA: f64 = 1.349;

/// Mean absolute deviation of a normal sample in units of sigma, inverted
const MEAN_AD_SCALE: f64 = 1.2533;

/// Minimum |z| for a column to count as a multivariate contributor
const CONTRIBUTOR_Z: f64 = 1.0;

/// Statistical anomaly detector
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Detect anomalies in the given columns (all numeric columns when `None`)
    pub fn detect(&self, dataset: &Dataset, columns: Option<&[String]>) -> Result<Vec<Anomaly>> {
        self.detect_with_deadline(dataset, columns, &Deadline::none())
    }

    /// Detect anomalies, checking `deadline` between columns
    pub fn detect_with_deadline(
        &self,
        dataset: &Dataset,
        columns: Option<&[String]>,
        deadline: &Deadline,
    ) -> Result<Vec<Anomaly>> {
        if dataset.is_empty() {
            return Err(Error::InsufficientData(
                "dataset has no rows to scan for anomalies".to_string(),
            ));
        }

        let targets = select_columns(dataset, columns)?;
        if targets.is_empty() {
            return Err(Error::InsufficientData(
                "no numeric columns to scan for anomalies".to_string(),
            ));
        }

        let mut anomalies = Vec::new();
        for column in &targets {
            deadline.check("anomaly detection")?;
            let found = self.detect_column(column);
            if !found.is_empty() {
                tracing::debug!(column = %column.name, count = found.len(), "Column anomalies");
            }
            anomalies.extend(found);
        }

        if self.config.multivariate && targets.len() >= 2 {
            deadline.check("multivariate anomaly detection")?;
            anomalies.extend(self.detect_joint(&targets));
        }

        let order: Vec<&str> = dataset.columns().iter().map(|c| c.name.as_str()).collect();
        let position = |name: &str| order.iter().position(|&n| n == name).unwrap_or(order.len());
        anomalies.sort_by(|a, b| {
            b.severity
                .priority()
                .cmp(&a.severity.priority())
                .then_with(|| b.deviation.value().abs().total_cmp(&a.deviation.value().abs()))
                .then_with(|| position(&a.column).cmp(&position(&b.column)))
                .then_with(|| a.row.cmp(&b.row))
        });

        Ok(anomalies)
    }

    fn detect_column(&self, column: &Column) -> Vec<Anomaly> {
        let points = column.present_values();
        if points.len() < self.config.min_samples {
            tracing::debug!(
                column = %column.name,
                samples = points.len(),
                "Too few values for anomaly detection"
            );
            return Vec::new();
        }

        let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
        let heavy_tailed = stats::skewness(&values)
            .is_some_and(|s| s.abs() > self.config.heavy_tail_skew);

        if points.len() < self.config.robust_min_samples {
            self.iqr_method(column, &points, &values, true)
        } else if heavy_tailed {
            self.iqr_method(column, &points, &values, false)
        } else {
            self.zscore_method(column, &points, &values)
        }
    }

    fn zscore_method(&self, column: &Column, points: &[(usize, f64)], values: &[f64]) -> Vec<Anomaly> {
        let (Some(mean), Some(std)) = (stats::mean(values), stats::std_dev(values)) else {
            return Vec::new();
        };
        if std <= f64::EPSILON {
            return Vec::new();
        }

        points
            .iter()
            .filter_map(|&(row, value)| {
                let z = (value - mean) / std;
                (z.abs() > self.config.z_threshold).then(|| Anomaly {
                    column: column.name.clone(),
                    row,
                    value,
                    baseline: Baseline::Mean(mean),
                    deviation: Deviation::ZScore(z),
                    severity: self.z_severity(z),
                    score: (z.abs() / (2.0 * self.config.z_threshold)).min(1.0),
                    contributing: Vec::new(),
                })
            })
            .collect()
    }

    /// IQR fences around the median. Small samples report a MAD-based
    /// robust z-score; heavy-tailed columns report the IQR distance.
    ///
    /// When most values are identical the IQR collapses to zero. The fences
    /// then sit on the common value, so a value must also clear the z
    /// threshold, measured against the mean absolute deviation.
    fn iqr_method(
        &self,
        column: &Column,
        points: &[(usize, f64)],
        values: &[f64],
        robust_z: bool,
    ) -> Vec<Anomaly> {
        let (Some((q1, q3)), Some(median)) = (stats::quartiles(values), stats::median(values)) else {
            return Vec::new();
        };
        let iqr = q3 - q1;
        let mad = stats::mad(values).unwrap_or(0.0);
        let scale = if mad > f64::EPSILON {
            mad / MAD_SCALE
        } else if iqr > f64::EPSILON {
            iqr / IQR_SIGMA
        } else {
            stats::mean_abs_deviation(values).unwrap_or(0.0) * MEAN_AD_SCALE
        };
        if scale <= f64::EPSILON {
            return Vec::new();
        }

        let degenerate = iqr <= f64::EPSILON;
        let k = self.config.iqr_multiplier;
        let (lower, upper) = (q1 - k * iqr, q3 + k * iqr);

        points
            .iter()
            .filter(|&&(_, v)| v < lower || v > upper)
            .filter_map(|&(row, value)| {
                let z = (value - median) / scale;
                let (deviation, severity, score) = if robust_z || degenerate {
                    if degenerate && z.abs() <= self.config.z_threshold {
                        return None;
                    }
                    (
                        Deviation::ZScore(z),
                        self.z_severity(z),
                        (z.abs() / (2.0 * self.config.z_threshold)).min(1.0),
                    )
                } else {
                    let distance = if value > upper {
                        (value - q3) / iqr
                    } else {
                        (q1 - value) / iqr
                    };
                    (
                        Deviation::IqrDistance(distance),
                        iqr_severity(distance - k),
                        (distance / (2.0 * k)).min(1.0),
                    )
                };

                Some(Anomaly {
                    column: column.name.clone(),
                    row,
                    value,
                    baseline: Baseline::Median(median),
                    deviation,
                    severity,
                    score,
                    contributing: Vec::new(),
                })
            })
            .collect()
    }

    /// Rows far from the centroid across two or more columns
    fn detect_joint(&self, columns: &[&Column]) -> Vec<Anomaly> {
        struct Scaler<'a> {
            column: &'a Column,
            cells: &'a [Option<f64>],
            mean: f64,
            std: f64,
        }

        let scalers: Vec<Scaler> = columns
            .iter()
            .filter_map(|&column| {
                let cells = column.as_numeric()?;
                let values: Vec<f64> = column.present_values().into_iter().map(|(_, v)| v).collect();
                if values.len() < self.config.min_samples {
                    return None;
                }
                let mean = stats::mean(&values)?;
                let std = stats::std_dev(&values).filter(|s| *s > f64::EPSILON)?;
                Some(Scaler { column, cells, mean, std })
            })
            .collect();

        if scalers.len() < 2 {
            return Vec::new();
        }

        let threshold = self.config.multivariate_threshold;
        let medium = threshold * self.config.medium_z / self.config.z_threshold;
        let high = threshold * self.config.high_z / self.config.z_threshold;
        let rows = scalers[0].cells.len();

        let mut found = Vec::new();
        for row in 0..rows {
            let mut zs: Vec<(&Scaler, f64, f64)> = scalers
                .iter()
                .filter_map(|s| {
                    let v = s.cells[row].filter(|v| v.is_finite())?;
                    Some((s, v, (v - s.mean) / s.std))
                })
                .collect();
            if zs.len() < 2 {
                continue;
            }

            let distance = (zs.iter().map(|(_, _, z)| z * z).sum::<f64>() / zs.len() as f64).sqrt();
            if distance <= threshold {
                continue;
            }

            zs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
            let (lead, lead_value, _) = zs[0];
            let severity = if distance >= high {
                Severity::High
            } else if distance >= medium {
                Severity::Medium
            } else {
                Severity::Low
            };

            found.push(Anomaly {
                column: lead.column.name.clone(),
                row,
                value: lead_value,
                baseline: Baseline::Centroid,
                deviation: Deviation::Joint(distance),
                severity,
                score: (distance / (2.0 * threshold)).min(1.0),
                contributing: zs
                    .iter()
                    .filter(|(_, _, z)| z.abs() >= CONTRIBUTOR_Z)
                    .map(|(s, _, _)| s.column.name.clone())
                    .collect(),
            });
        }

        found
    }

    fn z_severity(&self, z: f64) -> Severity {
        let z = z.abs();
        if z < self.config.medium_z {
            Severity::Low
        } else if z < self.config.high_z {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

/// Tier by how many IQRs a value lies past its fence
fn iqr_severity(past_fence: f64) -> Severity {
    if past_fence < 1.0 {
        Severity::Low
    } else if past_fence < 2.0 {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Resolve requested columns to numeric columns, in schema order
fn select_columns<'a>(dataset: &'a Dataset, columns: Option<&[String]>) -> Result<Vec<&'a Column>> {
    match columns {
        Some(names) if !names.is_empty() => {
            for name in names {
                dataset.require_column(name)?;
            }
            Ok(dataset
                .numeric_columns()
                .filter(|c| names.iter().any(|n| n == &c.name))
                .collect())
        }
        _ => Ok(dataset.numeric_columns().collect()),
    }
}
