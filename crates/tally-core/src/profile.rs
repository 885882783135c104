//! Dataset profiling: descriptive statistics, data quality and correlations

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::dataset::{Column, ColumnData, Dataset};
use crate::stats;

/// |r| above this is reported as a correlation
const CORRELATION_MIN: f64 = 0.5;

/// |r| above this is a strong correlation
const CORRELATION_STRONG: f64 = 0.8;

/// Columns with fewer values are not checked for outliers
const OUTLIER_MIN_SAMPLES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub column: String,
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    /// Values outside the 1.5 IQR fences
    pub outliers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub column: String,
    pub count: usize,
    pub missing: usize,
    pub unique: usize,
    pub most_frequent: Option<String>,
    pub frequency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub column: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub r: f64,
    pub strong: bool,
}

/// Summary of a whole dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub missing_percentage: f64,
    /// 0-100; penalizes missing cells and outliers
    pub quality_score: f64,
    pub numeric: Vec<NumericStats>,
    pub categorical: Vec<CategoricalStats>,
    pub dates: Vec<DateRange>,
    /// Pairs with |r| above 0.5, strongest first
    pub correlations: Vec<Correlation>,
}

impl DatasetProfile {
    pub fn numeric_stats(&self, column: &str) -> Option<&NumericStats> {
        self.numeric.iter().find(|s| s.column == column)
    }

    pub fn categorical_stats(&self, column: &str) -> Option<&CategoricalStats> {
        self.categorical.iter().find(|s| s.column == column)
    }

    /// Short observations worth surfacing before any query is asked
    pub fn highlights(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} rows and {} columns, data quality {:.0}/100",
            self.rows, self.columns, self.quality_score
        )];
        if self.missing_percentage > 0.0 {
            lines.push(format!("{:.1}% of cells are missing", self.missing_percentage));
        }
        for s in self.numeric.iter().filter(|s| s.outliers > 0) {
            lines.push(format!("{} has {} outlier(s) outside the 1.5 IQR fences", s.column, s.outliers));
        }
        for c in self.correlations.iter().filter(|c| c.strong) {
            lines.push(format!("{} and {} are strongly correlated (r = {:.2})", c.left, c.right, c.r));
        }
        for d in &self.dates {
            lines.push(format!("{} covers {} to {}", d.column, d.start.date(), d.end.date()));
        }
        lines
    }

    /// Example queries that exercise each intent on this dataset
    pub fn suggested_queries(&self) -> Vec<String> {
        let mut queries = vec!["Give me a comprehensive overview".to_string()];
        if let Some(first) = self.numeric.first() {
            queries.push(format!("Are there any anomalies in {}?", first.column));
            queries.push(format!("Forecast {} for the next 3 periods", first.column));
            queries.push(format!("What is the average {}?", first.column));
        }
        if let Some(first) = self.categorical.first() {
            queries.push(format!("How many distinct {} values are there?", first.column));
        }
        if self.numeric.len() >= 2 {
            queries.push("Split the rows into 3 segments".to_string());
        }
        queries.push("What do you recommend?".to_string());
        queries
    }
}

/// Profile a dataset
pub fn profile(dataset: &Dataset) -> DatasetProfile {
    let rows = dataset.row_count();
    let columns = dataset.columns().len();

    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    let mut dates = Vec::new();
    for column in dataset.columns() {
        match &column.data {
            ColumnData::Numeric(_) => numeric.extend(numeric_stats(column)),
            ColumnData::Categorical(cells) => categorical.push(categorical_stats(column, cells)),
            ColumnData::Datetime(cells) => {
                let present = cells.iter().flatten();
                if let (Some(start), Some(end)) = (present.clone().min(), present.max()) {
                    dates.push(DateRange {
                        column: column.name.clone(),
                        start: *start,
                        end: *end,
                    });
                }
            }
        }
    }

    let cells = rows * columns;
    let missing: usize = dataset.columns().iter().map(Column::missing_count).sum();
    let missing_fraction = if cells > 0 {
        missing as f64 / cells as f64
    } else {
        0.0
    };
    let outlier_fraction = if rows > 0 && !numeric.is_empty() {
        numeric.iter().map(|s| s.outliers).sum::<usize>() as f64 / rows as f64
    } else {
        0.0
    };
    let quality_score = (100.0 - missing_fraction * 50.0 - outlier_fraction * 30.0).max(0.0);

    DatasetProfile {
        name: dataset.name().to_string(),
        rows,
        columns,
        missing_percentage: missing_fraction * 100.0,
        quality_score,
        numeric,
        categorical,
        dates,
        correlations: correlations(dataset),
    }
}

fn numeric_stats(column: &Column) -> Option<NumericStats> {
    let values: Vec<f64> = column.present_values().into_iter().map(|(_, v)| v).collect();
    let (q1, q3) = stats::quartiles(&values)?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let outliers = if values.len() >= OUTLIER_MIN_SAMPLES {
        let iqr = q3 - q1;
        let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        values.iter().filter(|&&v| v < lower || v > upper).count()
    } else {
        0
    };

    Some(NumericStats {
        column: column.name.clone(),
        count: values.len(),
        missing: column.len() - values.len(),
        mean: stats::mean(&values)?,
        median: stats::median(&values)?,
        std: stats::std_dev(&values),
        min,
        max,
        q1,
        q3,
        outliers,
    })
}

fn categorical_stats(column: &Column, cells: &[Option<String>]) -> CategoricalStats {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in cells.iter().flatten() {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    let mut most_frequent: Option<(&str, usize)> = None;
    for (&value, &n) in &counts {
        if most_frequent.map_or(true, |(_, best)| n > best) {
            most_frequent = Some((value, n));
        }
    }

    CategoricalStats {
        column: column.name.clone(),
        count: counts.values().sum(),
        missing: column.missing_count(),
        unique: counts.len(),
        most_frequent: most_frequent.map(|(v, _)| v.to_string()),
        frequency: most_frequent.map_or(0, |(_, n)| n),
    }
}

fn correlations(dataset: &Dataset) -> Vec<Correlation> {
    let numeric: Vec<(&str, &[Option<f64>])> = dataset
        .numeric_columns()
        .filter_map(|c| Some((c.name.as_str(), c.as_numeric()?)))
        .collect();

    let mut found = Vec::new();
    for (i, (left, a)) in numeric.iter().enumerate() {
        for (right, b) in &numeric[i + 1..] {
            let (xs, ys): (Vec<f64>, Vec<f64>) = a
                .iter()
                .zip(b.iter())
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .unzip();
            if let Some(r) = stats::pearson(&xs, &ys) {
                if r.abs() > CORRELATION_MIN {
                    found.push(Correlation {
                        left: left.to_string(),
                        right: right.to_string(),
                        r,
                        strong: r.abs() > CORRELATION_STRONG,
                    });
                }
            }
        }
    }

    found.sort_by(|a, b| b.r.abs().total_cmp(&a.r.abs()));
    found
}
