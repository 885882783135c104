//! Dataset-level insights
//!
//! Findings about the dataset as a whole rather than single values: a
//! data-quality warning when the profiler's score falls below
//! [`QUALITY_THRESHOLD`], and a comparison of one revenue-like measure
//! across two period columns such as "ciro 2024" and "ciro 2025".

use crate::dataset::Dataset;
use crate::profile::profile;
use crate::recommend::REVENUE_WORDS;
use crate::types::{Finding, PeriodComparison, PeriodMover, QualityIssue, Severity};

/// Quality scores below this raise a [`QualityIssue`]
pub const QUALITY_THRESHOLD: f64 = 80.0;

/// Total growth below this is a high-severity decline
const SHARP_DECLINE: f64 = -0.10;

/// Column-name keywords for the column that names each row
const KEY_WORDS: &[&str] = &["mağaza", "magaza", "şube", "sube", "store", "branch", "shop"];

/// Every dataset-level finding that applies
pub fn dataset_insights(dataset: &Dataset) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(period_comparison(dataset).map(Finding::Comparison));
    findings.extend(quality_issue(dataset).map(Finding::Quality));
    findings
}

pub fn quality_issue(dataset: &Dataset) -> Option<QualityIssue> {
    if dataset.is_empty() {
        return None;
    }
    let p = profile(dataset);
    if p.quality_score >= QUALITY_THRESHOLD {
        return None;
    }
    tracing::debug!(dataset = %p.name, score = p.quality_score, "Data quality below threshold");
    Some(QualityIssue {
        dataset: p.name.clone(),
        quality_score: p.quality_score,
        missing_percentage: p.missing_percentage,
        outliers: p.numeric.iter().map(|s| s.outliers).sum(),
    })
}

/// Compare the first pair of period columns of the same revenue-like
/// measure. Only rows with both values present count.
pub fn period_comparison(dataset: &Dataset) -> Option<PeriodComparison> {
    let (from, to) = period_pair(dataset)?;
    let from_cells = dataset.column(&from)?.as_numeric()?;
    let to_cells = dataset.column(&to)?.as_numeric()?;

    let pairs: Vec<(usize, f64, f64)> = from_cells
        .iter()
        .zip(to_cells)
        .enumerate()
        .filter_map(|(row, (a, b))| Some((row, (*a)?, (*b)?)))
        .collect();

    let from_total: f64 = pairs.iter().map(|p| p.1).sum();
    let to_total: f64 = pairs.iter().map(|p| p.2).sum();
    if from_total.abs() <= f64::EPSILON {
        return None;
    }
    let growth = (to_total - from_total) / from_total.abs();

    let top = pairs
        .iter()
        .reduce(|best, p| if change(p) > change(best) { p } else { best })?;
    let bottom = pairs
        .iter()
        .reduce(|worst, p| if change(p) < change(worst) { p } else { worst })?;

    let key = key_column(dataset);
    let mover = |p: &(usize, f64, f64)| PeriodMover {
        label: key
            .and_then(|k| k[p.0].clone())
            .unwrap_or_else(|| format!("row {}", p.0)),
        row: p.0,
        change: change(p),
    };

    let severity = if growth < SHARP_DECLINE {
        Severity::High
    } else if growth < 0.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    tracing::debug!(from = %from, to = %to, growth, "Periods compared");
    Some(PeriodComparison {
        improved: pairs.iter().filter(|p| p.2 > p.1).count(),
        declined: pairs.iter().filter(|p| p.2 < p.1).count(),
        top: mover(top),
        bottom: mover(bottom),
        severity,
        score: (growth.abs() / SHARP_DECLINE.abs()).min(1.0),
        from,
        to,
        from_total,
        to_total,
        growth,
    })
}

fn change(pair: &(usize, f64, f64)) -> f64 {
    pair.2 - pair.1
}

/// Two numeric columns of the same revenue-like measure that differ only
/// in their period digits, earlier period first
fn period_pair(dataset: &Dataset) -> Option<(String, String)> {
    let candidates: Vec<(String, &str, u64)> = dataset
        .numeric_columns()
        .filter_map(|c| {
            let (stem, period) = split_period(&c.name)?;
            Some((stem, c.name.as_str(), period))
        })
        .filter(|(stem, ..)| REVENUE_WORDS.iter().any(|w| stem.contains(w)))
        .collect();

    candidates.iter().enumerate().find_map(|(i, (stem, name, period))| {
        let (_, other, other_period) = candidates[i + 1..].iter().find(|(s, ..)| s == stem)?;
        Some(if period <= other_period {
            (name.to_string(), other.to_string())
        } else {
            (other.to_string(), name.to_string())
        })
    })
}

/// "Ciro 2024" -> ("ciro", 2024)
fn split_period(name: &str) -> Option<(String, u64)> {
    let lower = name.to_lowercase();
    let period: u64 = lower
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    let stem: String = lower.chars().filter(|c| !c.is_ascii_digit()).collect();
    let stem = stem.trim_matches(|c: char| !c.is_alphanumeric());
    (!stem.is_empty()).then(|| (stem.to_string(), period))
}

/// Categorical column naming each row: a store-like name first, else
/// the first categorical column
fn key_column(dataset: &Dataset) -> Option<&[Option<String>]> {
    let categorical = || dataset.columns().iter().filter(|c| c.as_categorical().is_some());
    categorical()
        .find(|c| {
            let lower = c.name.to_lowercase();
            KEY_WORDS.iter().any(|w| lower.contains(w))
        })
        .or_else(|| categorical().next())
        .and_then(|c| c.as_categorical())
}
