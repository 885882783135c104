//! Row segmentation with seeded k-means
//!
//! Numeric dimensions are standardized and categorical dimensions one-hot
//! encoded; missing cells sit at the column mean. k-means++ seeding with a
//! fixed-seed RNG and a fixed number of restarts makes the assignment
//! identical for identical input.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SegmentConfig;
use crate::dataset::{Column, ColumnData, Dataset};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::stats;
use crate::types::{DimensionSummary, Segment};

/// Standardized distance from the global mean below which a segment is "Typical"
const LABEL_MIN_DEVIATION: f64 = 0.5;

/// An encoded dimension: the source column and its feature columns
struct Feature<'a> {
    column: &'a Column,
    /// Per-row values for each encoded feature
    values: Vec<Vec<f64>>,
    /// Global mean and std for numeric dimensions
    scale: Option<(f64, f64)>,
}

/// Outcome of one k-means run
struct Clustering {
    assignments: Vec<usize>,
    inertia: f64,
}

/// Seeded k-means segmenter
pub struct Segmenter {
    config: SegmentConfig,
}

impl Segmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// Segment rows over `dimensions` (all numeric columns when empty) into `k` cohorts
    pub fn segment(&self, dataset: &Dataset, dimensions: &[String], k: Option<usize>) -> Result<Vec<Segment>> {
        self.segment_with_deadline(dataset, dimensions, k, &Deadline::none())
    }

    /// Segment rows, checking `deadline` between restarts
    pub fn segment_with_deadline(
        &self,
        dataset: &Dataset,
        dimensions: &[String],
        k: Option<usize>,
        deadline: &Deadline,
    ) -> Result<Vec<Segment>> {
        for name in dimensions {
            dataset.require_column(name)?;
        }
        if dataset.is_empty() {
            return Err(Error::InsufficientData(
                "dataset has no rows to segment".to_string(),
            ));
        }

        let columns: Vec<&Column> = if dimensions.is_empty() {
            dataset.numeric_columns().collect()
        } else {
            dataset
                .columns()
                .iter()
                .filter(|c| dimensions.iter().any(|d| d == &c.name))
                .collect()
        };

        let features: Vec<Feature> = columns.into_iter().filter_map(encode).collect();
        if features.is_empty() {
            return Err(Error::InsufficientData(
                "no usable dimensions to segment on".to_string(),
            ));
        }

        let rows = dataset.row_count();
        let matrix: Vec<Vec<f64>> = (0..rows)
            .map(|row| {
                features
                    .iter()
                    .flat_map(|f| f.values.iter().map(move |v| v[row]))
                    .collect()
            })
            .collect();

        let distinct = matrix
            .iter()
            .map(|p| p.iter().map(|v| v.to_bits()).collect::<Vec<_>>())
            .collect::<HashSet<_>>()
            .len();
        let k = k
            .unwrap_or(self.config.default_k)
            .clamp(1, self.config.max_k.max(1))
            .min(distinct);

        let mut best: Option<Clustering> = None;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        for _ in 0..self.config.n_init {
            deadline.check("segmentation")?;
            let run = self.kmeans(&matrix, k, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| Error::Computation("k-means produced no run".to_string()))?;

        let segments = build_segments(&best.assignments, k, &features, rows);
        tracing::debug!(
            k,
            segments = segments.len(),
            inertia = best.inertia,
            "Segmentation complete"
        );
        Ok(segments)
    }

    fn kmeans(&self, points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Clustering {
        let mut centers = kmeans_plus_plus(points, k, rng);
        let mut assignments = vec![usize::MAX; points.len()];

        for _ in 0..self.config.max_iterations {
            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let nearest = nearest_center(p, &centers).0;
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let dims = points[0].len();
            let mut sums = vec![vec![0.0; dims]; centers.len()];
            let mut counts = vec![0usize; centers.len()];
            for (p, &c) in points.iter().zip(&assignments) {
                counts[c] += 1;
                for (s, v) in sums[c].iter_mut().zip(p) {
                    *s += v;
                }
            }
            for (c, center) in centers.iter_mut().enumerate() {
                // Empty clusters keep their previous center
                if counts[c] > 0 {
                    for (x, s) in center.iter_mut().zip(&sums[c]) {
                        *x = s / counts[c] as f64;
                    }
                }
            }
        }

        let inertia = points
            .iter()
            .map(|p| nearest_center(p, &centers).1)
            .sum();
        Clustering { assignments, inertia }
    }
}

/// Encode one column; `None` when it carries no usable values
fn encode(column: &Column) -> Option<Feature<'_>> {
    match &column.data {
        ColumnData::Numeric(cells) => {
            let present: Vec<f64> = column.present_values().into_iter().map(|(_, v)| v).collect();
            let mean = stats::mean(&present)?;
            let std = stats::std_dev(&present).unwrap_or(0.0);
            let divisor = if std > f64::EPSILON { std } else { 1.0 };
            let standardized = cells
                .iter()
                .map(|v| match v {
                    Some(x) if x.is_finite() => (x - mean) / divisor,
                    _ => 0.0,
                })
                .collect();
            Some(Feature {
                column,
                values: vec![standardized],
                scale: Some((mean, std)),
            })
        }
        ColumnData::Categorical(cells) => {
            let mut categories: Vec<&str> = Vec::new();
            for value in cells.iter().flatten() {
                if !categories.contains(&value.as_str()) {
                    categories.push(value);
                }
            }
            if categories.is_empty() {
                return None;
            }
            let values = categories
                .iter()
                .map(|cat| {
                    cells
                        .iter()
                        .map(|v| if v.as_deref() == Some(*cat) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect();
            Some(Feature {
                column,
                values,
                scale: None,
            })
        }
        ColumnData::Datetime(_) => None,
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest center (lowest index on ties) and the squared distance
fn nearest_center(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centers.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// D²-weighted seeding
fn kmeans_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = vec![points[rng.gen_range(0..points.len())].clone()];

    while centers.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| nearest_center(p, &centers).1)
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            break;
        }

        let mut target = rng.gen::<f64>() * total;
        let mut chosen = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if *w > 0.0 && target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centers.push(points[chosen].clone());
    }

    centers
}

fn build_segments(assignments: &[usize], k: usize, features: &[Feature], total: usize) -> Vec<Segment> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &cluster) in assignments.iter().enumerate() {
        if cluster < k {
            groups.entry(cluster).or_default().push(row);
        }
    }

    let mut members: Vec<Vec<usize>> = groups.into_values().collect();
    members.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    members
        .into_iter()
        .enumerate()
        .map(|(id, rows)| {
            let summaries = features.iter().map(|f| summarize(f.column, &rows)).collect();
            Segment {
                id,
                label: label(features, &rows),
                size: rows.len(),
                share: rows.len() as f64 / total as f64,
                rows,
                summaries,
            }
        })
        .collect()
}

fn summarize(column: &Column, rows: &[usize]) -> DimensionSummary {
    match &column.data {
        ColumnData::Categorical(cells) => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for &row in rows {
                if let Some(v) = &cells[row] {
                    *counts.entry(v.as_str()).or_default() += 1;
                }
            }
            // Highest count wins; BTreeMap order breaks ties alphabetically
            let mode = counts
                .iter()
                .fold(None, |best: Option<(&str, usize)>, (&v, &n)| match best {
                    Some((_, m)) if m >= n => best,
                    _ => Some((v, n)),
                });
            DimensionSummary::Categorical {
                column: column.name.clone(),
                mode: mode.map(|(v, _)| v.to_string()),
                share: mode.map_or(0.0, |(_, n)| n as f64 / rows.len() as f64),
            }
        }
        _ => {
            let values: Vec<f64> = column
                .as_numeric()
                .map(|cells| {
                    rows.iter()
                        .filter_map(|&r| cells[r].filter(|v| v.is_finite()))
                        .collect()
                })
                .unwrap_or_default();
            DimensionSummary::Numeric {
                column: column.name.clone(),
                mean: stats::mean(&values).unwrap_or(f64::NAN),
                median: stats::median(&values).unwrap_or(f64::NAN),
                std: stats::std_dev(&values),
            }
        }
    }
}

/// "High <col>" / "Low <col>" from the most deviating numeric dimension
fn label(features: &[Feature], rows: &[usize]) -> String {
    let mut strongest: Option<(&str, f64)> = None;

    for feature in features {
        let Some((_, std)) = feature.scale else { continue };
        if std <= f64::EPSILON {
            continue;
        }
        // Standardized values average to the deviation of the segment mean
        let deviation = rows.iter().map(|&r| feature.values[0][r]).sum::<f64>() / rows.len() as f64;
        if strongest.map_or(true, |(_, d)| deviation.abs() > d.abs()) {
            strongest = Some((feature.column.name.as_str(), deviation));
        }
    }

    match strongest {
        Some((name, d)) if d.abs() >= LABEL_MIN_DEVIATION => {
            if d > 0.0 {
                format!("High {}", name)
            } else {
                format!("Low {}", name)
            }
        }
        Some(_) => "Typical".to_string(),
        None => categorical_label(features, rows),
    }
}

/// Label for purely categorical segmentations: the dominant category
fn categorical_label(features: &[Feature], rows: &[usize]) -> String {
    features
        .first()
        .map(|f| match summarize(f.column, rows) {
            DimensionSummary::Categorical { mode: Some(mode), .. } => {
                format!("{}: {}", f.column.name, mode)
            }
            _ => "Typical".to_string(),
        })
        .unwrap_or_else(|| "Typical".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(SegmentConfig::default())
    }

    /// Three well-separated blobs of 6, 4 and 2 rows
    fn blobs() -> Dataset {
        let spend = [
            10.0, 11.0, 10.5, 9.5, 10.2, 9.8, // low
            50.0, 51.0, 49.0, 50.5, // mid
            200.0, 205.0, // high
        ];
        let visits = [
            1.0, 1.2, 0.9, 1.1, 1.0, 0.8, //
            5.0, 5.2, 4.9, 5.1, //
            9.0, 9.5,
        ];
        Dataset::new(
            "customers",
            vec![
                Column::from_values("spend", &spend),
                Column::from_values("visits", &visits),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_separated_blobs() {
        let segments = segmenter().segment(&blobs(), &[], Some(3)).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments.iter().map(|s| s.size).collect::<Vec<_>>(),
            vec![6, 4, 2]
        );
        assert_eq!(segments[0].rows, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(segments[2].label, "High spend");
        assert!(segments[0].label.starts_with("Low"));
        assert!((segments.iter().map(|s| s.share).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_assignments_are_stable() {
        let first = segmenter().segment(&blobs(), &[], None).unwrap();
        let second = segmenter().segment(&blobs(), &[], None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_k_clamped_to_distinct_rows() {
        let ds = Dataset::new(
            "dups",
            vec![Column::from_values("x", &[1.0, 1.0, 1.0, 5.0, 5.0])],
        )
        .unwrap();
        let segments = segmenter().segment(&ds, &[], Some(4)).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_numeric_summary() {
        let segments = segmenter().segment(&blobs(), &[], Some(3)).unwrap();
        match &segments[1].summaries[0] {
            DimensionSummary::Numeric { column, mean, median, std } => {
                assert_eq!(column, "spend");
                assert!((mean - 50.125).abs() < 1e-9);
                assert!((median - 50.25).abs() < 1e-9);
                assert!(std.is_some());
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_categorical_dimension_one_hot() {
        let region = ["north", "north", "south", "south", "north", "south"]
            .iter()
            .map(|s| Some(s.to_string()))
            .collect();
        let ds = Dataset::new(
            "regions",
            vec![
                Column::categorical("region", region),
                Column::from_values("sales", &[1.0, 1.1, 1.0, 0.9, 1.2, 1.0]),
            ],
        )
        .unwrap();

        let segments = segmenter()
            .segment(&ds, &["region".to_string()], Some(2))
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].rows, vec![0, 1, 4]);
        assert_eq!(segments[0].label, "region: north");
        match &segments[0].summaries[0] {
            DimensionSummary::Categorical { mode, share, .. } => {
                assert_eq!(mode.as_deref(), Some("north"));
                assert_eq!(*share, 1.0);
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_missing_values_imputed() {
        let ds = Dataset::new(
            "gaps",
            vec![Column::numeric(
                "x",
                vec![Some(1.0), None, Some(1.2), Some(9.0), Some(9.1), None],
            )],
        )
        .unwrap();
        let segments = segmenter().segment(&ds, &[], Some(2)).unwrap();
        assert_eq!(segments.iter().map(|s| s.size).sum::<usize>(), 6);
    }

    #[test]
    fn test_unknown_dimension() {
        let result = segmenter().segment(&blobs(), &["age".to_string()], None);
        assert!(matches!(result, Err(Error::UnknownColumn { .. })));
    }

    #[test]
    fn test_named_all_missing_dimension_is_dropped() {
        let spend = [10.0, 11.0, 10.5, 50.0, 51.0, 49.0];
        let ds = Dataset::new(
            "customers",
            vec![
                Column::from_values("spend", &spend),
                Column::numeric("score", vec![None; 6]),
            ],
        )
        .unwrap();

        let segments = segmenter()
            .segment(&ds, &["spend".to_string(), "score".to_string()], Some(2))
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().flat_map(|s| &s.summaries).all(|d| matches!(
            d,
            DimensionSummary::Numeric { column, .. } if column == "spend"
        )));
    }

    #[test]
    fn test_all_missing_dimension_is_insufficient() {
        let ds = Dataset::new("empty", vec![Column::numeric("x", vec![None, None, None])]).unwrap();
        assert!(matches!(
            segmenter().segment(&ds, &[], None),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_no_rows_is_insufficient() {
        let ds = Dataset::new("empty", vec![Column::from_values("x", &[])]).unwrap();
        assert!(matches!(
            segmenter().segment(&ds, &[], None),
            Err(Error::InsufficientData(_))
        ));
    }
}
