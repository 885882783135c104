//! In-memory tabular dataset
//!
//! A [`Dataset`] is an ordered sequence of named, typed columns with
//! positionally aligned rows. It is built once by a loader and is read-only
//! for every analysis that runs against it.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Logical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Datetime => "datetime",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column cells; `None` is an explicit missing-value marker
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
    Datetime(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
            ColumnData::Datetime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
            ColumnData::Datetime(_) => ColumnKind::Datetime,
        }
    }

    fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => v[row].is_none(),
            ColumnData::Categorical(v) => v[row].is_none(),
            ColumnData::Datetime(v) => v[row].is_none(),
        }
    }

    fn cell_text(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Categorical(v) => v[row].clone().unwrap_or_default(),
            ColumnData::Datetime(v) => v[row].map(|d| d.to_string()).unwrap_or_default(),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Numeric column without missing values
    pub fn from_values(name: impl Into<String>, values: &[f64]) -> Self {
        Self::numeric(name, values.iter().copied().map(Some).collect())
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    pub fn datetime(name: impl Into<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Datetime(values),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Numeric cells, or `None` for non-numeric columns
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&[Option<String>]> {
        match &self.data {
            ColumnData::Categorical(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&[Option<NaiveDateTime>]> {
        match &self.data {
            ColumnData::Datetime(v) => Some(v),
            _ => None,
        }
    }

    /// Number of missing cells
    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.data.is_missing(i)).count()
    }

    /// `(row, value)` pairs for the non-missing cells of a numeric column
    pub fn present_values(&self) -> Vec<(usize, f64)> {
        self.as_numeric()
            .map(|cells| {
                cells
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Column name and type, without the data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// The shape of a dataset, used by the classifier for parameter extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnInfo>,
}

impl Schema {
    /// Case-insensitive column lookup returning the canonical name
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .map(|c| c.name.as_str())
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable tabular dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    content_hash: String,
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Build a dataset, hashing its cell contents for the cache key
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let content_hash = hash_columns(&columns);
        Self::with_hash(name, columns, content_hash)
    }

    /// Build a dataset with a precomputed content hash (e.g. of the source bytes)
    pub fn with_hash(
        name: impl Into<String>,
        columns: Vec<Column>,
        content_hash: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let row_count = columns.first().map(Column::len).unwrap_or(0);

        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(Error::InvalidData(format!(
                "Column '{}' has {} rows, expected {}",
                bad.name,
                bad.len(),
                row_count
            )));
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::InvalidData(format!(
                    "Duplicate column name '{}'",
                    col.name
                )));
            }
        }

        Ok(Self {
            name,
            content_hash: content_hash.into(),
            columns,
            row_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Exact-name column lookup
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Lookup that reports an unknown column as an error
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| Error::UnknownColumn {
            column: name.to_string(),
            suggestion: None,
        })
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.kind() == ColumnKind::Numeric)
    }

    /// First datetime column, used as the explicit series index
    pub fn time_index(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.kind() == ColumnKind::Datetime)
    }

    pub fn schema(&self) -> Schema {
        Schema {
            columns: self
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    kind: c.kind(),
                })
                .collect(),
        }
    }

    /// Row positions in series order: by the time index when present
    /// (missing dates last, stable), otherwise row order
    pub fn series_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.row_count).collect();
        if let Some(dates) = self.time_index().and_then(Column::as_datetime) {
            order.sort_by(|&a, &b| match (dates[a], dates[b]) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        order
    }
}

/// Hash the canonical text of every cell
fn hash_columns(columns: &[Column]) -> String {
    let mut hasher = Sha256::new();
    for col in columns {
        hasher.update(col.name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(col.kind().as_str().as_bytes());
        for row in 0..col.len() {
            hasher.update([0x1e]);
            hasher.update(col.data.cell_text(row).as_bytes());
        }
        hasher.update([0x1d]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2025, 1, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    #[test]
    fn test_unequal_column_lengths_rejected() {
        let result = Dataset::new(
            "bad",
            vec![
                Column::from_values("a", &[1.0, 2.0]),
                Column::from_values("b", &[1.0]),
            ],
        );
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Dataset::new(
            "dup",
            vec![
                Column::from_values("a", &[1.0]),
                Column::from_values("a", &[2.0]),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_resolve_is_case_insensitive() {
        let ds = Dataset::new("s", vec![Column::from_values("Revenue", &[1.0])]).unwrap();
        let schema = ds.schema();
        assert_eq!(schema.resolve("revenue"), Some("Revenue"));
        assert_eq!(schema.resolve("cost"), None);
    }

    #[test]
    fn test_present_values_skip_missing() {
        let col = Column::numeric("x", vec![Some(1.0), None, Some(3.0), Some(f64::NAN)]);
        assert_eq!(col.present_values(), vec![(0, 1.0), (2, 3.0)]);
        assert_eq!(col.missing_count(), 1);
    }

    #[test]
    fn test_series_order_uses_time_index() {
        let ds = Dataset::new(
            "t",
            vec![
                Column::datetime("date", vec![date(3), None, date(1), date(2)]),
                Column::from_values("v", &[3.0, 9.0, 1.0, 2.0]),
            ],
        )
        .unwrap();
        assert_eq!(ds.series_order(), vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = Dataset::new("a", vec![Column::from_values("x", &[1.0, 2.0])]).unwrap();
        let b = Dataset::new("b", vec![Column::from_values("x", &[1.0, 2.0])]).unwrap();
        let c = Dataset::new("c", vec![Column::from_values("x", &[1.0, 2.5])]).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_empty_dataset() {
        let ds = Dataset::new("empty", vec![Column::from_values("x", &[])]).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.numeric_columns().count(), 1);
    }
}
