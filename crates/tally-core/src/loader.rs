//! Dataset loading
//!
//! Loaders turn an external source into an immutable [`Dataset`]. The CSV
//! loader infers a type per column: numeric when every present cell parses
//! as a number, datetime when every present cell parses as one of the
//! supported date formats, categorical otherwise.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};

use crate::dataset::{Column, Dataset};
use crate::error::{Error, Result};

/// Cell texts treated as missing values (compared case-insensitively)
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "null", "nan", "-", "none"];

/// Datetime formats, tried in order
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M"];

/// Date-only formats, tried in order
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // 2024-01-15
    "%d.%m.%Y", // 15.01.2024
    "%d/%m/%Y", // 15/01/2024
    "%Y/%m/%d", // 2024/01/15
];

/// Source of datasets
pub trait DatasetLoader: Send + Sync {
    /// Load the dataset identified by `source`
    fn load(&self, source: &str) -> Result<Dataset>;
}

/// Loads comma- (or otherwise) delimited files with a header row
#[derive(Debug, Clone)]
pub struct CsvLoader {
    delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file; the dataset is named after the file stem
    pub fn load_path(&self, path: &Path) -> Result<Dataset> {
        let bytes = fs::read(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.parse_bytes(&name, &bytes)
    }

    /// Load CSV from any reader
    pub fn load_reader<R: Read>(&self, name: &str, mut reader: R) -> Result<Dataset> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_bytes(name, &bytes)
    }

    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<Dataset> {
        let content_hash = hex::encode(Sha256::digest(bytes));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(Error::InvalidData("CSV has no header row".to_string()));
        }

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (i, column) in cells.iter_mut().enumerate() {
                let raw = record.get(i).unwrap_or("");
                column.push(if is_missing(raw) {
                    None
                } else {
                    Some(raw.to_string())
                });
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(header, values)| infer_column(header, values))
            .collect();

        let dataset = Dataset::with_hash(name, columns, content_hash)?;
        tracing::debug!(
            dataset = %dataset.name(),
            rows = dataset.row_count(),
            columns = dataset.columns().len(),
            "Loaded CSV dataset"
        );
        Ok(dataset)
    }
}

impl DatasetLoader for CsvLoader {
    fn load(&self, source: &str) -> Result<Dataset> {
        self.load_path(Path::new(source))
    }
}

fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_MARKERS
        .iter()
        .any(|m| trimmed.eq_ignore_ascii_case(m))
}

/// Pick the narrowest type every present cell fits
fn infer_column(name: String, values: Vec<Option<String>>) -> Column {
    let present = || values.iter().flatten();

    let mark = column_decimal_mark(present().map(String::as_str));
    let number = |v: &str| match mark {
        Some(mark) => parse_number_as(v, mark),
        None => parse_number(v),
    };
    if present().all(|v| number(v.as_str()).is_some()) {
        let parsed = values.iter().map(|v| v.as_deref().and_then(number)).collect();
        return Column::numeric(name, parsed);
    }

    if present().all(|v| parse_datetime(v).is_some()) {
        let parsed = values
            .iter()
            .map(|v| v.as_deref().and_then(parse_datetime))
            .collect();
        return Column::datetime(name, parsed);
    }

    Column::categorical(name, values)
}

/// Character separating the integer part from the fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecimalMark {
    Dot,
    Comma,
}

/// Parse a number written with either separator convention
/// ("1.234,5", "1,234.5", "1234,5", "12.5%"). A lone dot followed by
/// exactly three digits ("1.500") is read as thousands grouping.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned = clean_number(s)?;
    let mark = decimal_evidence(&cleaned).unwrap_or(if cleaned.contains('.') {
        DecimalMark::Comma
    } else {
        DecimalMark::Dot
    });
    normalize(&cleaned, mark)
}

fn parse_number_as(s: &str, mark: DecimalMark) -> Option<f64> {
    normalize(&clean_number(s)?, mark)
}

/// Decimal mark shared by a column's cells. Cells that can only be read
/// one way decide it; a column of grouped values like "1.500" and
/// "12.750" takes the comma. `None` when cells disagree.
fn column_decimal_mark<'a>(cells: impl Iterator<Item = &'a str>) -> Option<DecimalMark> {
    let mut dot = false;
    let mut comma = false;
    let mut grouped_dots = false;

    for cleaned in cells.filter_map(clean_number) {
        match decimal_evidence(&cleaned) {
            Some(DecimalMark::Dot) => dot = true,
            Some(DecimalMark::Comma) => comma = true,
            None => grouped_dots |= cleaned.contains('.'),
        }
    }

    match (dot, comma) {
        (true, true) => None,
        (true, false) => Some(DecimalMark::Dot),
        (false, true) => Some(DecimalMark::Comma),
        (false, false) if grouped_dots => Some(DecimalMark::Comma),
        (false, false) => Some(DecimalMark::Dot),
    }
}

/// Strip whitespace, currency symbols and a trailing percent sign
fn clean_number(s: &str) -> Option<String> {
    let cleaned: String = s
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '$' | '€' | '₺' | '£'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// The decimal mark a single cell can only be read with, if any
fn decimal_evidence(cleaned: &str) -> Option<DecimalMark> {
    match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: the later one is the decimal separator
        (Some(c), Some(d)) if c > d => Some(DecimalMark::Comma),
        (Some(_), Some(_)) => Some(DecimalMark::Dot),
        (Some(_), None) if !is_grouped(cleaned, ',') => Some(DecimalMark::Comma),
        (None, Some(_)) if !is_grouped(cleaned, '.') => Some(DecimalMark::Dot),
        _ => None,
    }
}

fn normalize(cleaned: &str, mark: DecimalMark) -> Option<f64> {
    let normalized = match mark {
        DecimalMark::Dot => cleaned.replace(',', ""),
        DecimalMark::Comma => cleaned.replace('.', "").replace(',', "."),
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// "1,234,567" style thousands grouping
fn is_grouped(s: &str, sep: char) -> bool {
    let digits = s.trim_start_matches(['-', '+']);
    let mut groups = digits.split(sep);
    let head_ok = groups.next().is_some_and(|g| {
        (1..=3).contains(&g.len())
            && !g.starts_with('0')
            && g.chars().all(|c| c.is_ascii_digit())
    });
    let rest: Vec<&str> = groups.collect();
    head_ok
        && !rest.is_empty()
        && rest
            .iter()
            .all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

/// Parse a date or datetime in one of the supported formats
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    // Month-only values need a day to be a valid date
    if s.len() == 7 {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnKind;
    use std::io::Write;

    #[test]
    fn test_parse_number_conventions() {
        assert_eq!(parse_number("1234.5"), Some(1234.5));
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_number("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_number("-42"), Some(-42.0));
        assert_eq!(parse_number("₺ 1.500"), Some(1500.0));
        assert_eq!(parse_number("0.125"), Some(0.125));
        assert_eq!(parse_number("3.5"), Some(3.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-01-15"), Some(expected));
        assert_eq!(parse_datetime("15.01.2024"), Some(expected));
        assert_eq!(parse_datetime("15/01/2024"), Some(expected));
        assert!(parse_datetime("2024-01-15 10:30:00").is_some());
        assert!(parse_datetime("2024-02").is_some());
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_type_inference_and_missing_markers() {
        let csv = "date,region,sales\n\
                   2024-01-01,North,10\n\
                   2024-01-02,South,NA\n\
                   2024-01-03,,12.5\n";

        let ds = CsvLoader::new()
            .load_reader("sales", csv.as_bytes())
            .unwrap();

        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column("date").unwrap().kind(), ColumnKind::Datetime);
        assert_eq!(ds.column("region").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(
            ds.column("sales").unwrap().as_numeric().unwrap(),
            &[Some(10.0), None, Some(12.5)]
        );
        assert_eq!(ds.column("region").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_column_shares_one_separator_convention() {
        let csv = "ciro,fiyat,oran\n\
                   \"1.500\",\"1.250\",0.5\n\
                   \"12.750\",\"2.375\",1.250\n\
                   980,\"3,5\",0.75\n\
                   \"2.250\",\"4,125\",1\n";

        let ds = CsvLoader::new()
            .load_reader("turkish", csv.as_bytes())
            .unwrap();

        assert_eq!(
            ds.column("ciro").unwrap().as_numeric().unwrap(),
            &[Some(1500.0), Some(12750.0), Some(980.0), Some(2250.0)]
        );
        assert_eq!(
            ds.column("fiyat").unwrap().as_numeric().unwrap(),
            &[Some(1250.0), Some(2375.0), Some(3.5), Some(4.125)]
        );
        assert_eq!(
            ds.column("oran").unwrap().as_numeric().unwrap(),
            &[Some(0.5), Some(1.25), Some(0.75), Some(1.0)]
        );
    }

    #[test]
    fn test_header_only_csv_gives_empty_dataset() {
        let ds = CsvLoader::new()
            .load_reader("empty", "a,b\n".as_bytes())
            .unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.columns().len(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = CsvLoader::new().load_reader("bad", "a,b\n1,2\n3\n".as_bytes());
        assert!(matches!(result, Err(Error::Csv(_))));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let ds = CsvLoader::new()
            .with_delimiter(b';')
            .load_reader("eu", "tutar;kategori\n1.234,5;A\n10,25;B\n".as_bytes())
            .unwrap();
        assert_eq!(
            ds.column("tutar").unwrap().as_numeric().unwrap(),
            &[Some(1234.5), Some(10.25)]
        );
    }

    #[test]
    fn test_load_path_hashes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "x\n1\n2").unwrap();

        let ds = CsvLoader::new().load(path.to_str().unwrap()).unwrap();
        assert_eq!(ds.name(), "metrics");
        assert_eq!(ds.content_hash().len(), 64);
    }
}
