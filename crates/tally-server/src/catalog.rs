//! Dataset catalog: the CSV files in the server's data directory

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{CsvLoader, Dataset};

use crate::AppError;

/// One dataset file
#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    /// File stem, used to reference the dataset in requests
    pub name: String,
    pub file: String,
    pub size_bytes: u64,
    /// RFC 3339 modification time
    pub modified: Option<String>,
}

/// A dataset file resolved for loading
#[derive(Debug, Clone)]
pub struct Located {
    pub name: String,
    pub path: PathBuf,
    /// Changes whenever the file does, so edited files are reloaded
    pub cache_key: String,
}

pub struct Catalog {
    data_dir: PathBuf,
    loader: CsvLoader,
}

impl Catalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            loader: CsvLoader::new(),
        }
    }

    /// Every CSV file in the data directory, by name
    pub fn list(&self) -> anyhow::Result<Vec<DatasetEntry>> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if !is_csv(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = fs::metadata(&path)?;
            entries.push(DatasetEntry {
                name: name.to_string(),
                file: path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_bytes: metadata.len(),
                modified: metadata
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Resolve a dataset by name, or the most recently modified one when
    /// no name is given
    pub fn locate(&self, name: Option<&str>) -> Result<Located, AppError> {
        let path = match name {
            Some(name) => {
                let stem = name.trim().trim_end_matches(".csv");
                if !is_valid_name(stem) {
                    return Err(AppError::bad_request("Invalid dataset name"));
                }
                let path = self.data_dir.join(format!("{}.csv", stem));
                if !path.is_file() {
                    return Err(AppError::not_found("Dataset not found"));
                }
                path
            }
            None => self
                .latest()?
                .ok_or_else(|| AppError::not_found("No datasets available"))?,
        };

        let metadata = fs::metadata(&path)?;
        let stamp = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        Ok(Located {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            cache_key: format!("{}@{}:{}", path.display(), stamp, metadata.len()),
            path,
        })
    }

    pub fn load(&self, located: &Located) -> tally_core::Result<Dataset> {
        self.loader.load_path(&located.path)
    }

    fn latest(&self) -> anyhow::Result<Option<PathBuf>> {
        let newest = self
            .list()?
            .into_iter()
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(newest.map(|e| self.data_dir.join(e.file)))
    }
}

fn is_csv(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Names are plain file stems: no separators, no leading dot
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("sales_2024"));
        assert!(is_valid_name("q1 report"));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_list_only_csv_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sales.csv"), "a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join("hr.CSV"), "x\n1\n").unwrap();

        let catalog = Catalog::new(dir.path());
        let names: Vec<String> = catalog.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["hr", "sales"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let catalog = Catalog::new("/nonexistent/tally/data");
        assert!(catalog.list().unwrap().is_empty());
        assert_eq!(catalog.locate(None).unwrap_err().status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_locate_by_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sales.csv"), "a,b\n1,2\n").unwrap();
        let catalog = Catalog::new(dir.path());

        let located = catalog.locate(Some("sales.csv")).unwrap();
        assert_eq!(located.name, "sales");
        assert!(located.cache_key.contains("sales.csv@"));

        let err = catalog.locate(Some("../sales")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = catalog.locate(Some("missing")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
