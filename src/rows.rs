//! Reading ingestion rows from CSV, JSON and JSON Lines files.
//!
//! A file that cannot be opened or whose top-level structure is invalid is
//! an error for the whole file. A single malformed record inside a valid
//! file becomes an `Err` entry so ingestion can count it and move on.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use jobscope_core::models::JobRow;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};

/// One parsed row, or the reason it could not be parsed.
pub type RowResult = Result<JobRow, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    Csv,
    Json,
    JsonLines,
}

impl RowFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(RowFormat::Csv),
            "json" => Some(RowFormat::Json),
            "jsonl" | "ndjson" => Some(RowFormat::JsonLines),
            _ => None,
        }
    }
}

/// Every supported row file at `path`: the file itself, or every
/// `.csv`/`.json`/`.jsonl` file below a directory, in sorted order.
pub fn collect_files(path: &Path) -> StoreResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such file or directory: {}", path.display()),
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| RowFormat::from_path(p).is_some())
        .collect();
    files.sort();
    Ok(files)
}

/// Parse every row in one file.
pub fn read_rows(path: &Path) -> StoreResult<Vec<RowResult>> {
    let format = RowFormat::from_path(path).ok_or_else(|| {
        StoreError::Serialization(format!("unsupported row file: {}", path.display()))
    })?;
    let file = File::open(path)?;
    match format {
        RowFormat::Csv => read_csv(file),
        RowFormat::Json => read_json(BufReader::new(file)),
        RowFormat::JsonLines => read_json_lines(BufReader::new(file)),
    }
}

pub fn read_csv<R: std::io::Read>(reader: R) -> StoreResult<Vec<RowResult>> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    // Header problems are fatal for the file.
    csv.headers()?;
    Ok(csv
        .deserialize::<JobRow>()
        .map(|r| r.map_err(|e| e.to_string()))
        .collect())
}

/// A JSON array of rows, or an object holding one under `jobs`, `results`
/// or `data`.
pub fn read_json<R: std::io::Read>(reader: R) -> StoreResult<Vec<RowResult>> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => ["jobs", "results", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(serde_json::Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                StoreError::Serialization("expected an array of job rows".to_string())
            })?,
        _ => {
            return Err(StoreError::Serialization(
                "expected an array of job rows".to_string(),
            ))
        }
    };
    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value::<JobRow>(item).map_err(|e| e.to_string()))
        .collect())
}

pub fn read_json_lines<R: BufRead>(reader: R) -> StoreResult<Vec<RowResult>> {
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str::<JobRow>(&line).map_err(|e| e.to_string()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_csv_with_aliases() {
        let data = "\
title,company,location,job_link,post_date,remote
Backend Engineer,Acme,Casablanca,https://x/1,2024-05-01,yes
Data Scientist,Beta,Rabat,,2024-05-02,
";
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.url.as_deref(), Some("https://x/1"));
        assert_eq!(first.scrape_date.as_deref(), Some("2024-05-01"));
        assert_eq!(first.remote, Some(true));
        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.url, None);
        assert_eq!(second.remote, None);
    }

    #[test]
    fn test_json_array_and_wrapped() {
        let rows = read_json(r#"[{"title":"A"},{"title":"B"}]"#.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = read_json(r#"{"results":[{"title":"A"}]}"#.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(read_json(r#"{"title":"A"}"#.as_bytes()).is_err());
    }

    #[test]
    fn test_json_lines_keeps_bad_lines_as_errors() {
        let data = "{\"title\":\"A\"}\n\nnot json\n{\"title\":\"B\"}\n";
        let rows = read_json_lines(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].is_err());
    }

    #[test]
    fn test_collect_files_walks_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("a.csv"), "title\nA\n").unwrap();
        std::fs::write(tmp.path().join("nested/b.jsonl"), "{}\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(collect_files(&tmp.path().join("missing")).is_err());
    }
}
