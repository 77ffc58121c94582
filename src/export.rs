//! Export the record store as CSV, JSON or JSON Lines.
//!
//! Exports mirror the [`JobRecord`] fields. Timestamps are RFC 3339; in CSV
//! the salary range is split into three columns and skills are joined with
//! `;`.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use jobscope_core::models::JobRecord;
use serde::Serialize;

use crate::error::StoreResult;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    JsonLines,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" => Ok(ExportFormat::JsonLines),
            other => Err(format!("Unknown export format: {other}. Use csv, json, or jsonl.")),
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    country: Option<&'a str>,
    summary: Option<&'a str>,
    description: &'a str,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: Option<&'a str>,
    skills: String,
    remote: bool,
    work_mode: &'static str,
    international: bool,
    job_type: Option<&'static str>,
    years_experience: Option<u32>,
    education: String,
    source_url: Option<&'a str>,
    posted_at: String,
    ingested_at: String,
    specialty: Option<&'a str>,
    keyword: Option<&'a str>,
}

impl<'a> From<&'a JobRecord> for CsvRow<'a> {
    fn from(r: &'a JobRecord) -> Self {
        let salary = r.salary.as_ref();
        CsvRow {
            id: &r.id,
            title: &r.title,
            company: &r.company,
            location: &r.location,
            country: r.country.as_deref(),
            summary: r.summary.as_deref(),
            description: &r.description,
            salary_min: salary.and_then(|s| s.min),
            salary_max: salary.and_then(|s| s.max),
            salary_currency: salary.and_then(|s| s.currency.as_deref()),
            skills: r
                .skills
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            remote: r.remote,
            work_mode: r.features.work_mode.as_str(),
            international: r.features.international,
            job_type: r.features.job_type.map(|t| t.as_str()),
            years_experience: r.features.years_experience,
            education: r
                .features
                .education
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            source_url: r.source_url.as_deref(),
            posted_at: r.posted_at.to_rfc3339(),
            ingested_at: r.ingested_at.to_rfc3339(),
            specialty: r.specialty.as_deref(),
            keyword: r.keyword.as_deref(),
        }
    }
}

impl JobStore {
    /// Write every record of the current snapshot, ordered by id. Returns
    /// the number of records written.
    pub fn export<W: Write>(&self, format: ExportFormat, mut writer: W) -> StoreResult<usize> {
        let snapshot = self.snapshot();
        let records: Vec<&JobRecord> = snapshot.records().iter().map(|r| r.as_ref()).collect();

        match format {
            ExportFormat::Csv => {
                let mut csv = csv::Writer::from_writer(writer);
                for record in &records {
                    csv.serialize(CsvRow::from(*record))?;
                }
                csv.flush()?;
            }
            ExportFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, &records)?;
                writeln!(writer)?;
            }
            ExportFormat::JsonLines => {
                for record in &records {
                    serde_json::to_writer(&mut writer, record)?;
                    writeln!(writer)?;
                }
            }
        }
        Ok(records.len())
    }
}

/// Export to `output`, or to stdout when `None`.
pub fn run_export(store: &JobStore, format: ExportFormat, output: Option<&Path>) -> StoreResult<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::io::BufWriter::new(std::fs::File::create(path)?);
            let count = store.export(format, file)?;
            eprintln!("Exported {} records to {}", count, path.display());
        }
        None => {
            let stdout = std::io::stdout();
            store.export(format, stdout.lock())?;
        }
    }
    Ok(())
}
