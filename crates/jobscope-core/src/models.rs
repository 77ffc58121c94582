//! Core data models: ingestion rows, job records, and index entries.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::text;

/// A raw row supplied by an ingestion source (CSV/JSON file, scraper output).
///
/// Every field is optional at this level; the ingestion pipeline decides
/// which ones are required. Common aliases from scraper exports are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRow {
    #[serde(alias = "job_id")]
    pub id: Option<String>,
    #[serde(alias = "speciality", alias = "department")]
    pub specialty: Option<String>,
    pub keyword: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub salary: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "job_link", alias = "redirect_url", alias = "source_url")]
    pub url: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "post_date", alias = "posted_date", alias = "posted_at")]
    pub scrape_date: Option<String>,
    #[serde(alias = "source_country")]
    pub country: Option<String>,
    #[serde(
        alias = "remote_friendly",
        deserialize_with = "flexible_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BoolLike> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(BoolLike::Bool(b)) => Some(b),
        Some(BoolLike::Int(i)) => Some(i != 0),
        Some(BoolLike::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "remote" => Some(true),
            "false" | "no" | "n" | "0" | "onsite" => Some(false),
            _ => None,
        },
        None => None,
    })
}

/// Salary information parsed from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Option<String>,
}

/// Where the work happens, as advertised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    Remote,
    Hybrid,
    #[default]
    Onsite,
}

impl WorkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkMode::Remote => "remote",
            WorkMode::Hybrid => "hybrid",
            WorkMode::Onsite => "onsite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::FullTime => "full_time",
            JobType::PartTime => "part_time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Temporary => "temporary",
        }
    }
}

/// Attributes extracted from the posting text at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFeatures {
    pub work_mode: WorkMode,
    /// Open to candidates abroad (mentions international, offshore,
    /// nearshore, worldwide and similar).
    pub international: bool,
    pub job_type: Option<JobType>,
    /// Minimum years of experience asked for.
    pub years_experience: Option<u32>,
    /// Degrees mentioned, lowercase (`"bac+5"`, `"master"`, `"mba"`).
    pub education: BTreeSet<String>,
}

/// Canonical metadata for one job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Stable id: explicit row id or the identity hash of title, company,
    /// location and source URL.
    pub id: String,
    /// Fingerprint of every content field; decides skip vs. upsert.
    pub content_hash: String,
    pub title: String,
    pub company: String,
    pub location: String,
    /// ISO 3166 alpha-2 country code, uppercase.
    pub country: Option<String>,
    pub summary: Option<String>,
    pub description: String,
    pub salary: Option<SalaryRange>,
    pub skills: BTreeSet<String>,
    pub remote: bool,
    pub source_url: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub specialty: Option<String>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub features: JobFeatures,
}

impl JobRecord {
    /// Text fed to the encoder: the defining fields, one per line, empty
    /// ones omitted.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(5);
        for field in [
            self.title.as_str(),
            self.company.as_str(),
            self.location.as_str(),
            self.summary.as_deref().unwrap_or(""),
            self.description.as_str(),
        ] {
            if !field.trim().is_empty() {
                parts.push(field);
            }
        }
        parts.join("\n")
    }

    /// Normalized `(company, title, location)` key used by exact-match
    /// deduplication. `None` when title or company is blank.
    pub fn dedup_key(&self) -> Option<(String, String, String)> {
        let company = text::normalize_key(&self.company);
        let title = text::normalize_key(&self.title);
        if company.is_empty() || title.is_empty() {
            return None;
        }
        Some((company, title, text::normalize_key(&self.location)))
    }

    /// Recompute [`content_hash`](Self::content_hash) from the current fields.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let salary = self.salary.as_ref().map(|s| {
            format!(
                "{:?}|{:?}|{}",
                s.min,
                s.max,
                s.currency.as_deref().unwrap_or("")
            )
        });
        let skills: Vec<&str> = self.skills.iter().map(String::as_str).collect();
        for field in [
            self.title.as_str(),
            self.company.as_str(),
            self.location.as_str(),
            self.country.as_deref().unwrap_or(""),
            self.summary.as_deref().unwrap_or(""),
            self.description.as_str(),
            salary.as_deref().unwrap_or(""),
            &skills.join(","),
            if self.remote { "remote" } else { "onsite" },
            self.source_url.as_deref().unwrap_or(""),
            self.specialty.as_deref().unwrap_or(""),
            self.keyword.as_deref().unwrap_or(""),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update(self.posted_at.timestamp().to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Derive a stable record id from the identifying fields of a posting.
///
/// Identical postings re-ingested later resolve to the same id regardless
/// of case, accents, or whitespace.
pub fn identity_id(title: &str, company: &str, location: &str, source_url: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for field in [title, company, location] {
        hasher.update(text::normalize_key(field).as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update(source_url.unwrap_or("").trim().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("job-{}", &digest[..16])
}

/// Id for a posting that shares `base`'s identity fields but has different
/// text, such as the same title re-posted with new wording. Derived from
/// the encoded text, so re-ingesting the same variant finds it again.
pub fn variant_id(base: &str, embedding_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text::normalize_key(embedding_text).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{base}-{}", &digest[..8])
}

/// One slot of the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    /// Unit-norm embedding of dimension D.
    pub vector: Arc<[f32]>,
    /// Monotonic insertion sequence; higher is more recently ingested.
    pub seq: u64,
    /// Set when the vector is the fallback produced for unusable text.
    pub low_confidence: bool,
    pub tombstoned: bool,
}
