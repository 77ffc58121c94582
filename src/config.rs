//! TOML configuration.
//!
//! Every field has a default, so an empty file (or [`Config::default`])
//! is a valid configuration that uses the offline hash encoder and keeps
//! artifacts under `./data`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobscope_core::dedup::{DedupOptions, MergePolicy};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_store_name")]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            name: default_store_name(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_store_name() -> String {
    "jobs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            min_tokens: default_min_tokens(),
            max_chars: default_max_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_min_tokens() -> usize {
    3
}
fn default_max_chars() -> usize {
    4000
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            rebuild_threshold: default_rebuild_threshold(),
        }
    }
}

fn default_rebuild_threshold() -> f64 {
    0.20
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_relevant_countries")]
    pub relevant_countries: Vec<String>,
    #[serde(default = "default_country_terms")]
    pub country_terms: BTreeMap<String, Vec<String>>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: default_overfetch_factor(),
            default_k: default_k(),
            relevant_countries: default_relevant_countries(),
            country_terms: default_country_terms(),
        }
    }
}

impl QueryConfig {
    /// Mention terms for the given country codes, looked up
    /// case-insensitively in `country_terms`.
    pub fn terms_for(&self, countries: &[String]) -> Vec<String> {
        countries
            .iter()
            .flat_map(|code| {
                self.country_terms
                    .iter()
                    .filter(move |(k, _)| k.eq_ignore_ascii_case(code))
                    .flat_map(|(_, terms)| terms.iter().cloned())
            })
            .collect()
    }
}

fn default_overfetch_factor() -> usize {
    5
}
fn default_k() -> usize {
    10
}
fn default_relevant_countries() -> Vec<String> {
    vec!["MA".to_string()]
}
fn default_country_terms() -> BTreeMap<String, Vec<String>> {
    let morocco = [
        "morocco",
        "maroc",
        "rabat",
        "casablanca",
        "tanger",
        "tangier",
        "fes",
        "fez",
        "marrakech",
        "agadir",
    ];
    BTreeMap::from([(
        "MA".to_string(),
        morocco.iter().map(|s| s.to_string()).collect(),
    )])
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_merge_policy")]
    pub merge_policy: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            merge_policy: default_merge_policy(),
        }
    }
}

impl DedupConfig {
    pub fn options(&self) -> Result<DedupOptions> {
        let merge_policy: MergePolicy = self
            .merge_policy
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        Ok(DedupOptions {
            similarity_threshold: self.similarity_threshold,
            merge_policy,
        })
    }
}

fn default_similarity_threshold() -> f32 {
    0.97
}
fn default_merge_policy() -> String {
    "fill_missing".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,
    /// Country for rows that carry neither a location nor a country.
    #[serde(default = "default_country")]
    pub default_country: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            commit_every: default_commit_every(),
            default_country: default_country(),
        }
    }
}

fn default_commit_every() -> usize {
    64
}
fn default_country() -> Option<String> {
    Some("MA".to_string())
}

/// Check value ranges and known names.
pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.max_chars == 0 {
        anyhow::bail!("embedding.max_chars must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    let threshold = config.index.rebuild_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!("index.rebuild_threshold must be in (0.0, 1.0]");
    }

    if config.query.overfetch_factor < 1 {
        anyhow::bail!("query.overfetch_factor must be >= 1");
    }
    if config.query.default_k < 1 {
        anyhow::bail!("query.default_k must be >= 1");
    }

    let similarity = config.dedup.similarity_threshold;
    if !(similarity > 0.0 && similarity <= 1.0) {
        anyhow::bail!("dedup.similarity_threshold must be in (0.0, 1.0]");
    }
    config
        .dedup
        .options()
        .context("Invalid dedup.merge_policy")?;

    if config.ingest.commit_every < 1 {
        anyhow::bail!("ingest.commit_every must be >= 1");
    }
    if config.store.name.trim().is_empty() {
        anyhow::bail!("store.name must not be empty");
    }

    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}
