//! Public search operations on a [`JobStore`].
//!
//! Each operation encodes its query text once, takes one snapshot, and runs
//! a pure query from `jobscope_core::query` against it. All of them are
//! read-only and never wait for a writer. Query text with no tokens yields
//! an empty result. If the encoder fails on the query, the search falls
//! back to term matching over the same snapshot and filter.

use std::str::FromStr;

use jobscope_core::models::{JobRecord, WorkMode};
use jobscope_core::query::{self, KeywordMatch, ScoredJob};
use jobscope_core::records::JobFilter;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::normalize;
use crate::store::JobStore;

enum QueryVector {
    Blank,
    Encoded(Vec<f32>),
    Unavailable,
}

impl JobStore {
    async fn query_vector(&self, input: &str) -> QueryVector {
        match self.encoder().encode_query(input).await {
            Ok(Some(vector)) => QueryVector::Encoded(vector),
            Ok(None) => QueryVector::Blank,
            Err(e) => {
                warn!(error = %e, model = self.encoder().model_name(), "query encoding failed, using term matching");
                QueryVector::Unavailable
            }
        }
    }

    async fn filtered(&self, input: &str, k: usize, filter: &JobFilter) -> StoreResult<Vec<ScoredJob>> {
        let vector = match self.query_vector(input).await {
            QueryVector::Encoded(vector) => vector,
            QueryVector::Blank => return Ok(Vec::new()),
            QueryVector::Unavailable => {
                let snapshot = self.snapshot();
                return Ok(query::term_match(snapshot.records(), input, k, filter));
            }
        };
        let snapshot = self.snapshot();
        let hits = query::nearest_filtered(
            &snapshot,
            &vector,
            k,
            filter,
            self.config().query.overfetch_factor,
        )?;
        debug!(k, hits = hits.len(), filter = ?filter, "filtered search");
        Ok(hits)
    }

    /// The `k` postings most similar to `input`.
    pub async fn search_similar(&self, input: &str, k: usize) -> StoreResult<Vec<ScoredJob>> {
        let vector = match self.query_vector(input).await {
            QueryVector::Encoded(vector) => vector,
            QueryVector::Blank => return Ok(Vec::new()),
            QueryVector::Unavailable => {
                let snapshot = self.snapshot();
                return Ok(query::term_match(snapshot.records(), input, k, &JobFilter::All));
            }
        };
        let snapshot = self.snapshot();
        let hits = query::nearest(&snapshot, &vector, k)?;
        debug!(k, hits = hits.len(), "similar search");
        Ok(hits)
    }

    /// Like [`search_similar`](Self::search_similar), but the query is
    /// cleaned as a job title before encoding.
    pub async fn search_by_title(&self, title: &str, k: usize) -> StoreResult<Vec<ScoredJob>> {
        let cleaned = normalize::clean_title(title);
        self.search_similar(&cleaned, k).await
    }

    /// Similarity search restricted to remote postings.
    pub async fn search_remote(&self, input: &str, k: usize) -> StoreResult<Vec<ScoredJob>> {
        self.filtered(input, k, &JobFilter::Remote(true)).await
    }

    /// Similarity search restricted to postings that are remote, open
    /// internationally, located in one of `countries`, or mention one of
    /// the configured terms for them. An empty `countries` uses
    /// `query.relevant_countries`.
    pub async fn search_country_relevant(
        &self,
        input: &str,
        k: usize,
        countries: &[String],
    ) -> StoreResult<Vec<ScoredJob>> {
        let countries = if countries.is_empty() {
            self.config().query.relevant_countries.as_slice()
        } else {
            countries
        };
        let terms = self.config().query.terms_for(countries);
        let filter = JobFilter::country_relevant(countries, &terms);
        self.filtered(input, k, &filter).await
    }

    /// Postings containing the keywords (AND when `require_all`, else OR),
    /// most matches first.
    pub fn search_by_keywords(&self, keywords: &[String], require_all: bool) -> Vec<KeywordMatch> {
        let snapshot = self.snapshot();
        query::keyword_search(snapshot.records(), keywords, require_all)
    }
}

/// Which search operation the CLI runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Similar,
    Title,
    Remote,
    Country,
    Keywords,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "similar" => Ok(SearchMode::Similar),
            "title" => Ok(SearchMode::Title),
            "remote" => Ok(SearchMode::Remote),
            "country" => Ok(SearchMode::Country),
            "keywords" => Ok(SearchMode::Keywords),
            other => Err(format!(
                "Unknown search mode: {}. Use similar, title, remote, country, or keywords.",
                other
            )),
        }
    }
}

/// Run one search and print the results.
pub async fn run_search(
    store: &JobStore,
    mode: SearchMode,
    input: &str,
    k: usize,
    countries: &[String],
    require_all: bool,
) -> StoreResult<()> {
    let results = match mode {
        SearchMode::Keywords => return print_keyword_matches(store, input, k, require_all),
        SearchMode::Similar => store.search_similar(input, k).await?,
        SearchMode::Title => store.search_by_title(input, k).await?,
        SearchMode::Remote => store.search_remote(input, k).await?,
        SearchMode::Country => store.search_country_relevant(input, k, countries).await?,
    };
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, job) in results.iter().enumerate() {
        let flag = if job.low_confidence { " (low confidence)" } else { "" };
        println!("{}. [{:.3}] {}{}", i + 1, job.score, headline(&job.record), flag);
        println!("    id: {}", job.record.id);
        if let Some(url) = &job.record.source_url {
            println!("    url: {}", url);
        }
    }
    Ok(())
}

fn print_keyword_matches(store: &JobStore, input: &str, k: usize, require_all: bool) -> StoreResult<()> {
    let keywords: Vec<String> = input.split_whitespace().map(str::to_string).collect();
    let matches = store.search_by_keywords(&keywords, require_all);
    if matches.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, m) in matches.iter().take(k).enumerate() {
        println!("{}. [{}] {}", i + 1, m.matched.join(","), headline(&m.record));
        println!("    id: {}", m.record.id);
    }
    Ok(())
}

fn headline(record: &JobRecord) -> String {
    let mut line = record.title.clone();
    if !record.company.is_empty() {
        line.push_str(" @ ");
        line.push_str(&record.company);
    }
    if !record.location.is_empty() {
        line.push_str(" (");
        line.push_str(&record.location);
        line.push(')');
    }
    match record.features.work_mode {
        WorkMode::Remote => line.push_str(" [remote]"),
        WorkMode::Hybrid => line.push_str(" [hybrid]"),
        WorkMode::Onsite => {}
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use jobscope_core::embedding::TextEncoder;
    use jobscope_core::models::JobRow;

    use crate::config::Config;
    use crate::encoder::Encoder;

    struct Unavailable(usize);

    #[async_trait]
    impl TextEncoder for Unavailable {
        fn model_name(&self) -> &str {
            "unavailable"
        }
        fn dims(&self) -> usize {
            self.0
        }
        async fn encode(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn row(title: &str, location: &str, description: &str, remote: bool) -> JobRow {
        JobRow {
            title: Some(title.into()),
            company: Some("Acme".into()),
            location: Some(location.into()),
            description: Some(description.into()),
            remote: Some(remote),
            scrape_date: Some("2024-05-01".into()),
            ..JobRow::default()
        }
    }

    async fn seeded() -> JobStore {
        let mut config = Config::default();
        config.embedding.dims = 128;
        let store = JobStore::from_config(config).unwrap();
        store
            .ingest(vec![
                row("DevOps Engineer", "Paris", "Kubernetes terraform pipelines", false),
                row("Backend Developer", "Berlin", "Rust services and PostgreSQL", true),
                row("Data Analyst", "Casablanca", "SQL dashboards and reporting", false),
                row("Frontend Developer", "Lyon", "React work for a team in Morocco", false),
                row("Chef de projet", "Lyon", "Rejoignez ma équipe de développeurs", false),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let store = seeded().await;
        assert!(store.search_similar("   ", 3).await.unwrap().is_empty());
        assert!(store.search_remote("", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_ranks_best_match_first() {
        let store = seeded().await;
        let hits = store
            .search_similar("DevOps engineer kubernetes terraform", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.title, "DevOps Engineer");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_title_search_ignores_noise() {
        let store = seeded().await;
        let hits = store.search_by_title("  DevOps   Engineer !!", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.title, "DevOps Engineer");
    }

    #[tokio::test]
    async fn test_country_relevant_predicate() {
        let store = seeded().await;
        let hits = store
            .search_country_relevant("developer", 10, &["MA".to_string()])
            .await
            .unwrap();
        let mut titles: Vec<&str> = hits.iter().map(|h| h.record.title.as_str()).collect();
        titles.sort();
        assert_eq!(
            titles,
            vec!["Backend Developer", "Data Analyst", "Frontend Developer"]
        );
    }

    #[tokio::test]
    async fn test_country_code_is_not_a_mention() {
        let store = seeded().await;
        let hits = store.search_country_relevant("projet équipe", 10, &[]).await.unwrap();
        assert!(hits.iter().all(|h| h.record.title != "Chef de projet"));
    }

    #[tokio::test]
    async fn test_query_encoding_failure_falls_back_to_terms() {
        let mut config = Config::default();
        config.embedding.dims = 16;
        let encoder = Encoder::new(Arc::new(Unavailable(16)), &config.embedding);
        let store = JobStore::new(config, encoder).unwrap();
        store
            .ingest(vec![
                row("Backend Developer", "Berlin", "Rust services and PostgreSQL", true),
                row("Rust Developer", "Paris", "Embedded Rust firmware", false),
                row("Data Analyst", "Casablanca", "SQL dashboards and reporting", false),
            ])
            .await
            .unwrap();

        let hits = store.search_similar("rust postgresql", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.title, "Backend Developer");
        assert!(hits.iter().all(|h| h.low_confidence));

        let remote = store.search_remote("rust", 5).await.unwrap();
        assert_eq!(remote.len(), 1);
        assert!(remote[0].record.remote);
        assert_eq!(store.search_similar("rust", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keywords_and_or() {
        let store = seeded().await;
        let any = store.search_by_keywords(&["rust".into(), "react".into()], false);
        assert_eq!(any.len(), 2);
        let all = store.search_by_keywords(&["rust".into(), "postgresql".into()], true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].matched.len(), 2);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("remote".parse::<SearchMode>().unwrap(), SearchMode::Remote);
        assert!("hybrid".parse::<SearchMode>().is_err());
    }
}
