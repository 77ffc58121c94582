//! Query algorithms over one catalog snapshot.
//!
//! Everything here is read-only. Query vectors are computed by the caller;
//! the app crate's `search` module encodes text and delegates here.
//!
//! # Filtered similarity search
//!
//! Filtering after truncating to the top `k` would starve selective
//! predicates, so the candidate pool is over-fetched:
//!
//! 1. Pull `k × M` nearest entries from the index.
//! 2. Join with the record store and apply the predicate.
//! 3. If fewer than `k` matched and live entries remain unseen, double
//!    the pool and repeat.
//!
//! The loop ends once every live entry has been considered, so exactly
//! `k` results come back whenever `k` eligible records exist.
//!
//! # Term matching
//!
//! When no query vector can be produced, [`term_match`] ranks records by
//! the share of query tokens they contain. Its results carry
//! `low_confidence = true`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::catalog::JobCatalog;
use crate::error::Result;
use crate::index::IndexHit;
use crate::models::JobRecord;
use crate::records::{JobFilter, RecordStore};
use crate::text;

/// A record with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredJob {
    pub record: Arc<JobRecord>,
    pub score: f32,
    pub low_confidence: bool,
}

/// A record with the keywords it matched.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordMatch {
    pub record: Arc<JobRecord>,
    pub matched: Vec<String>,
}

fn join(catalog: &JobCatalog, hits: Vec<IndexHit>) -> impl Iterator<Item = ScoredJob> + '_ {
    hits.into_iter().filter_map(move |hit| match catalog.get(&hit.id) {
        Ok(record) => Some(ScoredJob {
            record,
            score: hit.score,
            low_confidence: hit.low_confidence,
        }),
        Err(_) => {
            warn!(id = %hit.id, "indexed id has no record, skipping");
            None
        }
    })
}

/// The `k` records nearest to `query`. Ids missing from the record store
/// are skipped with a warning.
pub fn nearest(catalog: &JobCatalog, query: &[f32], k: usize) -> Result<Vec<ScoredJob>> {
    let hits = catalog.index().search(query, k)?;
    Ok(join(catalog, hits).collect())
}

/// The `k` nearest records that satisfy `filter`, over-fetching by
/// `overfetch_factor`.
pub fn nearest_filtered(
    catalog: &JobCatalog,
    query: &[f32],
    k: usize,
    filter: &JobFilter,
    overfetch_factor: usize,
) -> Result<Vec<ScoredJob>> {
    let live = catalog.index().len();
    if k == 0 || live == 0 {
        // Still validates the query dimension.
        catalog.index().search(query, 0)?;
        return Ok(Vec::new());
    }

    let mut pool = k.saturating_mul(overfetch_factor.max(1)).min(live);
    loop {
        let hits = catalog.index().search(query, pool)?;
        let mut matched: Vec<ScoredJob> = join(catalog, hits)
            .filter(|job| filter.matches(&job.record))
            .collect();

        if matched.len() >= k || pool >= live {
            matched.truncate(k);
            return Ok(matched);
        }
        pool = pool.saturating_mul(2).min(live);
    }
}

/// Up to `k` records satisfying `filter`, scored by the fraction of distinct
/// query tokens found in the title, company, location, summary,
/// description or skills. Records with no matching token are left out.
/// Ties go to the more recently posted record, then the lower id.
pub fn term_match(records: &RecordStore, input: &str, k: usize, filter: &JobFilter) -> Vec<ScoredJob> {
    let needles: BTreeSet<String> = text::tokens(input).into_iter().collect();
    if needles.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredJob> = records
        .list(filter)
        .filter_map(|record| {
            let mut haystack: BTreeSet<String> = BTreeSet::new();
            for field in [
                record.title.as_str(),
                record.company.as_str(),
                record.location.as_str(),
                record.summary.as_deref().unwrap_or(""),
                record.description.as_str(),
            ] {
                haystack.extend(text::tokens(field));
            }
            for skill in &record.skills {
                haystack.extend(text::tokens(skill));
            }
            let hits = needles.iter().filter(|n| haystack.contains(*n)).count();
            (hits > 0).then(|| ScoredJob {
                record: record.clone(),
                score: hits as f32 / needles.len() as f32,
                low_confidence: true,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.record.posted_at.cmp(&a.record.posted_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored.truncate(k);
    scored
}

/// Records matching the keywords by case-insensitive substring over title,
/// summary, description and skills.
///
/// With `require_all` every keyword must match (AND), otherwise any one is
/// enough (OR). Results are ordered by number of matched keywords
/// descending, then posted time descending, then id.
pub fn keyword_search(records: &RecordStore, keywords: &[String], require_all: bool) -> Vec<KeywordMatch> {
    let mut seen = BTreeSet::new();
    let needles: Vec<(String, JobFilter)> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(text::fold(k)))
        .map(|k| (k.to_string(), JobFilter::text(k)))
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<KeywordMatch> = records
        .iter()
        .filter_map(|record| {
            let matched: Vec<String> = needles
                .iter()
                .filter(|(_, f)| f.matches(record))
                .map(|(k, _)| k.clone())
                .collect();
            let keep = if require_all {
                matched.len() == needles.len()
            } else {
                !matched.is_empty()
            };
            keep.then(|| KeywordMatch {
                record: record.clone(),
                matched,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.matched
            .len()
            .cmp(&a.matched.len())
            .then(b.record.posted_at.cmp(&a.record.posted_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;
    use chrono::{Duration, TimeZone, Utc};

    fn rec(id: &str, remote: bool, days: i64, desc: &str) -> JobRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days);
        JobRecord {
            id: id.into(),
            content_hash: format!("hash-{id}"),
            title: format!("Job {id}"),
            company: "Acme".into(),
            location: String::new(),
            country: None,
            summary: None,
            description: desc.into(),
            salary: None,
            skills: Default::default(),
            remote,
            source_url: None,
            posted_at: ts,
            ingested_at: ts,
            specialty: None,
            keyword: None,
            features: Default::default(),
        }
    }

    fn angle(deg: f32) -> Vec<f32> {
        let r = deg.to_radians();
        vec![r.cos(), r.sin()]
    }

    #[test]
    fn test_nearest_on_empty_catalog() {
        let c = JobCatalog::new(2);
        assert!(nearest(&c, &[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_skips_orphans() {
        let mut index = VectorIndex::new(2);
        index.add("ghost", angle(0.0), false, false).unwrap();
        index.add("real", angle(10.0), false, false).unwrap();
        let mut records = RecordStore::new();
        records.put(rec("real", false, 0, ""));
        let c = JobCatalog::from_parts(index, records);

        let results = nearest(&c, &angle(0.0), 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "real");
    }

    #[test]
    fn test_filtered_search_overfetches() {
        let mut c = JobCatalog::new(2);
        // 20 onsite jobs closest to the query, 3 remote ones further away.
        for i in 0..20 {
            c.insert(rec(&format!("on{i}"), false, i, ""), angle(i as f32 * 0.1), false)
                .unwrap();
        }
        for i in 0..3 {
            c.insert(rec(&format!("re{i}"), true, i, ""), angle(60.0 + i as f32), false)
                .unwrap();
        }

        let results = nearest_filtered(&c, &angle(0.0), 3, &JobFilter::Remote(true), 2).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.record.remote));
        assert_eq!(results[0].record.id, "re0");
    }

    #[test]
    fn test_filtered_search_returns_all_eligible_when_fewer_than_k() {
        let mut c = JobCatalog::new(2);
        c.insert(rec("on", false, 0, ""), angle(0.0), false).unwrap();
        c.insert(rec("re", true, 0, ""), angle(45.0), false).unwrap();
        let results = nearest_filtered(&c, &angle(0.0), 5, &JobFilter::Remote(true), 5).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_keyword_and_or() {
        let mut s = RecordStore::new();
        s.put(rec("1", false, 0, "rust and kubernetes"));
        s.put(rec("2", false, 5, "rust only"));
        s.put(rec("3", false, 3, "kubernetes only"));

        let kw = vec!["Rust".to_string(), "kubernetes".to_string()];
        let all = keyword_search(&s, &kw, true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.id, "1");

        let any = keyword_search(&s, &kw, false);
        let ids: Vec<_> = any.iter().map(|m| m.record.id.as_str()).collect();
        // Two matches first, then single matches by posted time descending.
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(any[0].matched, kw);
    }

    #[test]
    fn test_term_match_scores_token_share() {
        let mut s = RecordStore::new();
        s.put(rec("1", false, 0, "rust and kubernetes"));
        s.put(rec("2", true, 5, "rust services"));
        s.put(rec("3", false, 3, "accounting"));

        let hits = term_match(&s, "Rust Kubernetes", 5, &JobFilter::All);
        let ids: Vec<_> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].score, 0.5);
        assert!(hits.iter().all(|h| h.low_confidence));

        let remote = term_match(&s, "rust", 5, &JobFilter::Remote(true));
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].record.id, "2");
        assert_eq!(term_match(&s, "rust", 1, &JobFilter::All).len(), 1);
        assert!(term_match(&s, "  ", 5, &JobFilter::All).is_empty());
    }

    #[test]
    fn test_keyword_blank_input() {
        let mut s = RecordStore::new();
        s.put(rec("1", false, 0, "rust"));
        assert!(keyword_search(&s, &[" ".to_string()], false).is_empty());
    }
}
