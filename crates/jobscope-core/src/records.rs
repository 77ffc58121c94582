//! Job record store and composable field filters.
//!
//! The store holds canonical metadata keyed by id, independent of the
//! vector index, so metadata-only edits never require re-encoding.
//! Records are kept behind `Arc` so cloning the store for a copy-on-write
//! snapshot only bumps reference counts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::models::JobRecord;
use crate::text;

/// Canonical per-job metadata keyed by stable id.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<String, Arc<JobRecord>>,
    by_hash: HashMap<String, BTreeSet<String>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace the record under `record.id`. Returns the previous
    /// record, if any.
    pub fn put(&mut self, record: JobRecord) -> Option<Arc<JobRecord>> {
        self.by_hash
            .entry(record.content_hash.clone())
            .or_default()
            .insert(record.id.clone());
        let previous = self.records.insert(record.id.clone(), Arc::new(record));
        if let Some(prev) = &previous {
            let current_hash = &self.records[&prev.id].content_hash;
            if *current_hash != prev.content_hash {
                self.unlink_hash(&prev.content_hash, &prev.id);
            }
        }
        previous
    }

    pub fn get(&self, id: &str) -> Result<Arc<JobRecord>> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    pub fn delete(&mut self, id: &str) -> Result<Arc<JobRecord>> {
        let removed = self
            .records
            .remove(id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        self.unlink_hash(&removed.content_hash, id);
        Ok(removed)
    }

    /// Any record whose content fingerprint equals `hash`.
    pub fn find_by_content_hash(&self, hash: &str) -> Option<&Arc<JobRecord>> {
        self.by_hash
            .get(hash)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| self.records.get(id))
    }

    fn unlink_hash(&mut self, hash: &str, id: &str) {
        if let Some(ids) = self.by_hash.get_mut(hash) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_hash.remove(hash);
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.keys().map(String::as_str)
    }

    /// All records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<JobRecord>> + '_ {
        self.records.values()
    }

    /// Lazily yield the records matching `filter`, in id order.
    ///
    /// Every call re-evaluates the predicate from the start.
    pub fn list<'a>(
        &'a self,
        filter: &'a JobFilter,
    ) -> impl Iterator<Item = &'a Arc<JobRecord>> + 'a {
        self.records.values().filter(move |r| filter.matches(r))
    }
}

/// A predicate over job records, composed from field-level filters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobFilter {
    All,
    /// `remote == value`.
    Remote(bool),
    /// `features.international == value`.
    International(bool),
    /// Country code in the set (codes stored uppercase).
    Country(BTreeSet<String>),
    /// Case- and accent-insensitive substring over title, summary,
    /// description and skills. Holds the folded needle.
    Text(String),
    /// Title, location, summary or description mentions any of the
    /// normalized terms as a whole-word phrase.
    Mentions(Vec<String>),
    And(Vec<JobFilter>),
    Or(Vec<JobFilter>),
    Not(Box<JobFilter>),
}

impl JobFilter {
    pub fn text(needle: &str) -> Self {
        JobFilter::Text(text::fold(needle.trim()))
    }

    pub fn countries<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        JobFilter::Country(
            codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    pub fn mentions<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        JobFilter::Mentions(
            terms
                .into_iter()
                .map(|t| text::normalize_key(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn and(self, other: JobFilter) -> Self {
        match self {
            JobFilter::All => other,
            JobFilter::And(mut parts) => {
                parts.push(other);
                JobFilter::And(parts)
            }
            first => JobFilter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: JobFilter) -> Self {
        match self {
            JobFilter::Or(mut parts) => {
                parts.push(other);
                JobFilter::Or(parts)
            }
            first => JobFilter::Or(vec![first, other]),
        }
    }

    /// `remote == true OR international OR country ∈ countries OR the
    /// posting mentions any of `terms``.
    pub fn country_relevant<I, S>(countries: I, terms: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        JobFilter::Remote(true)
            .or(JobFilter::International(true))
            .or(JobFilter::countries(countries))
            .or(JobFilter::mentions(terms))
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::Remote(value) => record.remote == *value,
            JobFilter::International(value) => record.features.international == *value,
            JobFilter::Country(set) => record
                .country
                .as_deref()
                .is_some_and(|c| set.contains(&c.to_ascii_uppercase())),
            JobFilter::Text(needle) => {
                !needle.is_empty()
                    && (text::contains_folded(&record.title, needle)
                        || text::contains_folded(&record.description, needle)
                        || record
                            .summary
                            .as_deref()
                            .is_some_and(|s| text::contains_folded(s, needle))
                        || record
                            .skills
                            .iter()
                            .any(|s| text::contains_folded(s, needle)))
            }
            JobFilter::Mentions(terms) => {
                if terms.is_empty() {
                    return false;
                }
                let haystack = format!(
                    " {} {} {} {} ",
                    text::normalize_key(&record.title),
                    text::normalize_key(&record.location),
                    text::normalize_key(record.summary.as_deref().unwrap_or("")),
                    text::normalize_key(&record.description)
                );
                terms
                    .iter()
                    .any(|t| haystack.contains(&format!(" {t} ")))
            }
            JobFilter::And(parts) => parts.iter().all(|f| f.matches(record)),
            JobFilter::Or(parts) => parts.iter().any(|f| f.matches(record)),
            JobFilter::Not(inner) => !inner.matches(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(id: &str, title: &str, remote: bool, country: Option<&str>, desc: &str) -> JobRecord {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        JobRecord {
            id: id.into(),
            content_hash: String::new(),
            title: title.into(),
            company: "Acme".into(),
            location: String::new(),
            country: country.map(str::to_string),
            summary: None,
            description: desc.into(),
            salary: None,
            skills: ["Rust".to_string(), "PostgreSQL".to_string()].into(),
            remote,
            source_url: None,
            posted_at: ts,
            ingested_at: ts,
            specialty: None,
            keyword: None,
            features: Default::default(),
        }
    }

    fn store() -> RecordStore {
        let mut s = RecordStore::new();
        s.put(rec("1", "Backend Engineer", false, Some("MA"), "APIs"));
        s.put(rec("2", "Data Scientist", true, Some("FR"), "models"));
        s.put(rec("3", "DevOps", false, Some("US"), "Clients based in Morocco"));
        s.put(rec("4", "Designer", false, Some("US"), "professional work"));
        s
    }

    fn ids<'a>(it: impl Iterator<Item = &'a Arc<JobRecord>>) -> Vec<String> {
        it.map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_put_get_delete() {
        let mut s = store();
        assert_eq!(s.get("1").unwrap().title, "Backend Engineer");
        s.delete("1").unwrap();
        assert_eq!(s.get("1").unwrap_err(), CoreError::NotFound("1".into()));
        assert_eq!(s.delete("1").unwrap_err(), CoreError::NotFound("1".into()));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_content_hash_lookup_follows_updates() {
        let mut s = RecordStore::new();
        let mut r = rec("1", "Backend Engineer", false, None, "APIs");
        r.content_hash = "h1".into();
        s.put(r.clone());
        assert_eq!(s.find_by_content_hash("h1").unwrap().id, "1");

        r.content_hash = "h2".into();
        s.put(r);
        assert!(s.find_by_content_hash("h1").is_none());
        assert_eq!(s.find_by_content_hash("h2").unwrap().id, "1");

        s.delete("1").unwrap();
        assert!(s.find_by_content_hash("h2").is_none());
    }

    #[test]
    fn test_remote_and_country_filters() {
        let s = store();
        assert_eq!(ids(s.list(&JobFilter::Remote(true))), vec!["2"]);
        assert_eq!(ids(s.list(&JobFilter::countries(["ma", "fr"]))), vec!["1", "2"]);
    }

    #[test]
    fn test_text_filter_is_case_insensitive_over_skills() {
        let s = store();
        assert_eq!(ids(s.list(&JobFilter::text("ENGINEER"))).len(), 1);
        assert_eq!(ids(s.list(&JobFilter::text("postgres"))).len(), 4);
        assert!(ids(s.list(&JobFilter::text(""))).is_empty());
    }

    #[test]
    fn test_country_relevant() {
        let s = store();
        let terms = vec!["morocco".to_string(), "fes".to_string()];
        let filter = JobFilter::country_relevant(["MA"], &terms);
        // "fes" must not match inside "professional".
        assert_eq!(ids(s.list(&filter)), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_international_counts_as_relevant() {
        let mut s = store();
        let mut offshore = rec("5", "Support Agent", false, Some("FR"), "offshore team");
        offshore.features.international = true;
        s.put(offshore);
        let filter = JobFilter::country_relevant(["MA"], &[]);
        assert_eq!(ids(s.list(&filter)), vec!["1", "2", "5"]);
        assert_eq!(ids(s.list(&JobFilter::International(true))), vec!["5"]);
    }

    #[test]
    fn test_composition_and_restartable_listing() {
        let s = store();
        let filter = JobFilter::All
            .and(JobFilter::Remote(false))
            .and(JobFilter::Not(Box::new(JobFilter::countries(["US"]))));
        assert_eq!(ids(s.list(&filter)), vec!["1"]);
        assert_eq!(ids(s.list(&filter)), vec!["1"]);
    }
}
