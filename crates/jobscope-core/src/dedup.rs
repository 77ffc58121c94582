//! Near-duplicate detection and merging.
//!
//! # Algorithm
//!
//! 1. Repair integrity violations so every record has a vector.
//! 2. Order records by ingestion time, then insertion sequence, then id.
//!    The earliest record of a duplicate group becomes its survivor.
//! 3. Walk the ordered records. A record is a duplicate of a survivor when
//!    its normalized `(company, title, location)` key matches, or when the
//!    cosine similarity of the two vectors is at or above the threshold.
//!    Low-confidence (fallback) vectors never take part in the similarity
//!    test.
//! 4. Merge each duplicate into its survivor according to [`MergePolicy`],
//!    always taking the union of the skills, and remove the duplicate's
//!    record and index entry.
//!
//! Merging never changes a survivor's key. When it changes the text a
//! survivor is encoded from (a filled-in description, or newer wording
//! under [`MergePolicy::PreferNewest`]), the survivor's id is listed in
//! [`DedupReport::reencode`] and its stored vector is stale until the
//! caller re-encodes it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::JobCatalog;
use crate::embedding::dot;
use crate::models::JobRecord;

/// How conflicting fields are resolved when a duplicate is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Survivor keeps its values; only missing optional fields are filled
    /// from the duplicate.
    #[default]
    FillMissing,
    /// Survivor keeps every value except the skills union.
    KeepSurvivor,
    /// Content fields of the more recently posted record win. Identity
    /// fields (title, company, location) and the id stay the survivor's.
    PreferNewest,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fill_missing" => Ok(MergePolicy::FillMissing),
            "keep_survivor" => Ok(MergePolicy::KeepSurvivor),
            "prefer_newest" => Ok(MergePolicy::PreferNewest),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupOptions {
    pub similarity_threshold: f32,
    pub merge_policy: MergePolicy,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.97,
            merge_policy: MergePolicy::FillMissing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateReason {
    SameKey,
    Similar(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub survivor: String,
    pub removed: String,
    pub reason: DuplicateReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupReport {
    pub removed: usize,
    pub repaired: usize,
    pub merges: Vec<Merge>,
    /// Survivors whose embedding text changed in the merge.
    pub reencode: Vec<String>,
}

struct Survivor {
    record: JobRecord,
    vector: Option<Arc<[f32]>>,
    changed: bool,
}

/// Collapse duplicates in place. Returns what was removed and why.
pub fn deduplicate(catalog: &mut JobCatalog, options: &DedupOptions) -> DedupReport {
    let repaired = catalog.repair();

    let mut ordered: Vec<(Arc<JobRecord>, u64, Option<Arc<[f32]>>)> = catalog
        .records()
        .iter()
        .filter_map(|r| {
            let entry = catalog.index().get(&r.id)?;
            let vector = (!entry.low_confidence).then(|| entry.vector.clone());
            Some((r.clone(), entry.seq, vector))
        })
        .collect();
    ordered.sort_by(|(a, a_seq, _), (b, b_seq, _)| {
        a.ingested_at
            .cmp(&b.ingested_at)
            .then(a_seq.cmp(b_seq))
            .then(a.id.cmp(&b.id))
    });

    let mut survivors: Vec<Survivor> = Vec::new();
    let mut by_key: HashMap<(String, String, String), usize> = HashMap::new();
    let mut merges = Vec::new();

    for (record, _, vector) in ordered {
        let key = record.dedup_key();
        let found = match key.as_ref().and_then(|k| by_key.get(k)) {
            Some(&slot) => Some((slot, DuplicateReason::SameKey)),
            None => vector.as_ref().and_then(|v| {
                most_similar(&survivors, v, options.similarity_threshold)
                    .map(|(slot, score)| (slot, DuplicateReason::Similar(score)))
            }),
        };

        match found {
            Some((slot, reason)) => {
                let survivor = &mut survivors[slot];
                merge_into(&mut survivor.record, &record, options.merge_policy);
                survivor.changed = true;
                debug!(survivor = %survivor.record.id, removed = %record.id, ?reason, "merging duplicate");
                merges.push(Merge {
                    survivor: survivor.record.id.clone(),
                    removed: record.id.clone(),
                    reason,
                });
            }
            None => {
                if let Some(k) = key {
                    by_key.insert(k, survivors.len());
                }
                survivors.push(Survivor {
                    record: (*record).clone(),
                    vector,
                    changed: false,
                });
            }
        }
    }

    for merge in &merges {
        let _ = catalog.remove(&merge.removed);
    }
    let mut reencode = Vec::new();
    for survivor in survivors.into_iter().filter(|s| s.changed) {
        let text_changed = catalog
            .get(&survivor.record.id)
            .is_ok_and(|before| before.embedding_text() != survivor.record.embedding_text());
        if text_changed {
            reencode.push(survivor.record.id.clone());
        }
        let _ = catalog.update_record(survivor.record);
    }

    if !merges.is_empty() {
        info!(removed = merges.len(), repaired, "deduplication removed records");
    }
    DedupReport {
        removed: merges.len(),
        repaired,
        merges,
        reencode,
    }
}

fn most_similar(survivors: &[Survivor], vector: &[f32], threshold: f32) -> Option<(usize, f32)> {
    survivors
        .iter()
        .enumerate()
        .filter_map(|(slot, s)| {
            let other = s.vector.as_ref()?;
            let score = dot(vector, other);
            (score >= threshold).then_some((slot, score))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
}

fn merge_into(survivor: &mut JobRecord, duplicate: &JobRecord, policy: MergePolicy) {
    survivor.skills.extend(duplicate.skills.iter().cloned());

    match policy {
        MergePolicy::KeepSurvivor => {}
        MergePolicy::FillMissing => fill_missing(survivor, duplicate),
        MergePolicy::PreferNewest => {
            if duplicate.posted_at > survivor.posted_at {
                if duplicate.salary.is_some() {
                    survivor.salary = duplicate.salary.clone();
                }
                if duplicate.summary.is_some() {
                    survivor.summary = duplicate.summary.clone();
                }
                if !duplicate.description.trim().is_empty() {
                    survivor.description = duplicate.description.clone();
                }
                if duplicate.source_url.is_some() {
                    survivor.source_url = duplicate.source_url.clone();
                }
                survivor.remote = duplicate.remote;
                survivor.posted_at = duplicate.posted_at;
            }
            fill_missing(survivor, duplicate);
        }
    }
}

fn fill_missing(survivor: &mut JobRecord, duplicate: &JobRecord) {
    if survivor.salary.is_none() {
        survivor.salary = duplicate.salary.clone();
    }
    if survivor.summary.is_none() {
        survivor.summary = duplicate.summary.clone();
    }
    if survivor.description.trim().is_empty() {
        survivor.description = duplicate.description.clone();
    }
    if survivor.source_url.is_none() {
        survivor.source_url = duplicate.source_url.clone();
    }
    if survivor.country.is_none() {
        survivor.country = duplicate.country.clone();
    }
    if survivor.specialty.is_none() {
        survivor.specialty = duplicate.specialty.clone();
    }
    if survivor.keyword.is_none() {
        survivor.keyword = duplicate.keyword.clone();
    }
    survivor.remote |= duplicate.remote;
}
