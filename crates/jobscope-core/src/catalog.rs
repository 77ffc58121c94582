//! The paired vector index and record store.
//!
//! Every write goes through [`JobCatalog`] so that each id in the index has
//! exactly one record in the store and vice versa. Where a write touches
//! both structures the fallible half runs first, so an error leaves the pair
//! unchanged.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::index::{AddOutcome, VectorIndex};
use crate::models::JobRecord;
use crate::records::RecordStore;

/// Which side of the pair is missing for an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityGap {
    /// Live index entry without a record.
    MissingRecord,
    /// Record without a live index entry.
    MissingVector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub id: String,
    pub gap: IntegrityGap,
}

impl From<&IntegrityIssue> for CoreError {
    fn from(issue: &IntegrityIssue) -> Self {
        let detail = match issue.gap {
            IntegrityGap::MissingRecord => "indexed without a record",
            IntegrityGap::MissingVector => "record without an index entry",
        };
        CoreError::IntegrityViolation {
            id: issue.id.clone(),
            detail: detail.to_string(),
        }
    }
}

/// Outcome of [`JobCatalog::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub reclaimed: usize,
    pub repaired: usize,
}

/// Vector index and record store kept in lockstep.
#[derive(Debug, Clone)]
pub struct JobCatalog {
    index: VectorIndex,
    records: RecordStore,
}

impl JobCatalog {
    pub fn new(dims: usize) -> Self {
        Self {
            index: VectorIndex::new(dims),
            records: RecordStore::new(),
        }
    }

    /// Assemble a catalog from restored parts. Callers should run
    /// [`check_integrity`](Self::check_integrity) on the result.
    pub fn from_parts(index: VectorIndex, records: RecordStore) -> Self {
        Self { index, records }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<Arc<JobRecord>> {
        self.records.get(id)
    }

    /// Insert a new id+vector+record unit. Fails with
    /// [`CoreError::DuplicateId`] if either side already holds the id.
    pub fn insert(&mut self, record: JobRecord, vector: Vec<f32>, low_confidence: bool) -> Result<()> {
        if self.records.contains(&record.id) {
            return Err(CoreError::DuplicateId(record.id));
        }
        self.index.add(&record.id, vector, low_confidence, false)?;
        self.records.put(record);
        Ok(())
    }

    /// Insert or replace the vector and record for `record.id`. Returns
    /// `true` when an existing record was replaced.
    pub fn upsert(&mut self, record: JobRecord, vector: Vec<f32>, low_confidence: bool) -> Result<bool> {
        let outcome = self.index.add(&record.id, vector, low_confidence, true)?;
        let previous = self.records.put(record);
        Ok(outcome == AddOutcome::Replaced || previous.is_some())
    }

    /// Replace the metadata of an existing record without touching its vector.
    pub fn update_record(&mut self, record: JobRecord) -> Result<()> {
        if !self.records.contains(&record.id) || !self.index.contains(&record.id) {
            return Err(CoreError::NotFound(record.id));
        }
        self.records.put(record);
        Ok(())
    }

    /// Remove whatever exists for `id` on either side. Fails with
    /// [`CoreError::NotFound`] only when neither side holds it.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let from_records = self.records.delete(id).is_ok();
        let from_index = self.index.remove(id).is_ok();
        if !from_records && !from_index {
            return Err(CoreError::NotFound(id.to_string()));
        }
        if from_records != from_index {
            warn!(id = %id, "removed a half-present pair");
        }
        Ok(())
    }

    /// List every id present on one side only.
    pub fn check_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues: Vec<IntegrityIssue> = self
            .index
            .iter_live()
            .filter(|e| !self.records.contains(&e.id))
            .map(|e| IntegrityIssue {
                id: e.id.clone(),
                gap: IntegrityGap::MissingRecord,
            })
            .collect();
        issues.extend(
            self.records
                .ids()
                .filter(|id| !self.index.contains(id))
                .map(|id| IntegrityIssue {
                    id: id.to_string(),
                    gap: IntegrityGap::MissingVector,
                }),
        );
        issues
    }

    /// Drop orphans on both sides. Returns the number of ids dropped.
    pub fn repair(&mut self) -> usize {
        let issues = self.check_integrity();
        for issue in &issues {
            warn!(id = %issue.id, gap = ?issue.gap, "repairing integrity violation");
            let _ = match issue.gap {
                IntegrityGap::MissingRecord => self.index.remove(&issue.id),
                IntegrityGap::MissingVector => self.records.delete(&issue.id).map(|_| ()),
            };
        }
        issues.len()
    }

    /// Repair integrity violations, then compact index tombstones.
    pub fn rebuild(&mut self) -> RebuildReport {
        let repaired = self.repair();
        let reclaimed = self.index.rebuild();
        info!(reclaimed, repaired, live = self.index.len(), "index rebuilt");
        RebuildReport { reclaimed, repaired }
    }

    /// Rebuild only when the tombstone ratio exceeds `threshold`.
    pub fn maybe_rebuild(&mut self, threshold: f64) -> Option<RebuildReport> {
        if self.index.needs_rebuild(threshold) {
            debug!(
                ratio = self.index.tombstone_ratio(),
                threshold, "tombstone ratio over threshold"
            );
            Some(self.rebuild())
        } else {
            None
        }
    }
}
