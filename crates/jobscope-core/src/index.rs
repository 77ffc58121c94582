//! Flat vector index over unit-norm embeddings.
//!
//! Entries live in one contiguous slot vector; removal only marks a slot
//! tombstoned and drops it from the live map, so ids are never reused while
//! a tombstone still occupies a slot. [`VectorIndex::rebuild`] compacts the
//! tombstones away.
//!
//! # Search
//!
//! 1. Validate the query dimension.
//! 2. Score every live entry by inner product (vectors are unit-norm, so
//!    this is cosine similarity).
//! 3. Sort by score descending, ties by insertion sequence descending (the
//!    most recently ingested entry first).
//! 4. Truncate to `k`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::{dot, is_finite};
use crate::error::{CoreError, Result};
use crate::models::IndexEntry;

/// One search result from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub score: f32,
    pub seq: u64,
    pub low_confidence: bool,
}

/// Whether [`VectorIndex::add`] created a new entry or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Replaced,
}

/// Nearest-neighbor index over `(id, vector)` pairs of a fixed dimension.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    entries: Vec<IndexEntry>,
    live: HashMap<String, usize>,
    tombstones: usize,
    next_seq: u64,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
            live: HashMap::new(),
            tombstones: 0,
            next_seq: 0,
        }
    }

    /// Rebuild an index from persisted slots.
    ///
    /// Fails with [`CoreError::EncodingFailure`] if any slot has the wrong
    /// dimension and with [`CoreError::DuplicateId`] if two live slots share
    /// an id.
    pub fn restore(dims: usize, entries: Vec<IndexEntry>, next_seq: u64) -> Result<Self> {
        let mut live = HashMap::with_capacity(entries.len());
        let mut tombstones = 0;
        let mut max_seq = None;
        for (slot, entry) in entries.iter().enumerate() {
            if entry.vector.len() != dims {
                return Err(CoreError::dimension_mismatch(dims, entry.vector.len()));
            }
            max_seq = max_seq.max(Some(entry.seq));
            if entry.tombstoned {
                tombstones += 1;
            } else if live.insert(entry.id.clone(), slot).is_some() {
                return Err(CoreError::DuplicateId(entry.id.clone()));
            }
        }
        let next_seq = next_seq.max(max_seq.map_or(0, |s| s + 1));
        Ok(Self {
            dims,
            entries,
            live,
            tombstones,
            next_seq,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of live (non-tombstoned) entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Fraction of physical slots that are tombstoned.
    pub fn tombstone_ratio(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.tombstones as f64 / self.entries.len() as f64
    }

    /// True when the tombstone ratio is strictly above `threshold`.
    pub fn needs_rebuild(&self, threshold: f64) -> bool {
        self.tombstones > 0 && self.tombstone_ratio() > threshold
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.live.get(id).map(|&slot| &self.entries[slot])
    }

    /// Every physical slot, tombstones included, in slot order.
    pub fn slots(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Live entries in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.iter().filter(|e| !e.tombstoned)
    }

    /// Insert a vector, or replace it in place when `upsert` is set.
    pub fn add(
        &mut self,
        id: &str,
        vector: impl Into<Arc<[f32]>>,
        low_confidence: bool,
        upsert: bool,
    ) -> Result<AddOutcome> {
        let vector: Arc<[f32]> = vector.into();
        if vector.len() != self.dims {
            return Err(CoreError::dimension_mismatch(self.dims, vector.len()));
        }
        if !is_finite(&vector) {
            return Err(CoreError::EncodingFailure(format!(
                "vector for {id} has non-finite components"
            )));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(&slot) = self.live.get(id) {
            if !upsert {
                return Err(CoreError::DuplicateId(id.to_string()));
            }
            let entry = &mut self.entries[slot];
            entry.vector = vector;
            entry.low_confidence = low_confidence;
            entry.seq = seq;
            return Ok(AddOutcome::Replaced);
        }

        self.live.insert(id.to_string(), self.entries.len());
        self.entries.push(IndexEntry {
            id: id.to_string(),
            vector,
            seq,
            low_confidence,
            tombstoned: false,
        });
        Ok(AddOutcome::Inserted)
    }

    /// Tombstone the entry for `id`. The slot is kept until [`rebuild`](Self::rebuild).
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let slot = self
            .live
            .remove(id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        self.entries[slot].tombstoned = true;
        self.tombstones += 1;
        Ok(())
    }

    /// The `k` live entries most similar to `query`.
    ///
    /// Returns fewer than `k` hits when fewer live entries exist; an empty
    /// index yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if query.len() != self.dims {
            return Err(CoreError::dimension_mismatch(self.dims, query.len()));
        }
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<IndexHit> = self
            .iter_live()
            .map(|e| IndexHit {
                id: e.id.clone(),
                score: dot(query, &e.vector),
                seq: e.seq,
                low_confidence: e.low_confidence,
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(b.seq.cmp(&a.seq)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Compact tombstones out of the slot vector. Returns the number of
    /// slots reclaimed.
    pub fn rebuild(&mut self) -> usize {
        let reclaimed = self.tombstones;
        if reclaimed == 0 {
            return 0;
        }
        self.entries.retain(|e| !e.tombstoned);
        self.live = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, e)| (e.id.clone(), slot))
            .collect();
        self.tombstones = 0;
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        crate::embedding::l2_normalize(&mut v);
        v
    }

    #[test]
    fn test_empty_index_search() {
        let idx = VectorIndex::new(3);
        assert!(idx.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), false, false).unwrap();
        idx.add("b", unit(&[0.0, 1.0]), false, false).unwrap();
        idx.add("c", unit(&[1.0, 1.0]), false, false).unwrap();

        let hits = idx.search(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_ties_prefer_recent() {
        let mut idx = VectorIndex::new(2);
        idx.add("old", unit(&[1.0, 0.0]), false, false).unwrap();
        idx.add("new", unit(&[1.0, 0.0]), false, false).unwrap();

        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, "new");
        assert_eq!(hits[1].id, "old");
    }

    #[test]
    fn test_fewer_than_k_returns_all() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), false, false).unwrap();
        assert_eq!(idx.search(&[1.0, 0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_id_without_upsert() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), false, false).unwrap();
        let err = idx.add("a", unit(&[0.0, 1.0]), false, false).unwrap_err();
        assert_eq!(err, CoreError::DuplicateId("a".into()));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), false, false).unwrap();
        let outcome = idx.add("a", unit(&[0.0, 1.0]), false, true).unwrap();
        assert_eq!(outcome, AddOutcome::Replaced);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.slots().len(), 1);
        assert_eq!(&*idx.get("a").unwrap().vector, &[0.0, 1.0]);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let mut idx = VectorIndex::new(3);
        let err = idx.add("a", vec![1.0, 0.0], false, false).unwrap_err();
        assert!(matches!(err, CoreError::EncodingFailure(_)));
        assert!(idx.search(&[1.0], 1).is_err());
        assert!(idx.add("b", vec![f32::NAN, 0.0, 0.0], false, false).is_err());
    }

    #[test]
    fn test_remove_tombstones_then_rebuild() {
        let mut idx = VectorIndex::new(2);
        for id in ["a", "b", "c", "d", "e"] {
            idx.add(id, unit(&[1.0, 0.0]), false, false).unwrap();
        }
        idx.remove("a").unwrap();
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.slots().len(), 5);
        assert!(!idx.needs_rebuild(0.20));

        idx.remove("b").unwrap();
        assert!(idx.needs_rebuild(0.20));
        assert!(idx.search(&[1.0, 0.0], 10).unwrap().iter().all(|h| h.id != "a"));

        assert_eq!(idx.rebuild(), 2);
        assert_eq!(idx.slots().len(), 3);
        assert_eq!(idx.tombstone_count(), 0);
        assert!(idx.get("c").is_some());
    }

    #[test]
    fn test_remove_missing() {
        let mut idx = VectorIndex::new(2);
        assert_eq!(idx.remove("x").unwrap_err(), CoreError::NotFound("x".into()));
    }

    #[test]
    fn test_readd_after_remove() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), false, false).unwrap();
        idx.remove("a").unwrap();
        idx.add("a", unit(&[0.0, 1.0]), false, false).unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.search(&[0.0, 1.0], 5).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_roundtrip() {
        let mut idx = VectorIndex::new(2);
        idx.add("a", unit(&[1.0, 0.0]), true, false).unwrap();
        idx.add("b", unit(&[0.0, 1.0]), false, false).unwrap();
        idx.remove("a").unwrap();

        let restored =
            VectorIndex::restore(2, idx.slots().to_vec(), idx.next_seq()).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.tombstone_count(), 1);
        assert_eq!(restored.next_seq(), idx.next_seq());
        assert!(restored.contains("b"));
    }
}
