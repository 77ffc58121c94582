//! The explicit store handle.
//!
//! [`JobStore`] owns one [`JobCatalog`] behind a copy-on-write pointer:
//!
//! - Readers call [`JobStore::snapshot`], which clones an `Arc` under a
//!   read lock held only for the pointer copy. A reader keeps its snapshot
//!   for the whole query, so it never sees a half-applied write.
//! - Writers (ingestion, deduplication, rebuild, purge, load) serialize on
//!   an async writer mutex, apply their changes to a private clone of the
//!   catalog, and publish the clone with a single pointer swap.
//! - `save` only needs a snapshot, but saves are serialized with each
//!   other on a separate lock because they share on-disk artifacts.

use std::sync::Arc;

use anyhow::Result;
use jobscope_core::catalog::{IntegrityIssue, JobCatalog, RebuildReport};
use jobscope_core::dedup::{self, DedupOptions, DedupReport};
use jobscope_core::models::JobRecord;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::{self, Config};
use crate::encoder::Encoder;
use crate::error::{StoreError, StoreResult};

pub struct JobStore {
    config: Config,
    dedup: DedupOptions,
    encoder: Encoder,
    current: RwLock<Arc<JobCatalog>>,
    writer: Mutex<()>,
    pub(crate) save_lock: Mutex<()>,
}

impl JobStore {
    /// Create an empty store. Fails when the configuration is invalid or
    /// the encoder's dimension differs from `embedding.dims`.
    pub fn new(config: Config, encoder: Encoder) -> Result<Self> {
        config::validate(&config)?;
        if encoder.dims() != config.embedding.dims {
            anyhow::bail!(
                "encoder '{}' produces {} dimensions but embedding.dims is {}",
                encoder.model_name(),
                encoder.dims(),
                config.embedding.dims
            );
        }
        let dedup = config.dedup.options()?;
        let catalog = JobCatalog::new(config.embedding.dims);
        Ok(Self {
            config,
            dedup,
            encoder,
            current: RwLock::new(Arc::new(catalog)),
            writer: Mutex::new(()),
            save_lock: Mutex::new(()),
        })
    }

    /// Create an empty store with the encoder named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let encoder = Encoder::from_config(&config.embedding)?;
        Self::new(config, encoder)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn dims(&self) -> usize {
        self.config.embedding.dims
    }

    /// The current committed state. Cheap; never waits for a writer.
    pub fn snapshot(&self) -> Arc<JobCatalog> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn get(&self, id: &str) -> StoreResult<Arc<JobRecord>> {
        Ok(self.snapshot().get(id)?)
    }

    /// Take the writer lock. Held for the duration of one writer operation.
    pub(crate) async fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Make `catalog` the committed state. Callers must hold the writer lock.
    pub(crate) fn publish(&self, catalog: JobCatalog) {
        *self.current.write() = Arc::new(catalog);
    }

    /// Run `f` on a private copy of the catalog and publish the copy if
    /// `f` succeeds. On error the committed state is untouched.
    pub(crate) async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut JobCatalog) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.lock_writer().await;
        let mut working = (*self.snapshot()).clone();
        let out = f(&mut working)?;
        self.publish(working);
        Ok(out)
    }

    /// Remove one record and its index entry.
    pub async fn purge(&self, id: &str) -> StoreResult<()> {
        let threshold = self.config.index.rebuild_threshold;
        self.mutate(|catalog| {
            catalog.remove(id)?;
            catalog.maybe_rebuild(threshold);
            Ok(())
        })
        .await?;
        info!(id = %id, "purged record");
        Ok(())
    }

    /// Repair integrity violations and compact tombstones.
    pub async fn rebuild(&self) -> StoreResult<RebuildReport> {
        self.mutate(|catalog| Ok(catalog.rebuild())).await
    }

    /// Merge near-duplicate postings. A second consecutive call removes
    /// nothing. Survivors whose text changed in the merge are re-encoded
    /// before the result is published.
    pub async fn deduplicate(&self) -> StoreResult<DedupReport> {
        self.deduplicate_with(&self.dedup).await
    }

    pub async fn deduplicate_with(&self, options: &DedupOptions) -> StoreResult<DedupReport> {
        let _guard = self.lock_writer().await;
        let mut working = (*self.snapshot()).clone();
        let report = dedup::deduplicate(&mut working, options);
        for id in &report.reencode {
            let record = working.get(id)?;
            let encoded = self.encoder.encode(&record.embedding_text()).await;
            working.upsert((*record).clone(), encoded.vector, encoded.low_confidence)?;
        }
        if !report.reencode.is_empty() {
            debug!(count = report.reencode.len(), "re-encoded merged survivors");
        }
        working.maybe_rebuild(self.config.index.rebuild_threshold);
        self.publish(working);
        Ok(report)
    }

    /// Ids present in only one of the index and the record store.
    pub fn check_integrity(&self) -> Vec<IntegrityIssue> {
        self.snapshot().check_integrity()
    }
}

/// Run blocking file work on tokio's blocking pool. A panicked task
/// surfaces as an I/O error.
pub(crate) async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))
}
