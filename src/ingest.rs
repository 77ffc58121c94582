//! Ingestion pipeline.
//!
//! Rows are normalized into job records, encoded, and applied to a
//! private working copy of the catalog. The working copy is published every
//! `ingest.commit_every` applied rows and once more at the end, so readers
//! see progress in whole rows and a cancelled batch leaves the store at its
//! last fully applied row.
//!
//! Per row:
//!
//! 1. Normalize; a row without a title fails.
//! 2. A row with neither an explicit id nor a source URL is identified only
//!    by title, company and location. If that id is taken by a record with
//!    different text, the row is a separate posting and moves to a variant
//!    id derived from its text; the deduplicator decides later whether the
//!    two are the same job.
//! 3. If the id already exists, compare content hashes: equal means
//!    skipped, different means upsert. An upsert whose embedding text is
//!    unchanged keeps the stored vector.
//! 4. A new id whose content hash matches another record is skipped.
//! 5. Otherwise encode and insert the id, vector and record together.
//!
//! Failures are counted and collected in [`IngestReport::failures`]; they
//! never stop the batch.
//!
//! # Cost
//!
//! The working copy is cloned once when the session starts and once per
//! intermediate commit; the last commit moves it. A clone is linear in the
//! record count but copies only ids and `Arc` pointers: records and vectors
//! are shared. A batch of `r` rows over `n` records therefore costs about
//! `r / commit_every` clones of size `n`. Raise `ingest.commit_every` for
//! large loads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobscope_core::catalog::JobCatalog;
use jobscope_core::models::{variant_id, JobRow};
use jobscope_core::CoreError;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::normalize::{clean_value, normalize_row};
use crate::rows::{self, RowResult};
use crate::store::{blocking, JobStore};

/// Why one row was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// File the row came from, when ingesting from files.
    pub source: Option<PathBuf>,
    /// 1-based row number within its source. 0 means the whole file.
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Inserted or updated rows that received the fallback vector.
    pub low_confidence: usize,
    pub failures: Vec<RowFailure>,
    /// The batch stopped early because its [`CancelToken`] fired.
    pub cancelled: bool,
    /// Number of times the working copy was published.
    pub commits: usize,
}

impl IngestReport {
    /// Rows that were looked at, whatever the outcome.
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.failed
    }
}

/// Cooperative cancellation for a running ingestion. Checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Applied {
    Inserted { low_confidence: bool },
    Updated { low_confidence: bool },
    Skipped,
}

/// One writer session: holds the writer lock and the working copy.
struct Session<'a> {
    store: &'a JobStore,
    _guard: MutexGuard<'a, ()>,
    working: JobCatalog,
    now: DateTime<Utc>,
    pending: usize,
    report: IngestReport,
}

impl<'a> Session<'a> {
    async fn begin(store: &'a JobStore) -> Session<'a> {
        let guard = store.lock_writer().await;
        let working = (*store.snapshot()).clone();
        Session {
            store,
            _guard: guard,
            working,
            now: Utc::now(),
            pending: 0,
            report: IngestReport::default(),
        }
    }

    fn commit(&mut self) {
        if self.pending == 0 {
            return;
        }
        self.store.publish(self.working.clone());
        self.report.commits += 1;
        info!(
            rows = self.pending,
            records = self.working.len(),
            "ingest committed"
        );
        self.pending = 0;
    }

    fn fail(&mut self, source: Option<&Path>, row: usize, reason: String) {
        warn!(row, source = ?source, reason = %reason, "row failed");
        self.report.failed += 1;
        self.report.failures.push(RowFailure {
            source: source.map(Path::to_path_buf),
            row,
            reason,
        });
    }

    /// Feed rows until exhausted or cancelled. Returns `false` on cancel.
    async fn feed<I>(&mut self, source: Option<&Path>, rows: I, cancel: &CancelToken) -> bool
    where
        I: IntoIterator<Item = RowResult>,
    {
        for (i, row) in rows.into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.report.cancelled = true;
                return false;
            }
            let row_no = i + 1;
            let row = match row {
                Ok(row) => row,
                Err(reason) => {
                    self.fail(source, row_no, reason);
                    continue;
                }
            };
            match self.apply(&row, row_no).await {
                Ok(Applied::Inserted { low_confidence }) => {
                    self.report.inserted += 1;
                    self.report.low_confidence += usize::from(low_confidence);
                    self.pending += 1;
                }
                Ok(Applied::Updated { low_confidence }) => {
                    self.report.updated += 1;
                    self.report.low_confidence += usize::from(low_confidence);
                    self.pending += 1;
                }
                Ok(Applied::Skipped) => self.report.skipped += 1,
                Err(e) => {
                    let reason = match e {
                        CoreError::IngestionRow { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    self.fail(source, row_no, reason);
                }
            }
            if self.pending >= self.store.config().ingest.commit_every {
                self.commit();
            }
        }
        true
    }

    async fn apply(&mut self, row: &JobRow, row_no: usize) -> Result<Applied, CoreError> {
        let default_country = self.store.config().ingest.default_country.as_deref();
        let mut record = normalize_row(row, row_no, self.now, default_country)?;

        let mut existing = self.working.get(&record.id).ok();
        let derived = clean_value(row.id.as_deref()).is_none() && record.source_url.is_none();
        if derived {
            let text = record.embedding_text();
            let variant = existing
                .as_ref()
                .filter(|current| current.embedding_text() != text)
                .map(|current| variant_id(&current.id, &text));
            if let Some(id) = variant {
                debug!(base = %record.id, id = %id, row = row_no, "same identity, different text");
                record.id = id;
                existing = self.working.get(&record.id).ok();
            }
        }
        if let Some(existing) = &existing {
            record.ingested_at = existing.ingested_at;
            // Undated rows are stamped with `now`; keep the first stamp so
            // an unchanged re-scrape hashes the same.
            if record.posted_at == self.now {
                record.posted_at = existing.posted_at;
            }
            record.content_hash = record.compute_content_hash();
            if existing.content_hash == record.content_hash {
                debug!(id = %record.id, row = row_no, "unchanged, skipped");
                return Ok(Applied::Skipped);
            }
        } else if let Some(other) = self.working.records().find_by_content_hash(&record.content_hash) {
            debug!(id = %record.id, existing = %other.id, row = row_no, "same content under another id, skipped");
            return Ok(Applied::Skipped);
        }

        match existing {
            Some(existing) if existing.embedding_text() == record.embedding_text() => {
                let low_confidence = self
                    .working
                    .index()
                    .get(&record.id)
                    .is_some_and(|e| e.low_confidence);
                debug!(id = %record.id, row = row_no, "metadata changed, vector kept");
                self.working.update_record(record)?;
                Ok(Applied::Updated { low_confidence })
            }
            Some(_) => {
                let encoded = self.store.encoder().encode(&record.embedding_text()).await;
                debug!(id = %record.id, row = row_no, "content changed, upserting");
                self.working
                    .upsert(record, encoded.vector, encoded.low_confidence)?;
                Ok(Applied::Updated {
                    low_confidence: encoded.low_confidence,
                })
            }
            None => {
                let encoded = self.store.encoder().encode(&record.embedding_text()).await;
                debug!(id = %record.id, row = row_no, "inserting");
                self.working
                    .insert(record, encoded.vector, encoded.low_confidence)?;
                Ok(Applied::Inserted {
                    low_confidence: encoded.low_confidence,
                })
            }
        }
    }

    /// Publish the remaining rows by moving the working copy, so a batch
    /// that fits in one commit never clones the catalog on the way out.
    fn finish(self) -> IngestReport {
        let Session {
            store,
            _guard,
            working,
            pending,
            mut report,
            ..
        } = self;
        if pending > 0 {
            info!(rows = pending, records = working.len(), "ingest committed");
            store.publish(working);
            report.commits += 1;
        }
        info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            low_confidence = report.low_confidence,
            commits = report.commits,
            cancelled = report.cancelled,
            "ingest finished"
        );
        report
    }
}

impl JobStore {
    /// Ingest already-parsed rows.
    pub async fn ingest(&self, rows: Vec<JobRow>) -> StoreResult<IngestReport> {
        self.ingest_with(rows.into_iter().map(Ok), &CancelToken::new())
            .await
    }

    /// Ingest rows that may carry parse errors, stopping between rows if
    /// `cancel` fires.
    pub async fn ingest_with<I>(&self, rows: I, cancel: &CancelToken) -> StoreResult<IngestReport>
    where
        I: IntoIterator<Item = RowResult>,
    {
        let mut session = Session::begin(self).await;
        session.feed(None, rows, cancel).await;
        Ok(session.finish())
    }

    /// Ingest one row file, or every row file below a directory.
    ///
    /// Files are listed and parsed on the blocking pool. A file that cannot
    /// be read is reported as one failure with row 0 and the remaining
    /// files are still ingested. A path that does not exist
    /// is an error.
    pub async fn ingest_path(&self, path: &Path, cancel: &CancelToken) -> StoreResult<IngestReport> {
        let root = path.to_path_buf();
        let files = blocking(move || rows::collect_files(&root)).await??;
        info!(path = %path.display(), files = files.len(), "ingesting from path");

        let mut session = Session::begin(self).await;
        for file in &files {
            if cancel.is_cancelled() {
                session.report.cancelled = true;
                break;
            }
            let owned = file.clone();
            let parsed = match blocking(move || rows::read_rows(&owned)).await.and_then(|r| r) {
                Ok(parsed) => parsed,
                Err(e) => {
                    session.fail(Some(file.as_path()), 0, e.to_string());
                    continue;
                }
            };
            debug!(file = %file.display(), rows = parsed.len(), "read row file");
            if !session.feed(Some(file.as_path()), parsed, cancel).await {
                break;
            }
        }
        Ok(session.finish())
    }
}
