//! Durable save and load of a whole store under one base name.
//!
//! # On-disk layout
//!
//! A save writes, inside `store.dir`:
//!
//! | File | Contents |
//! |------|----------|
//! | `{name}.{generation}.index` | index slots: id, seq, flags, vector |
//! | `{name}.{generation}.records` | records as a JSON array |
//! | `{name}.manifest.json` | schema version, generation, dims, counts |
//!
//! Both blobs start with a 4-byte magic, a little-endian `u32` schema
//! version and the 16-byte generation id, and end with a SHA-256 of
//! everything before it. Each file is written to a temporary file in the
//! same directory, synced, and renamed into place. The manifest is written
//! last; its rename is the commit point. A crash before that rename leaves
//! the previous manifest naming the previous, untouched generation. The
//! directory is synced after the manifest rename so the commit survives a
//! power loss. All file I/O runs on tokio's blocking pool.
//! Blobs from older generations are removed after the commit.
//!
//! # Loading
//!
//! A missing, truncated or checksum-mismatched artifact yields
//! [`LoadOutcome::Empty`] and resets the store. An unsupported schema
//! version or a dimension that differs from the configured one is
//! [`StoreError::CorruptPersistence`](crate::error::StoreError).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobscope_core::catalog::JobCatalog;
use jobscope_core::embedding::{blob_to_vec, vec_to_blob};
use jobscope_core::index::VectorIndex;
use jobscope_core::models::{IndexEntry, JobRecord};
use jobscope_core::records::RecordStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{blocking, JobStore};

pub const SCHEMA_VERSION: u32 = 1;

const INDEX_MAGIC: &[u8; 4] = b"JSIX";
const RECORDS_MAGIC: &[u8; 4] = b"JSRC";
const HEADER_LEN: usize = 4 + 4 + 16;
const CHECKSUM_LEN: usize = 32;

const FLAG_LOW_CONFIDENCE: u8 = 0b01;
const FLAG_TOMBSTONED: u8 = 0b10;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    schema_version: u32,
    generation: Uuid,
    dims: usize,
    model: String,
    records: usize,
    saved_at: DateTime<Utc>,
}

/// Result of a successful [`JobStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub generation: Uuid,
    pub records: usize,
    pub manifest: PathBuf,
}

/// Result of [`JobStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The store now holds the persisted state.
    Loaded { records: usize, generation: Uuid },
    /// Nothing usable was found; the store was reset to empty.
    Empty { reason: String },
}

/// Why a blob could not be used.
enum BlobError {
    /// Missing, truncated, checksum mismatch or wrong generation.
    Unusable(String),
    /// Well-formed but not something this build can read.
    Corrupt(String),
}

impl JobStore {
    fn artifact_dir(&self) -> &Path {
        &self.config().store.dir
    }

    /// Write the current snapshot under `name`.
    ///
    /// Only a snapshot is needed, so readers and writers keep running.
    /// Concurrent saves are serialized with each other.
    pub async fn save(&self, name: &str) -> StoreResult<SaveReport> {
        check_name(name)?;
        let _save = self.save_lock.lock().await;
        let snapshot = self.snapshot();
        let dir = self.artifact_dir().to_path_buf();
        let model = self.encoder().model_name().to_string();
        let owned = name.to_string();
        let report = blocking(move || write_generation(&dir, &owned, &snapshot, model)).await??;
        info!(
            name,
            generation = %report.generation,
            records = report.records,
            "store saved"
        );
        Ok(report)
    }

    /// Replace the store contents with the artifacts saved under `name`.
    pub async fn load(&self, name: &str) -> StoreResult<LoadOutcome> {
        check_name(name)?;
        let _save = self.save_lock.lock().await;
        let _writer = self.lock_writer().await;

        let dir = self.artifact_dir().to_path_buf();
        let dims = self.dims();
        let owned = name.to_string();
        match blocking(move || read_catalog(&dir, &owned, dims)).await? {
            Ok((mut catalog, generation)) => {
                let repaired = catalog.repair();
                if repaired > 0 {
                    warn!(name, repaired, "loaded store had integrity violations");
                }
                let records = catalog.len();
                self.publish(catalog);
                info!(name, generation = %generation, records, "store loaded");
                Ok(LoadOutcome::Loaded {
                    records,
                    generation,
                })
            }
            Err(BlobError::Unusable(reason)) => {
                warn!(name, reason = %reason, "no usable persisted store, starting empty");
                self.publish(JobCatalog::new(self.dims()));
                Ok(LoadOutcome::Empty { reason })
            }
            Err(BlobError::Corrupt(reason)) => Err(StoreError::corrupt(reason)),
        }
    }
}

/// Write both blobs and the manifest for a new generation, then drop older
/// generations. Runs on a blocking thread.
fn write_generation(dir: &Path, name: &str, catalog: &JobCatalog, model: String) -> StoreResult<SaveReport> {
    fs::create_dir_all(dir)?;

    let generation = Uuid::new_v4();
    let index_path = blob_path(dir, name, generation, "index");
    let records_path = blob_path(dir, name, generation, "records");

    write_atomic(dir, &index_path, &encode_index(catalog, generation))?;
    write_atomic(dir, &records_path, &encode_records(catalog, generation)?)?;

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        generation,
        dims: catalog.dims(),
        model,
        records: catalog.len(),
        saved_at: Utc::now(),
    };
    let manifest_path = manifest_path(dir, name);
    write_atomic(dir, &manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;
    sync_dir(dir)?;

    remove_stale(dir, name, generation);
    Ok(SaveReport {
        generation,
        records: manifest.records,
        manifest: manifest_path,
    })
}

fn read_catalog(dir: &Path, name: &str, dims: usize) -> Result<(JobCatalog, Uuid), BlobError> {
    let manifest_path = manifest_path(dir, name);
    let bytes = read_file(&manifest_path)?;
    let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
        BlobError::Unusable(format!("unreadable manifest {}: {}", manifest_path.display(), e))
    })?;
    if manifest.schema_version != SCHEMA_VERSION {
        return Err(BlobError::Corrupt(format!(
            "unsupported schema version {} (expected {})",
            manifest.schema_version, SCHEMA_VERSION
        )));
    }
    if manifest.dims != dims {
        return Err(BlobError::Corrupt(format!(
            "persisted dimension {} does not match configured {}",
            manifest.dims, dims
        )));
    }
    debug!(name, generation = %manifest.generation, "reading artifacts");

    let generation = manifest.generation;
    let index_bytes = read_file(&blob_path(dir, name, generation, "index"))?;
    let index = decode_index(&index_bytes, generation, manifest.dims)?;
    let records_bytes = read_file(&blob_path(dir, name, generation, "records"))?;
    let records = decode_records(&records_bytes, generation)?;

    if records.len() != manifest.records {
        return Err(BlobError::Unusable(format!(
            "manifest lists {} records, blob holds {}",
            manifest.records,
            records.len()
        )));
    }
    Ok((JobCatalog::from_parts(index, records), generation))
}

fn check_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid store name '{}': use letters, digits, '-' or '_'", name),
        )))
    }
}

fn manifest_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.manifest.json"))
}

fn blob_path(dir: &Path, name: &str, generation: Uuid, kind: &str) -> PathBuf {
    dir.join(format!("{name}.{}.{kind}", generation.simple()))
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Make the renames inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, BlobError> {
    fs::read(path).map_err(|e| BlobError::Unusable(format!("{}: {}", path.display(), e)))
}

/// Delete blobs of `name` from generations other than `keep`.
fn remove_stale(dir: &Path, name: &str, keep: Uuid) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let prefix = format!("{name}.");
    let current = keep.simple().to_string();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(rest) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        let Some((generation, kind)) = rest.split_once('.') else {
            continue;
        };
        if !matches!(kind, "index" | "records") || generation == current {
            continue;
        }
        if Uuid::try_parse(generation).is_err() {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!(file = file_name, "removed stale artifact"),
            Err(e) => warn!(file = file_name, error = %e, "failed to remove stale artifact"),
        }
    }
}

fn header(magic: &[u8; 4], generation: Uuid) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(magic);
    buf.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    buf.extend_from_slice(generation.as_bytes());
    buf
}

fn seal(mut buf: Vec<u8>) -> Vec<u8> {
    let digest = Sha256::digest(&buf);
    buf.extend_from_slice(&digest);
    buf
}

fn encode_index(catalog: &JobCatalog, generation: Uuid) -> Vec<u8> {
    let index = catalog.index();
    let mut buf = header(INDEX_MAGIC, generation);
    buf.extend_from_slice(&(index.dims() as u32).to_le_bytes());
    buf.extend_from_slice(&index.next_seq().to_le_bytes());
    buf.extend_from_slice(&(index.slots().len() as u64).to_le_bytes());
    for entry in index.slots() {
        buf.extend_from_slice(&(entry.id.len() as u32).to_le_bytes());
        buf.extend_from_slice(entry.id.as_bytes());
        buf.extend_from_slice(&entry.seq.to_le_bytes());
        let mut flags = 0u8;
        if entry.low_confidence {
            flags |= FLAG_LOW_CONFIDENCE;
        }
        if entry.tombstoned {
            flags |= FLAG_TOMBSTONED;
        }
        buf.push(flags);
        buf.extend_from_slice(&vec_to_blob(&entry.vector));
    }
    seal(buf)
}

fn encode_records(catalog: &JobCatalog, generation: Uuid) -> StoreResult<Vec<u8>> {
    let records: Vec<&JobRecord> = catalog.records().iter().map(|r| r.as_ref()).collect();
    let mut buf = header(RECORDS_MAGIC, generation);
    buf.extend_from_slice(&serde_json::to_vec(&records)?);
    Ok(seal(buf))
}

/// Verify magic, checksum, version and generation. Returns the payload.
fn open_blob<'a>(bytes: &'a [u8], magic: &[u8; 4], generation: Uuid) -> Result<&'a [u8], BlobError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(BlobError::Unusable("artifact is truncated".to_string()));
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(BlobError::Unusable("checksum mismatch".to_string()));
    }
    if &body[..4] != magic {
        return Err(BlobError::Unusable("unexpected file type".to_string()));
    }
    let mut reader = Reader::new(&body[4..]);
    let version = reader.u32()?;
    if version != SCHEMA_VERSION {
        return Err(BlobError::Corrupt(format!(
            "unsupported schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }
    let stamped = Uuid::from_slice(reader.take(16)?)
        .map_err(|e| BlobError::Unusable(format!("bad generation id: {e}")))?;
    if stamped != generation {
        return Err(BlobError::Unusable(format!(
            "artifact belongs to generation {stamped}, manifest names {generation}"
        )));
    }
    Ok(&body[HEADER_LEN..])
}

fn decode_index(bytes: &[u8], generation: Uuid, dims: usize) -> Result<VectorIndex, BlobError> {
    let mut reader = Reader::new(open_blob(bytes, INDEX_MAGIC, generation)?);
    let stored_dims = reader.u32()? as usize;
    if stored_dims != dims {
        return Err(BlobError::Corrupt(format!(
            "index dimension {stored_dims} does not match {dims}"
        )));
    }
    let next_seq = reader.u64()?;
    let count = reader.u64()? as usize;

    let mut entries = Vec::with_capacity(count.min(reader.remaining() / (dims * 4 + 13).max(1)));
    for _ in 0..count {
        let id_len = reader.u32()? as usize;
        let id = std::str::from_utf8(reader.take(id_len)?)
            .map_err(|e| BlobError::Unusable(format!("invalid id: {e}")))?
            .to_string();
        let seq = reader.u64()?;
        let flags = reader.take(1)?[0];
        let vector: Arc<[f32]> = blob_to_vec(reader.take(dims * 4)?).into();
        entries.push(IndexEntry {
            id,
            vector,
            seq,
            low_confidence: flags & FLAG_LOW_CONFIDENCE != 0,
            tombstoned: flags & FLAG_TOMBSTONED != 0,
        });
    }
    if reader.remaining() != 0 {
        return Err(BlobError::Unusable("trailing bytes in index".to_string()));
    }
    VectorIndex::restore(dims, entries, next_seq).map_err(|e| BlobError::Corrupt(e.to_string()))
}

fn decode_records(bytes: &[u8], generation: Uuid) -> Result<RecordStore, BlobError> {
    let payload = open_blob(bytes, RECORDS_MAGIC, generation)?;
    let records: Vec<JobRecord> = serde_json::from_slice(payload)
        .map_err(|e| BlobError::Corrupt(format!("record blob does not parse: {e}")))?;
    let mut store = RecordStore::new();
    for record in records {
        store.put(record);
    }
    Ok(store)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BlobError> {
        if self.remaining() < n {
            return Err(BlobError::Unusable("artifact is truncated".to_string()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, BlobError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, BlobError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use jobscope_core::models::JobRow;
    use tempfile::TempDir;

    fn store_in(dir: &Path, dims: usize) -> JobStore {
        let mut config = Config::default();
        config.embedding.dims = dims;
        config.store.dir = dir.to_path_buf();
        JobStore::from_config(config).unwrap()
    }

    async fn seeded(dir: &Path) -> JobStore {
        let store = store_in(dir, 32);
        let rows = ["Backend Engineer", "Data Scientist", "QA Analyst"]
            .iter()
            .map(|title| JobRow {
                title: Some(title.to_string()),
                company: Some("Acme".into()),
                description: Some(format!("{title} working on production systems")),
                scrape_date: Some("2024-05-01".into()),
                ..JobRow::default()
            })
            .collect();
        store.ingest(rows).await.unwrap();
        store
    }

    fn index_blob(dir: &Path) -> PathBuf {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|e| e == "index"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_artifacts_load_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path(), 32);
        let outcome = store.load("jobs").await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Empty { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_only_latest_generation_is_kept() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(tmp.path()).await;
        store.save("jobs").await.unwrap();
        let second = store.save("jobs").await.unwrap();

        let blobs: Vec<PathBuf> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| !p.to_string_lossy().ends_with(".manifest.json"))
            .collect();
        assert_eq!(blobs.len(), 2);
        let current = second.generation.simple().to_string();
        assert!(blobs
            .iter()
            .all(|p| p.to_string_lossy().contains(&current)));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(tmp.path()).await;
        store.save("jobs").await.unwrap();

        let path = index_blob(tmp.path());
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let outcome = store.load("jobs").await.unwrap();
        match outcome {
            LoadOutcome::Empty { reason } => assert!(reason.contains("checksum")),
            other => panic!("expected Empty, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_blob_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(tmp.path()).await;
        store.save("jobs").await.unwrap();
        let path = index_blob(tmp.path());
        fs::write(&path, b"JSIX").unwrap();
        assert!(matches!(
            store.load("jobs").await.unwrap(),
            LoadOutcome::Empty { .. }
        ));
    }

    #[tokio::test]
    async fn test_unsupported_version_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(tmp.path()).await;
        let report = store.save("jobs").await.unwrap();

        let raw = fs::read_to_string(&report.manifest).unwrap();
        let mut manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
        manifest["schema_version"] = serde_json::json!(99);
        fs::write(&report.manifest, manifest.to_string()).unwrap();

        let err = store.load("jobs").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptPersistence { .. }));
        // The store keeps its previous state on a hard failure.
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        seeded(tmp.path()).await.save("jobs").await.unwrap();
        let other = store_in(tmp.path(), 64);
        let err = other.load("jobs").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptPersistence { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path(), 32);
        assert!(store.save("../escape").await.is_err());
        assert!(store.load("").await.is_err());
    }
}
