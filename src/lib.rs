//! # jobscope
//!
//! A local-first index of scraped job postings with semantic search,
//! structured filters and deduplication.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────────────┐
//! │ Row files  │──▶│  Ingest    │──▶│ JobStore             │
//! │ CSV/JSON   │   │ Norm+Embed │   │ VectorIndex+Records  │
//! └────────────┘   └────────────┘   └─────┬──────────┬─────┘
//!                                         │          │
//!                                         ▼          ▼
//!                                   ┌──────────┐ ┌─────────┐
//!                                   │  Search  │ │ Persist │
//!                                   └──────────┘ └─────────┘
//! ```
//!
//! The pure algorithms (index, record store, deduplication, query) live in
//! `jobscope-core`. This crate adds the encoder backends, configuration,
//! file I/O and the [`store::JobStore`] handle that every operation goes
//! through.
//!
//! ## Quick Start
//!
//! ```bash
//! jobscope ingest ./scrapes/          # CSV, JSON or JSONL rows
//! jobscope dedup
//! jobscope search "devops kubernetes" --mode remote
//! jobscope stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`encoder`] | Text encoder adapter and backends |
//! | [`normalize`] | Row cleanup and feature extraction |
//! | [`rows`] | Reading rows from files |
//! | [`store`] | The store handle and its locking discipline |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Similarity, filtered and keyword search |
//! | [`persist`] | Versioned save/load |
//! | [`stats`] | Store statistics |
//! | [`export`] | CSV/JSON export |

pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod ingest;
pub mod normalize;
pub mod persist;
pub mod rows;
pub mod search;
pub mod stats;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::JobStore;
