//! # jobscope core
//!
//! Pure logic for jobscope: job data models, the vector index, the record
//! store, the paired catalog that keeps both in sync, deduplication, and the
//! query algorithms.
//!
//! This crate contains no tokio, filesystem I/O, or network code. Encoding
//! text into vectors is abstracted behind [`embedding::TextEncoder`]; the
//! application crate supplies concrete encoders, persistence, and locking.

pub mod catalog;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod records;
pub mod text;

pub use error::{CoreError, Result};
