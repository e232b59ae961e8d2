//! `svenn-batch`: "fetch once, process in chunks" execution skeleton.
//!
//! A concrete unit implements [`BatchProcessor`] (`fetch_candidates` +
//! `process_one`) and hands itself to [`run_all`], which takes care of
//! chunking, per-record failure isolation and the end-of-run summary.

pub mod error;
pub mod processor;
pub mod stats;

pub use error::{BatchError, Result};
pub use processor::{panic_message, run_all, BatchProcessor};
pub use stats::BatchRunStats;
