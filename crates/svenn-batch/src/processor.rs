use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use svenn_core::config::DEFAULT_BATCH_SIZE;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::stats::BatchRunStats;

/// The capability set a concrete processing unit provides.
pub trait BatchProcessor {
    type Record;

    /// Name used in log lines (e.g. `"byggmakker/prices"`).
    fn name(&self) -> &str;

    /// Records handed to `process_one` per chunk.
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Pull the full candidate set from the source store in one call.
    /// Any error here aborts the run.
    fn fetch_candidates(&mut self) -> Result<Vec<Self::Record>>;

    /// Transform/upsert exactly one record.
    ///
    /// A non-fatal error (see [`crate::BatchError::is_fatal`]) is counted and the
    /// batch continues; a fatal one aborts the run.
    fn process_one(&mut self, record: &Self::Record) -> Result<()>;

    /// Extra, unit-specific summary lines. Called once after the standard
    /// summary of a run that processed at least one chunk.
    fn log_summary(&self, _stats: &BatchRunStats) {}
}

/// Drive `processor` over its whole candidate set.
///
/// An empty candidate set is a successful run. Record order is preserved
/// across chunks.
pub fn run_all<P>(processor: &mut P) -> Result<BatchRunStats>
where
    P: BatchProcessor + ?Sized,
{
    let mut stats = BatchRunStats::start();
    let unit = processor.name().to_string();
    info!(unit = %unit, "starting batch processing");

    let records = processor.fetch_candidates().map_err(|e| {
        error!(unit = %unit, error = %e, "failed to fetch candidates");
        e
    })?;

    if records.is_empty() {
        warn!(unit = %unit, "no data found to process");
        return Ok(stats);
    }

    let batch_size = processor.batch_size().max(1);
    let total_chunks = records.len().div_ceil(batch_size);
    stats.total = records.len();
    info!(
        unit = %unit,
        records = records.len(),
        chunks = total_chunks,
        "found records to process"
    );

    for (idx, chunk) in records.chunks(batch_size).enumerate() {
        let current = idx + 1;
        info!(unit = %unit, "processing batch {current}/{total_chunks}");
        if let Err(e) = process_chunk(processor, chunk, &mut stats) {
            error!(unit = %unit, batch = current, error = %e, "batch aborted");
            return Err(e);
        }
        stats.chunks += 1;
    }

    info!(
        unit = %unit,
        processed = stats.processed,
        errors = stats.errors,
        elapsed_secs = stats.elapsed().as_secs_f64(),
        "processing summary"
    );
    processor.log_summary(&stats);
    Ok(stats)
}

/// Process one chunk. Every record gets its own failure boundary so a bad
/// row (or a panic while handling it) never skips the rest of the chunk.
fn process_chunk<P>(processor: &mut P, chunk: &[P::Record], stats: &mut BatchRunStats) -> Result<()>
where
    P: BatchProcessor + ?Sized,
{
    for record in chunk {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process_one(record)));
        match outcome {
            Ok(Ok(())) => {
                stats.processed += 1;
            }
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                stats.errors += 1;
                error!(unit = processor.name(), error = %e, "error processing record");
            }
            Err(payload) => {
                stats.errors += 1;
                error!(
                    unit = processor.name(),
                    panic = %panic_message(payload.as_ref()),
                    "record processing panicked"
                );
            }
        }
    }
    debug!(unit = processor.name(), seen = stats.seen(), "chunk done");
    Ok(())
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;

    /// Fails every `fail_every`-th record (1-based); optionally turns one
    /// record into a fatal error or a panic.
    struct Numbers {
        items: Vec<u32>,
        batch_size: usize,
        fail_every: Option<u32>,
        fatal_at: Option<u32>,
        panic_at: Option<u32>,
        fetch_fails: bool,
        seen: Vec<u32>,
    }

    impl Numbers {
        fn new(n: u32) -> Self {
            Self {
                items: (1..=n).collect(),
                batch_size: 100,
                fail_every: None,
                fatal_at: None,
                panic_at: None,
                fetch_fails: false,
                seen: Vec::new(),
            }
        }
    }

    impl BatchProcessor for Numbers {
        type Record = u32;

        fn name(&self) -> &str {
            "test/numbers"
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn fetch_candidates(&mut self) -> Result<Vec<u32>> {
            if self.fetch_fails {
                return Err(BatchError::fatal("source store unreachable"));
            }
            Ok(self.items.clone())
        }

        fn process_one(&mut self, record: &u32) -> Result<()> {
            self.seen.push(*record);
            if self.panic_at == Some(*record) {
                panic!("boom at {record}");
            }
            if self.fatal_at == Some(*record) {
                return Err(BatchError::fatal("connection lost"));
            }
            if self.fail_every.is_some_and(|k| record % k == 0) {
                return Err(BatchError::record(format!("bad record {record}")));
            }
            Ok(())
        }
    }

    #[test]
    fn every_kth_record_fails_without_aborting() {
        for (n, k) in [(10, 2), (100, 7), (250, 3), (5, 9)] {
            let mut p = Numbers::new(n);
            p.batch_size = 16;
            p.fail_every = Some(k);
            let stats = run_all(&mut p).expect("run must complete");
            assert_eq!(stats.processed + stats.errors, n as usize);
            assert_eq!(stats.errors, (n / k) as usize);
            assert_eq!(stats.total, n as usize);
        }
    }

    #[test]
    fn single_bad_record_in_three() {
        struct Letters(Vec<&'static str>);
        impl BatchProcessor for Letters {
            type Record = &'static str;
            fn name(&self) -> &str {
                "test/letters"
            }
            fn fetch_candidates(&mut self) -> Result<Vec<&'static str>> {
                Ok(self.0.clone())
            }
            fn process_one(&mut self, record: &&'static str) -> Result<()> {
                if *record == "B" {
                    return Err(BatchError::record("bad record"));
                }
                Ok(())
            }
        }

        let stats = run_all(&mut Letters(vec!["A", "B", "C"])).unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn empty_candidate_set_is_success() {
        let mut p = Numbers::new(0);
        let stats = run_all(&mut p).expect("empty is not a failure");
        assert_eq!(stats.seen(), 0);
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn fetch_failure_propagates() {
        let mut p = Numbers::new(5);
        p.fetch_fails = true;
        let err = run_all(&mut p).unwrap_err();
        assert!(err.is_fatal());
        assert!(p.seen.is_empty());
    }

    #[test]
    fn fatal_error_aborts_remaining_chunks() {
        let mut p = Numbers::new(30);
        p.batch_size = 10;
        p.fatal_at = Some(15);
        let err = run_all(&mut p).unwrap_err();
        assert!(matches!(err, BatchError::Fatal(_)));
        assert_eq!(p.seen.last(), Some(&15));
        assert_eq!(p.seen.len(), 15);
    }

    #[test]
    fn panic_is_counted_as_record_error() {
        let mut p = Numbers::new(6);
        p.panic_at = Some(3);
        let stats = run_all(&mut p).unwrap();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn chunks_preserve_source_order() {
        let mut p = Numbers::new(23);
        p.batch_size = 5;
        let stats = run_all(&mut p).unwrap();
        assert_eq!(stats.chunks, 5);
        assert_eq!(p.seen, (1..=23).collect::<Vec<_>>());
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let mut p = Numbers::new(3);
        p.batch_size = 0;
        let stats = run_all(&mut p).unwrap();
        assert_eq!(stats.chunks, 3);
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload = panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");
        let payload = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }
}
