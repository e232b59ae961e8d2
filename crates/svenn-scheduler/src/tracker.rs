use chrono::{SubsecRound, Utc};
use svenn_core::SvennError;
use tracing::{error, warn};

use crate::error::Result;
use crate::store::JobStore;
use crate::types::{ExecutionRecord, RunStatus};

const ABANDONED: &str = "run ended without reporting an outcome";

/// Opens and closes execution records.
#[derive(Clone)]
pub struct ExecutionTracker {
    store: JobStore,
    error_message_limit: usize,
}

impl ExecutionTracker {
    pub fn new(store: JobStore, error_message_limit: usize) -> Self {
        Self {
            store,
            error_message_limit,
        }
    }

    /// Persist a `running` record for `job_id`, started now.
    ///
    /// The returned guard closes the record exactly once: explicitly through
    /// [`RunGuard::end_run`], or as failed when it is dropped unfinished
    /// (early return, `?`, unwinding).
    pub fn begin_run(&self, job_id: i64) -> Result<RunGuard<'_>> {
        let record = self.store.insert_execution(job_id, Utc::now())?;
        Ok(RunGuard {
            tracker: self,
            record,
            closed: false,
        })
    }

    fn close(&self, record: &mut ExecutionRecord, status: RunStatus, message: Option<String>) {
        let end = Utc::now().trunc_subsecs(6);
        let message = message.map(|m| truncate_message(&m, self.error_message_limit));
        match self
            .store
            .close_execution(record.id, status, end, message.as_deref())
        {
            Ok(true) => {}
            Ok(false) => warn!(execution_id = record.id, "execution record was already closed"),
            // Never let bookkeeping hide the run's own outcome.
            Err(e) => error!(execution_id = record.id, error = %e, "failed to close execution record"),
        }
        record.status = status;
        record.end_time = Some(end);
        record.error_message = message;
    }
}

/// A run in progress. See [`ExecutionTracker::begin_run`].
pub struct RunGuard<'a> {
    tracker: &'a ExecutionTracker,
    record: ExecutionRecord,
    closed: bool,
}

impl RunGuard<'_> {
    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    /// Close the record as `completed` or `failed` according to `outcome`
    /// and return its final state.
    pub fn end_run(mut self, outcome: &std::result::Result<(), SvennError>) -> ExecutionRecord {
        let (status, message) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };
        self.tracker.close(&mut self.record, status, message);
        self.closed = true;
        self.record.clone()
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(execution_id = self.record.id, "run guard dropped before end_run");
            self.tracker
                .close(&mut self.record, RunStatus::Failed, Some(ABANDONED.to_string()));
        }
    }
}

/// At most `limit` characters, cut on a char boundary and marked with `…`.
pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut out: String = message.chars().take(limit - 1).collect();
    out.push('…');
    out
}
