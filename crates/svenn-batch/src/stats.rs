use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one invocation of [`run_all`](crate::run_all).
///
/// Produced fresh per run and only used for the summary; nothing persists it.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunStats {
    pub started_at: DateTime<Utc>,
    /// Candidates returned by `fetch_candidates`.
    pub total: usize,
    /// Records whose `process_one` returned `Ok`.
    pub processed: usize,
    /// Records whose `process_one` failed or panicked.
    pub errors: usize,
    /// Chunks fully handled so far.
    pub chunks: usize,
    #[serde(skip)]
    clock: Instant,
}

impl BatchRunStats {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            total: 0,
            processed: 0,
            errors: 0,
            chunks: 0,
            clock: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Records reached so far (successful or not).
    pub fn seen(&self) -> usize {
        self.processed + self.errors
    }
}
