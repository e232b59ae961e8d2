use svenn_core::SvennError;
use svenn_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    /// One record could not be processed. Counted, logged, run continues.
    #[error("record rejected: {0}")]
    Record(String),

    /// Something beyond a single record broke (lost store, bad config).
    /// Aborts the whole run.
    #[error("fatal batch error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BatchError {
    pub fn record(msg: impl Into<String>) -> Self {
        BatchError::Record(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        BatchError::Fatal(msg.into())
    }

    /// Whether this error must abort the run instead of being counted
    /// against a single record.
    ///
    /// Query errors stay record-level; a store that cannot be opened or is
    /// not configured is systemic.
    pub fn is_fatal(&self) -> bool {
        match self {
            BatchError::Record(_) => false,
            BatchError::Fatal(_) => true,
            BatchError::Store(StoreError::Database(_)) => false,
            BatchError::Store(_) => true,
        }
    }
}

impl From<rusqlite::Error> for BatchError {
    fn from(e: rusqlite::Error) -> Self {
        BatchError::Store(StoreError::Database(e))
    }
}

impl From<BatchError> for SvennError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::Record(msg) => SvennError::Record(msg),
            BatchError::Fatal(msg) => SvennError::Run(msg),
            BatchError::Store(store) => match SvennError::from(store) {
                SvennError::Database(msg) => SvennError::Run(msg),
                other => other,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
