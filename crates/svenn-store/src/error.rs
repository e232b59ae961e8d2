use svenn_core::SvennError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A store entry is missing a required parameter.
    #[error("invalid configuration for store '{store}': {reason}")]
    Configuration { store: String, reason: String },

    /// No `[stores.<name>]` entry exists for the requested store.
    #[error("no configuration found for store: {0}")]
    UnknownStore(String),

    #[error("failed to open store '{store}': {source}")]
    Open {
        store: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for SvennError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Configuration { .. } | StoreError::UnknownStore(_) => {
                SvennError::Configuration(e.to_string())
            }
            StoreError::Open { .. } | StoreError::Database(_) => SvennError::Database(e.to_string()),
        }
    }
}
