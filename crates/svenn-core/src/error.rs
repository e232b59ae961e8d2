use thiserror::Error;

/// Coarse classification used by callers that translate errors into
/// user-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Resolution,
    Record,
    Run,
    Internal,
}

#[derive(Debug, Error)]
pub enum SvennError {
    /// Missing or invalid connection/config parameters. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed input on a create/update call (bad cron expression, missing fields).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The processing unit addressed by a locator is missing or could not be built.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A single record failed during batch processing.
    #[error("Record error: {0}")]
    Record(String),

    /// A batch-level or unit-level failure that aborted the run.
    #[error("Run failed: {0}")]
    Run(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SvennError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SvennError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short, stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            SvennError::Configuration(_) => "CONFIGURATION_ERROR",
            SvennError::Validation(_) => "VALIDATION_ERROR",
            SvennError::NotFound { .. } => "NOT_FOUND",
            SvennError::Resolution(_) => "RESOLUTION_ERROR",
            SvennError::Record(_) => "RECORD_ERROR",
            SvennError::Run(_) => "RUN_ERROR",
            SvennError::Database(_) => "DATABASE_ERROR",
            SvennError::Serialization(_) => "SERIALIZATION_ERROR",
            SvennError::Io(_) => "IO_ERROR",
            SvennError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SvennError::Configuration(_) => ErrorKind::Configuration,
            SvennError::Validation(_) => ErrorKind::Validation,
            SvennError::NotFound { .. } => ErrorKind::NotFound,
            SvennError::Resolution(_) => ErrorKind::Resolution,
            SvennError::Record(_) => ErrorKind::Record,
            SvennError::Run(_) => ErrorKind::Run,
            SvennError::Database(_)
            | SvennError::Serialization(_)
            | SvennError::Io(_)
            | SvennError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SvennError::Run(_) | SvennError::Database(_) | SvennError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, SvennError>;
