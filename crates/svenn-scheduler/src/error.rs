use svenn_core::SvennError;
use svenn_units::UnitError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Not exactly five fields, or a field the cron evaluator rejects.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Unit(#[from] UnitError),

    /// The run reached its execution record and then failed. Carries the
    /// original failure so callers see the real cause.
    #[error("run failed: {0}")]
    RunFailed(#[source] SvennError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        SchedulerError::NotFound { entity, id }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        SchedulerError::Internal(format!("{what} lock poisoned"))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for SvennError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Database(e) => SvennError::Database(e.to_string()),
            SchedulerError::InvalidCron { .. } => SvennError::Validation(e.to_string()),
            SchedulerError::Validation(msg) => SvennError::Validation(msg),
            SchedulerError::NotFound { entity, id } => SvennError::not_found(entity, id),
            SchedulerError::Unit(unit) => unit.into(),
            SchedulerError::RunFailed(inner) => inner,
            SchedulerError::Internal(msg) => SvennError::Internal(msg),
        }
    }
}
