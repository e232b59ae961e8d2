use svenn_core::{SvennError, UnitLocator};
use svenn_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnitError {
    /// No unit is registered under the locator.
    #[error("processing unit not found: {0}")]
    NotFound(UnitLocator),

    /// The unit exists but its constructor failed.
    #[error("failed to load processing unit {locator}: {reason}")]
    Load { locator: UnitLocator, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, UnitError>;

impl From<UnitError> for SvennError {
    fn from(e: UnitError) -> Self {
        match e {
            UnitError::Store(store) => store.into(),
            other => SvennError::Resolution(other.to_string()),
        }
    }
}
