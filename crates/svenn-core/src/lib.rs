//! `svenn-core`: configuration, the shared error taxonomy and the
//! processing-unit locator used by every other `svenn-*` crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::SvennConfig;
pub use error::{ErrorKind, Result, SvennError};
pub use types::UnitLocator;
