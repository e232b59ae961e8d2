//! `svenn-store`: named, lazily opened SQLite stores with scoped
//! commit/rollback discipline.
//!
//! A [`ConnectionManager`] is built from the `[stores.*]` config tables and is
//! meant to be owned by exactly one run at a time: every method that touches a
//! connection takes `&mut self`, so two workers cannot share a handle.

pub mod error;
pub mod manager;
pub mod row;

pub use error::{Result, StoreError};
pub use manager::ConnectionManager;
pub use row::Row;
