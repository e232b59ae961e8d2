//! `svenn-units`: the processing-unit registry and the built-in warehouse
//! units.
//!
//! Jobs address units by a [`UnitLocator`](svenn_core::UnitLocator)
//! (`group/name`). The [`UnitRegistry`] maps each locator to a constructor that
//! is invoked fresh for every run, so a unit always gets its own
//! [`ConnectionManager`](svenn_store::ConnectionManager).

pub mod byggmakker;
pub mod error;
pub mod registry;
pub mod unit;

#[cfg(test)]
mod testutil;

pub use error::{Result, UnitError};
pub use registry::{UnitContext, UnitRegistry};
pub use unit::{BatchUnit, ProcessingUnit};

/// Registry with every unit that ships with this crate.
pub fn builtin() -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    byggmakker::register(&mut registry);
    registry
}
