use std::collections::BTreeMap;
use std::sync::Arc;

use svenn_core::config::{StoresConfig, DEFAULT_BATCH_SIZE};
use svenn_core::UnitLocator;
use svenn_store::ConnectionManager;
use tracing::{debug, warn};

use crate::error::{Result, UnitError};
use crate::unit::ProcessingUnit;

/// Everything a unit constructor may use to wire itself up.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub stores: StoresConfig,
    pub batch_size: usize,
}

impl UnitContext {
    pub fn new(stores: StoresConfig) -> Self {
        Self {
            stores,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// A fresh connection manager owned by the unit being built.
    pub fn connection_manager(&self) -> Result<ConnectionManager> {
        Ok(ConnectionManager::new(self.stores.clone())?)
    }
}

/// Builds a unit for one run.
pub type UnitFactory =
    Arc<dyn Fn(&UnitContext) -> Result<Box<dyn ProcessingUnit>> + Send + Sync>;

/// Maps locators to unit constructors.
///
/// Populated at startup; lookups never touch the filesystem. Units are built
/// fresh on every [`resolve`](Self::resolve), nothing is cached.
#[derive(Clone, Default)]
pub struct UnitRegistry {
    factories: BTreeMap<UnitLocator, UnitFactory>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `locator`, replacing any previous entry.
    pub fn register<F>(&mut self, locator: UnitLocator, factory: F)
    where
        F: Fn(&UnitContext) -> Result<Box<dyn ProcessingUnit>> + Send + Sync + 'static,
    {
        if self.factories.insert(locator.clone(), Arc::new(factory)).is_some() {
            warn!(unit = %locator, "processing unit re-registered, previous constructor replaced");
        } else {
            debug!(unit = %locator, "processing unit registered");
        }
    }

    pub fn contains(&self, locator: &UnitLocator) -> bool {
        self.factories.contains_key(locator)
    }

    /// Every registered locator, sorted.
    pub fn locators(&self) -> impl Iterator<Item = &UnitLocator> {
        self.factories.keys()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the unit registered under `locator`.
    ///
    /// Fails with [`UnitError::NotFound`] for an unknown locator and with
    /// [`UnitError::Load`] when the constructor itself fails.
    pub fn resolve(&self, locator: &UnitLocator, ctx: &UnitContext) -> Result<Box<dyn ProcessingUnit>> {
        let factory = self
            .factories
            .get(locator)
            .ok_or_else(|| UnitError::NotFound(locator.clone()))?;
        factory(ctx).map_err(|e| match e {
            UnitError::NotFound(_) | UnitError::Load { .. } => e,
            other => UnitError::Load {
                locator: locator.clone(),
                reason: other.to_string(),
            },
        })
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    impl ProcessingUnit for Noop {
        fn run(&mut self) -> svenn_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolve_unknown_locator_is_not_found() {
        let registry = UnitRegistry::new();
        let err = registry
            .resolve(&UnitLocator::new("acme", "prices"), &UnitContext::new(StoresConfig::new()))
            .err()
            .expect("must fail");
        assert!(matches!(err, UnitError::NotFound(_)));
        let svenn: svenn_core::SvennError = err.into();
        assert_eq!(svenn.kind(), svenn_core::ErrorKind::Resolution);
    }

    #[test]
    fn resolve_builds_a_fresh_unit_each_time() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut registry = UnitRegistry::new();
        registry.register(UnitLocator::new("acme", "noop"), move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Noop))
        });

        let ctx = UnitContext::new(StoresConfig::new());
        let loc = UnitLocator::new("acme", "noop");
        registry.resolve(&loc, &ctx).unwrap().run().unwrap();
        registry.resolve(&loc, &ctx).unwrap().run().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn constructor_failure_is_load_error() {
        let mut registry = UnitRegistry::new();
        registry.register(UnitLocator::new("acme", "needs_store"), |ctx| {
            let db = ctx.connection_manager()?;
            db.require(&["raw_data"])?;
            Ok(Box::new(Noop))
        });

        let err = registry
            .resolve(
                &UnitLocator::new("acme", "needs_store"),
                &UnitContext::new(StoresConfig::new()),
            )
            .err()
            .expect("must fail");
        assert!(matches!(err, UnitError::Load { .. }));
    }

    #[test]
    fn builtin_registry_lists_byggmakker_units() {
        let registry = crate::builtin();
        let names: Vec<String> = registry.locators().map(|l| l.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "byggmakker/base_data",
                "byggmakker/prices",
                "byggmakker/retailer_data",
                "byggmakker/store_data",
            ]
        );
    }
}
