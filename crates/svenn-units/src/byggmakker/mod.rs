//! Byggmakker warehouse units.
//!
//! All four read from the `raw_data` store and upsert into `svenn_products`,
//! one explicit transaction per record. Run order for a full sync is
//! `base_data`, `store_data`, `retailer_data`, `prices`: the later units look
//! products up by EAN and skip rows whose product has not been created yet.

mod base_data;
mod prices;
mod retailer_data;
mod store_data;

pub use base_data::BaseData;
pub use prices::StorePrices;
pub use retailer_data::RetailerData;
pub use store_data::StoreData;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use svenn_core::UnitLocator;
use tracing::warn;

use crate::registry::UnitRegistry;
use crate::unit::BatchUnit;

pub const GROUP: &str = "byggmakker";
pub const RAW_DATA: &str = "raw_data";
pub const SVENN_PRODUCTS: &str = "svenn_products";
/// Row id of Byggmakker in the `retailers` table of the products store.
pub const RETAILER_ID: i64 = 1;

/// Add every Byggmakker unit to `registry`.
pub fn register(registry: &mut UnitRegistry) {
    registry.register(UnitLocator::new(GROUP, BaseData::NAME), |ctx| {
        Ok(Box::new(BatchUnit::new(BaseData::new(
            ctx.connection_manager()?,
            ctx.batch_size,
        )?)))
    });
    registry.register(UnitLocator::new(GROUP, StoreData::NAME), |ctx| {
        Ok(Box::new(BatchUnit::new(StoreData::new(
            ctx.connection_manager()?,
            ctx.batch_size,
        )?)))
    });
    registry.register(UnitLocator::new(GROUP, RetailerData::NAME), |ctx| {
        Ok(Box::new(BatchUnit::new(RetailerData::new(
            ctx.connection_manager()?,
            ctx.batch_size,
        )?)))
    });
    registry.register(UnitLocator::new(GROUP, StorePrices::NAME), |ctx| {
        Ok(Box::new(BatchUnit::new(StorePrices::new(
            ctx.connection_manager()?,
            ctx.batch_size,
        )?)))
    });
}

/// An EAN is 12 to 14 ASCII digits. Numbers and strings are both accepted.
pub(crate) fn validate_ean(raw: Option<&Value>) -> Option<String> {
    let ean = text(raw)?;
    if !ean.chars().all(|c| c.is_ascii_digit()) {
        warn!(ean = %ean, "invalid EAN (non-digits)");
        return None;
    }
    if !(12..=14).contains(&ean.len()) {
        warn!(ean = %ean, "invalid EAN length");
        return None;
    }
    Some(ean)
}

/// Trimmed, non-empty string form of a column value.
pub(crate) fn text(raw: Option<&Value>) -> Option<String> {
    let s = match raw? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

pub(crate) fn product_id_by_ean(conn: &Connection, ean: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT product_id FROM ean_codes WHERE ean_code = ?1",
        [ean],
        |r| r.get(0),
    )
    .optional()
}
