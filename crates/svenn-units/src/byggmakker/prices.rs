use rusqlite::params;
use serde_json::Value;
use svenn_batch::{BatchError, BatchProcessor, BatchRunStats};
use svenn_store::{ConnectionManager, Row, StoreError};
use tracing::{debug, info, warn};

use super::{product_id_by_ean, text, RAW_DATA, SVENN_PRODUCTS};

const FETCH_SQL: &str = "
    SELECT ean, store_id, price, comparison_price
    FROM byggmakker_store_prices
    WHERE ean IS NOT NULL AND store_id IS NOT NULL AND price IS NOT NULL";

/// Upserts per-store shelf prices keyed by `(store_id, product_id)`.
///
/// Unlike the other units, a bad price or an unknown EAN is a record error:
/// it is counted in the run statistics instead of silently skipped.
pub struct StorePrices {
    db: ConnectionManager,
    batch_size: usize,
    upserted: usize,
}

impl StorePrices {
    pub const NAME: &'static str = "prices";

    pub fn new(db: ConnectionManager, batch_size: usize) -> Result<Self, StoreError> {
        db.require(&[RAW_DATA, SVENN_PRODUCTS])?;
        Ok(Self {
            db,
            batch_size,
            upserted: 0,
        })
    }
}

/// A finite, non-negative decimal from a numeric or textual column.
fn parse_price(raw: Option<&Value>) -> Option<f64> {
    let value = match raw? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !value.is_finite() {
        return None;
    }
    if value < 0.0 {
        warn!(price = value, "negative price value");
        return None;
    }
    Some(value)
}

impl BatchProcessor for StorePrices {
    type Record = Row;

    fn name(&self) -> &str {
        "byggmakker/prices"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_candidates(&mut self) -> Result<Vec<Row>, BatchError> {
        Ok(self.db.execute_query(RAW_DATA, FETCH_SQL, [])?)
    }

    fn process_one(&mut self, record: &Row) -> Result<(), BatchError> {
        let ean = text(record.get("ean")).unwrap_or_default();
        let store_id = text(record.get("store_id"))
            .ok_or_else(|| BatchError::record(format!("missing store id for EAN {ean}")))?;
        // Zero counts as missing.
        let price = parse_price(record.get("price"))
            .filter(|p| *p > 0.0)
            .ok_or_else(|| BatchError::record(format!("invalid price for EAN {ean}")))?;
        let comparison_price = parse_price(record.get("comparison_price"));

        self.db.transaction(SVENN_PRODUCTS, |conn| {
            let product_id = product_id_by_ean(conn, &ean)?
                .ok_or_else(|| BatchError::record(format!("no product found for EAN {ean}")))?;
            conn.execute(
                "INSERT INTO store_prices
                     (store_id, product_id, price, comparison_price, created, updated)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'), datetime('now'))
                 ON CONFLICT (store_id, product_id) DO UPDATE SET
                     price = excluded.price,
                     comparison_price = excluded.comparison_price,
                     updated = datetime('now')",
                params![store_id, product_id, price, comparison_price],
            )?;
            Ok::<_, BatchError>(())
        })?;

        self.upserted += 1;
        debug!(ean = %ean, store_id = %store_id, "price upserted");
        Ok(())
    }

    fn log_summary(&self, stats: &BatchRunStats) {
        info!(
            upserted = self.upserted,
            rejected = stats.errors,
            "store price details"
        );
    }
}
