use rusqlite::params;
use serde_json::Value;
use svenn_batch::{BatchError, BatchProcessor, BatchRunStats};
use svenn_store::{ConnectionManager, Row, StoreError};
use tracing::{debug, info, warn};

use super::{product_id_by_ean, text, validate_ean, RAW_DATA, SVENN_PRODUCTS};

const FETCH_SQL: &str = "
    SELECT b.name, b.ean, b.product_id, b.images,
           COALESCE(s.sales_unit, e.sales_unit) AS sales_unit,
           COALESCE(s.comparison_price_unit, e.comparison_price_unit) AS comparison_price_unit
    FROM byggmakker_base_data b
    LEFT JOIN byggmakker_retailer_store_unit s ON b.ean = s.ean
    LEFT JOIN byggmakker_retailer_ecom_unit e ON b.ean = e.ean
    WHERE b.ean IS NOT NULL";

#[derive(Debug)]
struct Product {
    ean: String,
    name: String,
    unit: String,
    price_unit: String,
    nobb: Option<String>,
    images: Vec<String>,
}

/// Creates or refreshes the core product rows (name, units, EAN, NOBB,
/// images).
pub struct BaseData {
    db: ConnectionManager,
    batch_size: usize,
    created: usize,
    updated: usize,
    skipped: usize,
}

impl BaseData {
    pub const NAME: &'static str = "base_data";

    pub fn new(db: ConnectionManager, batch_size: usize) -> Result<Self, StoreError> {
        db.require(&[RAW_DATA, SVENN_PRODUCTS])?;
        Ok(Self {
            db,
            batch_size,
            created: 0,
            updated: 0,
            skipped: 0,
        })
    }

    fn parse(row: &Row) -> Option<Product> {
        let ean = validate_ean(row.get("ean"))?;
        let (Some(name), Some(unit), Some(price_unit)) = (
            text(row.get("name")),
            text(row.get("sales_unit")),
            text(row.get("comparison_price_unit")),
        ) else {
            warn!(ean = %ean, "skipping product: missing required data");
            return None;
        };
        Some(Product {
            ean,
            name,
            unit,
            price_unit,
            nobb: text(row.get("product_id")),
            images: parse_images(row.get("images")),
        })
    }
}

/// Images arrive either as a JSON array or as a JSON-encoded string of one.
fn parse_images(raw: Option<&Value>) -> Vec<String> {
    let strings = |items: &[Value]| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    };
    match raw {
        Some(Value::Array(items)) => strings(items),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => strings(&items),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

impl BatchProcessor for BaseData {
    type Record = Row;

    fn name(&self) -> &str {
        "byggmakker/base_data"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_candidates(&mut self) -> Result<Vec<Row>, BatchError> {
        Ok(self.db.execute_query(RAW_DATA, FETCH_SQL, [])?)
    }

    fn process_one(&mut self, record: &Row) -> Result<(), BatchError> {
        let Some(product) = Self::parse(record) else {
            self.skipped += 1;
            return Ok(());
        };

        let created = self.db.transaction(SVENN_PRODUCTS, |conn| {
            if let Some(product_id) = product_id_by_ean(conn, &product.ean)? {
                conn.execute(
                    "UPDATE products
                     SET base_name = ?1, base_unit = ?2, base_price_unit = ?3,
                         updated = datetime('now')
                     WHERE product_id = ?4",
                    params![product.name, product.unit, product.price_unit, product_id],
                )?;
                return Ok::<_, BatchError>(false);
            }

            conn.execute(
                "INSERT INTO products (base_name, base_unit, base_price_unit, updated)
                 VALUES (?1, ?2, ?3, datetime('now'))",
                params![product.name, product.unit, product.price_unit],
            )?;
            let product_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO ean_codes (ean_code, product_id) VALUES (?1, ?2)",
                params![product.ean, product_id],
            )?;
            if let Some(nobb) = &product.nobb {
                conn.execute(
                    "INSERT INTO nobb_codes (nobb_code, product_id) VALUES (?1, ?2)",
                    params![nobb, product_id],
                )?;
            }
            for url in &product.images {
                conn.execute(
                    "INSERT INTO product_images (product_id, image_url) VALUES (?1, ?2)",
                    params![product_id, url],
                )?;
            }
            Ok(true)
        })?;

        if created {
            self.created += 1;
            debug!(ean = %product.ean, "inserted new product");
        } else {
            self.updated += 1;
            debug!(ean = %product.ean, "updated product");
        }
        Ok(())
    }

    fn log_summary(&self, _stats: &BatchRunStats) {
        info!(
            created = self.created,
            updated = self.updated,
            skipped = self.skipped,
            "base data details"
        );
    }
}
