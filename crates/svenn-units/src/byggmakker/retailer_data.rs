use rusqlite::{params, Connection, OptionalExtension};
use svenn_batch::{BatchError, BatchProcessor, BatchRunStats};
use svenn_store::{ConnectionManager, Row, StoreError};
use tracing::{debug, info, warn};

use super::{product_id_by_ean, text, validate_ean, RAW_DATA, RETAILER_ID, SVENN_PRODUCTS};

pub const BASE_URL: &str = "https://www.byggmakker.no/produkt/";

const FETCH_SQL: &str = "
    SELECT b.name, b.ean, b.brand, b.category,
           COALESCE(s.sales_unit, e.sales_unit) AS sales_unit,
           COALESCE(s.comparison_price_unit, e.comparison_price_unit) AS comparison_price_unit
    FROM byggmakker_base_data b
    LEFT JOIN byggmakker_retailer_store_unit s ON b.ean = s.ean
    LEFT JOIN byggmakker_retailer_ecom_unit e ON b.ean = e.ean
    WHERE b.ean IS NOT NULL";

#[derive(Debug)]
struct RetailerProduct {
    ean: String,
    name: String,
    brand: Option<String>,
    category: String,
    sales_unit: Option<String>,
    comparison_unit: Option<String>,
}

enum Outcome {
    Created,
    Updated,
    NoProduct,
}

/// Maintains the Byggmakker listing of each product: variant name, brand,
/// category, units and product page URL.
pub struct RetailerData {
    db: ConnectionManager,
    batch_size: usize,
    created: usize,
    updated: usize,
    skipped: usize,
}

impl RetailerData {
    pub const NAME: &'static str = "retailer_data";

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

    fn parse(row: &Row) -> Option<RetailerProduct> {
        let ean = validate_ean(row.get("ean"))?;
        let (Some(name), Some(category)) = (text(row.get("name")), text(row.get("category")))
        else {
            warn!(ean = %ean, "skipping product: missing required data");
            return None;
        };
        Some(RetailerProduct {
            ean,
            name,
            brand: text(row.get("brand")),
            category,
            sales_unit: text(row.get("sales_unit")),
            comparison_unit: text(row.get("comparison_price_unit")),
        })
    }
}

/// `{BASE_URL}{slug}/{ean}` where the slug keeps ASCII alphanumerics and
/// folds every other run of characters into a single `-`.
pub fn product_url(name: &str, ean: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    format!("{BASE_URL}{slug}/{ean}")
}

fn category_id(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    let existing = conn
        .query_row(
            "SELECT category_id FROM categories WHERE category_name = ?1",
            [name],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute("INSERT INTO categories (category_name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

impl BatchProcessor for RetailerData {
    type Record = Row;

    fn name(&self) -> &str {
        "byggmakker/retailer_data"
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

        let outcome = self.db.transaction(SVENN_PRODUCTS, |conn| {
            let Some(product_id) = product_id_by_ean(conn, &product.ean)? else {
                return Ok::<_, BatchError>(Outcome::NoProduct);
            };
            let category_id = category_id(conn, &product.category)?;
            let url = product_url(&product.name, &product.ean);

            let updated = conn.execute(
                "UPDATE retailers_products
                 SET variant_name = ?1, brand = ?2, category_id = ?3,
                     retail_unit = ?4, retail_price_comparison_unit = ?5,
                     url_product = ?6, updated = datetime('now')
                 WHERE product_id = ?7 AND retailer_id = ?8",
                params![
                    product.name,
                    product.brand,
                    category_id,
                    product.sales_unit,
                    product.comparison_unit,
                    url,
                    product_id,
                    RETAILER_ID
                ],
            )?;
            if updated > 0 {
                return Ok(Outcome::Updated);
            }

            conn.execute(
                "INSERT INTO retailers_products (
                     retailer_id, product_id, variant_name, brand, category_id,
                     retail_unit, retail_price_comparison_unit, url_product, created, updated
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'), datetime('now'))",
                params![
                    RETAILER_ID,
                    product_id,
                    product.name,
                    product.brand,
                    category_id,
                    product.sales_unit,
                    product.comparison_unit,
                    url
                ],
            )?;
            Ok(Outcome::Created)
        })?;

        match outcome {
            Outcome::Created => {
                self.created += 1;
                debug!(ean = %product.ean, "inserted retailer product");
            }
            Outcome::Updated => {
                self.updated += 1;
                debug!(ean = %product.ean, "updated retailer product");
            }
            Outcome::NoProduct => {
                self.skipped += 1;
                warn!(ean = %product.ean, "no product found for EAN");
            }
        }
        Ok(())
    }

    fn log_summary(&self, _stats: &BatchRunStats) {
        info!(
            created = self.created,
            updated = self.updated,
            skipped = self.skipped,
            "retailer data details"
        );
    }
}
