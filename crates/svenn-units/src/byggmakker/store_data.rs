use rusqlite::{params, OptionalExtension};
use svenn_batch::{BatchError, BatchProcessor, BatchRunStats};
use svenn_store::{ConnectionManager, Row, StoreError};
use tracing::{debug, info, warn};

use super::{text, RAW_DATA, RETAILER_ID, SVENN_PRODUCTS};

enum Change {
    Inserted,
    Renamed,
    Unchanged,
}

/// Mirrors the Byggmakker store list into `stores`.
pub struct StoreData {
    db: ConnectionManager,
    batch_size: usize,
    inserted: usize,
    updated: usize,
    skipped: usize,
}

impl StoreData {
    pub const NAME: &'static str = "store_data";

    pub fn new(db: ConnectionManager, batch_size: usize) -> Result<Self, StoreError> {
        db.require(&[RAW_DATA, SVENN_PRODUCTS])?;
        Ok(Self {
            db,
            batch_size,
            inserted: 0,
            updated: 0,
            skipped: 0,
        })
    }
}

impl BatchProcessor for StoreData {
    type Record = Row;

    fn name(&self) -> &str {
        "byggmakker/store_data"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_candidates(&mut self) -> Result<Vec<Row>, BatchError> {
        Ok(self.db.execute_query(
            RAW_DATA,
            "SELECT store_id, store_name FROM byggmakker_store_ids ORDER BY store_id",
            [],
        )?)
    }

    fn process_one(&mut self, record: &Row) -> Result<(), BatchError> {
        let (Some(store_id), Some(store_name)) =
            (text(record.get("store_id")), text(record.get("store_name")))
        else {
            warn!("skipping store: missing required data");
            self.skipped += 1;
            return Ok(());
        };

        let change = self.db.transaction(SVENN_PRODUCTS, |conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT store_name FROM stores WHERE store_id = ?1",
                    [&store_id],
                    |r| r.get(0),
                )
                .optional()?;

            match existing {
                Some(name) if name == store_name => Ok::<_, BatchError>(Change::Unchanged),
                Some(_) => {
                    conn.execute(
                        "UPDATE stores SET store_name = ?1 WHERE store_id = ?2",
                        params![store_name, store_id],
                    )?;
                    Ok(Change::Renamed)
                }
                None => {
                    conn.execute(
                        "INSERT INTO stores (store_id, retailer_id, store_name) VALUES (?1, ?2, ?3)",
                        params![store_id, RETAILER_ID, store_name],
                    )?;
                    Ok(Change::Inserted)
                }
            }
        })?;

        match change {
            Change::Inserted => {
                self.inserted += 1;
                info!(store_id = %store_id, store_name = %store_name, "inserted new store");
            }
            Change::Renamed => {
                self.updated += 1;
                info!(store_id = %store_id, store_name = %store_name, "updated store");
            }
            Change::Unchanged => {
                self.skipped += 1;
                debug!(store_id = %store_id, "store unchanged");
            }
        }
        Ok(())
    }

    fn log_summary(&self, _stats: &BatchRunStats) {
        info!(
            inserted = self.inserted,
            updated = self.updated,
            skipped = self.skipped,
            "store processing details"
        );
    }
}
