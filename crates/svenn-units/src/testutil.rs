//! Throwaway on-disk stores shaped like the Byggmakker raw and products
//! databases.

use svenn_core::config::{StoreConfig, StoresConfig};
use svenn_store::ConnectionManager;

use crate::byggmakker::{RAW_DATA, SVENN_PRODUCTS};

const RAW_DDL: &str = "
    CREATE TABLE byggmakker_base_data (
        ean TEXT, name TEXT, product_id TEXT, images TEXT, brand TEXT, category TEXT
    );
    CREATE TABLE byggmakker_retailer_store_unit (
        ean TEXT, sales_unit TEXT, comparison_price_unit TEXT
    );
    CREATE TABLE byggmakker_retailer_ecom_unit (
        ean TEXT, sales_unit TEXT, comparison_price_unit TEXT
    );
    CREATE TABLE byggmakker_store_ids (store_id TEXT, store_name TEXT);
    CREATE TABLE byggmakker_store_prices (
        ean TEXT, store_id TEXT, price REAL, comparison_price REAL
    );
";

const PRODUCTS_DDL: &str = "
    CREATE TABLE products (
        product_id      INTEGER PRIMARY KEY AUTOINCREMENT,
        base_name       TEXT NOT NULL,
        base_unit       TEXT NOT NULL,
        base_price_unit TEXT NOT NULL,
        updated         TEXT
    );
    CREATE TABLE ean_codes (ean_code TEXT PRIMARY KEY, product_id INTEGER NOT NULL);
    CREATE TABLE nobb_codes (nobb_code TEXT NOT NULL, product_id INTEGER NOT NULL);
    CREATE TABLE product_images (product_id INTEGER NOT NULL, image_url TEXT NOT NULL);
    CREATE TABLE stores (
        store_id TEXT PRIMARY KEY, retailer_id INTEGER NOT NULL, store_name TEXT NOT NULL
    );
    CREATE TABLE categories (
        category_id INTEGER PRIMARY KEY AUTOINCREMENT, category_name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE retailers_products (
        retailer_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        variant_name TEXT,
        brand TEXT,
        category_id INTEGER,
        retail_unit TEXT,
        retail_price_comparison_unit TEXT,
        url_product TEXT,
        created TEXT,
        updated TEXT,
        PRIMARY KEY (product_id, retailer_id)
    );
    CREATE TABLE store_prices (
        store_id TEXT NOT NULL,
        product_id INTEGER NOT NULL,
        price REAL NOT NULL,
        comparison_price REAL,
        created TEXT,
        updated TEXT,
        UNIQUE (store_id, product_id)
    );
";

pub(crate) struct Stores {
    _dir: tempfile::TempDir,
    pub config: StoresConfig,
}

impl Stores {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = StoresConfig::new();
        config.insert(
            RAW_DATA.to_string(),
            StoreConfig::new(dir.path().join("raw.db").to_string_lossy()),
        );
        config.insert(
            SVENN_PRODUCTS.to_string(),
            StoreConfig::new(dir.path().join("products.db").to_string_lossy()),
        );
        let stores = Self { _dir: dir, config };
        let mut db = stores.manager();
        db.acquire(RAW_DATA).unwrap().execute_batch(RAW_DDL).unwrap();
        db.acquire(SVENN_PRODUCTS).unwrap().execute_batch(PRODUCTS_DDL).unwrap();
        stores
    }

    pub fn manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.config.clone()).expect("valid stores")
    }

    pub fn raw(&self, sql: &str) {
        self.manager().acquire(RAW_DATA).unwrap().execute_batch(sql).unwrap();
    }

    pub fn products(&self, sql: &str) {
        self.manager().acquire(SVENN_PRODUCTS).unwrap().execute_batch(sql).unwrap();
    }

    pub fn count(&self, table: &str) -> i64 {
        self.manager()
            .acquire(SVENN_PRODUCTS)
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    pub fn scalar<T: rusqlite::types::FromSql>(&self, sql: &str) -> T {
        self.manager()
            .acquire(SVENN_PRODUCTS)
            .unwrap()
            .query_row(sql, [], |r| r.get(0))
            .unwrap()
    }
}
