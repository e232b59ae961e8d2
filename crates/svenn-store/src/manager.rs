use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Params};
use svenn_core::config::{StoreConfig, StoresConfig};
use tracing::{debug, error, info, warn};

use crate::error::{Result, StoreError};
use crate::row::{to_row, Row};

/// Owns one lazily opened connection per configured store.
///
/// Connections stay open across calls and are reused; a connection that no
/// longer answers a ping is dropped and reopened on the next acquisition.
/// Dropping the manager closes everything it still holds.
pub struct ConnectionManager {
    configs: StoresConfig,
    connections: HashMap<String, Connection>,
}

impl ConnectionManager {
    /// Validate every store entry and build an empty manager.
    ///
    /// Fails with [`StoreError::Configuration`] if any entry lacks a `path`.
    /// Nothing is opened here.
    pub fn new(configs: StoresConfig) -> Result<Self> {
        for (name, config) in &configs {
            validate(name, config)?;
        }
        Ok(Self {
            configs,
            connections: HashMap::new(),
        })
    }

    /// Fail unless every named store has a config entry.
    pub fn require(&self, stores: &[&str]) -> Result<()> {
        let missing: Vec<&str> = stores
            .iter()
            .copied()
            .filter(|s| !self.configs.contains_key(*s))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Configuration {
                store: missing.join(", "),
                reason: "store is required but not configured".to_string(),
            })
        }
    }

    /// Names of every configured store.
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// Number of currently open connections.
    pub fn open_count(&self) -> usize {
        self.connections.len()
    }

    /// Open `store` or hand back the live connection already held for it.
    pub fn acquire(&mut self, store: &str) -> Result<&Connection> {
        self.connection(store).map(|c| &*c)
    }

    /// Run `body` against `store` inside a scoped cursor.
    ///
    /// Commits when `body` returns `Ok`, rolls back otherwise; the caller never
    /// decides.
    pub fn with_cursor<T, E, F>(&mut self, store: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<StoreError> + Display,
    {
        let conn = self.connection(store)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        match body(&tx) {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    error!(store, error = %rb, "rollback failed");
                }
                warn!(store, error = %e, "database operation failed, rolled back");
                Err(e)
            }
        }
    }

    /// Like [`with_cursor`](Self::with_cursor) but brackets `body` with
    /// explicit `BEGIN` / `COMMIT` / `ROLLBACK` statements.
    ///
    /// The transaction is rolled back on `Err`, on a failed commit, and when
    /// `body` unwinds, so the connection is never left inside an open
    /// transaction.
    pub fn transaction<T, E, F>(&mut self, store: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<StoreError> + Display,
    {
        let begin = match self.configs.get(store) {
            Some(c) if c.read_only => "BEGIN DEFERRED",
            _ => "BEGIN IMMEDIATE",
        };
        let conn: &Connection = self.connection(store)?;
        conn.execute_batch(begin).map_err(StoreError::from)?;
        let mut open = OpenTransaction {
            conn,
            store,
            active: true,
        };

        match body(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT").map_err(StoreError::from)?;
                open.active = false;
                Ok(value)
            }
            Err(e) => {
                drop(open);
                error!(store, error = %e, "transaction failed, rolled back");
                Err(e)
            }
        }
    }

    /// Run `sql` in a scoped cursor and collect every row keyed by column name.
    pub fn execute_query<P: Params>(&mut self, store: &str, sql: &str, params: P) -> Result<Vec<Row>> {
        self.with_cursor(store, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let rows = stmt
                .query_map(params, |r| to_row(r, &columns))?
                .collect::<rusqlite::Result<Vec<Row>>>()?;
            Ok::<_, StoreError>(rows)
        })
    }

    /// Close every open connection. Safe to call repeatedly.
    pub fn close_all(&mut self) {
        for (store, conn) in self.connections.drain() {
            match conn.close() {
                Ok(()) => debug!(store = %store, "connection closed"),
                Err((_conn, e)) => warn!(store = %store, error = %e, "connection close failed"),
            }
        }
    }

    fn connection(&mut self, store: &str) -> Result<&mut Connection> {
        let config = self
            .configs
            .get(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;

        let alive = self.connections.get(store).is_some_and(is_alive);
        if !alive {
            if self.connections.remove(store).is_some() {
                warn!(store, "connection no longer usable, reopening");
            }
            let conn = open_store(store, config)?;
            info!(store, path = %config.path, "store connection opened");
            self.connections.insert(store.to_string(), conn);
        }

        self.connections
            .get_mut(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Rolls back an explicit transaction unless it was committed.
struct OpenTransaction<'a> {
    conn: &'a Connection,
    store: &'a str,
    active: bool,
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if std::thread::panicking() {
            warn!(store = self.store, "transaction body panicked, rolling back");
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            error!(store = self.store, error = %e, "rollback failed");
        }
    }
}

fn validate(name: &str, config: &StoreConfig) -> Result<()> {
    if config.path.trim().is_empty() {
        return Err(StoreError::Configuration {
            store: name.to_string(),
            reason: "missing required field: path".to_string(),
        });
    }
    Ok(())
}

fn open_store(name: &str, config: &StoreConfig) -> Result<Connection> {
    let flags = if config.read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::default()
    };
    let conn = Connection::open_with_flags(&config.path, flags).map_err(|source| StoreError::Open {
        store: name.to_string(),
        source,
    })?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(conn)
}

fn is_alive(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok()
}
