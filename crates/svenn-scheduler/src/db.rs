use rusqlite::Connection;

use crate::error::Result;

/// Initialise the catalog, job and execution schema in `conn`.
///
/// Idempotent. Execution rows outlive their job: deleting a job clears the
/// reference instead of the history.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS warehouses (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL UNIQUE,
            description TEXT,
            created_at  TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scripts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            warehouse_id INTEGER NOT NULL REFERENCES warehouses (id) ON DELETE CASCADE,
            name         TEXT    NOT NULL,
            locator      TEXT    NOT NULL,   -- group/name
            description  TEXT,
            created_at   TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id     TEXT    NOT NULL UNIQUE,
            script_id       INTEGER NOT NULL REFERENCES scripts (id),
            cron_expression TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_executions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id        INTEGER REFERENCES jobs (id) ON DELETE SET NULL,
            start_time    TEXT    NOT NULL,
            end_time      TEXT,
            status        TEXT    NOT NULL,  -- running | completed | failed
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_scripts_warehouse ON scripts (warehouse_id);
        CREATE INDEX IF NOT EXISTS idx_executions_job ON job_executions (job_id, start_time);
        ",
    )?;
    Ok(())
}
