use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{
    ExecutionRecord, JobDefinition, NewScript, NewWarehouse, RunStatus, Script, ScriptUpdate,
    Warehouse, WarehouseUpdate,
};

/// Persistent storage for the catalog, job definitions and execution records.
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

pub(crate) fn to_sql_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamps are stored with microsecond precision; values handed back to
/// callers are truncated the same way so they compare equal after a reload.
fn stored_time(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(6)
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn row_to_warehouse(row: &Row<'_>) -> rusqlite::Result<Warehouse> {
    Ok(Warehouse {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: time_column(row, 3)?,
    })
}

fn row_to_script(row: &Row<'_>) -> rusqlite::Result<Script> {
    Ok(Script {
        id: row.get(0)?,
        warehouse_id: row.get(1)?,
        name: row.get(2)?,
        locator: row.get(3)?,
        description: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobDefinition> {
    Ok(JobDefinition {
        id: row.get(0)?,
        external_id: row.get(1)?,
        script_id: row.get(2)?,
        cron_expression: row.get(3)?,
        enabled: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let status: String = row.get(4)?;
    let status = status.parse::<RunStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into())
    })?;
    Ok(ExecutionRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        start_time: time_column(row, 2)?,
        end_time: opt_time_column(row, 3)?,
        status,
        error_message: row.get(5)?,
    })
}

const WAREHOUSE_COLS: &str = "id, name, description, created_at";
const SCRIPT_COLS: &str = "id, warehouse_id, name, locator, description, created_at";
const JOB_COLS: &str = "id, external_id, script_id, cron_expression, enabled, created_at";
const EXECUTION_COLS: &str = "id, job_id, start_time, end_time, status, error_message";

impl JobStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::poisoned("job store"))
    }

    // ── warehouses ──────────────────────────────────────────────────────────

    pub fn create_warehouse(&self, new: &NewWarehouse) -> Result<Warehouse> {
        let conn = self.conn()?;
        let now = stored_time(Utc::now());
        conn.execute(
            "INSERT INTO warehouses (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![new.name, new.description, to_sql_time(now)],
        )?;
        Ok(Warehouse {
            id: conn.last_insert_rowid(),
            name: new.name.clone(),
            description: new.description.clone(),
            created_at: now,
        })
    }

    pub fn list_warehouses(&self) -> Result<Vec<Warehouse>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {WAREHOUSE_COLS} FROM warehouses ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_warehouse)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_warehouse(&self, id: i64) -> Result<Warehouse> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {WAREHOUSE_COLS} FROM warehouses WHERE id = ?1"),
            [id],
            row_to_warehouse,
        )
        .optional()?
        .ok_or_else(|| SchedulerError::not_found("warehouse", id))
    }

    pub fn warehouse_name_taken(&self, name: &str, except: Option<i64>) -> Result<bool> {
        let conn = self.conn()?;
        let hit: Option<i64> = conn
            .query_row("SELECT id FROM warehouses WHERE name = ?1", [name], |r| r.get(0))
            .optional()?;
        Ok(hit.is_some_and(|id| Some(id) != except))
    }

    pub fn update_warehouse(&self, id: i64, update: &WarehouseUpdate) -> Result<Warehouse> {
        let current = self.get_warehouse(id)?;
        let name = update.name.clone().unwrap_or(current.name);
        let description = update.description.clone().or(current.description);
        self.conn()?.execute(
            "UPDATE warehouses SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, id],
        )?;
        Ok(Warehouse {
            id,
            name,
            description,
            created_at: current.created_at,
        })
    }

    /// Delete a warehouse and, by cascade, its scripts.
    pub fn delete_warehouse(&self, id: i64) -> Result<()> {
        let n = self.conn()?.execute("DELETE FROM warehouses WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::not_found("warehouse", id));
        }
        Ok(())
    }

    /// Jobs attached to any script of the warehouse.
    pub fn count_jobs_in_warehouse(&self, warehouse_id: i64) -> Result<i64> {
        Ok(self.conn()?.query_row(
            "SELECT COUNT(*) FROM jobs j JOIN scripts s ON s.id = j.script_id
             WHERE s.warehouse_id = ?1",
            [warehouse_id],
            |r| r.get(0),
        )?)
    }

    // ── scripts ─────────────────────────────────────────────────────────────

    pub fn create_script(&self, warehouse_id: i64, new: &NewScript) -> Result<Script> {
        self.get_warehouse(warehouse_id)?;
        let conn = self.conn()?;
        let now = stored_time(Utc::now());
        conn.execute(
            "INSERT INTO scripts (warehouse_id, name, locator, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![warehouse_id, new.name, new.locator, new.description, to_sql_time(now)],
        )?;
        Ok(Script {
            id: conn.last_insert_rowid(),
            warehouse_id,
            name: new.name.clone(),
            locator: new.locator.clone(),
            description: new.description.clone(),
            created_at: now,
        })
    }

    pub fn scripts_for(&self, warehouse_id: i64) -> Result<Vec<Script>> {
        self.get_warehouse(warehouse_id)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLS} FROM scripts WHERE warehouse_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([warehouse_id], row_to_script)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_script(&self, id: i64) -> Result<Script> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SCRIPT_COLS} FROM scripts WHERE id = ?1"),
            [id],
            row_to_script,
        )
        .optional()?
        .ok_or_else(|| SchedulerError::not_found("script", id))
    }

    pub fn update_script(&self, id: i64, update: &ScriptUpdate) -> Result<Script> {
        let current = self.get_script(id)?;
        let name = update.name.clone().unwrap_or(current.name);
        let locator = update.locator.clone().unwrap_or(current.locator);
        let description = update.description.clone().or(current.description);
        self.conn()?.execute(
            "UPDATE scripts SET name = ?1, locator = ?2, description = ?3 WHERE id = ?4",
            params![name, locator, description, id],
        )?;
        Ok(Script {
            id,
            warehouse_id: current.warehouse_id,
            name,
            locator,
            description,
            created_at: current.created_at,
        })
    }

    pub fn delete_script(&self, id: i64) -> Result<()> {
        let n = self.conn()?.execute("DELETE FROM scripts WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::not_found("script", id));
        }
        Ok(())
    }

    // ── jobs ────────────────────────────────────────────────────────────────

    pub fn insert_job(
        &self,
        external_id: &str,
        script_id: i64,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<JobDefinition> {
        let conn = self.conn()?;
        let now = stored_time(Utc::now());
        conn.execute(
            "INSERT INTO jobs (external_id, script_id, cron_expression, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![external_id, script_id, cron_expression, enabled, to_sql_time(now)],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                SchedulerError::Validation(format!("job '{external_id}' already exists"))
            }
            other => other.into(),
        })?;
        Ok(JobDefinition {
            id: conn.last_insert_rowid(),
            external_id: external_id.to_string(),
            script_id,
            cron_expression: cron_expression.to_string(),
            enabled,
            created_at: now,
        })
    }

    pub fn get_job(&self, id: i64) -> Result<JobDefinition> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {JOB_COLS} FROM jobs WHERE id = ?1"),
            [id],
            row_to_job,
        )
        .optional()?
        .ok_or_else(|| SchedulerError::not_found("job", id))
    }

    pub fn job_by_external_id(&self, external_id: &str) -> Result<Option<JobDefinition>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {JOB_COLS} FROM jobs WHERE external_id = ?1"),
                [external_id],
                row_to_job,
            )
            .optional()?)
    }

    /// Scheduled jobs only; transient ad-hoc rows are left out.
    pub fn list_jobs(&self) -> Result<Vec<JobDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLS} FROM jobs WHERE external_id NOT LIKE 'temp\\_%' ESCAPE '\\'
             ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn enabled_jobs(&self) -> Result<Vec<JobDefinition>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {JOB_COLS} FROM jobs WHERE enabled = 1 ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn count_jobs_for_script(&self, script_id: i64) -> Result<i64> {
        Ok(self.conn()?.query_row(
            "SELECT COUNT(*) FROM jobs WHERE script_id = ?1",
            [script_id],
            |r| r.get(0),
        )?)
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let n = self
            .conn()?
            .execute("UPDATE jobs SET enabled = ?1 WHERE id = ?2", params![enabled, id])?;
        if n == 0 {
            return Err(SchedulerError::not_found("job", id));
        }
        Ok(())
    }

    pub fn set_cron(&self, id: i64, cron_expression: &str) -> Result<()> {
        let n = self.conn()?.execute(
            "UPDATE jobs SET cron_expression = ?1 WHERE id = ?2",
            params![cron_expression, id],
        )?;
        if n == 0 {
            return Err(SchedulerError::not_found("job", id));
        }
        Ok(())
    }

    pub fn delete_job(&self, id: i64) -> Result<()> {
        let n = self.conn()?.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::not_found("job", id));
        }
        Ok(())
    }

    // ── executions ──────────────────────────────────────────────────────────

    pub fn insert_execution(&self, job_id: i64, start: DateTime<Utc>) -> Result<ExecutionRecord> {
        let start = stored_time(start);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO job_executions (job_id, start_time, status) VALUES (?1, ?2, ?3)",
            params![job_id, to_sql_time(start), RunStatus::Running.to_string()],
        )?;
        Ok(ExecutionRecord {
            id: conn.last_insert_rowid(),
            job_id: Some(job_id),
            start_time: start,
            end_time: None,
            status: RunStatus::Running,
            error_message: None,
        })
    }

    /// Write the terminal state of a running record. A record that is
    /// already terminal is left untouched and `false` is returned.
    pub fn close_execution(
        &self,
        id: i64,
        status: RunStatus,
        end: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let n = self.conn()?.execute(
            "UPDATE job_executions SET status = ?1, end_time = ?2, error_message = ?3
             WHERE id = ?4 AND status = 'running'",
            params![status.to_string(), to_sql_time(end), error_message, id],
        )?;
        Ok(n == 1)
    }

    pub fn get_execution(&self, id: i64) -> Result<ExecutionRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {EXECUTION_COLS} FROM job_executions WHERE id = ?1"),
            [id],
            row_to_execution,
        )
        .optional()?
        .ok_or_else(|| SchedulerError::not_found("execution", id))
    }

    /// Execution history of a job, newest first.
    pub fn executions_for(&self, job_id: i64) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLS} FROM job_executions WHERE job_id = ?1
             ORDER BY start_time DESC, id DESC"
        ))?;
        let rows = stmt.query_map([job_id], row_to_execution)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn last_run_start(&self, job_id: i64) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn.query_row(
            "SELECT MAX(start_time) FROM job_executions WHERE job_id = ?1",
            [job_id],
            |r| r.get(0),
        )?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SchedulerError::Internal(format!("bad start_time '{s}': {e}")))
        })
        .transpose()
    }
}
