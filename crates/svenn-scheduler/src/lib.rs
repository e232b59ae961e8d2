//! `svenn-scheduler`: cron triggers, job storage and execution tracking.
//!
//! # Overview
//!
//! Jobs are persisted to SQLite (`jobs`, with the `warehouses` and `scripts`
//! catalog they point at). The [`Scheduler`] keeps a live [`TriggerRegistry`]
//! in step with the persisted jobs and, while its evaluation loop runs, fires
//! every due trigger on its own blocking worker.
//!
//! Each run goes through the [`ExecutionTracker`]: a `running` record is
//! written first, the job's processing unit is resolved and run, and the
//! record is closed as `completed` or `failed` on every exit path.
//!
//! # Trigger lifecycle
//!
//! | Operation      | Live trigger present      | Live trigger missing        |
//! |----------------|---------------------------|-----------------------------|
//! | `add_job`      | n/a (armed)               | n/a (armed)                 |
//! | `remove_job`   | removed                   | warning, row still deleted  |
//! | `toggle_job` ↓ | paused                    | nothing to pause            |
//! | `toggle_job` ↑ | resumed                   | recreated from storage      |
//! | `update_job`   | rescheduled in place      | recreated if enabled        |

pub mod catalog;
pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;
pub mod tracker;
pub mod triggers;
pub mod types;

pub use engine::{RunReport, Scheduler};
pub use error::{Result, SchedulerError};
pub use schedule::CronExpr;
pub use store::JobStore;
pub use tracker::{ExecutionTracker, RunGuard};
pub use triggers::{TriggerInfo, TriggerRegistry, TriggerUpdate};
pub use types::{
    ExecutionRecord, JobDefinition, NewScript, NewWarehouse, RunStatus, Script, ScriptUpdate,
    Warehouse, WarehouseUpdate,
};
