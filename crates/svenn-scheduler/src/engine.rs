use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use rusqlite::Connection;
use svenn_batch::panic_message;
use svenn_core::config::{MisfirePolicy, SchedulerConfig};
use svenn_core::{SvennError, UnitLocator};
use svenn_units::{UnitContext, UnitRegistry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::schedule::CronExpr;
use crate::store::JobStore;
use crate::tracker::ExecutionTracker;
use crate::triggers::{TriggerRegistry, TriggerUpdate};
use crate::types::{ExecutionRecord, JobDefinition};

/// Placeholder cron expression of transient ad-hoc jobs. Never armed.
pub const ONCE: &str = "once";

/// The outcome of one run: its closed execution record and the original
/// failure, if any.
#[derive(Debug)]
pub struct RunReport {
    pub execution: ExecutionRecord,
    pub outcome: std::result::Result<(), SvennError>,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the live triggers and runs jobs when they fire.
///
/// Build with [`Scheduler::new`], arm persisted jobs and spawn the
/// evaluation loop with [`start`](Self::start), and shut down with
/// [`stop`](Self::stop). Job operations work whether or not the loop is
/// running; triggers only fire while it is.
pub struct Scheduler {
    store: JobStore,
    tracker: ExecutionTracker,
    triggers: TriggerRegistry,
    units: UnitRegistry,
    unit_ctx: UnitContext,
    config: SchedulerConfig,
    running: DashSet<i64>,
    loop_handle: Mutex<Option<LoopHandle>>,
}

/// Frees a job's overlap slot when its run ends, however it ends.
struct RunningSlot {
    scheduler: Arc<Scheduler>,
    job_id: i64,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.scheduler.running.remove(&self.job_id);
    }
}

/// Deletes a transient ad-hoc job row when dropped.
struct TempJob {
    store: JobStore,
    job_id: i64,
}

impl Drop for TempJob {
    fn drop(&mut self) {
        match self.store.delete_job(self.job_id) {
            Ok(()) => debug!(job_id = self.job_id, "temporary job removed"),
            Err(e) => error!(job_id = self.job_id, error = %e, "failed to remove temporary job"),
        }
    }
}

impl Scheduler {
    pub fn new(
        conn: Connection,
        units: UnitRegistry,
        unit_ctx: UnitContext,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>> {
        let store = JobStore::new(conn)?;
        Ok(Self::with_store(store, units, unit_ctx, config))
    }

    pub fn with_store(
        store: JobStore,
        units: UnitRegistry,
        unit_ctx: UnitContext,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let tracker = ExecutionTracker::new(store.clone(), config.error_message_limit);
        Arc::new(Self {
            store,
            tracker,
            triggers: TriggerRegistry::new(),
            units,
            unit_ctx,
            config,
            running: DashSet::new(),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn is_running(&self, job_id: i64) -> bool {
        self.running.contains(&job_id)
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Re-arm every enabled job from storage and spawn the evaluation loop.
    /// Calling it on a started scheduler is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self
            .loop_handle
            .lock()
            .map_err(|_| SchedulerError::poisoned("scheduler loop"))?;
        if slot.is_some() {
            warn!("scheduler already started");
            return Ok(());
        }

        let armed = self.reconcile(Utc::now())?;
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(self).run(rx));
        *slot = Some(LoopHandle { shutdown, task });
        info!(armed, policy = ?self.config.misfire_policy, "scheduler started");
        Ok(())
    }

    /// Stop the evaluation loop and wait for it to exit. Runs already in
    /// flight are not cancelled.
    pub async fn stop(&self) {
        let handle = match self.loop_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            debug!("scheduler not running");
            return;
        };
        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.task.await {
            error!("scheduler loop ended abnormally: {e}");
        }
        info!("scheduler stopped");
    }

    /// Arm a trigger for every enabled job. Returns how many were armed.
    ///
    /// With [`MisfirePolicy::RunOnce`] a job whose most recent scheduled time
    /// since its last run (or creation) has already passed gets a single
    /// immediate catch-up fire.
    pub fn reconcile(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut armed = 0;
        for job in self.store.enabled_jobs()? {
            let cron = match CronExpr::parse(&job.cron_expression) {
                Ok(cron) => cron,
                Err(e) => {
                    error!(job_id = job.id, error = %e, "stored job has an invalid schedule, not armed");
                    continue;
                }
            };
            match self.missed_fire(&job, &cron, now)? {
                Some(missed) => {
                    info!(job_id = job.id, %missed, "arming catch-up run for missed fire");
                    self.triggers.arm_at(&job.external_id, job.id, cron, now);
                }
                None => self.triggers.arm(&job.external_id, job.id, cron, now),
            }
            armed += 1;
        }
        Ok(armed)
    }

    fn missed_fire(
        &self,
        job: &JobDefinition,
        cron: &CronExpr,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        if self.config.misfire_policy != MisfirePolicy::RunOnce {
            return Ok(None);
        }
        let anchor = self.store.last_run_start(job.id)?.unwrap_or(job.created_at);
        Ok(cron.next_after(anchor).filter(|at| *at <= now))
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.config.tick_interval_ms.max(10));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = period.as_millis() as u64, "scheduler loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every trigger due at `now`. Returns the job ids whose run was
    /// spawned.
    pub fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<i64> {
        self.triggers
            .take_due(now)
            .into_iter()
            .filter(|job_id| self.fire(*job_id))
            .collect()
    }

    fn fire(self: &Arc<Self>, job_id: i64) -> bool {
        let slot = if self.config.allow_overlap {
            None
        } else {
            if !self.running.insert(job_id) {
                warn!(job_id, "previous run still in progress, skipping this fire");
                return false;
            }
            Some(RunningSlot {
                scheduler: Arc::clone(self),
                job_id,
            })
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _slot = slot;
            match this.execute(job_id).await {
                Ok(report) => match &report.outcome {
                    Ok(()) => info!(job_id, execution_id = report.execution.id, "scheduled run completed"),
                    Err(e) => warn!(job_id, execution_id = report.execution.id, error = %e, "scheduled run failed"),
                },
                Err(e) => error!(job_id, error = %e, "scheduled run could not start"),
            }
        });
        true
    }

    // ── execution ───────────────────────────────────────────────────────────

    /// Run the job's unit on a blocking worker and return the closed record.
    pub async fn execute(self: &Arc<Self>, job_id: i64) -> Result<RunReport> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.execute_blocking(job_id))
            .await
            .map_err(|e| SchedulerError::Internal(format!("execution worker failed: {e}")))?
    }

    /// begin record → resolve unit → run → end record, on the calling thread.
    pub fn execute_blocking(&self, job_id: i64) -> Result<RunReport> {
        let job = self.store.get_job(job_id)?;
        let script = self.store.get_script(job.script_id)?;

        let guard = self.tracker.begin_run(job.id)?;
        info!(job_id, execution_id = guard.record().id, unit = %script.locator, "run started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_unit(&script.locator)))
            .unwrap_or_else(|payload| {
                Err(SvennError::Run(format!(
                    "processing unit panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let execution = guard.end_run(&outcome);
        match &outcome {
            Ok(()) => info!(job_id, execution_id = execution.id, "run completed"),
            Err(e) => error!(job_id, execution_id = execution.id, error = %e, "run failed"),
        }
        Ok(RunReport { execution, outcome })
    }

    fn run_unit(&self, locator: &str) -> std::result::Result<(), SvennError> {
        let locator = UnitLocator::parse(locator)
            .map_err(|e| SvennError::Resolution(e.to_string()))?;
        let mut unit = self.units.resolve(&locator, &self.unit_ctx)?;
        unit.run()
    }

    // ── job operations ──────────────────────────────────────────────────────

    /// Schedule `script_id` on `cron_expr`.
    #[instrument(skip(self))]
    pub fn add_job(&self, script_id: i64, cron_expr: &str) -> Result<JobDefinition> {
        let cron = CronExpr::parse(cron_expr)?;
        let script = self.store.get_script(script_id)?;
        self.check_unit(&script.locator)?;

        let external_id = format!("script_{script_id}");
        if self.store.job_by_external_id(&external_id)?.is_some() {
            return Err(SchedulerError::Validation(format!(
                "script {script_id} already has a job"
            )));
        }

        let job = self.store.insert_job(&external_id, script_id, cron.as_str(), true)?;
        self.triggers.arm(&job.external_id, job.id, cron, Utc::now());
        info!(job_id = job.id, external_id = %job.external_id, "job added");
        Ok(job)
    }

    #[instrument(skip(self))]
    pub fn remove_job(&self, id: i64) -> Result<()> {
        let job = self.store.get_job(id)?;
        if self.triggers.remove(&job.external_id) == TriggerUpdate::Missing {
            warn!(job_id = id, external_id = %job.external_id, "no live trigger to remove");
        }
        self.store.delete_job(id)?;
        info!(job_id = id, "job removed");
        Ok(())
    }

    /// Flip `enabled` and return the new value.
    #[instrument(skip(self))]
    pub fn toggle_job(&self, id: i64) -> Result<bool> {
        let job = self.store.get_job(id)?;
        let enabled = !job.enabled;

        if enabled {
            let cron = CronExpr::parse(&job.cron_expression)?;
            self.store.set_enabled(id, true)?;
            if self.triggers.resume(&job.external_id, Utc::now()) == TriggerUpdate::Missing {
                warn!(job_id = id, "trigger missing from live registry, recreating");
                self.triggers.arm(&job.external_id, job.id, cron, Utc::now());
            }
        } else {
            self.store.set_enabled(id, false)?;
            if self.triggers.pause(&job.external_id) == TriggerUpdate::Missing {
                debug!(job_id = id, "no live trigger to pause");
            }
        }

        info!(job_id = id, enabled, "job toggled");
        Ok(enabled)
    }

    /// Replace the cron expression. `None` leaves the job untouched.
    #[instrument(skip(self))]
    pub fn update_job(&self, id: i64, cron_expr: Option<&str>) -> Result<JobDefinition> {
        let mut job = self.store.get_job(id)?;
        let Some(cron_expr) = cron_expr else {
            return Ok(job);
        };
        let cron = CronExpr::parse(cron_expr)?;
        self.store.set_cron(id, cron.as_str())?;
        job.cron_expression = cron.as_str().to_string();

        let now = Utc::now();
        if self.triggers.reschedule(&job.external_id, cron.clone(), now) == TriggerUpdate::Missing {
            // A disabled job is re-armed from storage when it is enabled again.
            if job.enabled {
                warn!(job_id = id, "trigger missing from live registry, recreating");
                self.triggers.arm(&job.external_id, job.id, cron, now);
            }
        }

        info!(job_id = id, cron = %job.cron_expression, "job rescheduled");
        Ok(job)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobDefinition>> {
        self.store.list_jobs()
    }

    pub fn get_job(&self, id: i64) -> Result<JobDefinition> {
        self.store.get_job(id)
    }

    pub fn executions_for(&self, job_id: i64) -> Result<Vec<ExecutionRecord>> {
        self.store.executions_for(job_id)
    }

    /// Run `script_id` once, now, through the normal execution path.
    ///
    /// A transient job row carries the run and is deleted afterwards whatever
    /// the outcome; the execution record stays with its job reference
    /// cleared. A failed run is returned as [`SchedulerError::RunFailed`].
    #[instrument(skip(self))]
    pub async fn run_now(self: &Arc<Self>, script_id: i64) -> Result<ExecutionRecord> {
        let this = Arc::clone(self);
        let report = tokio::task::spawn_blocking(move || this.run_once_blocking(script_id))
            .await
            .map_err(|e| SchedulerError::Internal(format!("execution worker failed: {e}")))??;

        let mut execution = report.execution;
        execution.job_id = None;
        match report.outcome {
            Ok(()) => Ok(execution),
            Err(e) => Err(SchedulerError::RunFailed(e)),
        }
    }

    /// Transient job row, run, clean-up; all on the calling thread.
    fn run_once_blocking(&self, script_id: i64) -> Result<RunReport> {
        let script = self.store.get_script(script_id)?;
        let external_id = format!("temp_{script_id}_{}", Uuid::new_v4().simple());
        let job = self.store.insert_job(&external_id, script.id, ONCE, false)?;
        let _temp = TempJob {
            store: self.store.clone(),
            job_id: job.id,
        };
        info!(job_id = job.id, script_id, "ad-hoc run requested");
        self.execute_blocking(job.id)
    }

    fn check_unit(&self, locator: &str) -> Result<UnitLocator> {
        let locator = UnitLocator::parse(locator)
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;
        if !self.units.contains(&locator) {
            return Err(SchedulerError::Validation(format!(
                "processing unit not found: {locator}"
            )));
        }
        Ok(locator)
    }

    pub(crate) fn validate_locator(&self, locator: &str) -> Result<()> {
        self.check_unit(locator).map(|_| ())
    }
}
