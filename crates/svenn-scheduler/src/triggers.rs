use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::schedule::CronExpr;

/// Result of an operation addressed at a trigger by external id.
///
/// `Missing` is not an error: whether it is harmless (remove, pause) or calls
/// for recreating the trigger (resume, reschedule) is the caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerUpdate {
    Applied,
    Missing,
}

#[derive(Debug, Clone)]
struct Trigger {
    job_id: i64,
    cron: CronExpr,
    paused: bool,
    next_fire: Option<DateTime<Utc>>,
}

/// Read-only view of one live trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub external_id: String,
    pub job_id: i64,
    pub cron: String,
    pub paused: bool,
    pub next_fire: Option<DateTime<Utc>>,
}

/// The in-memory cron trigger table, keyed by a job's external id.
///
/// Volatile by nature: a restart empties it and the scheduler rebuilds it
/// from the persisted jobs.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: Mutex<HashMap<String, Trigger>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation leaves the map consistent, so a panic elsewhere while
    // holding the lock cannot leave a half-written trigger behind.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Trigger>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) an armed trigger whose first fire is the next
    /// cron time after `now`.
    pub fn arm(&self, external_id: &str, job_id: i64, cron: CronExpr, now: DateTime<Utc>) {
        let next_fire = cron.next_after(now);
        self.insert(external_id, job_id, cron, next_fire);
    }

    /// Register (or replace) an armed trigger that fires at `fire_at`, which
    /// may already have passed, then follows its cron cadence.
    pub fn arm_at(&self, external_id: &str, job_id: i64, cron: CronExpr, fire_at: DateTime<Utc>) {
        self.insert(external_id, job_id, cron, Some(fire_at));
    }

    fn insert(&self, external_id: &str, job_id: i64, cron: CronExpr, next_fire: Option<DateTime<Utc>>) {
        debug!(external_id, job_id, cron = %cron, ?next_fire, "trigger armed");
        self.lock().insert(
            external_id.to_string(),
            Trigger {
                job_id,
                cron,
                paused: false,
                next_fire,
            },
        );
    }

    pub fn remove(&self, external_id: &str) -> TriggerUpdate {
        match self.lock().remove(external_id) {
            Some(_) => TriggerUpdate::Applied,
            None => TriggerUpdate::Missing,
        }
    }

    pub fn pause(&self, external_id: &str) -> TriggerUpdate {
        match self.lock().get_mut(external_id) {
            Some(trigger) => {
                trigger.paused = true;
                TriggerUpdate::Applied
            }
            None => TriggerUpdate::Missing,
        }
    }

    /// Unpause and re-anchor on `now`: fire times that passed while paused
    /// are not replayed.
    pub fn resume(&self, external_id: &str, now: DateTime<Utc>) -> TriggerUpdate {
        match self.lock().get_mut(external_id) {
            Some(trigger) => {
                trigger.paused = false;
                trigger.next_fire = trigger.cron.next_after(now);
                TriggerUpdate::Applied
            }
            None => TriggerUpdate::Missing,
        }
    }

    /// Swap the cron expression in place, keeping the paused flag.
    pub fn reschedule(&self, external_id: &str, cron: CronExpr, now: DateTime<Utc>) -> TriggerUpdate {
        match self.lock().get_mut(external_id) {
            Some(trigger) => {
                trigger.next_fire = cron.next_after(now);
                trigger.cron = cron;
                TriggerUpdate::Applied
            }
            None => TriggerUpdate::Missing,
        }
    }

    /// Job ids of every armed trigger due at `now`, advancing each to its
    /// next cron time after `now`. Several elapsed fire times of one trigger
    /// yield a single firing.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<i64> {
        let mut due = Vec::new();
        for trigger in self.lock().values_mut() {
            if trigger.paused || !trigger.next_fire.is_some_and(|at| at <= now) {
                continue;
            }
            due.push(trigger.job_id);
            trigger.next_fire = trigger.cron.next_after(now);
        }
        due.sort_unstable();
        due
    }

    pub fn get(&self, external_id: &str) -> Option<TriggerInfo> {
        self.lock().get(external_id).map(|t| TriggerInfo {
            external_id: external_id.to_string(),
            job_id: t.job_id,
            cron: t.cron.to_string(),
            paused: t.paused,
            next_fire: t.next_fire,
        })
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.lock().contains_key(external_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every trigger, as a process restart would.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    fn every_minute() -> CronExpr {
        CronExpr::parse("* * * * *").unwrap()
    }

    #[test]
    fn missing_trigger_is_reported_not_raised() {
        let reg = TriggerRegistry::new();
        assert_eq!(reg.remove("script_1"), TriggerUpdate::Missing);
        assert_eq!(reg.pause("script_1"), TriggerUpdate::Missing);
        assert_eq!(reg.resume("script_1", at(0, 0, 0)), TriggerUpdate::Missing);
        assert_eq!(
            reg.reschedule("script_1", every_minute(), at(0, 0, 0)),
            TriggerUpdate::Missing
        );
    }

    #[test]
    fn due_trigger_fires_once_and_advances() {
        let reg = TriggerRegistry::new();
        reg.arm("script_1", 1, every_minute(), at(10, 0, 30));
        assert_eq!(reg.get("script_1").unwrap().next_fire, Some(at(10, 1, 0)));

        assert!(reg.take_due(at(10, 0, 59)).is_empty());
        assert_eq!(reg.take_due(at(10, 1, 0)), vec![1]);
        assert!(reg.take_due(at(10, 1, 0)).is_empty());
        assert_eq!(reg.get("script_1").unwrap().next_fire, Some(at(10, 2, 0)));
    }

    #[test]
    fn missed_fire_times_coalesce() {
        let reg = TriggerRegistry::new();
        reg.arm("script_1", 1, every_minute(), at(10, 0, 30));
        assert_eq!(reg.take_due(at(10, 7, 10)), vec![1]);
        assert_eq!(reg.get("script_1").unwrap().next_fire, Some(at(10, 8, 0)));
    }

    #[test]
    fn paused_trigger_never_fires_and_resume_does_not_replay() {
        let reg = TriggerRegistry::new();
        reg.arm("script_1", 1, every_minute(), at(10, 0, 30));
        assert_eq!(reg.pause("script_1"), TriggerUpdate::Applied);
        assert!(reg.take_due(at(10, 5, 0)).is_empty());

        assert_eq!(reg.resume("script_1", at(10, 5, 30)), TriggerUpdate::Applied);
        assert_eq!(reg.get("script_1").unwrap().next_fire, Some(at(10, 6, 0)));
        assert!(reg.take_due(at(10, 5, 59)).is_empty());
        assert_eq!(reg.take_due(at(10, 6, 0)), vec![1]);
    }

    #[test]
    fn reschedule_keeps_pause_state() {
        let reg = TriggerRegistry::new();
        reg.arm("script_1", 1, every_minute(), at(10, 0, 30));
        reg.pause("script_1");
        let hourly = CronExpr::parse("0 * * * *").unwrap();
        assert_eq!(reg.reschedule("script_1", hourly, at(10, 0, 30)), TriggerUpdate::Applied);
        let info = reg.get("script_1").unwrap();
        assert!(info.paused);
        assert_eq!(info.cron, "0 * * * *");
        assert_eq!(info.next_fire, Some(at(11, 0, 0)));
    }

    #[test]
    fn arm_at_allows_a_past_catch_up() {
        let reg = TriggerRegistry::new();
        let now = at(10, 0, 30);
        reg.arm_at("script_1", 1, every_minute(), now - Duration::minutes(5));
        assert_eq!(reg.take_due(now), vec![1]);
        assert_eq!(reg.get("script_1").unwrap().next_fire, Some(at(10, 1, 0)));
    }

    #[test]
    fn clear_simulates_restart() {
        let reg = TriggerRegistry::new();
        reg.arm("script_1", 1, every_minute(), at(0, 0, 0));
        reg.arm("script_2", 2, every_minute(), at(0, 0, 0));
        assert_eq!(reg.len(), 2);
        reg.clear();
        assert!(reg.is_empty());
        assert!(!reg.contains("script_1"));
    }
}
