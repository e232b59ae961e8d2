use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A data source whose sync scripts are grouped together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A schedulable script: the catalog entry that carries a unit locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: i64,
    pub warehouse_id: i64,
    pub name: String,
    /// `group/name` of the processing unit this script runs.
    pub locator: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScript {
    pub name: String,
    pub locator: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptUpdate {
    pub name: Option<String>,
    pub locator: Option<String>,
    pub description: Option<String>,
}

/// A persisted cron job bound to one script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: i64,
    /// Trigger key in the live registry. `script_{id}` for scheduled jobs,
    /// `temp_{script}_{uuid}` for ad-hoc runs.
    pub external_id: String,
    pub script_id: i64,
    pub cron_expression: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of one execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// One run of a job, from `begin_run` to its single terminal update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    /// `None` once the job has been deleted (always the case for ad-hoc runs).
    pub job_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    /// Set if and only if `status` is terminal.
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(status.to_string().parse::<RunStatus>(), Ok(status));
        }
        assert!("done".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
