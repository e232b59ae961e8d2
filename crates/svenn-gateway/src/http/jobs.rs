//! Job scheduling, ad-hoc runs and execution history.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use svenn_scheduler::{ExecutionRecord, JobDefinition};

use super::{api_error, body, ApiError, ApiResult};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJob {
    pub script_id: i64,
    pub cron_expression: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJob {
    #[serde(default)]
    pub cron_expression: Option<String>,
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Vec<JobDefinition>> {
    state.scheduler.list_jobs().map(Json).map_err(api_error)
}

/// POST /api/jobs: `{"script_id": 1, "cron_expression": "0 3 * * *"}`
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateJob>, JsonRejection>,
) -> Result<(StatusCode, Json<JobDefinition>), ApiError> {
    let req = body(payload)?;
    let job = state
        .scheduler
        .add_job(req.script_id, &req.cron_expression)
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<JobDefinition> {
    state.scheduler.get_job(id).map(Json).map_err(api_error)
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateJob>, JsonRejection>,
) -> ApiResult<JobDefinition> {
    let req = body(payload)?;
    state
        .scheduler
        .update_job(id, req.cron_expression.as_deref())
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.scheduler.remove_job(id).map_err(api_error)?;
    Ok(Json(json!({ "deleted": id })))
}

/// POST /api/jobs/{id}/toggle: returns the new `enabled` value.
pub async fn toggle_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    let enabled = state.scheduler.toggle_job(id).map_err(api_error)?;
    Ok(Json(json!({ "id": id, "enabled": enabled })))
}

/// POST /api/run_now/{script_id}: runs to completion before answering.
pub async fn run_now(
    State(state): State<Arc<AppState>>,
    Path(script_id): Path<i64>,
) -> ApiResult<ExecutionRecord> {
    state
        .scheduler
        .run_now(script_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/executions/{job_id}: newest first.
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> ApiResult<Vec<ExecutionRecord>> {
    state.scheduler.get_job(job_id).map_err(api_error)?;
    state
        .scheduler
        .executions_for(job_id)
        .map(Json)
        .map_err(api_error)
}

/// GET /api/units: every registered unit locator.
pub async fn list_units(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(
        state
            .scheduler
            .units()
            .locators()
            .map(ToString::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{call, test_router};
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::{json, Value};

    async fn script(router: &Router, locator: &str) -> i64 {
        let (_, warehouse) = call(router, "GET", "/api/warehouses", None).await;
        let warehouse_id = match warehouse.as_array().and_then(|w| w.first()) {
            Some(w) => w["id"].as_i64().unwrap(),
            None => {
                let (_, w) = call(router, "POST", "/api/warehouses", Some(json!({ "name": "w" }))).await;
                w["id"].as_i64().unwrap()
            }
        };
        let (status, script) = call(
            router,
            "POST",
            &format!("/api/warehouses/{warehouse_id}/scripts"),
            Some(json!({ "name": locator, "locator": locator })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        script["id"].as_i64().unwrap()
    }

    async fn add_job(router: &Router, script_id: i64, cron: &str) -> (StatusCode, Value) {
        call(
            router,
            "POST",
            "/api/jobs",
            Some(json!({ "script_id": script_id, "cron_expression": cron })),
        )
        .await
    }

    #[tokio::test]
    async fn job_lifecycle() {
        let router = test_router();
        let script_id = script(&router, "test/noop").await;

        let (status, job) = add_job(&router, script_id, "0 3 * * *").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["external_id"], format!("script_{script_id}"));
        assert_eq!(job["enabled"], true);
        let uri = format!("/api/jobs/{}", job["id"]);

        let (status, toggled) = call(&router, "POST", &format!("{uri}/toggle"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["enabled"], false);

        let (status, updated) = call(&router, "PUT", &uri, Some(json!({ "cron_expression": "*/5 * * * *" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["cron_expression"], "*/5 * * * *");

        let (_, unchanged) = call(&router, "PUT", &uri, Some(json!({}))).await;
        assert_eq!(unchanged["cron_expression"], "*/5 * * * *");

        let (_, jobs) = call(&router, "GET", "/api/jobs", None).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);

        let (status, _) = call(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_cron_is_400_and_nothing_is_stored() {
        let router = test_router();
        let script_id = script(&router, "test/noop").await;

        let (status, body) = add_job(&router, script_id, "* * * *").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("5 fields"));

        let (_, jobs) = call(&router, "GET", "/api/jobs", None).await;
        assert!(jobs.as_array().unwrap().is_empty());

        let (status, _) = add_job(&router, 404, "* * * * *").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_now_reports_outcome_and_history_survives() {
        let router = test_router();
        let ok = script(&router, "test/noop").await;
        let fails = script(&router, "test/fails").await;

        let (status, execution) = call(&router, "POST", &format!("/api/run_now/{ok}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(execution["status"], "completed");
        assert_eq!(execution["job_id"], Value::Null);

        let (status, body) = call(&router, "POST", &format!("/api/run_now/{fails}"), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("upstream table missing"));

        let (_, jobs) = call(&router, "GET", "/api/jobs", None).await;
        assert!(jobs.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn executions_for_unknown_job_is_404() {
        let router = test_router();
        let (status, _) = call(&router, "GET", "/api/executions/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let script_id = script(&router, "test/noop").await;
        let (_, job) = add_job(&router, script_id, "0 3 * * *").await;
        let (status, executions) =
            call(&router, "GET", &format!("/api/executions/{}", job["id"]), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(executions.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_registered_units() {
        let router = test_router();
        let (status, units) = call(&router, "GET", "/api/units", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(units, json!(["test/fails", "test/noop"]));
    }
}
