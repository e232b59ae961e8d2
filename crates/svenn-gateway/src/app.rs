use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use svenn_core::SvennConfig;
use svenn_scheduler::Scheduler;

use crate::http::{catalog, health, jobs};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: SvennConfig,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(config: SvennConfig, scheduler: Arc<Scheduler>) -> Self {
        Self { config, scheduler }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/warehouses",
            get(catalog::list_warehouses).post(catalog::create_warehouse),
        )
        .route(
            "/api/warehouses/{id}",
            get(catalog::get_warehouse)
                .put(catalog::update_warehouse)
                .delete(catalog::delete_warehouse),
        )
        .route(
            "/api/warehouses/{id}/scripts",
            get(catalog::list_scripts).post(catalog::create_script),
        )
        .route(
            "/api/scripts/{id}",
            get(catalog::get_script)
                .put(catalog::update_script)
                .delete(catalog::delete_script),
        )
        .route("/api/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/api/jobs/{id}",
            get(jobs::get_job).put(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/api/jobs/{id}/toggle", post(jobs::toggle_job))
        .route("/api/run_now/{script_id}", post(jobs::run_now))
        .route("/api/executions/{job_id}", get(jobs::list_executions))
        .route("/api/units", get(jobs::list_units))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rusqlite::Connection;
    use serde_json::Value;
    use svenn_core::config::{SchedulerConfig, StoresConfig};
    use svenn_core::UnitLocator;
    use svenn_units::{ProcessingUnit, UnitContext, UnitRegistry};
    use tower::ServiceExt;

    struct Noop;

    impl ProcessingUnit for Noop {
        fn run(&mut self) -> svenn_core::Result<()> {
            Ok(())
        }
    }

    struct Fails;

    impl ProcessingUnit for Fails {
        fn run(&mut self) -> svenn_core::Result<()> {
            Err(svenn_core::SvennError::Run("upstream table missing".into()))
        }
    }

    pub(crate) fn test_router() -> Router {
        let mut units = UnitRegistry::new();
        units.register(UnitLocator::new("test", "noop"), |_ctx| Ok(Box::new(Noop)));
        units.register(UnitLocator::new("test", "fails"), |_ctx| Ok(Box::new(Fails)));
        let scheduler = Scheduler::new(
            Connection::open_in_memory().unwrap(),
            units,
            UnitContext::new(StoresConfig::new()),
            SchedulerConfig::default(),
        )
        .unwrap();
        build_router(Arc::new(AppState::new(SvennConfig::default(), scheduler)))
    }

    /// Send one request and return the status with the decoded JSON body.
    pub(crate) async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = test_router();
        let (status, _) = call(&router, "GET", "/api/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
