use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "units": state.scheduler.units().len(),
        "triggers": state.scheduler.triggers().len(),
        "misfire_policy": state.config.scheduler.misfire_policy,
    }))
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{call, test_router};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn reports_ok() {
        let router = test_router();
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["units"], 2);
        assert_eq!(body["misfire_policy"], "skip");
    }
}
