//! Warehouse and script CRUD.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use svenn_scheduler::{NewScript, NewWarehouse, Script, ScriptUpdate, Warehouse, WarehouseUpdate};

use super::{api_error, body, ApiResult};
use crate::app::AppState;

/// GET /api/warehouses
pub async fn list_warehouses(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Warehouse>> {
    state.scheduler.list_warehouses().map(Json).map_err(api_error)
}

/// POST /api/warehouses
pub async fn create_warehouse(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewWarehouse>, JsonRejection>,
) -> Result<(StatusCode, Json<Warehouse>), super::ApiError> {
    let new = body(payload)?;
    let warehouse = state.scheduler.create_warehouse(&new).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

pub async fn get_warehouse(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Warehouse> {
    state.scheduler.get_warehouse(id).map(Json).map_err(api_error)
}

pub async fn update_warehouse(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<WarehouseUpdate>, JsonRejection>,
) -> ApiResult<Warehouse> {
    let update = body(payload)?;
    state
        .scheduler
        .update_warehouse(id, &update)
        .map(Json)
        .map_err(api_error)
}

/// DELETE /api/warehouses/{id}: scripts go with it; refused while jobs remain.
pub async fn delete_warehouse(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.scheduler.delete_warehouse(id).map_err(api_error)?;
    Ok(Json(json!({ "deleted": id })))
}

/// GET /api/warehouses/{id}/scripts
pub async fn list_scripts(
    State(state): State<Arc<AppState>>,
    Path(warehouse_id): Path<i64>,
) -> ApiResult<Vec<Script>> {
    state.scheduler.get_warehouse(warehouse_id).map_err(api_error)?;
    state
        .scheduler
        .scripts_for(warehouse_id)
        .map(Json)
        .map_err(api_error)
}

/// POST /api/warehouses/{id}/scripts
pub async fn create_script(
    State(state): State<Arc<AppState>>,
    Path(warehouse_id): Path<i64>,
    payload: Result<Json<NewScript>, JsonRejection>,
) -> Result<(StatusCode, Json<Script>), super::ApiError> {
    let new = body(payload)?;
    let script = state
        .scheduler
        .create_script(warehouse_id, &new)
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(script)))
}

pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Script> {
    state.scheduler.get_script(id).map(Json).map_err(api_error)
}

pub async fn update_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<ScriptUpdate>, JsonRejection>,
) -> ApiResult<Script> {
    let update = body(payload)?;
    state
        .scheduler
        .update_script(id, &update)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.scheduler.delete_script(id).map_err(api_error)?;
    Ok(Json(json!({ "deleted": id })))
}
