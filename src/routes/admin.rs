//! Admin route handlers: lot provisioning and platform reporting.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crate::allocation::services;
use crate::cache::CacheStats;
use crate::db::{self, PlatformSummary};
use crate::error::Result;
use crate::models::LotView;
use crate::provisioning::{self, CreateLotRequest, UpdateLotRequest};
use crate::store::ParkingStore;
use crate::AppState;

/// Full lot projections, read directly from the store so admins always see
/// committed state.
pub async fn list_lots(State(state): State<AppState>) -> Result<Json<Vec<LotView>>> {
    let views = state.store.lot_views(Utc::now()).await?;
    Ok(Json(views))
}

pub async fn create_lot(
    State(state): State<AppState>,
    Json(req): Json<CreateLotRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let lot = provisioning::create_lot(&state.store, &state.cache, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Parking lot created successfully",
            "lot": lot,
        })),
    ))
}

pub async fn update_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<i64>,
    Json(req): Json<UpdateLotRequest>,
) -> Result<Json<Value>> {
    let lot = provisioning::update_lot(&state.store, &state.cache, lot_id, req).await?;
    Ok(Json(json!({
        "message": "Parking lot updated successfully",
        "lot": lot,
    })))
}

pub async fn delete_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<i64>,
) -> Result<Json<Value>> {
    services::delete_lot(&state.store, &state.cache, lot_id).await?;
    Ok(Json(json!({ "message": "Parking lot deleted successfully" })))
}

pub async fn delete_spot(
    State(state): State<AppState>,
    Path((lot_id, spot_id)): Path<(i64, i64)>,
) -> Result<Json<Value>> {
    services::delete_spot(&state.store, &state.cache, lot_id, spot_id).await?;
    Ok(Json(json!({ "message": "Parking spot deleted successfully" })))
}

/// Platform-wide dashboard payload
#[derive(Debug, Serialize)]
pub struct AdminSummary {
    #[serde(flatten)]
    pub counts: PlatformSummary,
    pub total_revenue: Decimal,
    pub cache: CacheStats,
}

pub async fn summary(State(state): State<AppState>) -> Result<Json<AdminSummary>> {
    let counts = db::platform_summary(&state.db).await?;
    let total_revenue = db::total_revenue(&state.db).await?;

    Ok(Json(AdminSummary {
        counts,
        total_revenue,
        cache: state.cache.stats(),
    }))
}
