//! User route handlers: availability, booking, and reservation history.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::allocation::calculators::{self, cost_so_far, days_since, UserSummary};
use crate::allocation::services;
use crate::error::{AppError, Result};
use crate::models::{LotView, Reservation};
use crate::store::ParkingStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub user_id: i64,
    pub lot_id: i64,
    pub vehicle_number: String,
}

#[derive(Debug, Deserialize)]
pub struct VacateRequest {
    pub user_id: i64,
}

/// Identifies the requesting user; `from`/`to` narrow history queries to a
/// creation window.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Lot availability, served through the cache
pub async fn list_lots(State(state): State<AppState>) -> Result<Json<Vec<LotView>>> {
    let views = services::all_lot_availability(&state.store, &state.cache).await?;
    Ok(Json(views))
}

pub async fn book(
    State(state): State<AppState>,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let reservation = services::book(
        &state.store,
        &state.cache,
        req.user_id,
        req.lot_id,
        &req.vehicle_number,
        None,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Spot booked successfully",
            "reservation": reservation,
        })),
    ))
}

pub async fn vacate(
    State(state): State<AppState>,
    Json(req): Json<VacateRequest>,
) -> Result<Json<Value>> {
    let reservation = services::vacate(&state.store, &state.cache, req.user_id, None).await?;
    Ok(Json(json!({
        "message": "Spot vacated successfully",
        "reservation": reservation,
    })))
}

/// Reservation history, newest first. With both `from` and `to` present only
/// reservations created inside the window are returned.
pub async fn reservations(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Reservation>>> {
    let rows = match (query.from, query.to) {
        (Some(from), Some(to)) => {
            state
                .store
                .reservations_between(query.user_id, from, to)
                .await?
        }
        _ => state.store.reservations_for_user(query.user_id).await?,
    };
    Ok(Json(rows))
}

/// Active reservation enriched with its running cost
#[derive(Debug, Serialize)]
pub struct ActiveReservation {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub cost_so_far: Decimal,
}

pub async fn active_reservation(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ActiveReservation>> {
    let reservation = state
        .store
        .active_reservation_for_user(query.user_id)
        .await?
        .ok_or(AppError::NotFound("Active reservation"))?;

    let lot = state.store.get_lot(reservation.lot_id).await?;
    let running = cost_so_far(reservation.start_time, Utc::now(), lot.price);

    Ok(Json(ActiveReservation {
        reservation,
        cost_so_far: running,
    }))
}

/// Dashboard metrics for one user
#[derive(Debug, Serialize)]
pub struct UserDashboard {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub days_since_last_reservation: Option<i64>,
    pub active_reservation: Option<Reservation>,
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserDashboard>> {
    let now = Utc::now();
    let history = state.store.reservations_for_user(query.user_id).await?;
    let summary = calculators::user_summary(&history, now);

    let last = state.store.last_reservation_for_user(query.user_id).await?;
    let active = state
        .store
        .active_reservation_for_user(query.user_id)
        .await?;

    Ok(Json(UserDashboard {
        summary,
        days_since_last_reservation: last.map(|r| days_since(r.created_at, now)),
        active_reservation: active,
    }))
}
