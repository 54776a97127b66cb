//! HTTP route handlers.

use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub mod admin;
pub mod user;

/// Assemble the full API router
pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .route("/parking-lots", get(admin::list_lots).post(admin::create_lot))
        .route(
            "/parking-lots/:lot_id",
            put(admin::update_lot).delete(admin::delete_lot),
        )
        .route(
            "/parking-lots/:lot_id/spots/:spot_id",
            delete(admin::delete_spot),
        )
        .route("/summary", get(admin::summary));

    let user = Router::new()
        .route("/parking-lots", get(user::list_lots))
        .route("/book", post(user::book))
        .route("/vacate", post(user::vacate))
        .route("/reservations", get(user::reservations))
        .route("/reservations/active", get(user::active_reservation))
        .route("/summary", get(user::summary));

    Router::new()
        .route("/api/health", get(health))
        .nest("/api/admin", admin)
        .nest("/api/user", user)
}

/// Liveness probe with cache occupancy
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "cache": state.cache.stats(),
    }))
}
