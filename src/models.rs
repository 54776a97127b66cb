//! Database models and derived projections.
//!
//! Row structs use sqlx's FromRow derive for direct database deserialization.
//! `LotView` is the denormalized availability projection held by the lot
//! cache; it is always rebuilt from rows and never treated as a source of
//! truth.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::allocation::calculators::cost_so_far;

/// Spot occupancy state. A spot is occupied iff exactly one active
/// reservation references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpotStatus {
    Available,
    Occupied,
}

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Completed,
    Cancelled,
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Parking lot row from parking_lots
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Lot {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub address: String,
    pub pincode: String,
    pub price: Decimal,
    pub number_of_spots: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parking spot row from parking_spots
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Spot {
    pub id: i64,
    pub lot_id: i64,
    pub spot_number: String,
    pub status: SpotStatus,
    pub created_at: DateTime<Utc>,
}

/// Reservation row from reservations.
///
/// Created active with no end time or cost; mutated exactly once on vacate
/// (end time, computed cost, completed status) and immutable afterwards.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub spot_id: i64,
    pub lot_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ReservationStatus,
    pub vehicle_number: String,
    pub cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// Application user (admin or standard). Credentials and authentication live
/// with the auth layer; the backend consumes the id as an opaque, already
/// authenticated identity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new lot, validated by provisioning before reaching the store.
#[derive(Debug, Clone)]
pub struct NewLot {
    pub code: String,
    pub name: String,
    pub address: String,
    pub pincode: String,
    pub price: Decimal,
    pub number_of_spots: i32,
}

/// Partial lot update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct LotPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub pincode: Option<String>,
    pub price: Option<Decimal>,
}

/// Current occupant of a spot, derived from its active reservation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupantView {
    pub reservation_id: i64,
    pub user_id: i64,
    pub vehicle_number: String,
    pub start_time: DateTime<Utc>,
    pub cost_so_far: Decimal,
}

/// Spot entry inside a lot projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotView {
    pub id: i64,
    pub spot_number: String,
    pub status: SpotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupant: Option<OccupantView>,
}

/// Denormalized lot availability projection, the cached value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub address: String,
    pub pincode: String,
    pub price: Decimal,
    pub number_of_spots: i32,
    pub available_spots: i32,
    pub occupied_spots: i32,
    pub spots: Vec<SpotView>,
    pub created_at: DateTime<Utc>,
}

impl LotView {
    /// Build the projection from rows.
    ///
    /// `active` holds the lot's active reservations; `cost_so_far` for each
    /// occupant is recomputed here against `now` on every build, never cached
    /// on its own.
    pub fn build(lot: &Lot, spots: &[Spot], active: &[Reservation], now: DateTime<Utc>) -> Self {
        let available = spots
            .iter()
            .filter(|s| s.status == SpotStatus::Available)
            .count() as i32;

        let spot_views = spots
            .iter()
            .map(|s| SpotView {
                id: s.id,
                spot_number: s.spot_number.clone(),
                status: s.status,
                occupant: active
                    .iter()
                    .find(|r| r.spot_id == s.id && r.is_active())
                    .map(|r| OccupantView {
                        reservation_id: r.id,
                        user_id: r.user_id,
                        vehicle_number: r.vehicle_number.clone(),
                        start_time: r.start_time,
                        cost_so_far: cost_so_far(r.start_time, now, lot.price),
                    }),
            })
            .collect();

        Self {
            id: lot.id,
            code: lot.code.clone(),
            name: lot.name.clone(),
            address: lot.address.clone(),
            pincode: lot.pincode.clone(),
            price: lot.price,
            number_of_spots: lot.number_of_spots,
            available_spots: available,
            occupied_spots: lot.number_of_spots - available,
            spots: spot_views,
            created_at: lot.created_at,
        }
    }
}
