//! Pure cost and activity derivations.
//!
//! No database access. Every read and write path that needs a reservation
//! cost goes through these functions, so the formula cannot diverge between
//! the persisted cost and the `cost_so_far` projection.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::{Reservation, ReservationStatus};

const SECONDS_PER_HOUR: Decimal = dec!(3600);

/// Round to the given decimal places using banker's rounding
/// (ROUND_HALF_EVEN), which reduces cumulative rounding bias.
pub fn round_money(amount: Decimal, places: u32) -> Decimal {
    amount.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

/// Elapsed hours between start and end, clamped at zero to guard against
/// clock skew.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> Decimal {
    let secs = (end - start).num_seconds().max(0);
    Decimal::from(secs) / SECONDS_PER_HOUR
}

/// Elapsed whole minutes, clamped at zero
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

/// Cost of a reservation: elapsed hours times the lot's hourly price, rounded
/// to two places.
pub fn reservation_cost(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    price_per_hour: Decimal,
) -> Decimal {
    round_money(elapsed_hours(start, end) * price_per_hour, 2)
}

/// Running cost projection for an active reservation: the same formula as the
/// final cost, evaluated against `now`. Recomputed on every read, never
/// persisted.
pub fn cost_so_far(start: DateTime<Utc>, now: DateTime<Utc>, price_per_hour: Decimal) -> Decimal {
    reservation_cost(start, now, price_per_hour)
}

/// Whole days since the most recent reservation was created. Any reservation
/// counts as activity, regardless of its status.
pub fn days_since(last_created: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_created).num_days().max(0)
}

/// Aggregated reservation metrics for one user's dashboard
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub total_reservations: usize,
    pub completed_reservations: usize,
    pub total_spent: Decimal,
    pub total_hours: Decimal,
}

/// Fold a user's reservation history into dashboard metrics. Completed
/// reservations without an end time (which should not occur) accrue hours
/// against `now`.
pub fn user_summary(reservations: &[Reservation], now: DateTime<Utc>) -> UserSummary {
    let completed: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Completed)
        .collect();

    let total_spent: Decimal = completed.iter().filter_map(|r| r.cost).sum();
    let total_hours: Decimal = completed
        .iter()
        .map(|r| elapsed_hours(r.start_time, r.end_time.unwrap_or(now)))
        .sum();

    UserSummary {
        total_reservations: reservations.len(),
        completed_reservations: completed.len(),
        total_spent: round_money(total_spent, 2),
        total_hours: round_money(total_hours, 2),
    }
}
