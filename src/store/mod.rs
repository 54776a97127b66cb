//! Entity store abstraction.
//!
//! Each method is one atomic mutation unit: implementations must apply the
//! whole mutation and its guard checks together or not at all. The allocation
//! engine composes these units with input validation and cache refreshes but
//! never splits one.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Lot, LotPatch, LotView, NewLot, Reservation};

pub mod in_memory;
pub mod postgres;

pub trait ParkingStore: Send + Sync {
    /// Insert a lot together with its pre-numbered spots.
    ///
    /// # Errors
    /// - `Conflict` if a lot with the same name or code already exists
    ///   (a single combined existence check, so duplicates never surface as a
    ///   constraint violation)
    fn create_lot(
        &self,
        lot: NewLot,
        spot_numbers: Vec<String>,
    ) -> impl Future<Output = Result<Lot>> + Send;

    fn get_lot(&self, lot_id: i64) -> impl Future<Output = Result<Lot>> + Send;

    /// Ids of every lot, ascending.
    fn lot_ids(&self) -> impl Future<Output = Result<Vec<i64>>> + Send;

    /// Apply a partial update; omitted fields are unchanged.
    fn update_lot(&self, lot_id: i64, patch: LotPatch)
        -> impl Future<Output = Result<Lot>> + Send;

    /// Delete a lot, cascading its spots and reservations.
    ///
    /// # Errors
    /// - `Conflict` while any spot in the lot is occupied
    fn delete_lot(&self, lot_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Delete a single spot and decrement the lot's capacity (never below 0).
    ///
    /// Refuses occupied spots and spots referenced by an active reservation;
    /// the two checks are deliberately independent.
    fn delete_spot(&self, lot_id: i64, spot_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Atomically claim the first available spot of the lot (ascending spot
    /// id) for the user and open an active reservation on it.
    ///
    /// Implementations must serialize bookings per user so the guard holds
    /// across lots, not just for contenders on the same spot.
    ///
    /// # Errors
    /// - `NotFound` if the lot (or, for stores with a users table, the user)
    ///   does not exist
    /// - `OutOfCapacity` when no spot is available
    /// - `Conflict` if the user already holds an active reservation, re-checked
    ///   under the same transaction that locks the candidate spot
    fn book_spot(
        &self,
        user_id: i64,
        lot_id: i64,
        vehicle_number: String,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Reservation>> + Send;

    /// Close the user's active reservation in one unit: set the end time,
    /// store the computed cost, mark it completed, and release the spot.
    fn vacate_spot(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Reservation>> + Send;

    /// Build the availability projection for one lot.
    fn lot_view(
        &self,
        lot_id: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<LotView>> + Send;

    /// Projections for every lot, ordered by lot id.
    fn lot_views(&self, now: DateTime<Utc>) -> impl Future<Output = Result<Vec<LotView>>> + Send;

    /// Renumber spots that lack a well-formed `<code>-<label>` number, keyed
    /// by ascending spot id within each lot. Returns how many spots changed.
    fn renumber_spots(&self) -> impl Future<Output = Result<u64>> + Send;

    // Read surfaces consumed by the report and notification collaborators.

    /// A user's full reservation history, newest first.
    fn reservations_for_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<Reservation>>> + Send;

    fn active_reservation_for_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<Reservation>>> + Send;

    /// Reservations created inside `[from, to]`, newest first.
    fn reservations_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Reservation>>> + Send;

    /// The user's most recently created reservation in any status.
    fn last_reservation_for_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<Reservation>>> + Send;

    /// Lots created at or after the threshold (new-lot notifications).
    fn lots_created_since(
        &self,
        threshold: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Lot>>> + Send;
}
