//! Postgres entity store.
//!
//! Every mutation runs in a single sqlx transaction. Booking locks the user
//! row and the candidate spot row with `FOR UPDATE` and re-checks the
//! one-active-reservation-per-user rule behind those locks, so two concurrent
//! requests can neither claim the same spot nor leave a user with two active
//! reservations, even when they target different lots.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::allocation::calculators::reservation_cost;
use crate::error::{AppError, Result};
use crate::models::{
    Lot, LotPatch, LotView, NewLot, Reservation, ReservationStatus, Spot, SpotStatus,
};
use crate::provisioning::spot_label;

use super::ParkingStore;

/// Postgres implementation of the `ParkingStore` trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for read-side dashboard queries.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ParkingStore for PgStore {
    async fn create_lot(&self, lot: NewLot, spot_numbers: Vec<String>) -> Result<Lot> {
        let mut tx = self.pool.begin().await?;

        // Single combined existence check so a duplicate surfaces as Conflict
        // rather than a unique-constraint violation.
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM parking_lots WHERE name = $1 OR code = $2")
                .bind(&lot.name)
                .bind(&lot.code)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(
                "A parking lot with this name or code already exists".to_string(),
            ));
        }

        let created: Lot = sqlx::query_as(
            r#"
            INSERT INTO parking_lots (code, name, address, pincode, price, number_of_spots)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&lot.code)
        .bind(&lot.name)
        .bind(&lot.address)
        .bind(&lot.pincode)
        .bind(lot.price)
        .bind(spot_numbers.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        for number in &spot_numbers {
            sqlx::query("INSERT INTO parking_spots (lot_id, spot_number) VALUES ($1, $2)")
                .bind(created.id)
                .bind(number)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_lot(&self, lot_id: i64) -> Result<Lot> {
        sqlx::query_as::<_, Lot>("SELECT * FROM parking_lots WHERE id = $1")
            .bind(lot_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Parking lot"))
    }

    async fn lot_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM parking_lots ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn update_lot(&self, lot_id: i64, patch: LotPatch) -> Result<Lot> {
        sqlx::query_as::<_, Lot>(
            r#"
            UPDATE parking_lots
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                pincode = COALESCE($4, pincode),
                price = COALESCE($5, price),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(lot_id)
        .bind(patch.name)
        .bind(patch.address)
        .bind(patch.pincode)
        .bind(patch.price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Parking lot"))
    }

    async fn delete_lot(&self, lot_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let lot: Option<i64> =
            sqlx::query_scalar("SELECT id FROM parking_lots WHERE id = $1 FOR UPDATE")
                .bind(lot_id)
                .fetch_optional(&mut *tx)
                .await?;
        if lot.is_none() {
            return Err(AppError::NotFound("Parking lot"));
        }

        // Lock every spot row before counting, so the delete waits behind an
        // in-flight booking that holds a spot `FOR UPDATE` and then sees the
        // spot it occupied. An unlocked COUNT would read 0 and let the cascade
        // destroy the freshly committed reservation.
        let statuses: Vec<SpotStatus> = sqlx::query_scalar(
            "SELECT status FROM parking_spots WHERE lot_id = $1 FOR UPDATE",
        )
        .bind(lot_id)
        .fetch_all(&mut *tx)
        .await?;
        if statuses.iter().any(|s| *s == SpotStatus::Occupied) {
            return Err(AppError::Conflict(
                "Cannot delete a lot while spots are occupied".to_string(),
            ));
        }

        // Spots and reservations cascade.
        sqlx::query("DELETE FROM parking_lots WHERE id = $1")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_spot(&self, lot_id: i64, spot_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let spot: Spot = sqlx::query_as(
            "SELECT * FROM parking_spots WHERE id = $1 AND lot_id = $2 FOR UPDATE",
        )
        .bind(spot_id)
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Parking spot"))?;

        if spot.status == SpotStatus::Occupied {
            return Err(AppError::Conflict(
                "Cannot delete an occupied spot".to_string(),
            ));
        }
        // Checked independently of the status flag, defense in depth.
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE spot_id = $1 AND status = $2",
        )
        .bind(spot_id)
        .bind(ReservationStatus::Active)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(AppError::Conflict(
                "Cannot delete a spot with an active reservation".to_string(),
            ));
        }

        sqlx::query("DELETE FROM parking_spots WHERE id = $1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE parking_lots
            SET number_of_spots = GREATEST(number_of_spots - 1, 0), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lot_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn book_spot(
        &self,
        user_id: i64,
        lot_id: i64,
        vehicle_number: String,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        // Serialize bookings per user. Without this lock two transactions for
        // the same user against different lots lock different spot rows and
        // the active-reservation re-check below cannot see the other's
        // uncommitted insert.
        let user: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(AppError::NotFound("User"));
        }

        let lot: Option<i64> = sqlx::query_scalar("SELECT id FROM parking_lots WHERE id = $1")
            .bind(lot_id)
            .fetch_optional(&mut *tx)
            .await?;
        if lot.is_none() {
            return Err(AppError::NotFound("Parking lot"));
        }

        // Deterministic allocation order: lowest available spot id wins. The
        // row lock serializes concurrent bookings on the same lot.
        let spot: Option<Spot> = sqlx::query_as(
            r#"
            SELECT * FROM parking_spots
            WHERE lot_id = $1 AND status = $2
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(lot_id)
        .bind(SpotStatus::Available)
        .fetch_optional(&mut *tx)
        .await?;
        let spot = spot.ok_or(AppError::OutOfCapacity)?;

        // Re-check behind the user and spot locks: one active reservation per
        // user, even across lots.
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(ReservationStatus::Active)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(AppError::Conflict(
                "You already have an active reservation".to_string(),
            ));
        }

        let reservation: Reservation = sqlx::query_as(
            r#"
            INSERT INTO reservations (user_id, spot_id, lot_id, start_time, status, vehicle_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(spot.id)
        .bind(lot_id)
        .bind(now)
        .bind(ReservationStatus::Active)
        .bind(&vehicle_number)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE parking_spots SET status = $2 WHERE id = $1")
            .bind(spot.id)
            .bind(SpotStatus::Occupied)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn vacate_spot(&self, user_id: i64, now: DateTime<Utc>) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        let reservation: Reservation = sqlx::query_as(
            r#"
            SELECT * FROM reservations
            WHERE user_id = $1 AND status = $2
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(ReservationStatus::Active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Active reservation"))?;

        // Cascade invariants should make these lookups infallible; resolved
        // defensively anyway.
        let spot: Spot = sqlx::query_as("SELECT * FROM parking_spots WHERE id = $1 FOR UPDATE")
            .bind(reservation.spot_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Parking spot"))?;
        let lot: Lot = sqlx::query_as("SELECT * FROM parking_lots WHERE id = $1")
            .bind(spot.lot_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Parking lot"))?;

        let cost = reservation_cost(reservation.start_time, now, lot.price);

        let completed: Reservation = sqlx::query_as(
            r#"
            UPDATE reservations
            SET end_time = $2, cost = $3, status = $4, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(reservation.id)
        .bind(now)
        .bind(cost)
        .bind(ReservationStatus::Completed)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE parking_spots SET status = $2 WHERE id = $1")
            .bind(spot.id)
            .bind(SpotStatus::Available)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(completed)
    }

    async fn lot_view(&self, lot_id: i64, now: DateTime<Utc>) -> Result<LotView> {
        let lot = self.get_lot(lot_id).await?;
        let spots: Vec<Spot> =
            sqlx::query_as("SELECT * FROM parking_spots WHERE lot_id = $1 ORDER BY id")
                .bind(lot_id)
                .fetch_all(&self.pool)
                .await?;
        let active: Vec<Reservation> =
            sqlx::query_as("SELECT * FROM reservations WHERE lot_id = $1 AND status = $2")
                .bind(lot_id)
                .bind(ReservationStatus::Active)
                .fetch_all(&self.pool)
                .await?;
        Ok(LotView::build(&lot, &spots, &active, now))
    }

    async fn lot_views(&self, now: DateTime<Utc>) -> Result<Vec<LotView>> {
        let mut views = Vec::new();
        for lot_id in self.lot_ids().await? {
            views.push(self.lot_view(lot_id, now).await?);
        }
        Ok(views)
    }

    async fn renumber_spots(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut renumbered = 0u64;

        let lots: Vec<Lot> = sqlx::query_as("SELECT * FROM parking_lots ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;

        for lot in lots {
            let spots: Vec<Spot> = sqlx::query_as(
                "SELECT * FROM parking_spots WHERE lot_id = $1 ORDER BY id FOR UPDATE",
            )
            .bind(lot.id)
            .fetch_all(&mut *tx)
            .await?;

            for (idx, spot) in spots.iter().enumerate() {
                if spot.spot_number.contains('-') {
                    continue;
                }
                sqlx::query("UPDATE parking_spots SET spot_number = $2 WHERE id = $1")
                    .bind(spot.id)
                    .bind(format!("{}-{}", lot.code, spot_label(idx + 1)))
                    .execute(&mut *tx)
                    .await?;
                renumbered += 1;
            }
        }

        tx.commit().await?;
        Ok(renumbered)
    }

    async fn reservations_for_user(&self, user_id: i64) -> Result<Vec<Reservation>> {
        let reservations = sqlx::query_as(
            "SELECT * FROM reservations WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    async fn active_reservation_for_user(&self, user_id: i64) -> Result<Option<Reservation>> {
        let reservation = sqlx::query_as(
            "SELECT * FROM reservations WHERE user_id = $1 AND status = $2 ORDER BY id LIMIT 1",
        )
        .bind(user_id)
        .bind(ReservationStatus::Active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    async fn reservations_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let reservations = sqlx::query_as(
            r#"
            SELECT * FROM reservations
            WHERE user_id = $1 AND created_at >= $2 AND created_at <= $3
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    async fn last_reservation_for_user(&self, user_id: i64) -> Result<Option<Reservation>> {
        let reservation = sqlx::query_as(
            "SELECT * FROM reservations WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    async fn lots_created_since(&self, threshold: DateTime<Utc>) -> Result<Vec<Lot>> {
        let lots =
            sqlx::query_as("SELECT * FROM parking_lots WHERE created_at >= $1 ORDER BY id")
                .bind(threshold)
                .fetch_all(&self.pool)
                .await?;
        Ok(lots)
    }
}
