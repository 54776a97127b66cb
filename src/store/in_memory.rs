//! In-memory entity store.
//!
//! All state sits behind a single mutex, so every trait operation is atomic
//! by construction. Backs the engine tests and small demo deployments;
//! everything is lost on restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::allocation::calculators::reservation_cost;
use crate::error::{AppError, Result};
use crate::models::{
    Lot, LotPatch, LotView, NewLot, Reservation, ReservationStatus, Spot, SpotStatus,
};
use crate::provisioning::spot_label;

use super::ParkingStore;

#[derive(Default)]
struct State {
    lots: BTreeMap<i64, Lot>,
    spots: BTreeMap<i64, Spot>,
    reservations: BTreeMap<i64, Reservation>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn first_available_spot_id(&self, lot_id: i64) -> Option<i64> {
        // BTreeMap iteration gives ascending spot ids, the allocation order.
        self.spots
            .values()
            .find(|s| s.lot_id == lot_id && s.status == SpotStatus::Available)
            .map(|s| s.id)
    }

    fn active_reservation_for(&self, user_id: i64) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.user_id == user_id && r.is_active())
    }

    fn build_view(&self, lot: &Lot, now: DateTime<Utc>) -> LotView {
        let spots: Vec<Spot> = self
            .spots
            .values()
            .filter(|s| s.lot_id == lot.id)
            .cloned()
            .collect();
        let active: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.lot_id == lot.id && r.is_active())
            .cloned()
            .collect();
        LotView::build(lot, &spots, &active, now)
    }
}

/// In-memory implementation of the `ParkingStore` trait
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store state mutex poisoned")
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParkingStore for InMemoryStore {
    async fn create_lot(&self, lot: NewLot, spot_numbers: Vec<String>) -> Result<Lot> {
        let mut state = self.state();

        let duplicate = state
            .lots
            .values()
            .any(|l| l.name == lot.name || l.code == lot.code);
        if duplicate {
            return Err(AppError::Conflict(
                "A parking lot with this name or code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let id = state.next_id();
        let created = Lot {
            id,
            code: lot.code,
            name: lot.name,
            address: lot.address,
            pincode: lot.pincode,
            price: lot.price,
            number_of_spots: spot_numbers.len() as i32,
            created_at: now,
            updated_at: now,
        };
        state.lots.insert(id, created.clone());

        for number in spot_numbers {
            let spot_id = state.next_id();
            state.spots.insert(
                spot_id,
                Spot {
                    id: spot_id,
                    lot_id: id,
                    spot_number: number,
                    status: SpotStatus::Available,
                    created_at: now,
                },
            );
        }

        Ok(created)
    }

    async fn get_lot(&self, lot_id: i64) -> Result<Lot> {
        self.state()
            .lots
            .get(&lot_id)
            .cloned()
            .ok_or(AppError::NotFound("Parking lot"))
    }

    async fn lot_ids(&self) -> Result<Vec<i64>> {
        Ok(self.state().lots.keys().copied().collect())
    }

    async fn update_lot(&self, lot_id: i64, patch: LotPatch) -> Result<Lot> {
        let mut state = self.state();
        let lot = state
            .lots
            .get_mut(&lot_id)
            .ok_or(AppError::NotFound("Parking lot"))?;

        if let Some(name) = patch.name {
            lot.name = name;
        }
        if let Some(address) = patch.address {
            lot.address = address;
        }
        if let Some(pincode) = patch.pincode {
            lot.pincode = pincode;
        }
        if let Some(price) = patch.price {
            lot.price = price;
        }
        lot.updated_at = Utc::now();

        Ok(lot.clone())
    }

    async fn delete_lot(&self, lot_id: i64) -> Result<()> {
        let mut state = self.state();
        if !state.lots.contains_key(&lot_id) {
            return Err(AppError::NotFound("Parking lot"));
        }

        let occupied = state
            .spots
            .values()
            .any(|s| s.lot_id == lot_id && s.status == SpotStatus::Occupied);
        if occupied {
            return Err(AppError::Conflict(
                "Cannot delete a lot while spots are occupied".to_string(),
            ));
        }

        state.lots.remove(&lot_id);
        state.spots.retain(|_, s| s.lot_id != lot_id);
        state.reservations.retain(|_, r| r.lot_id != lot_id);
        Ok(())
    }

    async fn delete_spot(&self, lot_id: i64, spot_id: i64) -> Result<()> {
        let mut state = self.state();
        let spot = state
            .spots
            .get(&spot_id)
            .filter(|s| s.lot_id == lot_id)
            .ok_or(AppError::NotFound("Parking spot"))?;

        if spot.status == SpotStatus::Occupied {
            return Err(AppError::Conflict(
                "Cannot delete an occupied spot".to_string(),
            ));
        }
        let actively_reserved = state
            .reservations
            .values()
            .any(|r| r.spot_id == spot_id && r.is_active());
        if actively_reserved {
            return Err(AppError::Conflict(
                "Cannot delete a spot with an active reservation".to_string(),
            ));
        }

        state.spots.remove(&spot_id);
        state.reservations.retain(|_, r| r.spot_id != spot_id);
        if let Some(lot) = state.lots.get_mut(&lot_id) {
            lot.number_of_spots = (lot.number_of_spots - 1).max(0);
            lot.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn book_spot(
        &self,
        user_id: i64,
        lot_id: i64,
        vehicle_number: String,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut state = self.state();
        if !state.lots.contains_key(&lot_id) {
            return Err(AppError::NotFound("Parking lot"));
        }

        if state.active_reservation_for(user_id).is_some() {
            return Err(AppError::Conflict(
                "You already have an active reservation".to_string(),
            ));
        }

        let spot_id = state
            .first_available_spot_id(lot_id)
            .ok_or(AppError::OutOfCapacity)?;

        let id = state.next_id();
        let reservation = Reservation {
            id,
            user_id,
            spot_id,
            lot_id,
            start_time: now,
            end_time: None,
            status: ReservationStatus::Active,
            vehicle_number,
            cost: None,
            created_at: now,
            updated_at: now,
        };
        state.reservations.insert(id, reservation.clone());
        if let Some(spot) = state.spots.get_mut(&spot_id) {
            spot.status = SpotStatus::Occupied;
        }

        Ok(reservation)
    }

    async fn vacate_spot(&self, user_id: i64, now: DateTime<Utc>) -> Result<Reservation> {
        let mut state = self.state();
        let reservation_id = state
            .active_reservation_for(user_id)
            .map(|r| r.id)
            .ok_or(AppError::NotFound("Active reservation"))?;

        // Resolve spot and lot defensively; the cascade invariants should make
        // these lookups infallible.
        let (spot_id, lot_id) = {
            let r = &state.reservations[&reservation_id];
            (r.spot_id, r.lot_id)
        };
        if !state.spots.contains_key(&spot_id) {
            return Err(AppError::NotFound("Parking spot"));
        }
        let price = state
            .lots
            .get(&lot_id)
            .ok_or(AppError::NotFound("Parking lot"))?
            .price;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or(AppError::NotFound("Active reservation"))?;
        reservation.end_time = Some(now);
        reservation.cost = Some(reservation_cost(reservation.start_time, now, price));
        reservation.status = ReservationStatus::Completed;
        reservation.updated_at = now;
        let completed = reservation.clone();

        if let Some(spot) = state.spots.get_mut(&spot_id) {
            spot.status = SpotStatus::Available;
        }

        Ok(completed)
    }

    async fn lot_view(&self, lot_id: i64, now: DateTime<Utc>) -> Result<LotView> {
        let state = self.state();
        let lot = state
            .lots
            .get(&lot_id)
            .ok_or(AppError::NotFound("Parking lot"))?;
        Ok(state.build_view(lot, now))
    }

    async fn lot_views(&self, now: DateTime<Utc>) -> Result<Vec<LotView>> {
        let state = self.state();
        Ok(state
            .lots
            .values()
            .map(|lot| state.build_view(lot, now))
            .collect())
    }

    async fn renumber_spots(&self) -> Result<u64> {
        let mut state = self.state();
        let mut renumbered = 0u64;

        let lot_codes: Vec<(i64, String)> = state
            .lots
            .values()
            .map(|l| (l.id, l.code.clone()))
            .collect();

        for (lot_id, code) in lot_codes {
            let spot_ids: Vec<i64> = state
                .spots
                .values()
                .filter(|s| s.lot_id == lot_id)
                .map(|s| s.id)
                .collect();

            for (idx, spot_id) in spot_ids.iter().enumerate() {
                let spot = state.spots.get_mut(spot_id).expect("spot id just listed");
                if !spot.spot_number.contains('-') {
                    spot.spot_number = format!("{code}-{}", spot_label(idx + 1));
                    renumbered += 1;
                }
            }
        }

        Ok(renumbered)
    }

    async fn reservations_for_user(&self, user_id: i64) -> Result<Vec<Reservation>> {
        let state = self.state();
        let mut reservations: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reservations)
    }

    async fn active_reservation_for_user(&self, user_id: i64) -> Result<Option<Reservation>> {
        Ok(self.state().active_reservation_for(user_id).cloned())
    }

    async fn reservations_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let state = self.state();
        let mut reservations: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && r.created_at >= from && r.created_at <= to)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reservations)
    }

    async fn last_reservation_for_user(&self, user_id: i64) -> Result<Option<Reservation>> {
        let state = self.state();
        Ok(state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn lots_created_since(&self, threshold: DateTime<Utc>) -> Result<Vec<Lot>> {
        let state = self.state();
        Ok(state
            .lots
            .values()
            .filter(|l| l.created_at >= threshold)
            .cloned()
            .collect())
    }
}
