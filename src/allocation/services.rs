//! Allocation engine services.
//!
//! Orchestrates the reservation lifecycle on top of the entity store's atomic
//! operations and keeps the availability cache in step: the backing mutation
//! always commits first, then the cache entry is rebuilt, so a cached
//! projection can never show a spot as free after the commit that occupied
//! it. Store and cache are passed in explicitly so the engine can run against
//! any `ParkingStore` implementation.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::cache::LotCache;
use crate::error::Result;
use crate::models::{LotView, Reservation};
use crate::store::ParkingStore;

use super::validation::normalize_plate;

/// Book the first available spot in a lot for a user.
///
/// The plate is normalized and validated before the store is touched. Booking
/// time defaults to now; `as_of` exists so elapsed-time costs can be
/// simulated.
pub async fn book<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    user_id: i64,
    lot_id: i64,
    vehicle_number: &str,
    as_of: Option<DateTime<Utc>>,
) -> Result<Reservation> {
    let plate = normalize_plate(vehicle_number)?;
    let now = as_of.unwrap_or_else(Utc::now);

    let reservation = store.book_spot(user_id, lot_id, plate, now).await?;
    refresh_lot_cache(store, cache, lot_id).await;
    Ok(reservation)
}

/// Close the user's active reservation, computing the elapsed-time cost, and
/// release its spot.
pub async fn vacate<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    user_id: i64,
    as_of: Option<DateTime<Utc>>,
) -> Result<Reservation> {
    let now = as_of.unwrap_or_else(Utc::now);

    let reservation = store.vacate_spot(user_id, now).await?;
    refresh_lot_cache(store, cache, reservation.lot_id).await;
    Ok(reservation)
}

/// Remove a single spot from a lot, shrinking its capacity.
pub async fn delete_spot<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    lot_id: i64,
    spot_id: i64,
) -> Result<()> {
    store.delete_spot(lot_id, spot_id).await?;
    refresh_lot_cache(store, cache, lot_id).await;
    Ok(())
}

/// Remove a lot and everything under it.
pub async fn delete_lot<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    lot_id: i64,
) -> Result<()> {
    store.delete_lot(lot_id).await?;
    cache.invalidate(lot_id).await;
    Ok(())
}

/// Cache-first availability read for one lot.
pub async fn lot_availability<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    lot_id: i64,
) -> Result<LotView> {
    if let Some(cached) = cache.get(lot_id).await {
        tracing::debug!("Cache HIT for lot {}", lot_id);
        return Ok((*cached).clone());
    }
    tracing::debug!("Cache MISS for lot {}", lot_id);

    let view = store.lot_view(lot_id, Utc::now()).await?;
    cache.insert(view.clone()).await;
    Ok(view)
}

/// Availability for every lot, served from the cache where possible.
pub async fn all_lot_availability<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
) -> Result<Vec<LotView>> {
    let mut views = Vec::new();
    for lot_id in store.lot_ids().await? {
        views.push(lot_availability(store, cache, lot_id).await?);
    }
    Ok(views)
}

/// Rebuild the cached projection for a lot after a committed mutation.
///
/// Best-effort: if the projection cannot be recomputed, the stale entry is
/// dropped instead and the error never reaches the caller. The store stays
/// authoritative and the next read recomputes directly.
pub(crate) async fn refresh_lot_cache<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    lot_id: i64,
) {
    match store.lot_view(lot_id, Utc::now()).await {
        Ok(view) => cache.insert(view).await,
        Err(e) => {
            warn!("Failed to refresh cache for lot {}: {}", lot_id, e);
            cache.invalidate(lot_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Lot, ReservationStatus, SpotStatus};
    use crate::provisioning::{self, CreateLotRequest};
    use crate::store::in_memory::InMemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn setup_lot(
        store: &InMemoryStore,
        cache: &LotCache,
        code: &str,
        price: Decimal,
        capacity: i32,
    ) -> Lot {
        provisioning::create_lot(
            store,
            cache,
            CreateLotRequest {
                code: code.to_string(),
                name: format!("{code} Lot"),
                address: "1 Main St".to_string(),
                pincode: "123456".to_string(),
                price,
                number_of_spots: capacity,
            },
        )
        .await
        .unwrap()
    }

    async fn assert_occupancy_invariant(store: &InMemoryStore, lot_id: i64) {
        let view = store.lot_view(lot_id, Utc::now()).await.unwrap();
        assert_eq!(
            view.available_spots + view.occupied_spots,
            view.number_of_spots
        );
        // A spot is occupied iff exactly one active reservation references it.
        for spot in &view.spots {
            match spot.status {
                SpotStatus::Occupied => assert!(spot.occupant.is_some()),
                SpotStatus::Available => assert!(spot.occupant.is_none()),
            }
        }
    }

    #[tokio::test]
    async fn booking_occupies_the_first_available_spot() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P2", dec!(5), 3).await;

        let reservation = book(&store, &cache, 1, lot.id, "KA01AB1234", None)
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Active);
        assert!(reservation.end_time.is_none());
        assert!(reservation.cost.is_none());

        let view = store.lot_view(lot.id, Utc::now()).await.unwrap();
        assert_eq!(view.available_spots, 2);
        assert_eq!(view.spots[0].status, SpotStatus::Occupied);
        assert_eq!(view.spots[0].id, reservation.spot_id);
        assert_occupancy_invariant(&store, lot.id).await;
    }

    #[tokio::test]
    async fn capacity_one_contention_scenario() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P1", dec!(10.0), 1).await;

        let t0 = Utc::now();
        let reservation = book(&store, &cache, 1, lot.id, "KA01AB1234", Some(t0))
            .await
            .unwrap();
        assert_eq!(reservation.vehicle_number, "KA01AB1234");

        // Second user hits a full lot.
        let err = book(&store, &cache, 2, lot.id, "KA02CD5678", Some(t0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OutOfCapacity));

        // First user vacates after exactly one simulated hour.
        let completed = vacate(&store, &cache, 1, Some(t0 + Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(completed.status, ReservationStatus::Completed);
        assert_eq!(completed.cost, Some(dec!(10.00)));
        assert!(completed.end_time.unwrap() >= completed.start_time);

        // The spot is free again and the retry succeeds.
        let view = store.lot_view(lot.id, Utc::now()).await.unwrap();
        assert_eq!(view.available_spots, 1);
        let retry = book(&store, &cache, 2, lot.id, "KA02CD5678", None)
            .await
            .unwrap();
        assert_eq!(retry.spot_id, reservation.spot_id);
        assert_occupancy_invariant(&store, lot.id).await;
    }

    #[tokio::test]
    async fn one_active_reservation_per_user() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot_a = setup_lot(&store, &cache, "PA", dec!(10), 2).await;
        let lot_b = setup_lot(&store, &cache, "PB", dec!(10), 2).await;

        book(&store, &cache, 1, lot_a.id, "KA01AB1234", None)
            .await
            .unwrap();

        // A second booking conflicts even against a different lot.
        let err = book(&store, &cache, 1, lot_b.id, "KA01AB1234", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        vacate(&store, &cache, 1, None).await.unwrap();
        book(&store, &cache, 1, lot_b.id, "KA01AB1234", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_bookings_across_lots_leave_one_active_reservation() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot_a = setup_lot(&store, &cache, "CA", dec!(10), 1).await;
        let lot_b = setup_lot(&store, &cache, "CB", dec!(10), 1).await;

        let (first, second) = tokio::join!(
            book(&store, &cache, 1, lot_a.id, "KA01AB1234", None),
            book(&store, &cache, 1, lot_b.id, "KA01AB1234", None),
        );

        // The per-user guard must hold even when the two bookings target
        // different lots and therefore different spots.
        assert!(first.is_ok() != second.is_ok());
        let active: Vec<_> = store
            .reservations_for_user(1)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_active())
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn booking_racing_delete_lot_never_strands_a_reservation() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "CD", dec!(10), 1).await;

        let (booked, deleted) = tokio::join!(
            book(&store, &cache, 1, lot.id, "KA01AB1234", None),
            delete_lot(&store, &cache, lot.id),
        );

        // Whichever operation wins, an active reservation must still have its
        // lot: the delete either loses with Conflict or the booking finds the
        // lot already gone.
        match (&booked, &deleted) {
            (Ok(reservation), Err(AppError::Conflict(_))) => {
                assert!(store.get_lot(reservation.lot_id).await.is_ok());
                assert_occupancy_invariant(&store, reservation.lot_id).await;
            }
            (Err(AppError::NotFound(_)), Ok(())) => {
                assert!(store.reservations_for_user(1).await.unwrap().is_empty());
            }
            other => panic!("inconsistent outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_plate_never_reaches_the_store() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P3", dec!(10), 1).await;

        let err = book(&store, &cache, 1, lot.id, "NOTAPLATE", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let view = store.lot_view(lot.id, Utc::now()).await.unwrap();
        assert_eq!(view.available_spots, 1);
    }

    #[tokio::test]
    async fn plate_is_stored_normalized() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P4", dec!(10), 1).await;

        let reservation = book(&store, &cache, 1, lot.id, "ka 01 ab 1234", None)
            .await
            .unwrap();
        assert_eq!(reservation.vehicle_number, "KA01AB1234");
    }

    #[tokio::test]
    async fn vacate_without_active_reservation_is_not_found() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        setup_lot(&store, &cache, "P5", dec!(10), 1).await;

        let err = vacate(&store, &cache, 42, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn immediate_vacate_costs_zero() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P6", dec!(10), 1).await;

        let t0 = Utc::now();
        book(&store, &cache, 1, lot.id, "KA01AB1234", Some(t0))
            .await
            .unwrap();
        let completed = vacate(&store, &cache, 1, Some(t0)).await.unwrap();
        assert_eq!(completed.cost, Some(dec!(0)));
        assert!(completed.cost.unwrap() >= dec!(0));
    }

    #[tokio::test]
    async fn delete_spot_conflicts_while_occupied_then_shrinks_capacity() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P7", dec!(10), 2).await;

        let reservation = book(&store, &cache, 1, lot.id, "KA01AB1234", None)
            .await
            .unwrap();

        let err = delete_spot(&store, &cache, lot.id, reservation.spot_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        vacate(&store, &cache, 1, None).await.unwrap();
        delete_spot(&store, &cache, lot.id, reservation.spot_id)
            .await
            .unwrap();

        let lot = store.get_lot(lot.id).await.unwrap();
        assert_eq!(lot.number_of_spots, 1);
        assert_occupancy_invariant(&store, lot.id).await;
    }

    #[tokio::test]
    async fn delete_lot_conflicts_while_occupied_then_cascades() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P8", dec!(10), 1).await;

        book(&store, &cache, 1, lot.id, "KA01AB1234", None)
            .await
            .unwrap();
        let err = delete_lot(&store, &cache, lot.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        vacate(&store, &cache, 1, None).await.unwrap();
        delete_lot(&store, &cache, lot.id).await.unwrap();

        let err = store.lot_view(lot.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // Reservations go with the lot.
        assert!(store.reservations_for_user(1).await.unwrap().is_empty());
        assert!(cache.get(lot.id).await.is_none());
    }

    #[tokio::test]
    async fn projection_reads_are_idempotent_within_ttl() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "P9", dec!(10), 2).await;

        let first = lot_availability(&store, &cache, lot.id).await.unwrap();
        let second = lot_availability(&store, &cache, lot.id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cache_reflects_committed_state_after_booking() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "PX", dec!(10), 1).await;

        assert_eq!(cache.get(lot.id).await.unwrap().available_spots, 1);

        book(&store, &cache, 1, lot.id, "KA01AB1234", None)
            .await
            .unwrap();
        // Refreshed after the commit: the cached entry never shows the spot
        // as still available.
        assert_eq!(cache.get(lot.id).await.unwrap().available_spots, 0);

        vacate(&store, &cache, 1, None).await.unwrap();
        assert_eq!(cache.get(lot.id).await.unwrap().available_spots, 1);
    }

    #[tokio::test]
    async fn listing_covers_every_lot() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        setup_lot(&store, &cache, "L1", dec!(5), 1).await;
        setup_lot(&store, &cache, "L2", dec!(6), 2).await;

        let views = all_lot_availability(&store, &cache).await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].code, "L1");
        assert_eq!(views[1].code, "L2");
    }

    #[tokio::test]
    async fn reservations_between_filters_by_creation_window() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = setup_lot(&store, &cache, "PR", dec!(10), 1).await;

        let t0 = Utc::now() - Duration::days(30);
        book(&store, &cache, 1, lot.id, "KA01AB1234", Some(t0))
            .await
            .unwrap();
        vacate(&store, &cache, 1, Some(t0 + Duration::hours(2)))
            .await
            .unwrap();
        book(&store, &cache, 1, lot.id, "KA01AB1234", None)
            .await
            .unwrap();

        let last_week = store
            .reservations_between(1, Utc::now() - Duration::days(7), Utc::now())
            .await
            .unwrap();
        assert_eq!(last_week.len(), 1);
        assert!(last_week[0].is_active());

        let all = store
            .reservations_between(1, t0 - Duration::days(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
