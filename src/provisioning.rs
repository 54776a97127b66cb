//! Lot provisioning: creation, partial updates, and deterministic spot
//! numbering.
//!
//! Spot numbers are derived purely from the lot code and the spot's ordinal
//! position, row-major: ten spots per row, rows lettered A upward, columns
//! numbered 1..=10. Spot 1 is `<code>-A1`, spot 10 is `<code>-A10`, spot 11
//! is `<code>-B1`, and so on.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::allocation::services::refresh_lot_cache;
use crate::allocation::validation::{
    validate_capacity, validate_lot_code, validate_pincode, validate_price,
};
use crate::cache::LotCache;
use crate::error::{AppError, Result};
use crate::models::{Lot, LotPatch, NewLot};
use crate::store::ParkingStore;

/// Row-major label for the 1-based ordinal `i`: A1..A10, B1..B10, ...
pub fn spot_label(i: usize) -> String {
    let row = (b'A' + ((i - 1) / 10) as u8) as char;
    let col = (i - 1) % 10 + 1;
    format!("{row}{col}")
}

/// Full spot numbers for a lot, in allocation order.
pub fn spot_numbers(code: &str, capacity: i32) -> Vec<String> {
    (1..=capacity as usize)
        .map(|i| format!("{code}-{}", spot_label(i)))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLotRequest {
    pub code: String,
    pub name: String,
    pub address: String,
    pub pincode: String,
    pub price: Decimal,
    pub number_of_spots: i32,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLotRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub pincode: Option<String>,
    pub price: Option<Decimal>,
}

fn required_text(raw: &str, what: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{what} is required")));
    }
    Ok(value.to_string())
}

/// Validate and create a lot with its full set of numbered spots, then seed
/// the availability cache.
pub async fn create_lot<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    req: CreateLotRequest,
) -> Result<Lot> {
    let code = validate_lot_code(&req.code)?;
    let name = required_text(&req.name, "Lot name")?;
    let address = required_text(&req.address, "Address")?;
    let pincode = validate_pincode(&req.pincode)?;
    let price = validate_price(req.price)?;
    let number_of_spots = validate_capacity(req.number_of_spots)?;

    let numbers = spot_numbers(&code, number_of_spots);
    let lot = store
        .create_lot(
            NewLot {
                code,
                name,
                address,
                pincode,
                price,
                number_of_spots,
            },
            numbers,
        )
        .await?;

    info!(
        "Created lot {} ({}) with {} spots",
        lot.id, lot.code, lot.number_of_spots
    );
    refresh_lot_cache(store, cache, lot.id).await;
    Ok(lot)
}

/// Validate the provided fields and apply a partial lot update, then refresh
/// the cached projection.
pub async fn update_lot<S: ParkingStore>(
    store: &S,
    cache: &LotCache,
    lot_id: i64,
    req: UpdateLotRequest,
) -> Result<Lot> {
    let patch = LotPatch {
        name: req
            .name
            .map(|n| required_text(&n, "Lot name"))
            .transpose()?,
        address: req
            .address
            .map(|a| required_text(&a, "Address"))
            .transpose()?,
        pincode: req.pincode.map(|p| validate_pincode(&p)).transpose()?,
        price: req.price.map(validate_price).transpose()?,
    };

    let lot = store.update_lot(lot_id, patch).await?;
    refresh_lot_cache(store, cache, lot_id).await;
    Ok(lot)
}

/// Startup repair pass: renumber spots whose number does not follow the
/// `<code>-<label>` convention, keyed by ascending spot id within each lot.
pub async fn renumber_spots<S: ParkingStore>(store: &S) -> Result<()> {
    let changed = store.renumber_spots().await?;
    if changed > 0 {
        info!("Renumbered {} parking spots", changed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;

    fn request(code: &str, name: &str, capacity: i32) -> CreateLotRequest {
        CreateLotRequest {
            code: code.to_string(),
            name: name.to_string(),
            address: "1 Main St".to_string(),
            pincode: "123456".to_string(),
            price: dec!(10),
            number_of_spots: capacity,
        }
    }

    #[test]
    fn labels_wrap_rows_at_ten() {
        assert_eq!(spot_label(1), "A1");
        assert_eq!(spot_label(10), "A10");
        assert_eq!(spot_label(11), "B1");
        assert_eq!(spot_label(25), "C5");
    }

    #[test]
    fn numbers_are_code_prefixed_in_allocation_order() {
        assert_eq!(spot_numbers("ZX1", 3), vec!["ZX1-A1", "ZX1-A2", "ZX1-A3"]);

        let twelve = spot_numbers("P1", 12);
        assert_eq!(twelve.len(), 12);
        assert_eq!(twelve[9], "P1-A10");
        assert_eq!(twelve[10], "P1-B1");
        assert_eq!(twelve[11], "P1-B2");
    }

    #[tokio::test]
    async fn create_lot_validates_before_storing() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();

        let mut bad = request("P1", "Central", 2);
        bad.pincode = "12AB56".to_string();
        let err = create_lot(&store, &cache, bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(store.lot_ids().await.unwrap().is_empty());

        let lot = create_lot(&store, &cache, request("p1", "Central", 2))
            .await
            .unwrap();
        assert_eq!(lot.code, "P1");
        // cache is seeded on create
        assert_eq!(cache.get(lot.id).await.unwrap().available_spots, 2);
    }

    #[tokio::test]
    async fn duplicate_name_or_code_is_a_conflict() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        create_lot(&store, &cache, request("P1", "Central", 1))
            .await
            .unwrap();

        let err = create_lot(&store, &cache, request("P1", "Other", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = create_lot(&store, &cache, request("P2", "Central", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = create_lot(&store, &cache, request("P1", "Central", 1))
            .await
            .unwrap();

        let updated = update_lot(
            &store,
            &cache,
            lot.id,
            UpdateLotRequest {
                price: Some(dec!(12.50)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.price, dec!(12.50));
        assert_eq!(updated.name, "Central");
        assert_eq!(updated.pincode, "123456");
        assert_eq!(cache.get(lot.id).await.unwrap().price, dec!(12.50));
    }

    #[tokio::test]
    async fn update_rejects_invalid_fields() {
        let store = InMemoryStore::new();
        let cache = LotCache::new();
        let lot = create_lot(&store, &cache, request("P1", "Central", 1))
            .await
            .unwrap();

        let err = update_lot(
            &store,
            &cache,
            lot.id,
            UpdateLotRequest {
                price: Some(dec!(-1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
