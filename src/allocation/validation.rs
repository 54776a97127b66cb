//! Input validation for booking and provisioning requests.

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;

use crate::error::{AppError, Result};

/// Canonical plate pattern: two letters, two digits, one-or-two letters,
/// four digits (e.g. KA01AB1234).
static PLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{2}[A-Z]{1,2}\d{4}$").expect("valid regex"));

/// Uppercase a vehicle number, strip whitespace, and check it against the
/// canonical plate pattern. Returns the normalized plate, which is what gets
/// persisted.
pub fn normalize_plate(raw: &str) -> Result<String> {
    let plate: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if PLATE_RE.is_match(&plate) {
        Ok(plate)
    } else {
        Err(AppError::InvalidInput(
            "Invalid vehicle number. Use format like KA01AB1234".to_string(),
        ))
    }
}

/// Lot codes are alphanumeric and stored upper-cased
pub fn validate_lot_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidInput(
            "Lot code must be alphanumeric".to_string(),
        ));
    }
    Ok(code)
}

/// Pincodes are exactly six digits
pub fn validate_pincode(raw: &str) -> Result<String> {
    let pin = raw.trim();
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidInput(
            "Pin code must be a 6-digit number".to_string(),
        ));
    }
    Ok(pin.to_string())
}

pub fn validate_price(price: Decimal) -> Result<Decimal> {
    if price < Decimal::ZERO {
        return Err(AppError::InvalidInput("Price cannot be negative".to_string()));
    }
    Ok(price)
}

pub fn validate_capacity(number_of_spots: i32) -> Result<i32> {
    if number_of_spots < 1 {
        return Err(AppError::InvalidInput(
            "Number of spots must be at least 1".to_string(),
        ));
    }
    Ok(number_of_spots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accepts_canonical_plates() {
        assert_eq!(normalize_plate("KA01AB1234").unwrap(), "KA01AB1234");
        // single-letter series
        assert_eq!(normalize_plate("MH12A0001").unwrap(), "MH12A0001");
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_plate("ka 01 ab 1234").unwrap(), "KA01AB1234");
        assert_eq!(normalize_plate(" dl05cx0042 ").unwrap(), "DL05CX0042");
    }

    #[test]
    fn rejects_malformed_plates() {
        for plate in ["", "KA01AB123", "K101AB1234", "KA01ABC1234", "1234ABKA01"] {
            assert!(normalize_plate(plate).is_err(), "accepted {plate:?}");
        }
    }

    #[test]
    fn lot_code_is_upper_cased_alphanumeric() {
        assert_eq!(validate_lot_code("zx1").unwrap(), "ZX1");
        assert!(validate_lot_code("").is_err());
        assert!(validate_lot_code("P-1").is_err());
    }

    #[test]
    fn pincode_must_be_six_digits() {
        assert_eq!(validate_pincode("123456").unwrap(), "123456");
        assert!(validate_pincode("12AB56").is_err());
        assert!(validate_pincode("12345").is_err());
        assert!(validate_pincode("1234567").is_err());
    }

    #[test]
    fn price_and_capacity_bounds() {
        assert!(validate_price(dec!(0)).is_ok());
        assert!(validate_price(dec!(-0.01)).is_err());
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(0).is_err());
    }
}
