//! Spot allocation and reservation lifecycle engine.
//!
//! Validates booking input, assigns and releases spots through the entity
//! store's atomic operations, and keeps the lot availability cache consistent
//! with committed state.

pub mod calculators;
pub mod services;
pub mod validation;

// Re-export commonly used items
pub use calculators::{reservation_cost, round_money};
pub use services::{book, vacate};
