//! Aggregate queries for the admin dashboard.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Platform-wide counts for the admin summary endpoint
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlatformSummary {
    pub total_lots: i64,
    pub total_spots: i64,
    pub available_spots: i64,
    pub occupied_spots: i64,
    pub total_users: i64,
    pub total_reservations: i64,
    pub active_reservations: i64,
}

pub async fn platform_summary(pool: &PgPool) -> Result<PlatformSummary, sqlx::Error> {
    sqlx::query_as::<_, PlatformSummary>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM parking_lots) AS total_lots,
            (SELECT COUNT(*) FROM parking_spots) AS total_spots,
            (SELECT COUNT(*) FROM parking_spots WHERE status = 'available') AS available_spots,
            (SELECT COUNT(*) FROM parking_spots WHERE status = 'occupied') AS occupied_spots,
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM reservations) AS total_reservations,
            (SELECT COUNT(*) FROM reservations WHERE status = 'active') AS active_reservations
        "#,
    )
    .fetch_one(pool)
    .await
}

/// Total revenue across all completed reservations
pub async fn total_revenue(pool: &PgPool) -> Result<Decimal, sqlx::Error> {
    let revenue: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(cost) FROM reservations WHERE status = 'completed'",
    )
    .fetch_one(pool)
    .await?;
    Ok(revenue.unwrap_or(Decimal::ZERO))
}

/// Seed the default admin account if no user claims the username yet
pub async fn ensure_default_admin(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (username, email, role)
        VALUES ('admin', 'admin@example.com', 'admin')
        ON CONFLICT (username) DO NOTHING
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
