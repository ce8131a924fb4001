//! Aggregate queries behind the vendor and admin dashboards.

use chrono::NaiveDate;
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::{AnalyticsScope, DailyRevenue, SalesSummary, TopProduct};

/// Repository for analytics queries.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    /// Create a new analytics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Order counts and revenue for a scope.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_summary(
        &self,
        scope: AnalyticsScope,
    ) -> Result<SalesSummary, RepositoryError> {
        let summary = sqlx::query_as::<_, SalesSummary>(
            r"
            SELECT COUNT(*) AS order_count,
                   COUNT(*) FILTER (WHERE o.status = 'pending') AS pending_orders,
                   COUNT(*) FILTER (WHERE o.status = 'completed') AS completed_orders,
                   COUNT(*) FILTER (WHERE o.status = 'cancelled') AS cancelled_orders,
                   COALESCE(SUM(t.amount) FILTER (WHERE t.status = 'successful'), 0)
                       AS revenue,
                   COALESCE(ROUND(AVG(t.amount) FILTER (WHERE t.status = 'successful'), 2), 0)
                       AS average_order_value
            FROM orders o
            JOIN shops s ON s.id = o.shop_id
            JOIN transactions t ON t.order_id = o.id
            WHERE ($1::INTEGER IS NULL OR s.vendor_id = $1)
            ",
        )
        .bind(scope.vendor_id())
        .fetch_one(self.pool)
        .await?;

        Ok(summary)
    }

    /// Successful revenue per day (Nairobi time) from `since` onwards.
    ///
    /// Days without revenue are absent; callers zero-fill.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn daily_revenue(
        &self,
        scope: AnalyticsScope,
        since: NaiveDate,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyRevenue>(
            r"
            SELECT (t.completed_at AT TIME ZONE 'Africa/Nairobi')::DATE AS day,
                   SUM(t.amount) AS revenue,
                   COUNT(*) AS orders
            FROM transactions t
            JOIN orders o ON o.id = t.order_id
            JOIN shops s ON s.id = o.shop_id
            WHERE t.status = 'successful'
              AND t.completed_at IS NOT NULL
              AND (t.completed_at AT TIME ZONE 'Africa/Nairobi')::DATE >= $2
              AND ($1::INTEGER IS NULL OR s.vendor_id = $1)
            GROUP BY 1
            ORDER BY 1
            ",
        )
        .bind(scope.vendor_id())
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Best sellers by units in orders that were not cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(
        &self,
        scope: AnalyticsScope,
        limit: i64,
    ) -> Result<Vec<TopProduct>, RepositoryError> {
        let products = sqlx::query_as::<_, TopProduct>(
            r"
            SELECT oi.product_id,
                   MAX(oi.product_name) AS name,
                   MAX(s.name) AS shop_name,
                   SUM(oi.quantity)::BIGINT AS units_sold,
                   SUM(oi.unit_price * oi.quantity) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN shops s ON s.id = o.shop_id
            WHERE o.status <> 'cancelled'
              AND ($1::INTEGER IS NULL OR s.vendor_id = $1)
            GROUP BY oi.product_id
            ORDER BY units_sold DESC, revenue DESC
            LIMIT $2
            ",
        )
        .bind(scope.vendor_id())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }
}
