//! Sales analytics for vendor and admin dashboards.

use chrono::{NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use sqlx::PgPool;

use shop_next_door_core::Money;

use crate::db::{AnalyticsRepository, RepositoryError};
use crate::models::{AnalyticsScope, DailyRevenue, SalesSummary, TopProduct};

/// Default length of the daily revenue series.
pub const DEFAULT_DAYS: u32 = 30;

/// Longest daily revenue series.
pub const MAX_DAYS: u32 = 365;

/// Best sellers shown on dashboards.
const TOP_PRODUCTS: i64 = 5;

/// Summary plus daily series, as served to chart scripts.
#[derive(Debug, Clone, Serialize)]
pub struct SalesReport {
    pub summary: SalesSummary,
    pub days: u32,
    pub daily: Vec<DailyRevenue>,
}

/// Clamp a requested series length to `1..=365`, defaulting to 30.
#[must_use]
pub fn clamp_days(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
}

/// Today's date in Nairobi.
#[must_use]
pub fn nairobi_today() -> NaiveDate {
    // East Africa Time is UTC+3 with no daylight saving.
    (Utc::now() + TimeDelta::hours(3)).date_naive()
}

/// One point per day from `first` to `last` inclusive, zero where `points`
/// has no entry.
#[must_use]
pub fn zero_fill(points: &[DailyRevenue], first: NaiveDate, last: NaiveDate) -> Vec<DailyRevenue> {
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| {
            points
                .iter()
                .find(|p| p.day == day)
                .cloned()
                .unwrap_or_else(|| DailyRevenue {
                    day,
                    revenue: Money::ZERO,
                    orders: 0,
                })
        })
        .collect()
}

/// Analytics service.
pub struct AnalyticsService<'a> {
    analytics: AnalyticsRepository<'a>,
}

impl<'a> AnalyticsService<'a> {
    /// Create a new analytics service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            analytics: AnalyticsRepository::new(pool),
        }
    }

    /// Order counts and revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, scope: AnalyticsScope) -> Result<SalesSummary, RepositoryError> {
        self.analytics.sales_summary(scope).await
    }

    /// Revenue for each of the last `days` days, today included.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn daily_revenue(
        &self,
        scope: AnalyticsScope,
        days: Option<u32>,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let days = clamp_days(days);
        let today = nairobi_today();
        let first = today - TimeDelta::days(i64::from(days) - 1);

        let points = self.analytics.daily_revenue(scope, first).await?;
        Ok(zero_fill(&points, first, today))
    }

    /// Best sellers by units.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(
        &self,
        scope: AnalyticsScope,
    ) -> Result<Vec<TopProduct>, RepositoryError> {
        self.analytics.top_products(scope, TOP_PRODUCTS).await
    }

    /// Summary and daily series together.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn report(
        &self,
        scope: AnalyticsScope,
        days: Option<u32>,
    ) -> Result<SalesReport, RepositoryError> {
        let summary = self.summary(scope).await?;
        let days = clamp_days(days);
        let daily = self.daily_revenue(scope, Some(days)).await?;
        Ok(SalesReport {
            summary,
            days,
            daily,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_clamp_days() {
        assert_eq!(clamp_days(None), 30);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(7)), 7);
        assert_eq!(clamp_days(Some(365)), 365);
        assert_eq!(clamp_days(Some(5000)), 365);
    }

    #[test]
    fn test_zero_fill_covers_every_day() {
        let points = vec![DailyRevenue {
            day: date(2026, 3, 2),
            revenue: Money::from_shillings(1200),
            orders: 3,
        }];

        let filled = zero_fill(&points, date(2026, 2, 28), date(2026, 3, 3));

        let days: Vec<NaiveDate> = filled.iter().map(|p| p.day).collect();
        assert_eq!(
            days,
            vec![
                date(2026, 2, 28),
                date(2026, 3, 1),
                date(2026, 3, 2),
                date(2026, 3, 3)
            ]
        );
        assert_eq!(filled[2].revenue, Money::from_shillings(1200));
        assert_eq!(filled[2].orders, 3);
        assert!(filled[0].revenue.is_zero());
        assert_eq!(filled[3].orders, 0);
    }

    #[test]
    fn test_zero_fill_single_day() {
        let filled = zero_fill(&[], date(2026, 1, 1), date(2026, 1, 1));
        assert_eq!(filled.len(), 1);
        assert!(filled[0].revenue.is_zero());
    }
}
