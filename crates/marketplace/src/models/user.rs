//! User domain types.

use chrono::{DateTime, Utc};

use shop_next_door_core::{Email, PhoneNumber, UserId, UserRole};

/// A marketplace account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Default M-Pesa number for payments.
    pub phone: Option<PhoneNumber>,
    /// What the account may do.
    pub role: UserRole,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
