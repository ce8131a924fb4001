//! Role, type and status enums for marketplace entities.
//!
//! Every enum serializes to its `snake_case` wire name, which is also the
//! label of the matching `PostgreSQL` enum type.

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a known enum label.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Implements `as_str`, `Display`, `FromStr` and `ALL` for a unit enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The `snake_case` label used on the wire and in the database.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($label => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Role of a marketplace account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Browses shops and places orders.
    #[default]
    Customer,
    /// Owns shops and fulfils their orders.
    Vendor,
    /// Operates the marketplace.
    Admin,
}

string_enum!(UserRole, "user role", {
    Customer => "customer",
    Vendor => "vendor",
    Admin => "admin",
});

impl UserRole {
    /// Roles a visitor may pick on the registration form.
    #[must_use]
    pub const fn is_self_service(&self) -> bool {
        matches!(self, Self::Customer | Self::Vendor)
    }

    /// Whether the role can manage shops (admins can manage all of them).
    #[must_use]
    pub const fn can_manage_shops(&self) -> bool {
        matches!(self, Self::Vendor | Self::Admin)
    }

    /// Dashboard a freshly logged-in user lands on.
    #[must_use]
    pub const fn dashboard_path(&self) -> &'static str {
        match self {
            Self::Customer => "/account/orders",
            Self::Vendor => "/vendor",
            Self::Admin => "/admin",
        }
    }
}

/// Kind of storefront a vendor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShopType {
    #[default]
    LocalShop,
    GroceryShop,
}

string_enum!(ShopType, "shop type", {
    LocalShop => "local_shop",
    GroceryShop => "grocery_shop",
});

impl ShopType {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LocalShop => "Local shop",
            Self::GroceryShop => "Grocery shop",
        }
    }
}

/// Whether a shop is visible to customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShopStatus {
    #[default]
    Active,
    Inactive,
}

string_enum!(ShopStatus, "shop status", {
    Active => "active",
    Inactive => "inactive",
});

impl ShopStatus {
    /// The other status, used by the activate/deactivate toggle.
    #[must_use]
    pub const fn toggled(&self) -> Self {
        match self {
            Self::Active => Self::Inactive,
            Self::Inactive => Self::Active,
        }
    }
}

/// Fulfilment lifecycle of an order.
///
/// ```text
/// pending ──► shipped ──► completed
///    │           │
///    ├───────────┴──► cancelled
///    └──────────────► completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Completed,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Shipped => "shipped",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a valid lifecycle step.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Shipped | Self::Completed | Self::Cancelled)
                | (Self::Shipped, Self::Completed | Self::Cancelled)
        )
    }

    /// Whether entering this status puts the ordered stock back on the shelf.
    #[must_use]
    pub const fn releases_stock(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Statuses reachable from this one.
    #[must_use]
    pub fn next_statuses(&self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Safaricom M-Pesa via STK push.
    #[default]
    Mpesa,
    /// Airtel Money, settled manually by an admin.
    Airtel,
    /// Cash on delivery, settled when the order completes.
    Cod,
}

string_enum!(PaymentMethod, "payment method", {
    Mpesa => "mpesa",
    Airtel => "airtel",
    Cod => "cod",
});

impl PaymentMethod {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Mpesa => "M-Pesa",
            Self::Airtel => "Airtel Money",
            Self::Cod => "Cash on delivery",
        }
    }

    /// Whether the payer's phone number is required to place the order.
    #[must_use]
    pub const fn requires_phone(&self) -> bool {
        matches!(self, Self::Mpesa | Self::Airtel)
    }
}

/// Settlement state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "transaction_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Successful,
    Failed,
}

string_enum!(TransactionStatus, "transaction status", {
    Pending => "pending",
    Successful => "successful",
    Failed => "failed",
});

impl TransactionStatus {
    /// Whether the payment outcome is known.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `failed → successful` exists for manual settlement by an admin after
    /// the money is confirmed out of band. A failed payment re-enters
    /// `pending` only through a payment retry.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Successful | Self::Failed)
                | (Self::Failed, Self::Successful | Self::Pending)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), *role);
        }
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), *status);
        }
        assert_eq!("grocery_shop".parse::<ShopType>().unwrap(), ShopType::GroceryShop);
        assert_eq!("cod".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cod);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "refunded".parse::<TransactionStatus>().unwrap_err();
        assert_eq!(err.kind, "transaction status");
        assert_eq!(err.to_string(), "invalid transaction status: refunded");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ShopType::LocalShop).unwrap(),
            "\"local_shop\""
        );
        let method: PaymentMethod = serde_json::from_str("\"mpesa\"").unwrap();
        assert_eq!(method, PaymentMethod::Mpesa);
    }

    #[test]
    fn test_order_transitions() {
        use OrderStatus::{Cancelled, Completed, Pending, Shipped};

        assert!(Pending.can_transition_to(Shipped));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Completed));
        assert!(Shipped.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(Completed.next_statuses().is_empty());
        assert_eq!(Shipped.next_statuses(), vec![Completed, Cancelled]);
    }

    #[test]
    fn test_only_cancel_releases_stock() {
        assert!(OrderStatus::Cancelled.releases_stock());
        assert!(!OrderStatus::Completed.releases_stock());
    }

    #[test]
    fn test_transaction_transitions() {
        use TransactionStatus::{Failed, Pending, Successful};

        assert!(Pending.can_transition_to(Successful));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Successful));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Successful.can_transition_to(Failed));
        assert!(!Successful.can_transition_to(Pending));
        assert!(Successful.is_terminal() && Failed.is_terminal() && !Pending.is_terminal());
    }

    #[test]
    fn test_role_helpers() {
        assert!(UserRole::Vendor.is_self_service());
        assert!(!UserRole::Admin.is_self_service());
        assert!(UserRole::Admin.can_manage_shops());
        assert_eq!(UserRole::Customer.dashboard_path(), "/account/orders");
        assert_eq!(ShopStatus::Active.toggled(), ShopStatus::Inactive);
    }
}
