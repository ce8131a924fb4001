//! Payment transaction domain types.

use chrono::{DateTime, Utc};

use shop_next_door_core::{
    Money, OrderId, PaymentMethod, PhoneNumber, TransactionId, TransactionStatus,
};

/// The payment record of an order (one per order).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    /// Amount due, equal to the order total.
    pub amount: Money,
    /// Payer's phone for mobile money.
    pub phone: Option<PhoneNumber>,
    /// Daraja's id for the STK push request.
    pub merchant_request_id: Option<String>,
    /// Daraja's id used to match callbacks and status queries.
    pub checkout_request_id: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    /// Amount reported by the payment provider.
    pub paid_amount: Option<Money>,
    pub result_code: Option<i32>,
    pub result_description: Option<String>,
    /// When the latest payment attempt started, restamped once Daraja
    /// accepts the push.
    pub initiated_at: Option<DateTime<Utc>>,
    /// When the transaction reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Whether an M-Pesa payment is waiting on the customer's phone.
    #[must_use]
    pub const fn is_awaiting_mpesa(&self) -> bool {
        matches!(self.method, PaymentMethod::Mpesa)
            && matches!(self.status, TransactionStatus::Pending)
            && self.checkout_request_id.is_some()
    }
}

/// A transaction joined with its order's shop and customer, for admins.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionListing {
    #[sqlx(flatten)]
    pub transaction: Transaction,
    pub shop_name: String,
    pub customer_email: String,
}

/// The result to record against a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Money received.
    Successful {
        receipt_number: Option<String>,
        paid_amount: Option<Money>,
        phone: Option<PhoneNumber>,
        result_code: i32,
        description: String,
    },
    /// Payment did not happen.
    Failed {
        result_code: Option<i32>,
        description: String,
    },
}

impl PaymentOutcome {
    /// A failure with no provider result code.
    #[must_use]
    pub fn failed(description: impl Into<String>) -> Self {
        Self::Failed {
            result_code: None,
            description: description.into(),
        }
    }

    /// The status this outcome moves the transaction to.
    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        match self {
            Self::Successful { .. } => TransactionStatus::Successful,
            Self::Failed { .. } => TransactionStatus::Failed,
        }
    }
}
