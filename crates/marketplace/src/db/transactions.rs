//! Payment transaction repository.
//!
//! Every status change is a conditional update on the status the caller
//! expects to find, so a Daraja callback, the reconciler and an admin racing
//! on the same row cannot both win.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use shop_next_door_core::{
    Money, OrderId, PaymentMethod, PhoneNumber, TransactionId, TransactionStatus,
};

use super::{PAGE_SIZE, RepositoryError, page_offset};
use crate::models::{PaymentOutcome, Transaction, TransactionListing};

const TRANSACTION_COLUMNS: &str = "t.id, t.order_id, t.method, t.status, t.amount, t.phone, \
     t.merchant_request_id, t.checkout_request_id, t.mpesa_receipt_number, t.paid_amount, \
     t.result_code, t.result_description, t.initiated_at, t.completed_at, \
     t.created_at, t.updated_at";

/// Repository for payment transactions.
pub struct TransactionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TransactionRepository<'a> {
    /// Create a new transaction repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// Get the transaction of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// Find the transaction an STK callback refers to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.checkout_request_id = $1"
        ))
        .bind(checkout_request_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// List transactions for admins, newest first, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<TransactionStatus>,
        page: u32,
    ) -> Result<Vec<TransactionListing>, RepositoryError> {
        let transactions = sqlx::query_as::<_, TransactionListing>(&format!(
            "SELECT {TRANSACTION_COLUMNS}, s.name AS shop_name, u.email AS customer_email \
             FROM transactions t \
             JOIN orders o ON o.id = t.order_id \
             JOIN shops s ON s.id = o.shop_id \
             JOIN users u ON u.id = o.customer_id \
             WHERE ($1::transaction_status IS NULL OR t.status = $1) \
             ORDER BY t.created_at DESC, t.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(PAGE_SIZE)
        .bind(page_offset(page))
        .fetch_all(self.pool)
        .await?;

        Ok(transactions)
    }

    /// Pending M-Pesa transactions last touched before `cutoff`.
    ///
    /// A transaction ages from its latest payment attempt, or from its
    /// creation if no attempt was ever made, so a push still in flight is
    /// never picked up.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
             WHERE t.method = 'mpesa' AND t.status = 'pending' \
               AND COALESCE(t.initiated_at, t.created_at) < $1 \
             ORDER BY COALESCE(t.initiated_at, t.created_at) \
             LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(transactions)
    }

    /// Start a new payment attempt before an STK push.
    ///
    /// Clears the previous attempt's Daraja ids and result and stamps
    /// `initiated_at` with the attempt time. Only a `failed` transaction, or
    /// a `pending` one with no prompt at Daraja and no attempt since
    /// `attempt_cutoff`, is reset, and only while its order is still
    /// `pending`. The order row is share-locked so a concurrent cancel
    /// either commits first or waits for the reset. Returns `None` when
    /// nothing was reset.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn prepare_retry(
        &self,
        id: TransactionId,
        phone: &PhoneNumber,
        attempt_cutoff: DateTime<Utc>,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions AS t \
             SET status = 'pending', phone = $2, merchant_request_id = NULL, \
                 checkout_request_id = NULL, result_code = NULL, \
                 result_description = NULL, initiated_at = NOW(), completed_at = NULL \
             WHERE t.id = $1 \
               AND (t.status = 'failed' \
                    OR (t.status = 'pending' AND t.checkout_request_id IS NULL \
                        AND (t.initiated_at IS NULL OR t.initiated_at < $3))) \
               AND EXISTS ( \
                   SELECT 1 FROM orders o \
                   WHERE o.id = t.order_id AND o.status = 'pending' \
                   FOR SHARE) \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(phone)
        .bind(attempt_cutoff)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// Record that Daraja accepted an STK push.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the transaction is no longer pending.
    pub async fn record_initiation(
        &self,
        id: TransactionId,
        merchant_request_id: &str,
        checkout_request_id: &str,
    ) -> Result<Transaction, RepositoryError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions AS t \
             SET merchant_request_id = $2, checkout_request_id = $3, initiated_at = NOW() \
             WHERE t.id = $1 AND t.status = 'pending' \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(merchant_request_id)
        .bind(checkout_request_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "duplicate checkout request id"))?
        .ok_or_else(|| RepositoryError::Conflict(format!("transaction {id} is not pending")))
    }

    /// Apply a payment outcome if the transaction is still in `expected`.
    ///
    /// Returns `None` when someone else changed the status first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn apply_outcome(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        outcome: &PaymentOutcome,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        apply_outcome(&mut conn, id, expected, outcome).await
    }
}

// =============================================================================
// Transaction-scoped writes
// =============================================================================

/// Insert the pending payment record of a new order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    order_id: OrderId,
    method: PaymentMethod,
    amount: Money,
    phone: Option<&PhoneNumber>,
) -> Result<Transaction, RepositoryError> {
    let transaction = sqlx::query_as::<_, Transaction>(&format!(
        "INSERT INTO transactions AS t (order_id, method, amount, phone) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(order_id)
    .bind(method)
    .bind(amount)
    .bind(phone)
    .fetch_one(conn)
    .await?;

    Ok(transaction)
}

/// Lock the transaction of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_order(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Option<Transaction>, RepositoryError> {
    let transaction = sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.order_id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?;

    Ok(transaction)
}

/// Apply a payment outcome if the transaction is still in `expected`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn apply_outcome(
    conn: &mut PgConnection,
    id: TransactionId,
    expected: TransactionStatus,
    outcome: &PaymentOutcome,
) -> Result<Option<Transaction>, RepositoryError> {
    let (receipt, paid_amount, phone, result_code, description) = match outcome {
        PaymentOutcome::Successful {
            receipt_number,
            paid_amount,
            phone,
            result_code,
            description,
        } => (
            receipt_number.as_deref(),
            *paid_amount,
            phone.as_ref(),
            Some(*result_code),
            description.as_str(),
        ),
        PaymentOutcome::Failed {
            result_code,
            description,
        } => (None, None, None, *result_code, description.as_str()),
    };

    let transaction = sqlx::query_as::<_, Transaction>(&format!(
        "UPDATE transactions AS t \
         SET status = $3, \
             mpesa_receipt_number = COALESCE($4, t.mpesa_receipt_number), \
             paid_amount = COALESCE($5, t.paid_amount), \
             phone = COALESCE($6, t.phone), \
             result_code = $7, \
             result_description = $8, \
             completed_at = NOW() \
         WHERE t.id = $1 AND t.status = $2 \
         RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(id)
    .bind(expected)
    .bind(outcome.status())
    .bind(receipt)
    .bind(paid_amount)
    .bind(phone)
    .bind(result_code)
    .bind(description)
    .fetch_optional(conn)
    .await?;

    Ok(transaction)
}
