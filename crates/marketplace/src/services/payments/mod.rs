//! Payment service.
//!
//! Starts M-Pesa STK pushes, applies Daraja callbacks, and reconciles
//! payments whose callback never arrived. Every status change goes through
//! a conditional update on the expected current status, so a callback, the
//! reconciler and an admin can race without double-settling a payment.

mod error;

pub use error::PaymentError;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};

use shop_next_door_core::{
    OrderId, OrderStatus, PaymentMethod, PhoneNumber, TransactionId, TransactionStatus,
};

use crate::config::PaymentTimingConfig;
use crate::db::{OrderRepository, TransactionRepository};
use crate::models::{CurrentUser, PaymentOutcome, Transaction};
use crate::mpesa::types::{CallbackAck, StkCallback, StkQueryResult};
use crate::mpesa::{MpesaClient, MpesaError};
use crate::state::AppState;

/// Most stale transactions handled in one reconciler sweep.
const RECONCILE_BATCH: i64 = 100;

/// Description stored on payments whose STK push never went out.
pub const NEVER_INITIATED: &str = "payment was never initiated";

/// Description stored when Daraja refused or failed an STK push.
pub const STK_PUSH_FAILED: &str = "could not start the M-Pesa payment, please try again";

/// Payment service.
pub struct PaymentService<'a> {
    pool: &'a PgPool,
    mpesa: Option<&'a MpesaClient>,
    timing: PaymentTimingConfig,
}

impl<'a> PaymentService<'a> {
    /// Create a payment service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        mpesa: Option<&'a MpesaClient>,
        timing: PaymentTimingConfig,
    ) -> Self {
        Self {
            pool,
            mpesa,
            timing,
        }
    }

    /// Create a payment service from the application state.
    #[must_use]
    pub fn from_state(state: &'a AppState) -> Self {
        Self::new(state.pool(), state.mpesa(), state.config().payments)
    }

    fn mpesa(&self) -> Result<&'a MpesaClient, PaymentError> {
        self.mpesa.ok_or(PaymentError::Mpesa(MpesaError::NotConfigured))
    }

    fn transactions(&self) -> TransactionRepository<'a> {
        TransactionRepository::new(self.pool)
    }

    // =========================================================================
    // STK push
    // =========================================================================

    /// Send an STK push for a customer's pending order.
    ///
    /// A failed payment is put back to pending for the retry. A prompt that
    /// has been open past the timeout is first looked up at Daraja; only a
    /// prompt Daraja reports as failed is replaced. When Daraja refuses the
    /// push the transaction is marked failed so the customer can try again.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` if the order is not the
    /// customer's, `PaymentError::NotPayable` or `PaymentError::AlreadyPaid`
    /// if it cannot be paid, `PaymentError::InProgress` while a prompt is
    /// still open, `PaymentError::Conflict` if the order changed meanwhile,
    /// and `PaymentError::Mpesa` if Daraja fails.
    #[instrument(skip(self, customer, phone), fields(customer_id = %customer.id))]
    pub async fn initiate_mpesa(
        &self,
        customer: &CurrentUser,
        order_id: OrderId,
        phone: Option<&str>,
    ) -> Result<Transaction, PaymentError> {
        let mpesa = self.mpesa()?;

        let order = OrderRepository::new(self.pool)
            .get(order_id)
            .await?
            .filter(|o| o.customer_id == customer.id)
            .ok_or(PaymentError::OrderNotFound)?;
        if order.status != OrderStatus::Pending {
            return Err(PaymentError::NotPayable(format!(
                "order is {} and can no longer be paid",
                order.status
            )));
        }

        let mut transaction = self
            .transactions()
            .get_by_order(order_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;
        let now = Utc::now();
        if needs_status_check(&transaction, now, self.timing.timeout) {
            transaction = self.reconcile(transaction).await?;
        }
        check_retry_allowed(&transaction, now, self.timing.timeout)?;

        let phone = match phone.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => PhoneNumber::parse(raw)?,
            None => transaction.phone.clone().ok_or(PaymentError::PhoneRequired)?,
        };

        let attempt_cutoff = now - to_time_delta(self.timing.timeout);
        let prepared = self
            .transactions()
            .prepare_retry(transaction.id, &phone, attempt_cutoff)
            .await?
            .ok_or(PaymentError::Conflict)?;

        let accepted = match mpesa.stk_push(order_id, &phone, prepared.amount).await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "STK push failed");
                let outcome = PaymentOutcome::failed(STK_PUSH_FAILED);
                self.transactions()
                    .apply_outcome(prepared.id, TransactionStatus::Pending, &outcome)
                    .await?;
                return Err(e.into());
            }
        };

        let recorded = self
            .transactions()
            .record_initiation(
                prepared.id,
                &accepted.merchant_request_id,
                &accepted.checkout_request_id,
            )
            .await
            .inspect_err(|e| {
                error!(
                    order_id = %order_id,
                    checkout_request_id = %accepted.checkout_request_id,
                    error = %e,
                    "STK push sent but not recorded; check the payment at Daraja"
                );
            })?;

        info!(
            order_id = %order_id,
            checkout_request_id = %accepted.checkout_request_id,
            phone = %phone.masked(),
            "STK push sent"
        );

        Ok(recorded)
    }

    // =========================================================================
    // Callback
    // =========================================================================

    /// Apply a Daraja callback.
    ///
    /// Once the signature verifies the answer is always an acknowledgement,
    /// even when the callback changes nothing, so Daraja stops retrying.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Mpesa(MpesaError::InvalidSignature)` for a bad
    /// signature and `PaymentError::Repository` if the database fails.
    #[instrument(
        skip(self, signature, callback),
        fields(checkout_request_id = %callback.checkout_request_id, result_code = callback.result_code)
    )]
    pub async fn handle_callback(
        &self,
        order_id: OrderId,
        signature: &str,
        callback: &StkCallback,
    ) -> Result<CallbackAck, PaymentError> {
        let mpesa = self.mpesa()?;
        if let Err(e) = mpesa.verify_callback(order_id, signature) {
            warn!(order_id = %order_id, "Rejected M-Pesa callback with bad signature");
            return Err(e.into());
        }

        let Some(transaction) = self
            .transactions()
            .get_by_checkout_request_id(&callback.checkout_request_id)
            .await?
        else {
            warn!(order_id = %order_id, "Callback for unknown checkout request");
            return Ok(CallbackAck::accepted());
        };

        if transaction.order_id != order_id {
            warn!(
                order_id = %order_id,
                transaction_order_id = %transaction.order_id,
                "Callback order does not match its checkout request"
            );
            return Ok(CallbackAck::accepted());
        }

        if transaction.status.is_terminal() {
            info!(
                order_id = %order_id,
                status = %transaction.status,
                "Callback for settled payment ignored"
            );
            return Ok(CallbackAck::accepted());
        }

        let outcome = callback_outcome(&transaction, callback);
        self.settle(&transaction, &outcome, "callback").await?;

        Ok(CallbackAck::accepted())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Ask Daraja about one customer's order payment.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` if the order is not the
    /// customer's and `PaymentError::Mpesa` if Daraja fails.
    pub async fn refresh_for_customer(
        &self,
        customer: &CurrentUser,
        order_id: OrderId,
    ) -> Result<Transaction, PaymentError> {
        OrderRepository::new(self.pool)
            .get(order_id)
            .await?
            .filter(|o| o.customer_id == customer.id)
            .ok_or(PaymentError::OrderNotFound)?;

        let transaction = self
            .transactions()
            .get_by_order(order_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;

        self.reconcile(transaction).await
    }

    /// Ask Daraja about any transaction (admin).
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::TransactionNotFound` or `PaymentError::Mpesa`.
    pub async fn refresh_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Transaction, PaymentError> {
        let transaction = self
            .transactions()
            .get(id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;

        self.reconcile(transaction).await
    }

    /// Settle every M-Pesa payment that has been pending past the timeout.
    ///
    /// Returns how many payments changed. Errors on single transactions are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Repository` if the stale list cannot be read.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(&self) -> Result<usize, PaymentError> {
        let cutoff = Utc::now() - to_time_delta(self.timing.timeout);
        let stale = self
            .transactions()
            .list_stale_pending(cutoff, RECONCILE_BATCH)
            .await?;

        let mut settled = 0;
        for transaction in stale {
            let id = transaction.id;
            match self.reconcile(transaction).await {
                Ok(t) if t.status.is_terminal() => settled += 1,
                Ok(_) => {}
                Err(e) => warn!(transaction_id = %id, error = %e, "Reconcile failed"),
            }
        }

        if settled > 0 {
            info!(settled, "Reconciled stale payments");
        }
        Ok(settled)
    }

    /// Bring one transaction up to date with Daraja.
    async fn reconcile(&self, transaction: Transaction) -> Result<Transaction, PaymentError> {
        if transaction.method != PaymentMethod::Mpesa
            || transaction.status != TransactionStatus::Pending
        {
            return Ok(transaction);
        }

        let Some(checkout_request_id) = transaction.checkout_request_id.as_deref() else {
            let attempted_at = transaction.initiated_at.unwrap_or(transaction.created_at);
            let waited = Utc::now() - attempted_at;
            if waited < to_time_delta(self.timing.timeout) {
                return Ok(transaction);
            }
            let outcome = PaymentOutcome::failed(NEVER_INITIATED);
            return self.settle(&transaction, &outcome, "reconciler").await;
        };

        let result = self.mpesa()?.stk_query(checkout_request_id).await?;
        match query_outcome(&transaction, result) {
            Some(outcome) => self.settle(&transaction, &outcome, "stk query").await,
            None => {
                debug!(checkout_request_id, "Payment still processing");
                Ok(transaction)
            }
        }
    }

    // =========================================================================
    // Manual settlement
    // =========================================================================

    /// Mark a payment successful or failed by hand (admin).
    ///
    /// Airtel Money and cash payments are confirmed out of band and settled
    /// here.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidTransition` for a step the payment
    /// lifecycle doesn't allow and `PaymentError::Conflict` if the
    /// transaction changed meanwhile.
    #[instrument(skip(self, admin), fields(admin_id = %admin.id))]
    pub async fn settle_manually(
        &self,
        admin: &CurrentUser,
        id: TransactionId,
        next: TransactionStatus,
    ) -> Result<Transaction, PaymentError> {
        let transaction = self
            .transactions()
            .get(id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;

        let outcome = manual_outcome(&transaction, next, admin)?;
        let updated = self
            .transactions()
            .apply_outcome(id, transaction.status, &outcome)
            .await?
            .ok_or(PaymentError::Conflict)?;

        warn!(
            admin_id = %admin.id,
            transaction_id = %id,
            order_id = %updated.order_id,
            from = %transaction.status,
            to = %updated.status,
            "Payment settled manually"
        );

        Ok(updated)
    }

    /// The payment of an order, for its customer or an admin.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` if the viewer may not see it.
    pub async fn payment_for(
        &self,
        viewer: &CurrentUser,
        order_id: OrderId,
    ) -> Result<Transaction, PaymentError> {
        let order = OrderRepository::new(self.pool)
            .get(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        if order.customer_id != viewer.id && !viewer.is_admin() {
            return Err(PaymentError::OrderNotFound);
        }

        self.transactions()
            .get_by_order(order_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)
    }

    /// Apply `outcome` if the transaction is still pending.
    ///
    /// Losing the race to another writer is not an error; the current row
    /// is returned instead.
    async fn settle(
        &self,
        transaction: &Transaction,
        outcome: &PaymentOutcome,
        source: &'static str,
    ) -> Result<Transaction, PaymentError> {
        let applied = self
            .transactions()
            .apply_outcome(transaction.id, TransactionStatus::Pending, outcome)
            .await?;

        match applied {
            Some(updated) => {
                info!(
                    order_id = %updated.order_id,
                    transaction_id = %updated.id,
                    checkout_request_id = updated.checkout_request_id.as_deref().unwrap_or("-"),
                    status = %updated.status,
                    source,
                    "Payment settled"
                );
                Ok(updated)
            }
            None => {
                debug!(transaction_id = %transaction.id, source, "Payment already settled");
                self.transactions()
                    .get(transaction.id)
                    .await?
                    .ok_or(PaymentError::TransactionNotFound)
            }
        }
    }
}

/// Run [`PaymentService::reconcile_stale`] every reconcile interval.
pub fn spawn_reconciler(state: AppState) {
    let interval = state.config().payments.reconcile_interval;
    info!(interval_secs = interval.as_secs(), "Starting payment reconciler");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; let the server finish starting.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = PaymentService::from_state(&state).reconcile_stale().await {
                error!(error = %e, "Payment reconciliation sweep failed");
            }
        }
    });
}

// =============================================================================
// Decisions
// =============================================================================

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(365))
}

/// Whether a prompt is still open or waiting to be sent.
fn attempt_is_recent(transaction: &Transaction, now: DateTime<Utc>, timeout: Duration) -> bool {
    transaction
        .initiated_at
        .is_some_and(|at| now - at < to_time_delta(timeout))
}

/// Whether Daraja must be asked about the current prompt before a retry.
fn needs_status_check(transaction: &Transaction, now: DateTime<Utc>, timeout: Duration) -> bool {
    transaction.method == PaymentMethod::Mpesa
        && transaction.status == TransactionStatus::Pending
        && transaction.checkout_request_id.is_some()
        && !attempt_is_recent(transaction, now, timeout)
}

/// Whether a new STK push may be sent for this payment.
///
/// A pending payment with a prompt at Daraja is never re-pushed; the prompt
/// has to be settled first, by callback or by an STK query.
fn check_retry_allowed(
    transaction: &Transaction,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<(), PaymentError> {
    if transaction.method != PaymentMethod::Mpesa {
        return Err(PaymentError::NotPayable(format!(
            "this order is paid by {}",
            transaction.method.label()
        )));
    }

    match transaction.status {
        TransactionStatus::Successful => Err(PaymentError::AlreadyPaid),
        TransactionStatus::Failed => Ok(()),
        TransactionStatus::Pending => {
            let open_prompt = transaction.checkout_request_id.is_some()
                || attempt_is_recent(transaction, now, timeout);
            if open_prompt {
                Err(PaymentError::InProgress)
            } else {
                Ok(())
            }
        }
    }
}

/// What a callback means for the payment.
///
/// A successful callback for less than the order amount is treated as a
/// failed payment.
fn callback_outcome(transaction: &Transaction, callback: &StkCallback) -> PaymentOutcome {
    if !callback.is_success() {
        return PaymentOutcome::Failed {
            result_code: Some(callback.result_code_i32()),
            description: callback.result_desc.clone(),
        };
    }

    match callback.amount() {
        Some(paid) if paid >= transaction.amount => PaymentOutcome::Successful {
            receipt_number: callback.mpesa_receipt_number(),
            paid_amount: Some(paid),
            phone: callback.phone_number(),
            result_code: 0,
            description: callback.result_desc.clone(),
        },
        paid => PaymentOutcome::Failed {
            result_code: Some(0),
            description: format!(
                "amount mismatch: paid {}, expected {}",
                paid.map_or_else(|| "nothing".to_owned(), |p| p.display()),
                transaction.amount.display()
            ),
        },
    }
}

/// What an STK query result means for the payment; `None` while processing.
fn query_outcome(transaction: &Transaction, result: StkQueryResult) -> Option<PaymentOutcome> {
    match result {
        StkQueryResult::Processing => None,
        StkQueryResult::Completed {
            result_code: 0,
            description,
        } => Some(PaymentOutcome::Successful {
            receipt_number: None,
            paid_amount: Some(transaction.amount),
            phone: None,
            result_code: 0,
            description,
        }),
        StkQueryResult::Completed {
            result_code,
            description,
        } => Some(PaymentOutcome::Failed {
            result_code: Some(i32::try_from(result_code).unwrap_or(i32::MAX)),
            description,
        }),
    }
}

fn manual_outcome(
    transaction: &Transaction,
    next: TransactionStatus,
    admin: &CurrentUser,
) -> Result<PaymentOutcome, PaymentError> {
    let invalid = || PaymentError::InvalidTransition {
        from: transaction.status,
        to: next,
    };
    if !transaction.status.can_transition_to(next) {
        return Err(invalid());
    }

    match next {
        TransactionStatus::Successful => Ok(PaymentOutcome::Successful {
            receipt_number: None,
            paid_amount: Some(transaction.amount),
            phone: None,
            result_code: 0,
            description: format!("settled manually by admin {}", admin.id),
        }),
        TransactionStatus::Failed => Ok(PaymentOutcome::failed(format!(
            "marked failed by admin {}",
            admin.id
        ))),
        TransactionStatus::Pending => Err(invalid()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shop_next_door_core::{Email, Money, UserId, UserRole};

    use super::*;
    use crate::mpesa::types::CallbackEnvelope;

    fn transaction(status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(3),
            order_id: OrderId::new(7),
            method: PaymentMethod::Mpesa,
            status,
            amount: Money::from_shillings(1500),
            phone: Some(PhoneNumber::parse("0712345678").unwrap()),
            merchant_request_id: None,
            checkout_request_id: None,
            mpesa_receipt_number: None,
            paid_amount: None,
            result_code: None,
            result_description: None,
            initiated_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            id: UserId::new(1),
            email: Email::parse("admin@example.com").unwrap(),
            name: "Admin".to_owned(),
            role: UserRole::Admin,
        }
    }

    fn callback(json: &str) -> StkCallback {
        serde_json::from_str::<CallbackEnvelope>(json)
            .unwrap()
            .body
            .stk_callback
    }

    fn paid_callback(amount: u32) -> StkCallback {
        callback(&format!(
            r#"{{"Body":{{"stkCallback":{{
                "MerchantRequestID":"29115-34620561-1",
                "CheckoutRequestID":"ws_CO_191220191020363925",
                "ResultCode":0,
                "ResultDesc":"The service request is processed successfully.",
                "CallbackMetadata":{{"Item":[
                    {{"Name":"Amount","Value":{amount}}},
                    {{"Name":"MpesaReceiptNumber","Value":"NLJ7RT61SV"}},
                    {{"Name":"TransactionDate","Value":20191219102115}},
                    {{"Name":"PhoneNumber","Value":254708374149}}
                ]}}
            }}}}}}"#
        ))
    }

    #[test]
    fn test_callback_success_with_full_amount() {
        let pending = transaction(TransactionStatus::Pending);
        let outcome = callback_outcome(&pending, &paid_callback(1500));
        match outcome {
            PaymentOutcome::Successful {
                receipt_number,
                paid_amount,
                phone,
                ..
            } => {
                assert_eq!(receipt_number.as_deref(), Some("NLJ7RT61SV"));
                assert_eq!(paid_amount, Some(Money::from_shillings(1500)));
                assert_eq!(phone.unwrap().as_str(), "254708374149");
            }
            PaymentOutcome::Failed { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn test_callback_short_payment_fails() {
        let pending = transaction(TransactionStatus::Pending);
        let outcome = callback_outcome(&pending, &paid_callback(1));
        assert_eq!(outcome.status(), TransactionStatus::Failed);
        let PaymentOutcome::Failed { description, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(description.starts_with("amount mismatch"));
    }

    #[test]
    fn test_callback_cancelled_by_user() {
        let cancelled = callback(
            r#"{"Body":{"stkCallback":{
                "MerchantRequestID":"29115-34620561-1",
                "CheckoutRequestID":"ws_CO_191220191020363925",
                "ResultCode":1032,
                "ResultDesc":"Request cancelled by user"
            }}}"#,
        );
        let outcome = callback_outcome(&transaction(TransactionStatus::Pending), &cancelled);
        assert_eq!(
            outcome,
            PaymentOutcome::Failed {
                result_code: Some(1032),
                description: "Request cancelled by user".to_owned(),
            }
        );
    }

    #[test]
    fn test_query_outcome() {
        let pending = transaction(TransactionStatus::Pending);
        assert_eq!(query_outcome(&pending, StkQueryResult::Processing), None);

        let paid = query_outcome(
            &pending,
            StkQueryResult::Completed {
                result_code: 0,
                description: "ok".to_owned(),
            },
        )
        .unwrap();
        assert_eq!(paid.status(), TransactionStatus::Successful);

        let timed_out = query_outcome(
            &pending,
            StkQueryResult::Completed {
                result_code: 1037,
                description: "DS timeout user cannot be reached".to_owned(),
            },
        )
        .unwrap();
        assert!(matches!(
            timed_out,
            PaymentOutcome::Failed {
                result_code: Some(1037),
                ..
            }
        ));
    }

    #[test]
    fn test_retry_rules() {
        let now = Utc::now();
        let timeout = Duration::from_secs(180);

        assert!(check_retry_allowed(&transaction(TransactionStatus::Failed), now, timeout).is_ok());
        assert!(matches!(
            check_retry_allowed(&transaction(TransactionStatus::Successful), now, timeout),
            Err(PaymentError::AlreadyPaid)
        ));

        let mut open = transaction(TransactionStatus::Pending);
        open.checkout_request_id = Some("ws_CO_1".to_owned());
        open.initiated_at = Some(now - TimeDelta::seconds(30));
        assert!(matches!(
            check_retry_allowed(&open, now, timeout),
            Err(PaymentError::InProgress)
        ));

        // Still pending after the timeout: Daraja has to settle it first.
        open.initiated_at = Some(now - TimeDelta::seconds(600));
        assert!(matches!(
            check_retry_allowed(&open, now, timeout),
            Err(PaymentError::InProgress)
        ));

        let mut in_flight = transaction(TransactionStatus::Pending);
        in_flight.initiated_at = Some(now - TimeDelta::seconds(2));
        assert!(matches!(
            check_retry_allowed(&in_flight, now, timeout),
            Err(PaymentError::InProgress)
        ));

        in_flight.initiated_at = Some(now - TimeDelta::seconds(600));
        assert!(check_retry_allowed(&in_flight, now, timeout).is_ok());
        assert!(check_retry_allowed(&transaction(TransactionStatus::Pending), now, timeout).is_ok());

        let mut cod = transaction(TransactionStatus::Pending);
        cod.method = PaymentMethod::Cod;
        assert!(matches!(
            check_retry_allowed(&cod, now, timeout),
            Err(PaymentError::NotPayable(_))
        ));
    }

    #[test]
    fn test_stale_prompt_is_queried_before_retry() {
        let now = Utc::now();
        let timeout = Duration::from_secs(180);

        let mut prompt = transaction(TransactionStatus::Pending);
        prompt.checkout_request_id = Some("ws_CO_first".to_owned());
        prompt.initiated_at = Some(now - TimeDelta::seconds(240));
        assert!(needs_status_check(&prompt, now, timeout));

        prompt.initiated_at = Some(now - TimeDelta::seconds(20));
        assert!(!needs_status_check(&prompt, now, timeout));

        let never_pushed = transaction(TransactionStatus::Pending);
        assert!(!needs_status_check(&never_pushed, now, timeout));

        let mut failed = transaction(TransactionStatus::Failed);
        failed.checkout_request_id = Some("ws_CO_first".to_owned());
        failed.initiated_at = Some(now - TimeDelta::seconds(240));
        assert!(!needs_status_check(&failed, now, timeout));
    }

    #[test]
    fn test_manual_outcome_follows_lifecycle() {
        let admin = admin();

        let ok = manual_outcome(
            &transaction(TransactionStatus::Pending),
            TransactionStatus::Successful,
            &admin,
        )
        .unwrap();
        assert_eq!(ok.status(), TransactionStatus::Successful);

        assert!(manual_outcome(
            &transaction(TransactionStatus::Failed),
            TransactionStatus::Successful,
            &admin
        )
        .is_ok());

        assert!(matches!(
            manual_outcome(
                &transaction(TransactionStatus::Successful),
                TransactionStatus::Failed,
                &admin
            ),
            Err(PaymentError::InvalidTransition { .. })
        ));
        assert!(matches!(
            manual_outcome(
                &transaction(TransactionStatus::Failed),
                TransactionStatus::Pending,
                &admin
            ),
            Err(PaymentError::InvalidTransition { .. })
        ));
    }
}
