//! Payment error types.

use thiserror::Error;

use shop_next_door_core::{PhoneNumberError, TransactionStatus};

use crate::db::RepositoryError;
use crate::mpesa::MpesaError;

/// Errors raised while taking or settling payments.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order not found")]
    OrderNotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    /// The order or its payment cannot be paid through M-Pesa right now.
    #[error("{0}")]
    NotPayable(String),

    #[error("this order has already been paid")]
    AlreadyPaid,

    /// An earlier prompt is still waiting on the customer's phone.
    #[error("a payment prompt is already waiting on your phone")]
    InProgress,

    #[error("a phone number is required for M-Pesa payments")]
    PhoneRequired,

    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneNumberError),

    #[error("cannot move a payment from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Someone else changed the transaction first.
    #[error("the payment was updated by someone else; reload and try again")]
    Conflict,

    #[error("M-Pesa error: {0}")]
    Mpesa(#[from] MpesaError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl PaymentError {
    /// Message safe to show the customer.
    ///
    /// Daraja and database failures are replaced by fixed text; their
    /// details belong in the logs.
    #[must_use]
    pub fn customer_message(&self) -> String {
        match self {
            Self::Mpesa(MpesaError::NotConfigured) => {
                "M-Pesa payments are not available right now".to_owned()
            }
            Self::Mpesa(MpesaError::InvalidSignature) => "Invalid signature".to_owned(),
            Self::Mpesa(MpesaError::InvalidAmount(_)) => {
                "This amount cannot be paid through M-Pesa".to_owned()
            }
            Self::Mpesa(_) => "The payment service is unavailable, please try again".to_owned(),
            Self::Repository(RepositoryError::Conflict(_)) => Self::Conflict.to_string(),
            Self::Repository(RepositoryError::NotFound) => Self::TransactionNotFound.to_string(),
            Self::Repository(_) => "Something went wrong, please try again".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_message_hides_gateway_and_database_detail() {
        let rejected = PaymentError::Mpesa(MpesaError::Rejected {
            code: "500.001.1001".to_owned(),
            message: "Unable to lock subscriber, a transaction is already in process".to_owned(),
        });
        assert_eq!(
            rejected.customer_message(),
            "The payment service is unavailable, please try again"
        );

        let token = PaymentError::Mpesa(MpesaError::AuthenticationFailed(
            r#"{"errorCode":"400.008.01","errorMessage":"Invalid Authentication passed"}"#
                .to_owned(),
        ));
        assert!(!token.customer_message().contains("errorCode"));

        let db = PaymentError::Repository(RepositoryError::DataCorruption(
            "transactions.amount out of range".to_owned(),
        ));
        assert_eq!(db.customer_message(), "Something went wrong, please try again");
    }

    #[test]
    fn test_customer_message_keeps_domain_explanations() {
        assert_eq!(
            PaymentError::InProgress.customer_message(),
            "a payment prompt is already waiting on your phone"
        );
        assert_eq!(
            PaymentError::NotPayable("order is cancelled and can no longer be paid".to_owned())
                .customer_message(),
            "order is cancelled and can no longer be paid"
        );
    }
}
