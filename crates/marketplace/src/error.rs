//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry and logged before responding; clients never see
//! internal details. JSON routes wrap the same error in [`ApiError`].

use askama::Template;
use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::mpesa::MpesaError;
use crate::services::auth::AuthError;
use crate::services::impersonation::ImpersonationError;
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;
use crate::services::shops::ShopError;

/// Application-level error type for the marketplace.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Shop error: {0}")]
    Shop(#[from] ShopError),

    #[error("Impersonation error: {0}")]
    Impersonation(#[from] ImpersonationError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in without the needed role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_)
                | AuthError::InvalidPhone(_)
                | AuthError::InvalidName(_)
                | AuthError::WeakPassword(_)
                | AuthError::RoleNotAllowed(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Order(err) => match err {
                OrderError::ShopNotFound | OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::Forbidden => StatusCode::FORBIDDEN,
                OrderError::InsufficientStock { .. } | OrderError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                OrderError::PaymentMethodUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                OrderError::Repository(err) => repository_status(err),
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Payment(err) => match err {
                PaymentError::OrderNotFound | PaymentError::TransactionNotFound => {
                    StatusCode::NOT_FOUND
                }
                PaymentError::NotPayable(_)
                | PaymentError::AlreadyPaid
                | PaymentError::InProgress
                | PaymentError::InvalidTransition { .. }
                | PaymentError::Conflict => StatusCode::CONFLICT,
                PaymentError::PhoneRequired | PaymentError::InvalidPhone(_) => {
                    StatusCode::BAD_REQUEST
                }
                PaymentError::Mpesa(err) => mpesa_status(err),
                PaymentError::Repository(err) => repository_status(err),
            },
            Self::Shop(err) => match err {
                ShopError::Invalid(_) | ShopError::InvalidPrice(_) => StatusCode::BAD_REQUEST,
                ShopError::ShopNotFound | ShopError::ProductNotFound => StatusCode::NOT_FOUND,
                ShopError::Repository(err) => repository_status(err),
            },
            Self::Impersonation(err) => match err {
                ImpersonationError::NotAdmin => StatusCode::FORBIDDEN,
                ImpersonationError::UserNotFound => StatusCode::NOT_FOUND,
                ImpersonationError::TargetIsAdmin
                | ImpersonationError::SelfTarget
                | ImpersonationError::AlreadyImpersonating
                | ImpersonationError::NotImpersonating => StatusCode::BAD_REQUEST,
                ImpersonationError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ImpersonationError::Repository(err) => repository_status(err),
            },
            Self::Session(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show the client.
    ///
    /// Server-side failures get a generic message; domain errors explain
    /// themselves.
    #[must_use]
    pub fn public_message(&self) -> String {
        let status = self.status();
        if status.is_server_error() {
            return match status {
                StatusCode::BAD_GATEWAY => "The payment service is unavailable, please try again",
                StatusCode::SERVICE_UNAVAILABLE => "This feature is not available right now",
                _ => "Internal server error",
            }
            .to_owned();
        }

        match self {
            Self::Auth(AuthError::InvalidCredentials) => "Invalid email or password".to_owned(),
            Self::Auth(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::Payment(err) => err.customer_message(),
            Self::Shop(err) => err.to_string(),
            Self::Impersonation(err) => err.to_string(),
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg) | Self::Forbidden(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, slow down".to_owned(),
            _ => "Internal server error".to_owned(),
        }
    }

    /// Capture server errors to Sentry.
    fn report(&self) {
        if self.status().is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn mpesa_status(err: &MpesaError) -> StatusCode {
    match err {
        MpesaError::InvalidSignature => StatusCode::UNAUTHORIZED,
        MpesaError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        MpesaError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        MpesaError::Http(_)
        | MpesaError::AuthenticationFailed(_)
        | MpesaError::Rejected { .. }
        | MpesaError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Error page.
#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    status: u16,
    title: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();

        let status = self.status();
        let message = self.public_message();
        let page = ErrorTemplate {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_owned(),
            message: message.clone(),
        };

        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(_) => (status, message).into_response(),
        }
    }
}

/// [`AppError`] rendered as `{"error": "..."}` for JSON routes.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl<E: Into<AppError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.report();
        let status = self.0.status();
        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for JSON routes.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Set the Sentry user context.
///
/// Call this after sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shop_next_door_core::{OrderStatus, TransactionStatus};

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("shop".to_string());
        assert_eq!(err.to_string(), "Not found: shop");
        assert_eq!(err.public_message(), "shop not found");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn status(err: impl Into<AppError>) -> StatusCode {
            err.into().into_response().status()
        }

        assert_eq!(status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status(OrderError::EmptyOrder), StatusCode::BAD_REQUEST);
        assert_eq!(status(OrderError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status(OrderError::InvalidTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Pending,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(PaymentError::Mpesa(MpesaError::InvalidSignature)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(PaymentError::Mpesa(MpesaError::NotConfigured)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(PaymentError::InvalidTransition {
                from: TransactionStatus::Successful,
                to: TransactionStatus::Failed,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::Payment(PaymentError::Mpesa(MpesaError::AuthenticationFailed(
            "consumer key rejected".into(),
        )));
        assert!(!err.public_message().contains("consumer key"));
    }

    #[test]
    fn test_client_payment_errors_use_customer_text() {
        let err = AppError::Payment(PaymentError::Mpesa(MpesaError::InvalidAmount(
            "KES 0.40 rounds to zero".into(),
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "This amount cannot be paid through M-Pesa");

        let err = AppError::Payment(PaymentError::Repository(RepositoryError::Conflict(
            "transaction 41 is not pending".into(),
        )));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(!err.public_message().contains("41"));
    }

    #[test]
    fn test_api_error_is_json() {
        let response = ApiError::from(OrderError::EmptyOrder).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }
}
