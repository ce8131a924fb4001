//! M-Pesa Daraja error types.

use thiserror::Error;

/// Errors that can occur when talking to the Daraja API.
#[derive(Debug, Error)]
pub enum MpesaError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The OAuth token request was refused.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Daraja answered with an error code or a non-zero response code.
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The amount cannot be charged (zero or out of range).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A callback URL signature did not verify.
    #[error("invalid callback signature")]
    InvalidSignature,

    /// M-Pesa credentials are not configured.
    #[error("M-Pesa is not configured")]
    NotConfigured,
}
