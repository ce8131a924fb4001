//! Authentication error types.

use thiserror::Error;

use shop_next_door_core::UserRole;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] shop_next_door_core::EmailError),

    /// Invalid phone number.
    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] shop_next_door_core::PhoneNumberError),

    /// Name missing or too long.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The role cannot be chosen at registration.
    #[error("cannot register as {0}")]
    RoleNotAllowed(UserRole),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
