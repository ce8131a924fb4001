//! Authentication service.
//!
//! Email and password accounts with argon2 hashes. Admin accounts are never
//! self-registered; they are created or promoted from the CLI.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::instrument;

use shop_next_door_core::{Email, PhoneNumber, UserId, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted password; argon2 cost grows with input.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// Raw registration input as submitted.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub role: UserRole,
}

/// Authentication service.
///
/// Handles user registration, login and role changes.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a customer or vendor account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RoleNotAllowed` for admin registration, a
    /// validation error for bad input, and `AuthError::UserAlreadyExists` if
    /// the email is taken.
    #[instrument(skip(self, registration), fields(role = %registration.role))]
    pub async fn register(&self, registration: &Registration<'_>) -> Result<User, AuthError> {
        if !registration.role.is_self_service() {
            return Err(AuthError::RoleNotAllowed(registration.role));
        }
        self.create_user(registration).await
    }

    /// Create an account of any role (CLI only).
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`], without the role restriction.
    pub async fn create_user(&self, registration: &Registration<'_>) -> Result<User, AuthError> {
        let email = Email::parse(registration.email)?;
        let name = validate_name(registration.name)?;
        let phone = registration
            .phone
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PhoneNumber::parse)
            .transpose()?;
        validate_password(registration.password)?;

        let password_hash = hash_password(registration.password)?;

        let new_user = NewUser {
            email: &email,
            name: &name,
            phone: phone.as_ref(),
            role: registration.role,
        };

        let user = self
            .users
            .create_with_password(&new_user, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Change the role of the account with this email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if there is no such account.
    pub async fn set_role_by_email(&self, email: &str, role: UserRole) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.set_role(user.id, role).await
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if there is no such account.
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, AuthError> {
        let user = self.users.update_role(id, role).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => AuthError::Repository(other),
        })?;
        tracing::warn!(user_id = %id, role = %role, "User role changed");
        Ok(user)
    }

    /// Set a new password for an account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password is too short.
    pub async fn set_password(&self, id: UserId, password: &str) -> Result<(), AuthError> {
        validate_password(password)?;
        let hash = hash_password(password)?;
        self.users.set_password_hash(id, &hash).await?;
        Ok(())
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Trim a display name and check its length.
fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::InvalidName("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  Wanjiku  ").unwrap(), "Wanjiku");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"n".repeat(101)).is_err());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_admin_before_touching_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = AuthService::new(&pool);

        let err = service
            .register(&Registration {
                email: "boss@example.co.ke",
                password: "longenough",
                name: "Boss",
                phone: None,
                role: UserRole::Admin,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RoleNotAllowed(UserRole::Admin)));
    }
}
