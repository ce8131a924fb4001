//! `snd-cli` subcommands.

pub mod migrate;
pub mod user;

use secrecy::SecretString;
use thiserror::Error;

/// Errors shared by the commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Session table creation failed.
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: customer, vendor, admin")]
    InvalidRole(String),

    /// User creation or update failed.
    #[error(transparent)]
    Auth(#[from] shop_next_door_marketplace::services::auth::AuthError),
}

/// Database URL from `SND_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("SND_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("SND_DATABASE_URL"))
}
