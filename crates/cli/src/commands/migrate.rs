//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! snd-cli migrate
//! ```
//!
//! Applies `crates/marketplace/migrations/` and creates the
//! `tower_sessions` table used by the session store.

use tower_sessions_sqlx_store::PostgresStore;

use shop_next_door_marketplace::db;

use super::{CommandError, database_url};

/// Run all marketplace migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running marketplace migrations...");
    sqlx::migrate!("../marketplace/migrations").run(&pool).await?;

    tracing::info!("Creating session store table...");
    PostgresStore::new(pool.clone())
        .migrate()
        .await
        .map_err(|e| CommandError::SessionStore(e.to_string()))?;

    tracing::info!("Migrations complete!");
    Ok(())
}
