//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::MarketplaceConfig;
use crate::mpesa::{MpesaClient, MpesaError};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketplaceConfig,
    pool: PgPool,
    mpesa: Option<MpesaClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Builds the Daraja client when M-Pesa is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the M-Pesa HTTP client cannot be built.
    pub fn new(config: MarketplaceConfig, pool: PgPool) -> Result<Self, MpesaError> {
        let mpesa = config.mpesa.clone().map(MpesaClient::new).transpose()?;
        Ok(Self::with_mpesa(config, pool, mpesa))
    }

    /// Create application state with an explicit (or no) M-Pesa client.
    #[must_use]
    pub fn with_mpesa(config: MarketplaceConfig, pool: PgPool, mpesa: Option<MpesaClient>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                mpesa,
            }),
        }
    }

    /// Get a reference to the marketplace configuration.
    #[must_use]
    pub fn config(&self) -> &MarketplaceConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the Daraja client, if M-Pesa is enabled.
    #[must_use]
    pub fn mpesa(&self) -> Option<&MpesaClient> {
        self.inner.mpesa.as_ref()
    }
}
