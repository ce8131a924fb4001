//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. The session
//! cookie is signed with a key derived from `SND_SESSION_SECRET`.

use secrecy::ExposeSecret;
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use tower_sessions::cookie::Key;
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::MarketplaceConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "snd_session";

/// Session expiry time in seconds (7 days of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with the `PostgreSQL` store.
///
/// The session table is created by `snd-cli migrate`.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &MarketplaceConfig,
) -> SessionManagerLayer<PostgresStore, SignedCookie> {
    session_layer(PostgresStore::new(pool.clone()), config)
}

/// Cookie signing key for `config`.
///
/// The secret is stretched to the 64 bytes a [`Key`] needs with SHA-512.
#[must_use]
pub fn session_key(config: &MarketplaceConfig) -> Key {
    let digest = Sha512::digest(config.session_secret.expose_secret().as_bytes());
    Key::from(digest.as_slice())
}

/// Configure a session layer over any store.
#[must_use]
pub fn session_layer<S: SessionStore>(store: S, config: &MarketplaceConfig) -> SessionManagerLayer<S, SignedCookie> {
    SessionManagerLayer::new(store)
        .with_signed(session_key(config))
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use secrecy::SecretString;
    use tower_sessions::cookie::{Cookie, CookieJar};

    use super::*;
    use crate::config::PaymentTimingConfig;

    fn config(secret: &str) -> MarketplaceConfig {
        MarketplaceConfig {
            database_url: SecretString::from("postgres://localhost/snd"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_url: "http://localhost:3000".to_owned(),
            session_secret: SecretString::from(secret),
            payments: PaymentTimingConfig::default(),
            mpesa: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_session_key_depends_on_secret() {
        let a = session_key(&config("kQ7#vN2$pL9@xR4!mT6^wB8&zC1*jH5%"));
        let b = session_key(&config("zP3!qW8@eR5#tY2$uI9%oA6^sD1&fG4*"));
        assert_eq!(a.master(), session_key(&config("kQ7#vN2$pL9@xR4!mT6^wB8&zC1*jH5%")).master());
        assert_ne!(a.master(), b.master());
    }

    #[test]
    fn test_signed_cookie_rejects_forged_value() {
        let key = session_key(&config("kQ7#vN2$pL9@xR4!mT6^wB8&zC1*jH5%"));

        let mut jar = CookieJar::new();
        jar.signed_mut(&key)
            .add(Cookie::new(SESSION_COOKIE_NAME, "session-id"));
        let signed = jar.get(SESSION_COOKIE_NAME).unwrap().value().to_owned();
        assert_ne!(signed, "session-id");

        let mut incoming = CookieJar::new();
        incoming.add_original(Cookie::new(SESSION_COOKIE_NAME, signed));
        assert_eq!(
            incoming.signed(&key).get(SESSION_COOKIE_NAME).unwrap().value(),
            "session-id"
        );

        let mut forged = CookieJar::new();
        forged.add_original(Cookie::new(SESSION_COOKIE_NAME, "session-id"));
        assert!(forged.signed(&key).get(SESSION_COOKIE_NAME).is_none());
    }
}
