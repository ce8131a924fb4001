//! Marketplace configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SND_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SND_BASE_URL` - Public URL of the marketplace
//! - `SND_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `SND_HOST` - Bind address (default: 127.0.0.1)
//! - `SND_PORT` - Listen port (default: 3000)
//! - `SND_PAYMENT_TIMEOUT_SECS` - Age after which a pending payment is reconciled (default: 180)
//! - `SND_RECONCILE_INTERVAL_SECS` - How often the reconciler runs (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//!
//! ## M-Pesa (all-or-nothing)
//! - `MPESA_CONSUMER_KEY`, `MPESA_CONSUMER_SECRET` - Daraja app credentials
//! - `MPESA_SHORTCODE` - Paybill / till number
//! - `MPESA_PASSKEY` - Lipa na M-Pesa online passkey
//! - `MPESA_CALLBACK_SECRET` - Key used to sign callback URLs
//! - `MPESA_ENVIRONMENT` - `sandbox` (default) or `production`
//! - `MPESA_CALLBACK_URL` - Override for the callback endpoint

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Names of the variables that must be set together to enable M-Pesa.
const MPESA_REQUIRED_VARS: &[&str] = &[
    "MPESA_CONSUMER_KEY",
    "MPESA_CONSUMER_SECRET",
    "MPESA_SHORTCODE",
    "MPESA_PASSKEY",
    "MPESA_CALLBACK_SECRET",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Incomplete M-Pesa configuration: {0} set but missing {1}")]
    PartialMpesa(String, String),
}

/// Marketplace application configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Payment reconciliation timing
    pub payments: PaymentTimingConfig,
    /// M-Pesa Daraja settings; `None` disables M-Pesa payments
    pub mpesa: Option<MpesaConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Timing for the background payment reconciler.
#[derive(Debug, Clone, Copy)]
pub struct PaymentTimingConfig {
    /// A pending M-Pesa payment older than this is queried at Daraja.
    pub timeout: Duration,
    /// Interval between reconciler sweeps.
    pub reconcile_interval: Duration,
}

impl Default for PaymentTimingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    /// API base URL for this environment.
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl std::str::FromStr for MpesaEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            other => Err(format!("expected 'sandbox' or 'production', got '{other}'")),
        }
    }
}

/// M-Pesa Daraja API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct MpesaConfig {
    /// Sandbox or production
    pub environment: MpesaEnvironment,
    /// Daraja app consumer key
    pub consumer_key: String,
    /// Daraja app consumer secret
    pub consumer_secret: SecretString,
    /// Business short code (paybill or till)
    pub shortcode: String,
    /// Lipa na M-Pesa online passkey
    pub passkey: SecretString,
    /// HMAC key for callback URL signatures
    pub callback_secret: SecretString,
    /// Callback endpoint, without the signature query string
    pub callback_url: String,
}

impl std::fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("environment", &self.environment)
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("shortcode", &self.shortcode)
            .field("passkey", &"[REDACTED]")
            .field("callback_secret", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

impl MarketplaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SND_DATABASE_URL")?;
        let host = get_env_or_default("SND_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SND_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("SND_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SND_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("SND_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let session_secret = get_validated_secret("SND_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SND_SESSION_SECRET")?;

        let payments = PaymentTimingConfig {
            timeout: get_duration_secs("SND_PAYMENT_TIMEOUT_SECS", 180)?,
            reconcile_interval: get_duration_secs("SND_RECONCILE_INTERVAL_SECS", 60)?,
        };
        let mpesa = MpesaConfig::from_lookup(&base_url, |key| std::env::var(key).ok())?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            payments,
            mpesa,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl MpesaConfig {
    /// Build the M-Pesa group from a variable lookup.
    ///
    /// Returns `Ok(None)` when none of the required variables are set, and an
    /// error when only some of them are.
    fn from_lookup(
        base_url: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let present: Vec<&str> = MPESA_REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| lookup(key).is_some_and(|v| !v.trim().is_empty()))
            .collect();

        if present.is_empty() {
            return Ok(None);
        }
        if present.len() != MPESA_REQUIRED_VARS.len() {
            let missing: Vec<&str> = MPESA_REQUIRED_VARS
                .iter()
                .copied()
                .filter(|key| !present.contains(key))
                .collect();
            return Err(ConfigError::PartialMpesa(
                present.join(", "),
                missing.join(", "),
            ));
        }

        let required = |key: &str| {
            lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let environment = lookup("MPESA_ENVIRONMENT")
            .map(|v| v.parse::<MpesaEnvironment>())
            .transpose()
            .map_err(|e| ConfigError::InvalidEnvVar("MPESA_ENVIRONMENT".to_string(), e))?
            .unwrap_or_default();

        let callback_secret = required("MPESA_CALLBACK_SECRET")?;
        validate_secret_strength(&callback_secret, "MPESA_CALLBACK_SECRET")?;

        let callback_url = lookup("MPESA_CALLBACK_URL")
            .unwrap_or_else(|| format!("{base_url}/api/payments/mpesa/callback"));
        if environment == MpesaEnvironment::Production && !callback_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnvVar(
                "MPESA_CALLBACK_URL".to_string(),
                "production callbacks must use https".to_string(),
            ));
        }

        Ok(Some(Self {
            environment,
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: SecretString::from(required("MPESA_CONSUMER_SECRET")?),
            shortcode: required("MPESA_SHORTCODE")?,
            passkey: SecretString::from(required("MPESA_PASSKEY")?),
            callback_secret: SecretString::from(callback_secret),
            callback_url,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a positive number of seconds as a `Duration`.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    let secs = get_env_or_default(key, &default.to_string())
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STRONG: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_mpesa() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MPESA_CONSUMER_KEY", "ck_live"),
            ("MPESA_CONSUMER_SECRET", "cs_live"),
            ("MPESA_SHORTCODE", "174379"),
            ("MPESA_PASSKEY", "bfb279f9aa9bdbcf"),
            ("MPESA_CALLBACK_SECRET", STRONG),
        ]
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-api-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"a".repeat(40), "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength(STRONG, "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_mpesa_absent_is_disabled() {
        let config = MpesaConfig::from_lookup("https://snd.test", lookup_from(&[])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_mpesa_partial_is_rejected() {
        let err = MpesaConfig::from_lookup(
            "https://snd.test",
            lookup_from(&[("MPESA_CONSUMER_KEY", "ck"), ("MPESA_SHORTCODE", "174379")]),
        )
        .unwrap_err();
        let ConfigError::PartialMpesa(present, missing) = err else {
            panic!("expected PartialMpesa");
        };
        assert_eq!(present, "MPESA_CONSUMER_KEY, MPESA_SHORTCODE");
        assert!(missing.contains("MPESA_PASSKEY"));
    }

    #[test]
    fn test_mpesa_full_defaults() {
        let config = MpesaConfig::from_lookup("https://snd.test", lookup_from(&full_mpesa()))
            .unwrap()
            .unwrap();
        assert_eq!(config.environment, MpesaEnvironment::Sandbox);
        assert_eq!(
            config.callback_url,
            "https://snd.test/api/payments/mpesa/callback"
        );
        assert_eq!(config.shortcode, "174379");
    }

    #[test]
    fn test_mpesa_production_requires_https_callback() {
        let mut vars = full_mpesa();
        vars.push(("MPESA_ENVIRONMENT", "production"));
        let result = MpesaConfig::from_lookup("http://localhost:3000", lookup_from(&vars));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_mpesa_weak_callback_secret_rejected() {
        let mut vars = full_mpesa();
        vars.retain(|(k, _)| *k != "MPESA_CALLBACK_SECRET");
        vars.push(("MPESA_CALLBACK_SECRET", "changeme"));
        let result = MpesaConfig::from_lookup("https://snd.test", lookup_from(&vars));
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_mpesa_environment_parse() {
        assert_eq!(
            "Production".parse::<MpesaEnvironment>().unwrap(),
            MpesaEnvironment::Production
        );
        assert!("staging".parse::<MpesaEnvironment>().is_err());
        assert_eq!(
            MpesaEnvironment::Sandbox.base_url(),
            "https://sandbox.safaricom.co.ke"
        );
    }

    #[test]
    fn test_mpesa_config_debug_redacts_secrets() {
        let config = MpesaConfig::from_lookup("https://snd.test", lookup_from(&full_mpesa()))
            .unwrap()
            .unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("174379"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("bfb279f9aa9bdbcf"));
        assert!(!debug_output.contains(STRONG));
    }

    #[test]
    fn test_socket_addr_and_https() {
        let config = MarketplaceConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "https://snd.test".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            payments: PaymentTimingConfig::default(),
            mpesa: None,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(config.is_https());
    }
}
