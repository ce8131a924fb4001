//! Safaricom M-Pesa Daraja API client.
//!
//! # Architecture
//!
//! - OAuth client-credentials token, cached in `moka` until shortly before
//!   it expires
//! - Lipa na M-Pesa online (STK push) initiation and status query
//! - Typed callback bodies in [`types`] and signed callback URLs in
//!   [`signature`]

mod error;
pub mod signature;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, Utc};
use moka::Expiry;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use shop_next_door_core::{Money, OrderId, PhoneNumber};

use crate::config::MpesaConfig;

pub use error::MpesaError;
pub use types::{CallbackAck, CallbackEnvelope, StkCallback};
use types::{
    DarajaErrorBody, STILL_PROCESSING_CODE, StkPushAccepted, StkPushRequest, StkPushResponse,
    StkQueryRequest, StkQueryResponse, StkQueryResult, TRANSACTION_TYPE_PAYBILL, TokenResponse,
};

/// East Africa Time, the zone Daraja timestamps are in.
const EAT_OFFSET_SECS: i32 = 3 * 60 * 60;

/// Refresh the OAuth token this long before Daraja expires it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Daraja caps `AccountReference` at 12 characters.
const MAX_ACCOUNT_REFERENCE_LEN: usize = 12;

/// Daraja caps `TransactionDesc` at 13 characters.
const MAX_TRANSACTION_DESC_LEN: usize = 13;

const TOKEN_CACHE_KEY: &str = "daraja";

/// An OAuth token and how long it stays usable.
#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    ttl: Duration,
}

/// Per-entry expiry so each token lives exactly as long as Daraja says.
struct TokenExpiry;

impl Expiry<&'static str, CachedToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &&'static str,
        value: &CachedToken,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Client for the M-Pesa Daraja API.
#[derive(Clone)]
pub struct MpesaClient {
    inner: Arc<MpesaClientInner>,
}

struct MpesaClientInner {
    http: reqwest::Client,
    base_url: String,
    config: MpesaConfig,
    token_cache: Cache<&'static str, CachedToken>,
}

impl MpesaClient {
    /// Create a client for the configured Daraja environment.
    ///
    /// # Errors
    ///
    /// Returns `MpesaError::Http` if the HTTP client cannot be built.
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaError> {
        let base_url = config.environment.base_url().to_string();
        Self::with_base_url(config, base_url)
    }

    /// Create a client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns `MpesaError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(config: MpesaConfig, base_url: String) -> Result<Self, MpesaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let token_cache = Cache::builder()
            .max_capacity(1)
            .expire_after(TokenExpiry)
            .build();

        Ok(Self {
            inner: Arc::new(MpesaClientInner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                config,
                token_cache,
            }),
        })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &MpesaConfig {
        &self.inner.config
    }

    /// The callback URL to hand Daraja for an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured callback URL is invalid.
    pub fn callback_url_for(&self, order_id: OrderId) -> Result<String, MpesaError> {
        signature::signed_callback_url(
            &self.inner.config.callback_url,
            &self.inner.config.callback_secret,
            order_id,
        )
    }

    /// Check a callback's `sig` against its `order`.
    ///
    /// # Errors
    ///
    /// Returns `MpesaError::InvalidSignature` if it does not verify.
    pub fn verify_callback(&self, order_id: OrderId, sig: &str) -> Result<(), MpesaError> {
        signature::verify_order(&self.inner.config.callback_secret, order_id, sig)
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Get a bearer token, fetching a new one when the cached one expired.
    async fn access_token(&self) -> Result<SecretString, MpesaError> {
        let cached = self
            .inner
            .token_cache
            .try_get_with(TOKEN_CACHE_KEY, self.fetch_token())
            .await
            .map_err(|e| MpesaError::AuthenticationFailed(e.to_string()))?;

        Ok(cached.token)
    }

    #[instrument(skip(self))]
    async fn fetch_token(&self) -> Result<CachedToken, MpesaError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.inner.base_url
        );

        let response = self
            .inner
            .http
            .get(&url)
            .basic_auth(
                &self.inner.config.consumer_key,
                Some(self.inner.config.consumer_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MpesaError::AuthenticationFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MpesaError::InvalidResponse(e.to_string()))?;

        debug!(expires_in = token.expires_in, "Fetched Daraja access token");

        Ok(CachedToken {
            token: SecretString::from(token.access_token),
            ttl: token_ttl(token.expires_in),
        })
    }

    // =========================================================================
    // STK push
    // =========================================================================

    /// Ask the payer's phone to approve a payment.
    ///
    /// # Errors
    ///
    /// Returns `MpesaError::InvalidAmount` for a zero amount,
    /// `MpesaError::Rejected` if Daraja refuses the request, and transport
    /// or parsing errors otherwise.
    #[instrument(skip(self, phone), fields(order_id = %order_id, phone = %phone.masked()))]
    pub async fn stk_push(
        &self,
        order_id: OrderId,
        phone: &PhoneNumber,
        amount: Money,
    ) -> Result<StkPushAccepted, MpesaError> {
        let whole_shillings = amount
            .to_mpesa_amount()
            .ok_or_else(|| MpesaError::InvalidAmount(amount.display()))?;

        let config = &self.inner.config;
        let timestamp = daraja_timestamp(Utc::now());
        let callback_url = self.callback_url_for(order_id)?;

        let body = StkPushRequest {
            business_short_code: &config.shortcode,
            password: stk_password(&config.shortcode, &config.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE_PAYBILL,
            amount: whole_shillings,
            party_a: phone.as_str(),
            party_b: &config.shortcode,
            phone_number: phone.as_str(),
            callback_url: &callback_url,
            account_reference: account_reference(order_id),
            transaction_desc: transaction_desc(order_id),
        };

        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.inner.base_url))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(rejection_from_error_body(status, &text));
        }

        let parsed: StkPushResponse = serde_json::from_str(&text)
            .map_err(|e| MpesaError::InvalidResponse(format!("{e}: {text}")))?;

        if parsed.response_code.trim() != "0" {
            warn!(
                response_code = %parsed.response_code,
                description = %parsed.response_description,
                "STK push not accepted"
            );
            return Err(MpesaError::Rejected {
                code: parsed.response_code,
                message: parsed.response_description,
            });
        }

        debug!(
            checkout_request_id = %parsed.checkout_request_id,
            "STK push accepted"
        );

        Ok(StkPushAccepted {
            merchant_request_id: parsed.merchant_request_id,
            checkout_request_id: parsed.checkout_request_id,
            customer_message: parsed.customer_message,
        })
    }

    /// Ask Daraja for the outcome of an STK push.
    ///
    /// # Errors
    ///
    /// Returns `MpesaError::Rejected` for Daraja errors other than "still
    /// processing", and transport or parsing errors otherwise.
    #[instrument(skip(self))]
    pub async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResult, MpesaError> {
        let config = &self.inner.config;
        let timestamp = daraja_timestamp(Utc::now());

        let body = StkQueryRequest {
            business_short_code: &config.shortcode,
            password: stk_password(&config.shortcode, &config.passkey, &timestamp),
            timestamp,
            checkout_request_id,
        };

        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.inner.base_url))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return match rejection_from_error_body(status, &text) {
                MpesaError::Rejected { code, .. } if code == STILL_PROCESSING_CODE => {
                    Ok(StkQueryResult::Processing)
                }
                other => Err(other),
            };
        }

        let parsed: StkQueryResponse = serde_json::from_str(&text)
            .map_err(|e| MpesaError::InvalidResponse(format!("{e}: {text}")))?;

        Ok(StkQueryResult::Completed {
            result_code: parsed.result_code,
            description: parsed.result_desc,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `YYYYMMDDHHMMSS` in East Africa Time.
#[must_use]
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    FixedOffset::east_opt(EAT_OFFSET_SECS).map_or_else(
        || now.format("%Y%m%d%H%M%S").to_string(),
        |eat| now.with_timezone(&eat).format("%Y%m%d%H%M%S").to_string(),
    )
}

/// `base64(shortcode + passkey + timestamp)`.
#[must_use]
pub fn stk_password(shortcode: &str, passkey: &SecretString, timestamp: &str) -> String {
    BASE64.encode(format!(
        "{shortcode}{}{timestamp}",
        passkey.expose_secret()
    ))
}

/// Reference shown on the customer's M-Pesa statement.
#[must_use]
pub fn account_reference(order_id: OrderId) -> String {
    format!("SND-{order_id}")
        .chars()
        .take(MAX_ACCOUNT_REFERENCE_LEN)
        .collect()
}

fn transaction_desc(order_id: OrderId) -> String {
    format!("Order {order_id}")
        .chars()
        .take(MAX_TRANSACTION_DESC_LEN)
        .collect()
}

/// How long to cache a token Daraja says lives `expires_in` seconds.
fn token_ttl(expires_in: i64) -> Duration {
    let secs = (expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(1);
    Duration::from_secs(u64::try_from(secs).unwrap_or(1))
}

fn rejection_from_error_body(status: reqwest::StatusCode, text: &str) -> MpesaError {
    let body: DarajaErrorBody = serde_json::from_str(text).unwrap_or_default();
    match (body.error_code, body.error_message) {
        (Some(code), message) => MpesaError::Rejected {
            code,
            message: message.unwrap_or_default(),
        },
        (None, _) => MpesaError::InvalidResponse(format!("HTTP {status}: {text}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, extract::State, http::HeaderMap, routing::get, routing::post};
    use chrono::TimeZone;
    use serde_json::{Value, json};

    use super::*;
    use crate::config::MpesaEnvironment;

    fn test_config() -> MpesaConfig {
        MpesaConfig {
            environment: MpesaEnvironment::Sandbox,
            consumer_key: "ck".to_string(),
            consumer_secret: SecretString::from("cs"),
            shortcode: "174379".to_string(),
            passkey: SecretString::from("passkey"),
            callback_secret: SecretString::from("k7Qp2vX9mL4nR8sT1wZ6yB3cF5hJ0dG"),
            callback_url: "https://snd.test/api/payments/mpesa/callback".to_string(),
        }
    }

    #[test]
    fn test_daraja_timestamp_is_eat() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 5).unwrap();
        assert_eq!(daraja_timestamp(now), "20260302013005");
    }

    #[test]
    fn test_stk_password() {
        let password = stk_password("174379", &SecretString::from("pk"), "20260101000000");
        let decoded = String::from_utf8(BASE64.decode(password).unwrap()).unwrap();
        assert_eq!(decoded, "174379pk20260101000000");
    }

    #[test]
    fn test_account_reference_is_truncated() {
        assert_eq!(account_reference(OrderId::new(42)), "SND-42");
        assert_eq!(account_reference(OrderId::new(1_234_567_890)), "SND-12345678");
        assert_eq!(transaction_desc(OrderId::new(1_234_567_890)).len(), 13);
    }

    #[test]
    fn test_token_ttl_keeps_margin() {
        assert_eq!(token_ttl(3599), Duration::from_secs(3539));
        assert_eq!(token_ttl(10), Duration::from_secs(1));
    }

    #[test]
    fn test_rejection_from_error_body() {
        let err = rejection_from_error_body(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"requestId":"1","errorCode":"400.002.02","errorMessage":"Bad Request - Invalid PhoneNumber"}"#,
        );
        assert!(matches!(err, MpesaError::Rejected { ref code, .. } if code == "400.002.02"));

        let err = rejection_from_error_body(reqwest::StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(err, MpesaError::InvalidResponse(_)));
    }

    #[derive(Clone, Default)]
    struct FakeDaraja {
        token_calls: Arc<AtomicUsize>,
    }

    async fn fake_token(State(fake): State<FakeDaraja>, headers: HeaderMap) -> Json<Value> {
        assert!(headers.contains_key("authorization"));
        fake.token_calls.fetch_add(1, Ordering::SeqCst);
        Json(json!({"access_token": "tok", "expires_in": "3599"}))
    }

    async fn fake_push(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(body["Amount"], 1251);
        assert!(
            body["CallBackURL"]
                .as_str()
                .unwrap()
                .contains("order=5&sig=")
        );
        Json(json!({
            "MerchantRequestID": "m-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }))
    }

    async fn fake_query() -> (axum::http::StatusCode, Json<Value>) {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "requestId": "r-1",
                "errorCode": STILL_PROCESSING_CODE,
                "errorMessage": "The transaction is being processed"
            })),
        )
    }

    async fn spawn_fake() -> (String, FakeDaraja) {
        let fake = FakeDaraja::default();
        let app = Router::new()
            .route("/oauth/v1/generate", get(fake_token))
            .route("/mpesa/stkpush/v1/processrequest", post(fake_push))
            .route("/mpesa/stkpushquery/v1/query", post(fake_query))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), fake)
    }

    #[tokio::test]
    async fn test_stk_push_and_token_cache() {
        let (base, fake) = spawn_fake().await;
        let client = MpesaClient::with_base_url(test_config(), base).unwrap();
        let phone = PhoneNumber::parse("0708374149").unwrap();
        let amount = Money::parse("1250.50").unwrap();

        let accepted = client.stk_push(OrderId::new(5), &phone, amount).await.unwrap();
        assert_eq!(accepted.checkout_request_id, "ws_CO_1");
        assert_eq!(accepted.merchant_request_id, "m-1");

        client.stk_push(OrderId::new(5), &phone, amount).await.unwrap();
        assert_eq!(fake.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stk_query_still_processing() {
        let (base, _fake) = spawn_fake().await;
        let client = MpesaClient::with_base_url(test_config(), base).unwrap();

        let result = client.stk_query("ws_CO_1").await.unwrap();
        assert_eq!(result, StkQueryResult::Processing);
    }

    #[tokio::test]
    async fn test_stk_push_rejects_zero_amount() {
        let client =
            MpesaClient::with_base_url(test_config(), "http://127.0.0.1:9".to_string()).unwrap();
        let phone = PhoneNumber::parse("0708374149").unwrap();

        let err = client
            .stk_push(OrderId::new(1), &phone, Money::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, MpesaError::InvalidAmount(_)));
    }
}
