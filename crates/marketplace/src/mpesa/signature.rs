//! Signed callback URLs.
//!
//! Daraja does not sign its callbacks, so every STK push carries a callback
//! URL with `order` and `sig` query parameters, where `sig` is the hex
//! HMAC-SHA256 of the order ID under the callback secret. A callback whose
//! signature does not verify never touches a transaction.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use url::Url;

use shop_next_door_core::OrderId;

use super::MpesaError;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &SecretString, order_id: OrderId) -> Result<HmacSha256, MpesaError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| MpesaError::InvalidSignature)?;
    mac.update(order_id.to_string().as_bytes());
    Ok(mac)
}

/// Hex signature of an order ID.
///
/// # Errors
///
/// Returns `MpesaError::InvalidSignature` if the key cannot be used.
pub fn sign_order(secret: &SecretString, order_id: OrderId) -> Result<String, MpesaError> {
    Ok(hex::encode(mac_for(secret, order_id)?.finalize().into_bytes()))
}

/// Check a callback signature in constant time.
///
/// # Errors
///
/// Returns `MpesaError::InvalidSignature` if the signature is malformed or wrong.
pub fn verify_order(
    secret: &SecretString,
    order_id: OrderId,
    signature: &str,
) -> Result<(), MpesaError> {
    let bytes = hex::decode(signature.trim()).map_err(|_| MpesaError::InvalidSignature)?;
    mac_for(secret, order_id)?
        .verify_slice(&bytes)
        .map_err(|_| MpesaError::InvalidSignature)
}

/// The callback URL for one order, with `order` and `sig` appended.
///
/// # Errors
///
/// Returns `MpesaError::InvalidResponse` if `base` is not a valid URL.
pub fn signed_callback_url(
    base: &str,
    secret: &SecretString,
    order_id: OrderId,
) -> Result<String, MpesaError> {
    let mut url = Url::parse(base)
        .map_err(|e| MpesaError::InvalidResponse(format!("invalid callback URL: {e}")))?;
    let signature = sign_order(secret, order_id)?;
    url.query_pairs_mut()
        .append_pair("order", &order_id.to_string())
        .append_pair("sig", &signature);
    Ok(url.into())
}
