//! Daraja request, response and callback bodies.
//!
//! Daraja uses `PascalCase` keys, reports some numbers as strings and others
//! as integers depending on the endpoint, so numeric fields go through
//! [`de_i64_lenient`].

use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use shop_next_door_core::{Money, PhoneNumber};

/// Transaction type for paybill STK pushes.
pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";

/// Daraja's error code for "the transaction is being processed".
pub const STILL_PROCESSING_CODE: &str = "500.001.1001";

/// Accept an integer either as a JSON number or as a numeric string.
///
/// # Errors
///
/// Fails if the value is neither an integer nor a string holding one.
pub fn de_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(i64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// OAuth
// =============================================================================

/// Response from `/oauth/v1/generate`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds (Daraja sends `"3599"`).
    #[serde(deserialize_with = "de_i64_lenient")]
    pub expires_in: i64,
}

// =============================================================================
// STK push
// =============================================================================

/// Body of `/mpesa/stkpush/v1/processrequest`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,
    pub amount: u64,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub callback_url: &'a str,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Synchronous answer to an STK push.
#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

/// Ids Daraja assigned to an accepted STK push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Error body Daraja returns with 4xx/5xx statuses.
#[derive(Debug, Default, Deserialize)]
pub struct DarajaErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

// =============================================================================
// STK query
// =============================================================================

/// Body of `/mpesa/stkpushquery/v1/query`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryRequest<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

/// Answer to an STK query for a finished push.
#[derive(Debug, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResultCode", deserialize_with = "de_i64_lenient")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
}

/// What Daraja knows about an STK push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StkQueryResult {
    /// The customer has answered (or the prompt timed out).
    Completed { result_code: i64, description: String },
    /// Still waiting on the customer's phone.
    Processing,
}

// =============================================================================
// Callback
// =============================================================================

/// Outer envelope Daraja posts to the callback URL.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// The result of one STK push.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// `0` means the customer paid.
    #[serde(rename = "ResultCode", deserialize_with = "de_i64_lenient")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

/// A `{Name, Value}` pair; `Value` is missing for some names (e.g. `Balance`).
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    /// Whether the customer completed the payment.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// The result code as stored on the transaction.
    #[must_use]
    pub fn result_code_i32(&self) -> i32 {
        i32::try_from(self.result_code).unwrap_or(i32::MAX)
    }

    fn item(&self, name: &str) -> Option<&serde_json::Value> {
        self.metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    fn item_text(&self, name: &str) -> Option<String> {
        match self.item(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Amount paid.
    #[must_use]
    pub fn amount(&self) -> Option<Money> {
        let text = self.item_text("Amount")?;
        Decimal::from_str(&text).ok().and_then(|d| Money::new(d).ok())
    }

    /// M-Pesa receipt, e.g. `NLJ7RT61SV`.
    #[must_use]
    pub fn mpesa_receipt_number(&self) -> Option<String> {
        self.item_text("MpesaReceiptNumber")
    }

    /// When M-Pesa completed the payment (East Africa Time).
    #[must_use]
    pub fn transaction_date(&self) -> Option<NaiveDateTime> {
        let text = self.item_text("TransactionDate")?;
        NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M%S").ok()
    }

    /// Number that paid.
    #[must_use]
    pub fn phone_number(&self) -> Option<PhoneNumber> {
        PhoneNumber::parse(&self.item_text("PhoneNumber")?).ok()
    }
}

/// Acknowledgement Daraja expects from the callback endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    /// The only answer Daraja needs: stop retrying.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SUCCESS_CALLBACK: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 1.00},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "Balance"},
                        {"Name": "TransactionDate", "Value": 20191219102115},
                        {"Name": "PhoneNumber", "Value": 254708374149}
                    ]
                }
            }
        }
    }"#;

    const CANCELLED_CALLBACK: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "8555-67195-1",
                "CheckoutRequestID": "ws_CO_27072017151044001",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    }"#;

    #[test]
    fn test_parse_success_callback() {
        let envelope: CallbackEnvelope = serde_json::from_str(SUCCESS_CALLBACK).unwrap();
        let cb = envelope.body.stk_callback;

        assert!(cb.is_success());
        assert_eq!(cb.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(cb.amount(), Some(Money::from_shillings(1)));
        assert_eq!(cb.mpesa_receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(
            cb.transaction_date().unwrap().to_string(),
            "2019-12-19 10:21:15"
        );
        assert_eq!(cb.phone_number().unwrap().as_str(), "254708374149");
    }

    #[test]
    fn test_parse_cancelled_callback_has_no_metadata() {
        let envelope: CallbackEnvelope = serde_json::from_str(CANCELLED_CALLBACK).unwrap();
        let cb = envelope.body.stk_callback;

        assert!(!cb.is_success());
        assert_eq!(cb.result_code_i32(), 1032);
        assert_eq!(cb.result_desc, "Request cancelled by user");
        assert_eq!(cb.amount(), None);
        assert_eq!(cb.mpesa_receipt_number(), None);
    }

    #[test]
    fn test_query_response_accepts_string_result_code() {
        let resp: StkQueryResponse = serde_json::from_str(
            r#"{"ResponseCode":"0","ResultCode":"1037","ResultDesc":"DS timeout user cannot be reached"}"#,
        )
        .unwrap();
        assert_eq!(resp.result_code, 1037);

        let resp: StkQueryResponse =
            serde_json::from_str(r#"{"ResultCode":0,"ResultDesc":"ok"}"#).unwrap();
        assert_eq!(resp.result_code, 0);
    }

    #[test]
    fn test_token_expires_in_as_string() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        assert_eq!(token.expires_in, 3599);
    }

    #[test]
    fn test_stk_push_request_uses_daraja_keys() {
        let body = StkPushRequest {
            business_short_code: "174379",
            password: "pw".to_string(),
            timestamp: "20260101120000".to_string(),
            transaction_type: TRANSACTION_TYPE_PAYBILL,
            amount: 10,
            party_a: "254708374149",
            party_b: "174379",
            phone_number: "254708374149",
            callback_url: "https://snd.test/cb",
            account_reference: "SND-1".to_string(),
            transaction_desc: "Order 1".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["CallBackURL"], "https://snd.test/cb");
        assert_eq!(json["PartyA"], "254708374149");
        assert_eq!(json["Amount"], 10);
    }

    #[test]
    fn test_ack_shape() {
        let json = serde_json::to_string(&CallbackAck::accepted()).unwrap();
        assert_eq!(json, r#"{"ResultCode":0,"ResultDesc":"Accepted"}"#);
    }
}
