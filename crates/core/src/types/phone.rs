//! Kenyan mobile numbers in the international MSISDN form M-Pesa expects.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits, spaces, dashes or a leading +.
    #[error("phone number contains invalid characters")]
    InvalidCharacters,
    /// The digits do not form a Kenyan mobile number.
    #[error("not a Kenyan mobile number (expected 07XXXXXXXX, 01XXXXXXXX or 254XXXXXXXXX)")]
    NotKenyanMobile,
}

/// A Kenyan mobile number normalized to `254XXXXXXXXX`.
///
/// Safaricom's Daraja API identifies payers by MSISDN without the leading
/// `+`. Customers type numbers in many shapes, so every accepted shape is
/// normalized here once.
///
/// ```
/// use shop_next_door_core::PhoneNumber;
///
/// for input in ["0712 345 678", "+254712345678", "254-712-345-678", "712345678"] {
///     assert_eq!(PhoneNumber::parse(input).unwrap().as_str(), "254712345678");
/// }
/// assert_eq!(PhoneNumber::parse("0112345678").unwrap().as_str(), "254112345678");
/// assert!(PhoneNumber::parse("0812345678").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Kenya's country calling code.
    pub const COUNTRY_CODE: &'static str = "254";

    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneNumberError`] if the input is empty, contains stray
    /// characters, or is not a Kenyan `7xx` / `1xx` mobile number.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let without_plus = s.strip_prefix('+').unwrap_or(s);
        if !without_plus
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        {
            return Err(PhoneNumberError::InvalidCharacters);
        }
        let digits: String = without_plus.chars().filter(char::is_ascii_digit).collect();

        let subscriber = if let Some(rest) = digits.strip_prefix(Self::COUNTRY_CODE) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else {
            digits.as_str()
        };

        let valid = subscriber.len() == 9 && (subscriber.starts_with('7') || subscriber.starts_with('1'));
        if !valid {
            return Err(PhoneNumberError::NotKenyanMobile);
        }

        Ok(Self(format!("{}{subscriber}", Self::COUNTRY_CODE)))
    }

    /// The normalized `254XXXXXXXXX` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number as an integer, which is how Daraja echoes it in callbacks.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        // Always 12 ASCII digits after parse
        self.0.parse().unwrap_or_default()
    }

    /// A masked form for logs and receipts, e.g. `2547****678`.
    #[must_use]
    pub fn masked(&self) -> String {
        let head = self.0.get(..4).unwrap_or_default();
        let tail = self.0.get(self.0.len().saturating_sub(3)..).unwrap_or_default();
        format!("{head}****{tail}")
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PhoneNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PhoneNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PhoneNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
