//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// ISO 3166-1 alpha-2 country code, stored lowercase the way the store API expects it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_lowercase();
        if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValueError::InvalidCountryCode(value));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// The storefront's fallback region.
impl Default for CountryCode {
    fn default() -> Self { Self("us".to_string()) }
}

impl TryFrom<String> for CountryCode {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self { code.0 }
}

/// Promotion code as typed by the shopper. Codes are case-sensitive on the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoCode(String);

impl PromoCode {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ValueError::EmptyPromoCode); }
        if value.len() > 64 { return Err(ValueError::PromoCodeTooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Requested line quantity. Zero is a deletion signal and is never stored on a line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
    pub fn times(&self, unit_price: Decimal) -> Decimal { unit_price * Decimal::from(self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid country code: {0:?}")]
    InvalidCountryCode(String),
    #[error("promotion code is empty")]
    EmptyPromoCode,
    #[error("promotion code too long")]
    PromoCodeTooLong,
}
