//! Core types for currency conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which tier of the rate chain produced a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateSource {
    #[serde(rename = "exchangerate-api.com")]
    ExchangeRateApi,
    #[serde(rename = "moneymorph.dev")]
    MoneyMorph,
    #[serde(rename = "fallback-rates")]
    FallbackRates,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExchangeRateApi => "exchangerate-api.com",
            Self::MoneyMorph => "moneymorph.dev",
            Self::FallbackRates => "fallback-rates",
        }
    }

    /// True for the static table, the degraded terminal tier.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FallbackRates)
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A converted amount with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub rate: f64,
    pub converted_amount: f64,
    pub source: Option<RateSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ConversionResult {
    /// The same-currency result: rate 1, no source.
    pub fn identity(amount: f64) -> Self {
        Self {
            rate: 1.0,
            converted_amount: amount,
            source: None,
            warning: None,
        }
    }

    /// True when the caller must present this as a cached-rate price.
    pub fn is_degraded(&self) -> bool {
        self.source.is_some_and(|s| s.is_degraded())
    }
}

/// A rate answered by one tier of the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub rate: f64,
    pub source: RateSource,
    pub warning: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// `meta` block of the conversion endpoint's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMeta {
    pub timestamp: i64,
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RateSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// `request` block echoed back by the conversion endpoint. Informational
/// only, so missing or differently shaped fields are tolerated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRequest {
    pub query: String,
    pub amount: f64,
    pub from: String,
    pub to: String,
}

impl ConversionRequest {
    pub fn new(amount: f64, from: &str, to: &str) -> Self {
        Self {
            query: format!("/convert/{}/{}/{}", amount, from, to),
            amount,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Wire shape of `GET /api/convert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub meta: ConversionMeta,
    #[serde(default, deserialize_with = "lenient_request")]
    pub request: ConversionRequest,
    pub response: f64,
}

fn lenient_request<'de, D>(deserializer: D) -> Result<ConversionRequest, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl ConversionResponse {
    pub fn from_quote(amount: f64, from: &str, to: &str, quote: &Quote) -> Self {
        Self {
            meta: ConversionMeta {
                timestamp: quote.fetched_at.timestamp(),
                rate: quote.rate,
                source: Some(quote.source),
                warning: quote.warning.clone(),
            },
            request: ConversionRequest::new(amount, from, to),
            response: amount * quote.rate,
        }
    }

    pub fn into_result(self) -> ConversionResult {
        ConversionResult {
            rate: self.meta.rate,
            converted_amount: self.response,
            source: self.meta.source,
            warning: self.meta.warning,
        }
    }
}

/// Normalize and check an ISO 4217 code.
pub fn currency_code(raw: &str) -> Result<String, CurrencyError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(CurrencyError::InvalidCurrency(raw.to_string()))
    }
}

/// Failure of one rate provider, or of the whole chain.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("network error from {provider}: {message}")]
    Network { provider: &'static str, message: String },
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: &'static str, message: String },
    #[error("{provider} has no rate for {from}->{to}")]
    UnsupportedPair {
        provider: &'static str,
        from: String,
        to: String,
    },
    #[error("no exchange rate available for {from}->{to}")]
    Unavailable { from: String, to: String },
}

/// Conversion failure as seen by the price display.
#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),
    #[error("invalid amount {0}")]
    InvalidAmount(f64),
    #[error("conversion endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("conversion endpoint returned HTTP {0}")]
    Status(u16),
    #[error("malformed conversion response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Rate(#[from] RateError),
}
