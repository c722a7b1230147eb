//! Exchange rate providers: exchangerate-api.com, moneymorph.dev and the
//! built-in static table.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::types::{RateError, RateSource};
use crate::http::{self, HttpError};

/// One tier of the rate chain.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn source(&self) -> RateSource;

    /// Units of `to` per one unit of `from`. Codes are uppercase ISO 4217.
    async fn rate(&self, from: &str, to: &str) -> Result<f64, RateError>;
}

fn http_error(provider: &'static str, e: HttpError) -> RateError {
    match e {
        HttpError::Status(status) => RateError::Status { provider, status },
        other => RateError::Network {
            provider,
            message: other.to_string(),
        },
    }
}

fn checked_rate(provider: &'static str, rate: f64) -> Result<f64, RateError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(RateError::InvalidResponse {
            provider,
            message: format!("non-positive rate {}", rate),
        })
    }
}

// ─── exchangerate-api.com ───────────────────────────────────────

#[derive(Deserialize)]
struct LatestRates {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Primary provider: `GET {base}/v4/latest/{FROM}` → `{ rates: { TO: n } }`.
pub struct ExchangeRateApiProvider {
    base_url: String,
    timeout: Duration,
}

impl ExchangeRateApiProvider {
    const ID: &'static str = "exchangerate-api.com";

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn source(&self) -> RateSource {
        RateSource::ExchangeRateApi
    }

    async fn rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let url = format!("{}/v4/latest/{}", self.base_url.trim_end_matches('/'), from);
        let body = http::get_text(&url, &[], self.timeout)
            .await
            .map_err(|e| http_error(Self::ID, e))?;
        let latest: LatestRates =
            serde_json::from_str(&body).map_err(|e| RateError::InvalidResponse {
                provider: Self::ID,
                message: e.to_string(),
            })?;
        let rate = latest
            .rates
            .get(to)
            .copied()
            .ok_or_else(|| RateError::UnsupportedPair {
                provider: Self::ID,
                from: from.to_string(),
                to: to.to_string(),
            })?;
        checked_rate(Self::ID, rate)
    }
}

// ─── moneymorph.dev ─────────────────────────────────────────────

#[derive(Deserialize)]
struct MoneyMorphMeta {
    rate: Option<f64>,
}

#[derive(Deserialize)]
struct MoneyMorphBody {
    meta: Option<MoneyMorphMeta>,
    response: Option<f64>,
}

/// Secondary provider: `GET {base}/api/convert/1/{FROM}/{TO}`.
pub struct MoneyMorphProvider {
    base_url: String,
    timeout: Duration,
}

impl MoneyMorphProvider {
    const ID: &'static str = "moneymorph.dev";

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RateProvider for MoneyMorphProvider {
    fn source(&self) -> RateSource {
        RateSource::MoneyMorph
    }

    async fn rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let url = format!(
            "{}/api/convert/1/{}/{}",
            self.base_url.trim_end_matches('/'),
            from,
            to
        );
        let body = http::get_text(&url, &[], self.timeout)
            .await
            .map_err(|e| http_error(Self::ID, e))?;
        let parsed: MoneyMorphBody =
            serde_json::from_str(&body).map_err(|e| RateError::InvalidResponse {
                provider: Self::ID,
                message: e.to_string(),
            })?;
        // Converting 1 unit: the response is the rate when meta omits it.
        let rate = parsed
            .meta
            .and_then(|m| m.rate)
            .or(parsed.response)
            .ok_or_else(|| RateError::InvalidResponse {
                provider: Self::ID,
                message: "no rate in response".into(),
            })?;
        checked_rate(Self::ID, rate)
    }
}

// ─── Static table ───────────────────────────────────────────────

/// Units per one US dollar. Last-resort values, refreshed by hand.
const USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("EGP", 48.50),
    ("SAR", 3.75),
    ("AED", 3.6725),
    ("CAD", 1.36),
    ("AUD", 1.52),
    ("JPY", 150.0),
    ("INR", 83.0),
    ("CNY", 7.20),
];

fn usd_rate(code: &str) -> Option<f64> {
    USD_RATES.iter().find(|(c, _)| *c == code).map(|(_, r)| *r)
}

/// Codes covered by the static table.
pub fn static_rate_codes() -> impl Iterator<Item = &'static str> {
    USD_RATES.iter().map(|(c, _)| *c)
}

/// Terminal tier: cross rates through USD from a fixed table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRateProvider;

impl StaticRateProvider {
    const ID: &'static str = "fallback-rates";

    pub fn lookup(from: &str, to: &str) -> Option<f64> {
        Some(usd_rate(to)? / usd_rate(from)?)
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    fn source(&self) -> RateSource {
        RateSource::FallbackRates
    }

    async fn rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        Self::lookup(from, to).ok_or_else(|| RateError::UnsupportedPair {
            provider: Self::ID,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
