//! Client-side currency conversion.
//!
//! [`CurrencyConverter`] answers same-currency requests locally and
//! everything else through a [`ConversionEndpoint`] (the storefront's
//! `/api/convert`, or a [`RateChain`] in-process). Rates are cached per
//! `(base, target)` pair for a configurable TTL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::chain::RateChain;
use super::types::{
    currency_code, ConversionResponse, ConversionResult, CurrencyError, RateSource,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::http::{self, HttpError};

/// Something that converts an amount and reports the tier that answered.
#[async_trait]
pub trait ConversionEndpoint: Send + Sync {
    async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<ConversionResponse, CurrencyError>;
}

#[async_trait]
impl ConversionEndpoint for RateChain {
    async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<ConversionResponse, CurrencyError> {
        RateChain::convert(self, amount, from, to).await
    }
}

/// `GET {url}?amount=&from=&to=` against the storefront API.
#[derive(Debug, Clone)]
pub struct HttpConversionEndpoint {
    url: String,
    timeout: std::time::Duration,
}

impl HttpConversionEndpoint {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ConversionEndpoint for HttpConversionEndpoint {
    async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<ConversionResponse, CurrencyError> {
        let query = [
            ("amount", amount.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];
        let body = http::get_text(&self.url, &query, self.timeout)
            .await
            .map_err(|e| match e {
                HttpError::Status(code) => CurrencyError::Status(code),
                other => CurrencyError::Unreachable(other.to_string()),
            })?;

        let resp: ConversionResponse =
            serde_json::from_str(&body).map_err(|e| CurrencyError::Malformed(e.to_string()))?;
        if !resp.meta.rate.is_finite() || resp.meta.rate <= 0.0 || !resp.response.is_finite() {
            return Err(CurrencyError::Malformed(format!(
                "unusable rate {} / amount {}",
                resp.meta.rate, resp.response
            )));
        }
        Ok(resp)
    }
}

#[derive(Debug, Clone)]
struct CachedRate {
    rate: f64,
    source: Option<RateSource>,
    warning: Option<String>,
    fetched_at: DateTime<Utc>,
}

pub struct CurrencyConverter {
    endpoint: Arc<dyn ConversionEndpoint>,
    cache: Mutex<HashMap<(String, String), CachedRate>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CurrencyConverter {
    pub fn new(endpoint: Arc<dyn ConversionEndpoint>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            endpoint,
            cache: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// A converter talking to the configured storefront API.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(HttpConversionEndpoint::new(
                settings.conversion_url(),
                settings.upstream_timeout,
            )),
            settings.rate_ttl,
            Arc::new(SystemClock),
        )
    }

    /// Convert `amount` from one currency to another.
    ///
    /// Same-currency requests never touch the endpoint. Any endpoint failure
    /// is returned as-is; callers must fall back to the unconverted price.
    pub async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<ConversionResult, CurrencyError> {
        if !amount.is_finite() {
            return Err(CurrencyError::InvalidAmount(amount));
        }
        let from = currency_code(from)?;
        let to = currency_code(to)?;
        if from == to {
            return Ok(ConversionResult::identity(amount));
        }

        let key = (from, to);
        if let Some(hit) = self.cached(&key) {
            debug!(from = %key.0, to = %key.1, "conversion rate cache hit");
            return Ok(ConversionResult {
                rate: hit.rate,
                converted_amount: amount * hit.rate,
                source: hit.source,
                warning: hit.warning,
            });
        }

        let result = match self.endpoint.convert(amount, &key.0, &key.1).await {
            Ok(resp) => resp.into_result(),
            Err(e) => {
                warn!(from = %key.0, to = %key.1, error = %e, "currency conversion failed");
                return Err(e);
            }
        };

        if !result.is_degraded() {
            let entry = CachedRate {
                rate: result.rate,
                source: result.source,
                warning: result.warning.clone(),
                fetched_at: self.clock.now(),
            };
            self.cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key, entry);
        }
        Ok(result)
    }

    fn cached(&self, key: &(String, String)) -> Option<CachedRate> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let hit = cache.get(key)?;
        (self.clock.now() - hit.fetched_at <= self.ttl).then(|| hit.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::currency::chain::tests::FakeRates;
    use crate::currency::providers::StaticRateProvider;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    /// Endpoint that counts calls and answers with a fixed rate (or fails),
    /// optionally after a delay.
    pub(crate) struct FakeEndpoint {
        pub rate: Option<f64>,
        pub source: RateSource,
        pub delay: StdDuration,
        pub calls: AtomicUsize,
    }

    impl FakeEndpoint {
        pub fn answering(rate: f64) -> Self {
            Self {
                rate: Some(rate),
                source: RateSource::ExchangeRateApi,
                delay: StdDuration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                rate: None,
                ..Self::answering(0.0)
            }
        }
    }

    #[async_trait]
    impl ConversionEndpoint for FakeEndpoint {
        async fn convert(
            &self,
            amount: f64,
            from: &str,
            to: &str,
        ) -> Result<ConversionResponse, CurrencyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let rate = self.rate.ok_or(CurrencyError::Status(502))?;
            Ok(ConversionResponse::from_quote(
                amount,
                from,
                to,
                &crate::currency::types::Quote {
                    rate,
                    source: self.source,
                    warning: None,
                    fetched_at: Utc::now(),
                },
            ))
        }
    }

    fn converter(endpoint: Arc<dyn ConversionEndpoint>, clock: Arc<dyn Clock>) -> CurrencyConverter {
        CurrencyConverter::new(endpoint, Duration::hours(1), clock)
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(Utc::now()))
    }

    #[tokio::test]
    async fn test_same_currency_fast_path() {
        let endpoint = Arc::new(FakeEndpoint::answering(2.0));
        let c = converter(endpoint.clone(), clock());

        let result = c.convert(100.0, "USD", "USD").await.unwrap();

        assert_eq!(result, ConversionResult::identity(100.0));
        assert_eq!(result.rate, 1.0);
        assert_eq!(result.converted_amount, 100.0);
        assert_eq!(result.source, None);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_currency_is_case_insensitive() {
        let endpoint = Arc::new(FakeEndpoint::failing());
        let c = converter(endpoint.clone(), clock());
        assert!(c.convert(5.0, "eur", "EUR").await.is_ok());
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_conversion_and_cache() {
        let manual = ManualClock::new(Utc::now());
        let endpoint = Arc::new(FakeEndpoint::answering(48.0));
        let c = converter(endpoint.clone(), Arc::new(manual.clone()));

        let first = c.convert(2.0, "USD", "EGP").await.unwrap();
        let second = c.convert(3.0, "usd", "egp").await.unwrap();

        assert_relative_eq!(first.converted_amount, 96.0);
        assert_relative_eq!(second.converted_amount, 144.0);
        assert_eq!(second.source, Some(RateSource::ExchangeRateApi));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);

        manual.advance(Duration::hours(2));
        c.convert(1.0, "USD", "EGP").await.unwrap();
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_an_error() {
        let c = converter(Arc::new(FakeEndpoint::failing()), clock());
        let err = c.convert(10.0, "USD", "EGP").await.unwrap_err();
        assert!(matches!(err, CurrencyError::Status(502)));
    }

    #[tokio::test]
    async fn test_degraded_chain_surfaces_warning() {
        let (primary, _) = FakeRates::new(RateSource::ExchangeRateApi, None);
        let (secondary, _) = FakeRates::new(RateSource::MoneyMorph, None);
        let chain = RateChain::new(
            vec![Box::new(primary), Box::new(secondary), Box::new(StaticRateProvider)],
            Duration::hours(1),
            clock(),
        );
        let c = converter(Arc::new(chain), clock());

        let result = c.convert(10.0, "USD", "EGP").await.unwrap();

        assert_eq!(result.source, Some(RateSource::FallbackRates));
        assert!(result.warning.as_deref().is_some_and(|w| !w.is_empty()));
        assert!(result.is_degraded());
    }

    #[tokio::test]
    async fn test_invalid_codes_rejected_before_network() {
        let endpoint = Arc::new(FakeEndpoint::answering(1.0));
        let c = converter(endpoint.clone(), clock());
        assert!(c.convert(1.0, "US", "EUR").await.is_err());
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }
}
