//! The conversion endpoint's rate chain: primary provider, then secondary,
//! then the static table. Each provider is asked in order and the first
//! answer wins; the tier that answered is reported as the quote's source.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::providers::{
    ExchangeRateApiProvider, MoneyMorphProvider, RateProvider, StaticRateProvider,
};
use super::types::{
    currency_code, ConversionMeta, ConversionRequest, ConversionResponse, CurrencyError, Quote,
    RateError, RateSource,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;

pub const DELAYED_RATES_WARNING: &str =
    "Primary exchange rate provider unavailable; rates may be delayed";
pub const CACHED_RATES_WARNING: &str =
    "Live exchange rates unavailable; showing cached rates";

pub struct RateChain {
    providers: Vec<Box<dyn RateProvider>>,
    cache: Mutex<HashMap<(String, String), Quote>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RateChain {
    pub fn new(providers: Vec<Box<dyn RateProvider>>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            providers,
            cache: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// exchangerate-api.com → moneymorph.dev → static table.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            vec![
                Box::new(ExchangeRateApiProvider::new(
                    settings.exchangerate_api_url.clone(),
                    settings.upstream_timeout,
                )),
                Box::new(MoneyMorphProvider::new(
                    settings.moneymorph_url.clone(),
                    settings.upstream_timeout,
                )),
                Box::new(StaticRateProvider),
            ],
            settings.rate_ttl,
            Arc::new(SystemClock),
        )
    }

    /// Quote a rate for `from → to`. Codes must already be normalized.
    pub async fn quote(&self, from: &str, to: &str) -> Result<Quote, RateError> {
        let key = (from.to_string(), to.to_string());
        if let Some(hit) = self.cached(&key) {
            debug!(from, to, source = %hit.source, "rate cache hit");
            return Ok(hit);
        }

        for (tier, provider) in self.providers.iter().enumerate() {
            let source = provider.source();
            match provider.rate(from, to).await {
                Ok(rate) => {
                    let quote = Quote {
                        rate,
                        source,
                        warning: warning_for(tier, source),
                        fetched_at: self.clock.now(),
                    };
                    // Degraded answers are not cached so live tiers are retried.
                    if !source.is_degraded() {
                        self.lock_cache().insert(key, quote.clone());
                    }
                    if tier > 0 {
                        warn!(from, to, %source, "rate answered by fallback tier");
                    }
                    return Ok(quote);
                }
                Err(e) => debug!(from, to, %source, error = %e, "rate provider missed"),
            }
        }

        Err(RateError::Unavailable {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Full conversion in the endpoint's wire shape.
    pub async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<ConversionResponse, CurrencyError> {
        if !amount.is_finite() {
            return Err(CurrencyError::InvalidAmount(amount));
        }
        let from = currency_code(from)?;
        let to = currency_code(to)?;

        if from == to {
            return Ok(ConversionResponse {
                meta: ConversionMeta {
                    timestamp: self.clock.now().timestamp(),
                    rate: 1.0,
                    source: None,
                    warning: None,
                },
                request: ConversionRequest::new(amount, &from, &to),
                response: amount,
            });
        }

        let quote = self.quote(&from, &to).await?;
        Ok(ConversionResponse::from_quote(amount, &from, &to, &quote))
    }

    fn cached(&self, key: &(String, String)) -> Option<Quote> {
        let cache = self.lock_cache();
        let quote = cache.get(key)?;
        (self.clock.now() - quote.fetched_at <= self.ttl).then(|| quote.clone())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Quote>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn warning_for(tier: usize, source: RateSource) -> Option<String> {
    if source.is_degraded() {
        Some(CACHED_RATES_WARNING.to_string())
    } else if tier > 0 {
        Some(DELAYED_RATES_WARNING.to_string())
    } else {
        None
    }
}
