//! A displayed price that follows the shopper's currency.
//!
//! Every [`PriceConverter::set_currency`] call starts a new conversion and
//! bumps a generation counter. When an older request finishes after a newer
//! one was issued, its result is dropped so the display never flips back to
//! a currency the shopper already moved away from.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::converter::CurrencyConverter;
use super::format::format_price;
use super::types::RateSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PriceState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Converting { target: String },
    #[serde(rename_all = "camelCase")]
    Resolved {
        amount: f64,
        currency: String,
        formatted: String,
        source: Option<RateSource>,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    /// Conversion failed; the original price is shown instead.
    #[serde(rename_all = "camelCase")]
    Degraded {
        amount: f64,
        currency: String,
        formatted: String,
        error: String,
    },
}

impl PriceState {
    /// Text for the price slot. `None` while idle or converting.
    pub fn display_text(&self) -> Option<String> {
        match self {
            Self::Idle | Self::Converting { .. } => None,
            Self::Resolved { formatted, .. } => Some(formatted.clone()),
            Self::Degraded { formatted, .. } => Some(format!("{} (conversion failed)", formatted)),
        }
    }
}

pub struct PriceConverter {
    converter: Arc<CurrencyConverter>,
    base_amount: f64,
    base_currency: String,
    generation: AtomicU64,
    state: watch::Sender<PriceState>,
}

impl PriceConverter {
    pub fn new(converter: Arc<CurrencyConverter>, amount: f64, currency: impl Into<String>) -> Self {
        let (state, _) = watch::channel(PriceState::Idle);
        Self {
            converter,
            base_amount: amount,
            base_currency: currency.into(),
            generation: AtomicU64::new(0),
            state,
        }
    }

    pub fn state(&self) -> PriceState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PriceState> {
        self.state.subscribe()
    }

    /// Convert the base price into `target` and publish the outcome.
    ///
    /// Returns the state current once this request settles, which is the
    /// newer request's state if this one was superseded.
    pub async fn set_currency(&self, target: &str) -> PriceState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(PriceState::Converting {
            target: target.to_string(),
        });

        let outcome = self
            .converter
            .convert(self.base_amount, &self.base_currency, target)
            .await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(target, generation, "discarding superseded price conversion");
            return self.state();
        }

        let next = match outcome {
            Ok(result) => {
                let currency = target.trim().to_ascii_uppercase();
                PriceState::Resolved {
                    amount: result.converted_amount,
                    formatted: format_price(result.converted_amount, &currency),
                    currency,
                    source: result.source,
                    warning: result.warning,
                }
            }
            Err(e) => PriceState::Degraded {
                amount: self.base_amount,
                currency: self.base_currency.clone(),
                formatted: format_price(self.base_amount, &self.base_currency),
                error: e.to_string(),
            },
        };
        self.state.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::currency::converter::ConversionEndpoint;
    use crate::currency::converter::tests::FakeEndpoint;
    use crate::currency::types::{ConversionResponse, CurrencyError, Quote};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Answers each target with its own rate after its own delay.
    struct PerTarget(HashMap<&'static str, (f64, Duration)>);

    #[async_trait]
    impl ConversionEndpoint for PerTarget {
        async fn convert(
            &self,
            amount: f64,
            from: &str,
            to: &str,
        ) -> Result<ConversionResponse, CurrencyError> {
            let (rate, delay) = *self
                .0
                .get(to)
                .ok_or_else(|| CurrencyError::InvalidCurrency(to.into()))?;
            tokio::time::sleep(delay).await;
            let quote = Quote {
                rate,
                source: RateSource::ExchangeRateApi,
                warning: None,
                fetched_at: Utc::now(),
            };
            Ok(ConversionResponse::from_quote(amount, from, to, &quote))
        }
    }

    fn converter(endpoint: Arc<dyn ConversionEndpoint>) -> Arc<CurrencyConverter> {
        Arc::new(CurrencyConverter::new(
            endpoint,
            chrono::Duration::hours(1),
            Arc::new(ManualClock::new(Utc::now())),
        ))
    }

    #[tokio::test]
    async fn test_resolves_into_target_currency() {
        let price = PriceConverter::new(converter(Arc::new(FakeEndpoint::answering(48.5))), 20.0, "USD");
        assert_eq!(price.state(), PriceState::Idle);

        let state = price.set_currency("egp").await;

        match &state {
            PriceState::Resolved { amount, currency, formatted, source, .. } => {
                assert_eq!(*amount, 970.0);
                assert_eq!(currency, "EGP");
                assert_eq!(formatted, "EGP 970.00");
                assert_eq!(*source, Some(RateSource::ExchangeRateApi));
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(price.state(), state);
    }

    #[tokio::test]
    async fn test_failure_shows_original_price() {
        let price = PriceConverter::new(converter(Arc::new(FakeEndpoint::failing())), 19.99, "USD");

        let state = price.set_currency("EUR").await;

        assert!(matches!(
            &state,
            PriceState::Degraded { amount, currency, .. } if *amount == 19.99 && currency == "USD"
        ));
        assert_eq!(state.display_text().as_deref(), Some("$19.99 (conversion failed)"));
    }

    #[tokio::test]
    async fn test_same_currency_resolves_without_source() {
        let endpoint = Arc::new(FakeEndpoint::failing());
        let price = PriceConverter::new(converter(endpoint), 5.0, "GBP");
        let state = price.set_currency("GBP").await;
        assert!(matches!(state, PriceState::Resolved { source: None, .. }));
        assert_eq!(state.display_text().as_deref(), Some("£5.00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_is_discarded() {
        let endpoint = PerTarget(HashMap::from([
            ("EUR", (0.9, Duration::from_secs(5))),
            ("GBP", (0.8, Duration::from_secs(1))),
        ]));
        let price = PriceConverter::new(converter(Arc::new(endpoint)), 100.0, "USD");

        let (slow, fast) = tokio::join!(price.set_currency("EUR"), price.set_currency("GBP"));

        assert!(matches!(&fast, PriceState::Resolved { currency, .. } if currency == "GBP"));
        // The EUR request finished last but was already superseded.
        assert_eq!(slow, fast);
        assert!(matches!(price.state(), PriceState::Resolved { currency, .. } if currency == "GBP"));
    }

    #[tokio::test]
    async fn test_converting_is_published_to_subscribers() {
        let mut endpoint = FakeEndpoint::answering(2.0);
        endpoint.delay = Duration::from_millis(20);
        let price = PriceConverter::new(converter(Arc::new(endpoint)), 1.0, "USD");
        let mut rx = price.subscribe();

        let watcher = async {
            rx.changed().await.unwrap();
            rx.borrow_and_update().clone()
        };
        let (first_seen, _) = tokio::join!(watcher, price.set_currency("CAD"));

        assert_eq!(first_seen, PriceState::Converting { target: "CAD".into() });
    }
}
