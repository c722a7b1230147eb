//! Supported-currency list.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::config::Settings;
use crate::http;

/// Currencies always offered, with display names.
pub const FALLBACK_CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("EGP", "Egyptian Pound"),
    ("SAR", "Saudi Riyal"),
    ("AED", "UAE Dirham"),
    ("CAD", "Canadian Dollar"),
    ("AUD", "Australian Dollar"),
    ("JPY", "Japanese Yen"),
    ("INR", "Indian Rupee"),
    ("CNY", "Chinese Yuan"),
];

pub fn fallback_currencies() -> BTreeMap<String, String> {
    FALLBACK_CURRENCIES
        .iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Map(BTreeMap<String, String>),
    Wrapped { currencies: BTreeMap<String, String> },
}

/// Fetches the `code → name` list, falling back to [`FALLBACK_CURRENCIES`].
#[derive(Debug, Clone)]
pub struct CurrencyCatalog {
    url: String,
    timeout: Duration,
}

impl CurrencyCatalog {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.currency_list_url(), settings.upstream_timeout)
    }

    /// Never fails: any fetch or parse problem yields the fallback list.
    pub async fn list(&self) -> BTreeMap<String, String> {
        match self.fetch().await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                debug!(url = %self.url, "empty currency list, using fallback");
                fallback_currencies()
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "currency list unavailable, using fallback");
                fallback_currencies()
            }
        }
    }

    async fn fetch(&self) -> Result<BTreeMap<String, String>, String> {
        let body = http::get_text(&self.url, &[], self.timeout)
            .await
            .map_err(|e| e.to_string())?;
        let parsed: ListBody = serde_json::from_str(&body).map_err(|e| e.to_string())?;
        let raw = match parsed {
            ListBody::Map(m) => m,
            ListBody::Wrapped { currencies } => currencies,
        };
        Ok(raw
            .into_iter()
            .filter_map(|(code, name)| {
                let code = code.trim().to_ascii_uppercase();
                (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
                    .then_some((code, name))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_list_is_complete() {
        let list = fallback_currencies();
        assert_eq!(list.len(), 11);
        for code in ["USD", "EUR", "GBP", "EGP", "SAR", "AED", "CAD", "AUD", "JPY", "INR", "CNY"] {
            assert!(list.contains_key(code), "missing {}", code);
        }
    }

    #[test]
    fn test_fallback_matches_static_rates() {
        let list = fallback_currencies();
        for code in crate::currency::providers::static_rate_codes() {
            assert!(list.contains_key(code));
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        let catalog = CurrencyCatalog::new("http://127.0.0.1:9/api/currencies", Duration::from_millis(200));
        assert_eq!(catalog.list().await, fallback_currencies());
    }
}
