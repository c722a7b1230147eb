//! Runtime settings, read from `STOREFRONT_*` environment variables.
//!
//! Every value has a default, so an empty environment yields a working
//! configuration pointed at the public upstream services.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the storefront API the client-side services talk to.
    pub api_base_url: String,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub storage_path: PathBuf,

    // Upstream services used by the HTTP surface.
    pub ipapi_url: String,
    pub nominatim_url: String,
    pub exchangerate_api_url: String,
    pub moneymorph_url: String,
    pub upstream_timeout: Duration,

    // Detection policy.
    pub geolocation_timeout: Duration,
    pub position_max_age: Duration,
    pub ip_lookup_timeout: Duration,
    pub staleness: chrono::Duration,

    /// How long a fetched exchange rate is reused.
    pub rate_ttl: chrono::Duration,

    /// Coordinates reported by the device, if it has a position fix.
    pub device_position: Option<(f64, f64)>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000".into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".into(),
            storage_path: default_storage_path(),
            ipapi_url: "https://ipapi.co".into(),
            nominatim_url: "https://nominatim.openstreetmap.org".into(),
            exchangerate_api_url: "https://api.exchangerate-api.com".into(),
            moneymorph_url: "https://moneymorph.dev".into(),
            upstream_timeout: Duration::from_secs(10),
            geolocation_timeout: Duration::from_secs(8),
            position_max_age: Duration::from_secs(5 * 60),
            ip_lookup_timeout: Duration::from_secs(10),
            staleness: chrono::Duration::hours(24),
            rate_ttl: chrono::Duration::hours(1),
            device_position: None,
        }
    }
}

impl Settings {
    /// Load settings from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup (for testing).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let device_position = match (
            lookup("STOREFRONT_DEVICE_LAT"),
            lookup("STOREFRONT_DEVICE_LNG"),
        ) {
            (Some(lat), Some(lng)) => Some((
                parse("STOREFRONT_DEVICE_LAT", lat)?,
                parse("STOREFRONT_DEVICE_LNG", lng)?,
            )),
            _ => None,
        };

        Ok(Self {
            api_base_url: lookup("STOREFRONT_API_URL").unwrap_or(d.api_base_url),
            bind_addr: opt_parse(&lookup, "STOREFRONT_BIND_ADDR")?.unwrap_or(d.bind_addr),
            log_level: lookup("STOREFRONT_LOG_LEVEL").unwrap_or(d.log_level),
            storage_path: lookup("STOREFRONT_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.storage_path),
            ipapi_url: lookup("STOREFRONT_IPAPI_URL").unwrap_or(d.ipapi_url),
            nominatim_url: lookup("STOREFRONT_NOMINATIM_URL").unwrap_or(d.nominatim_url),
            exchangerate_api_url: lookup("STOREFRONT_EXCHANGERATE_API_URL")
                .unwrap_or(d.exchangerate_api_url),
            moneymorph_url: lookup("STOREFRONT_MONEYMORPH_URL").unwrap_or(d.moneymorph_url),
            upstream_timeout: opt_parse(&lookup, "STOREFRONT_UPSTREAM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.upstream_timeout),
            geolocation_timeout: opt_parse(&lookup, "STOREFRONT_GEOLOCATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.geolocation_timeout),
            position_max_age: opt_parse(&lookup, "STOREFRONT_POSITION_MAX_AGE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.position_max_age),
            ip_lookup_timeout: opt_parse(&lookup, "STOREFRONT_IP_LOOKUP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.ip_lookup_timeout),
            staleness: opt_span(&lookup, "STOREFRONT_STALENESS_HOURS", chrono::Duration::try_hours)?
                .unwrap_or(d.staleness),
            rate_ttl: opt_span(&lookup, "STOREFRONT_RATE_TTL_SECS", chrono::Duration::try_seconds)?
                .unwrap_or(d.rate_ttl),
            device_position,
        })
    }

    pub fn ip_lookup_url(&self) -> String {
        format!("{}/api/geo/ip", self.api_base_url.trim_end_matches('/'))
    }

    pub fn reverse_geocode_url(&self) -> String {
        format!("{}/api/geo/reverse", self.api_base_url.trim_end_matches('/'))
    }

    pub fn conversion_url(&self) -> String {
        format!("{}/api/convert", self.api_base_url.trim_end_matches('/'))
    }

    pub fn currency_list_url(&self) -> String {
        format!("{}/api/currencies", self.api_base_url.trim_end_matches('/'))
    }
}

fn default_storage_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".storefront")
        .join("location.json")
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn opt_parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| parse(key, v)).transpose()
}

/// A non-negative span built by `make`, which returns `None` out of range.
fn opt_span<F>(
    lookup: &F,
    key: &'static str,
    make: fn(i64) -> Option<chrono::Duration>,
) -> Result<Option<chrono::Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match parse::<i64>(key, value.clone())? {
        n if n >= 0 => make(n)
            .map(Some)
            .ok_or(ConfigError::Invalid { key, value }),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
