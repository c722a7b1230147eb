//! Upstream lookups behind `/api/geo/*`: ipapi.co for IP geolocation and
//! Nominatim for reverse geocoding. Both answer in their own shapes; this
//! module narrows them into [`LocationData`].

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::Settings;
use crate::http;
use crate::location::providers::{IpGeolocator, ReverseGeocoder};
use crate::location::tables;
use crate::location::types::Coordinates;
use crate::location::{GeoError, LocationData};

// ─── ipapi.co ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResult {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
    country_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    timezone: Option<String>,
    currency: Option<String>,
}

pub fn parse_ipapi(body: &str) -> Result<LocationData, GeoError> {
    let r: IpApiResult =
        serde_json::from_str(body).map_err(|e| GeoError::InvalidResponse(e.to_string()))?;
    if r.error {
        return Err(GeoError::Upstream(
            r.reason.unwrap_or_else(|| "IP lookup failed".into()),
        ));
    }

    let code = r
        .country_code
        .ok_or_else(|| GeoError::InvalidResponse("no country_code".into()))?
        .to_ascii_uppercase();
    let country = r
        .country_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| tables::country_name(&code).map(str::to_string))
        .ok_or_else(|| GeoError::InvalidResponse("no country_name".into()))?;
    let timezone = r
        .timezone
        .or_else(|| r.longitude.map(|lon| tz_from_longitude(lon).to_string()));
    let currency = r
        .currency
        .or_else(|| tables::currency_for_country(&code).map(str::to_string));

    LocationData {
        country,
        country_code: code,
        city: r.city,
        region: r.region,
        latitude: r.latitude,
        longitude: r.longitude,
        currency,
        timezone,
        ip: r.ip,
    }
    .normalized()
}

/// IP geolocation against ipapi.co.
#[derive(Debug, Clone)]
pub struct IpApiClient {
    base_url: String,
    timeout: Duration,
}

impl IpApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ipapi_url.clone(), settings.ip_lookup_timeout)
    }

    /// Look up `ip`, or the caller's own address when `None`.
    pub async fn lookup_ip(&self, ip: Option<IpAddr>) -> Result<LocationData, GeoError> {
        let base = self.base_url.trim_end_matches('/');
        let url = match ip {
            Some(ip) => format!("{}/{}/json/", base, ip),
            None => format!("{}/json/", base),
        };
        let body = http::get_text(&url, &[], self.timeout).await?;
        parse_ipapi(&body)
    }
}

#[async_trait]
impl IpGeolocator for IpApiClient {
    async fn lookup(&self) -> Result<LocationData, GeoError> {
        self.lookup_ip(None).await
    }
}

/// An address worth sending upstream; loopback and private ranges are not.
pub fn public_ip(ip: IpAddr) -> Option<IpAddr> {
    let private = match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    };
    (!private).then_some(ip)
}

// ─── Nominatim ──────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

#[derive(Deserialize)]
struct NominatimReverse {
    error: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

/// Narrow a Nominatim `/reverse` body for the fix at `coords`.
pub fn parse_nominatim(body: &str, coords: Coordinates) -> Result<LocationData, GeoError> {
    let r: NominatimReverse =
        serde_json::from_str(body).map_err(|e| GeoError::InvalidResponse(e.to_string()))?;
    if let Some(err) = r.error {
        return Err(GeoError::Upstream(err));
    }

    let a = r.address;
    let code = a
        .country_code
        .ok_or_else(|| GeoError::InvalidResponse("no address.country_code".into()))?
        .to_ascii_uppercase();
    let country = a
        .country
        .filter(|n| !n.trim().is_empty())
        .or_else(|| tables::country_name(&code).map(str::to_string))
        .ok_or_else(|| GeoError::InvalidResponse("no address.country".into()))?;

    LocationData {
        city: a.city.or(a.town).or(a.village),
        region: a.state,
        latitude: Some(coords.latitude),
        longitude: Some(coords.longitude),
        currency: tables::currency_for_country(&code).map(str::to_string),
        timezone: Some(tz_from_longitude(coords.longitude).to_string()),
        ..LocationData::new(country, code)
    }
    .normalized()
}

/// Reverse geocoding against Nominatim.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    base_url: String,
    timeout: Duration,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.nominatim_url.clone(), settings.upstream_timeout)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, coords: Coordinates) -> Result<LocationData, GeoError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let query = [
            ("format", "json".to_string()),
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("zoom", "10".to_string()),
            ("addressdetails", "1".to_string()),
        ];
        let body = http::get_text(&url, &query, self.timeout).await?;
        parse_nominatim(&body, coords)
    }
}

// ─── Timezone estimation ────────────────────────────────────────

/// Rough IANA zone from longitude. Nominatim has no timezone field.
pub fn tz_from_longitude(lon: f64) -> &'static str {
    match (lon / 15.0).round() as i32 {
        -12..=-10 => "Pacific/Honolulu",
        -9 => "America/Anchorage",
        -8 => "America/Los_Angeles",
        -7 => "America/Denver",
        -6 => "America/Chicago",
        -5 => "America/New_York",
        -4 => "America/Halifax",
        -3 => "America/Sao_Paulo",
        -2..=-1 => "Atlantic/Azores",
        0 => "Europe/London",
        1 => "Europe/Paris",
        2 => "Africa/Cairo",
        3 => "Europe/Moscow",
        4 => "Asia/Dubai",
        5 => "Asia/Karachi",
        6 => "Asia/Dhaka",
        7 => "Asia/Bangkok",
        8 => "Asia/Shanghai",
        9 => "Asia/Tokyo",
        10 => "Australia/Sydney",
        11 => "Pacific/Noumea",
        12 => "Pacific/Auckland",
        _ => "UTC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipapi_success() {
        let body = r#"{
            "ip": "41.33.0.1", "city": "Cairo", "region": "Cairo Governorate",
            "country_name": "Egypt", "country_code": "EG",
            "latitude": 30.0588, "longitude": 31.2268,
            "timezone": "Africa/Cairo", "currency": "EGP"
        }"#;
        let loc = parse_ipapi(body).unwrap();
        assert_eq!(loc.country, "Egypt");
        assert_eq!(loc.country_code, "EG");
        assert_eq!(loc.currency.as_deref(), Some("EGP"));
        assert_eq!(loc.timezone.as_deref(), Some("Africa/Cairo"));
    }

    #[test]
    fn test_parse_ipapi_error_flag() {
        let err = parse_ipapi(r#"{"error": true, "reason": "RateLimited"}"#).unwrap_err();
        assert!(matches!(err, GeoError::Upstream(ref r) if r == "RateLimited"));
    }

    #[test]
    fn test_parse_ipapi_fills_currency_from_country() {
        let loc = parse_ipapi(r#"{"country_name": "Sweden", "country_code": "se"}"#).unwrap();
        assert_eq!(loc.country_code, "SE");
        assert_eq!(loc.currency.as_deref(), Some("SEK"));
    }

    #[test]
    fn test_parse_nominatim_city_fallbacks() {
        let body = r#"{"address": {"town": "Lund", "state": "Skåne", "country": "Sweden", "country_code": "se"}}"#;
        let loc = parse_nominatim(body, Coordinates { latitude: 55.7, longitude: 13.19 }).unwrap();
        assert_eq!(loc.city.as_deref(), Some("Lund"));
        assert_eq!(loc.region.as_deref(), Some("Skåne"));
        assert_eq!(loc.latitude, Some(55.7));
        assert_eq!(loc.timezone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn test_parse_nominatim_error() {
        let err = parse_nominatim(
            r#"{"error": "Unable to geocode"}"#,
            Coordinates { latitude: 0.0, longitude: -160.0 },
        )
        .unwrap_err();
        assert!(matches!(err, GeoError::Upstream(_)));
    }

    #[test]
    fn test_public_ip_filter() {
        assert!(public_ip("127.0.0.1".parse().unwrap()).is_none());
        assert!(public_ip("192.168.1.4".parse().unwrap()).is_none());
        assert!(public_ip("::1".parse().unwrap()).is_none());
        assert!(public_ip("41.33.0.1".parse().unwrap()).is_some());
    }

    #[test]
    fn test_tz_from_longitude() {
        assert_eq!(tz_from_longitude(-74.0), "America/New_York");
        assert_eq!(tz_from_longitude(31.2), "Africa/Cairo");
        assert_eq!(tz_from_longitude(139.7), "Asia/Tokyo");
    }
}
