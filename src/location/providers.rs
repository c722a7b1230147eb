//! Raw detection primitives: device position, reverse geocoding and IP
//! geolocation.
//!
//! The HTTP implementations talk to the storefront's own normalized
//! endpoints (`/api/geo/ip`, `/api/geo/reverse`) and narrow their payloads
//! into [`LocationData`] before anything else sees them.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use super::types::{Coordinates, GeoError, LocationData, Position, PositionOptions};
use crate::http::{self, HttpError};

// ─── Traits ─────────────────────────────────────────────────────

/// The device's own geolocation capability.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self, options: PositionOptions) -> Result<Position, GeoError>;
}

/// Coordinates → location lookup.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coords: Coordinates) -> Result<LocationData, GeoError>;
}

/// Visitor IP → location lookup.
#[async_trait]
pub trait IpGeolocator: Send + Sync {
    async fn lookup(&self) -> Result<LocationData, GeoError>;
}

// ─── Position sources ───────────────────────────────────────────

/// A device with no geolocation support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPosition;

#[async_trait]
impl PositionSource for NoPosition {
    async fn current_position(&self, _options: PositionOptions) -> Result<Position, GeoError> {
        Err(GeoError::Unsupported)
    }
}

/// A device that always reports the same fix (configured coordinates).
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    pub coords: Coordinates,
}

impl FixedPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coords: Coordinates { latitude, longitude },
        }
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self, _options: PositionOptions) -> Result<Position, GeoError> {
        Ok(Position {
            coords: self.coords,
            timestamp: Utc::now(),
        })
    }
}

// ─── Wire payloads ──────────────────────────────────────────────

/// Body of the IP and reverse geocode endpoints: a location or `{ error }`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoPayload {
    #[serde(default)]
    error: Option<serde_json::Value>,
    country: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
    region: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    currency: Option<String>,
    timezone: Option<String>,
    ip: Option<String>,
}

/// Narrow a raw JSON body into a validated [`LocationData`].
pub fn parse_geo_payload(body: &str) -> Result<LocationData, GeoError> {
    let p: GeoPayload =
        serde_json::from_str(body).map_err(|e| GeoError::InvalidResponse(e.to_string()))?;

    if let Some(err) = p.error {
        if !err.is_null() && err != serde_json::Value::Bool(false) {
            let msg = match err {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(GeoError::Upstream(msg));
        }
    }

    let country = p
        .country
        .ok_or_else(|| GeoError::InvalidResponse("missing country".into()))?;
    let country_code = p
        .country_code
        .ok_or_else(|| GeoError::InvalidResponse("missing countryCode".into()))?;

    LocationData {
        country,
        country_code,
        city: p.city,
        region: p.region,
        latitude: p.latitude,
        longitude: p.longitude,
        currency: p.currency,
        timezone: p.timezone,
        ip: p.ip,
    }
    .normalized()
}

// ─── HTTP implementations ───────────────────────────────────────

impl From<HttpError> for GeoError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Network(msg) => GeoError::Network(msg),
            HttpError::Status(code) => GeoError::Status(code),
            HttpError::Timeout(after) => GeoError::Timeout(after),
            HttpError::Body(msg) => GeoError::InvalidResponse(msg),
        }
    }
}

/// IP lookup against the storefront's `/api/geo/ip` endpoint.
#[derive(Debug, Clone)]
pub struct HttpIpGeolocator {
    url: String,
    timeout: Duration,
}

impl HttpIpGeolocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl IpGeolocator for HttpIpGeolocator {
    async fn lookup(&self) -> Result<LocationData, GeoError> {
        let body = http::get_text(&self.url, &[], self.timeout).await?;
        parse_geo_payload(&body)
    }
}

/// Reverse geocoding against the storefront's `/api/geo/reverse` endpoint.
#[derive(Debug, Clone)]
pub struct HttpReverseGeocoder {
    url: String,
    timeout: Duration,
}

impl HttpReverseGeocoder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn reverse(&self, coords: Coordinates) -> Result<LocationData, GeoError> {
        let query = [
            ("lat", coords.latitude.to_string()),
            ("lng", coords.longitude.to_string()),
        ];
        let body = http::get_text(&self.url, &query, self.timeout).await?;
        let mut loc = parse_geo_payload(&body)?;
        loc.latitude.get_or_insert(coords.latitude);
        loc.longitude.get_or_insert(coords.longitude);
        Ok(loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let body = r#"{
            "country": "Egypt", "countryCode": "EG", "city": "Cairo",
            "region": "Cairo Governorate", "currency": "EGP",
            "timezone": "Africa/Cairo", "ip": "41.0.0.1"
        }"#;
        let loc = parse_geo_payload(body).unwrap();
        assert_eq!(loc.country_code, "EG");
        assert_eq!(loc.city.as_deref(), Some("Cairo"));
        assert_eq!(loc.currency.as_deref(), Some("EGP"));
        assert_eq!(loc.ip.as_deref(), Some("41.0.0.1"));
    }

    #[test]
    fn test_parse_error_field_is_a_miss() {
        let err = parse_geo_payload(r#"{"error": "rate limited"}"#).unwrap_err();
        assert!(matches!(err, GeoError::Upstream(ref m) if m == "rate limited"));
    }

    #[test]
    fn test_parse_error_flag_true() {
        let err = parse_geo_payload(r#"{"error": true, "country": "Egypt", "countryCode": "EG"}"#)
            .unwrap_err();
        assert!(matches!(err, GeoError::Upstream(_)));
    }

    #[test]
    fn test_parse_missing_country_code() {
        let err = parse_geo_payload(r#"{"country": "Egypt"}"#).unwrap_err();
        assert!(matches!(err, GeoError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_geo_payload("<html>502</html>").unwrap_err(),
            GeoError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_no_position_is_unsupported() {
        let err = NoPosition
            .current_position(PositionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GeoError::Unsupported));
    }

    #[tokio::test]
    async fn test_fixed_position_reports_coords() {
        let pos = FixedPosition::new(30.04, 31.23)
            .current_position(PositionOptions::default())
            .await
            .unwrap();
        assert_eq!(pos.coords.latitude, 30.04);
    }
}
