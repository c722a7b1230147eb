//! Core types for the location subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How the current location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Browser,
    Ip,
    Manual,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Ip => write!(f, "ip"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One resolved geographic/currency context for a visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    pub country: String,
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl LocationData {
    /// A bare location with only the required fields.
    pub fn new(country: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            country_code: country_code.into(),
            city: None,
            region: None,
            latitude: None,
            longitude: None,
            currency: None,
            timezone: None,
            ip: None,
        }
    }

    /// The location used when every detection tier misses.
    pub fn default_us() -> Self {
        Self {
            currency: Some("USD".into()),
            timezone: Some("America/New_York".into()),
            ..Self::new("United States", "US")
        }
    }

    /// Check and normalize a location coming from outside the crate.
    ///
    /// Required fields and coordinates are hard errors. Optional fields that
    /// fail validation (currency code, IANA timezone) are dropped, since the
    /// context layer has fallbacks for them.
    pub fn normalized(mut self) -> Result<Self, GeoError> {
        self.country = self.country.trim().to_string();
        self.country_code = self.country_code.trim().to_ascii_uppercase();

        if self.country_code.len() != 2 || !self.country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GeoError::InvalidLocation(format!(
                "bad country code '{}'",
                self.country_code
            )));
        }
        if self.country.is_empty() {
            return Err(GeoError::InvalidLocation("empty country name".into()));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(GeoError::InvalidLocation(format!("latitude {} out of range", lat)));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(GeoError::InvalidLocation(format!("longitude {} out of range", lon)));
            }
        }

        self.currency = self
            .currency
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()));
        self.timezone = self
            .timezone
            .filter(|tz| tz.parse::<chrono_tz::Tz>().is_ok());
        self.city = non_empty(self.city);
        self.region = non_empty(self.region);
        self.ip = non_empty(self.ip);

        Ok(self)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A coordinate fix and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coords: Coordinates,
    pub timestamp: DateTime<Utc>,
}

/// Options passed to a position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: false,
            timeout: Duration::from_secs(8),
            maximum_age: Duration::from_secs(5 * 60),
        }
    }
}

/// Session-visible location state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationState {
    pub location: Option<LocationData>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_manual_override: bool,
    pub detection_method: Option<DetectionMethod>,
}

impl LocationState {
    /// State before anything has been loaded.
    pub fn initial() -> Self {
        Self {
            location: None,
            is_loading: true,
            error: None,
            is_manual_override: false,
            detection_method: None,
        }
    }
}

/// Why a single detection step missed.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation is not supported")]
    Unsupported,
    #[error("geolocation permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("lookup failed: {0}")]
    Upstream(String),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_json_uses_camel_case() {
        let loc = LocationData::default_us();
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["countryCode"], "US");
        assert_eq!(json["timezone"], "America/New_York");
        assert!(json.get("city").is_none());
    }

    #[test]
    fn test_normalized_uppercases_codes() {
        let loc = LocationData {
            currency: Some("egp".into()),
            ..LocationData::new(" Egypt ", "eg")
        }
        .normalized()
        .unwrap();
        assert_eq!(loc.country, "Egypt");
        assert_eq!(loc.country_code, "EG");
        assert_eq!(loc.currency.as_deref(), Some("EGP"));
    }

    #[test]
    fn test_normalized_rejects_bad_country_code() {
        assert!(LocationData::new("Nowhere", "XYZ").normalized().is_err());
        assert!(LocationData::new("", "US").normalized().is_err());
    }

    #[test]
    fn test_normalized_rejects_out_of_range_coordinates() {
        let loc = LocationData {
            latitude: Some(123.0),
            ..LocationData::new("Egypt", "EG")
        };
        assert!(loc.normalized().is_err());
    }

    #[test]
    fn test_normalized_drops_unknown_timezone() {
        let loc = LocationData {
            timezone: Some("Mars/Olympus_Mons".into()),
            city: Some("  ".into()),
            ..LocationData::new("Egypt", "EG")
        }
        .normalized()
        .unwrap();
        assert!(loc.timezone.is_none());
        assert!(loc.city.is_none());
    }

    #[test]
    fn test_detection_method_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DetectionMethod::Ip).unwrap(), "\"ip\"");
        assert_eq!(DetectionMethod::Browser.to_string(), "browser");
    }
}
