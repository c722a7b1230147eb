//! Display fields derived from the resolved location.

use serde::Serialize;

use super::tables;
use super::types::{DetectionMethod, LocationData, LocationState};

const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_COUNTRY_NAME: &str = "United States";
const DEFAULT_COUNTRY_CODE: &str = "US";

/// Pure derivation over a [`LocationState`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocationContext {
    location: Option<LocationData>,
    is_manual_override: bool,
    detection_method: Option<DetectionMethod>,
    error: Option<String>,
}

/// The "shipping/currency context" read handed to the rest of the storefront.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingContext {
    pub country_code: String,
    pub country_name: String,
    pub currency: String,
    pub ship_to_text: String,
    pub is_manual_override: bool,
    pub detection_method: Option<DetectionMethod>,
    pub error: Option<String>,
}

impl LocationContext {
    pub fn from_state(state: &LocationState) -> Self {
        Self {
            location: state.location.clone(),
            is_manual_override: state.is_manual_override,
            detection_method: state.detection_method,
            error: state.error.clone(),
        }
    }

    pub fn from_location(location: LocationData) -> Self {
        Self {
            location: Some(location),
            is_manual_override: false,
            detection_method: None,
            error: None,
        }
    }

    pub fn location(&self) -> Option<&LocationData> {
        self.location.as_ref()
    }

    /// Location currency, else the country's currency, else USD.
    pub fn currency(&self) -> String {
        let Some(loc) = &self.location else {
            return DEFAULT_CURRENCY.to_string();
        };
        loc.currency
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| tables::currency_for_country(&loc.country_code).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }

    /// Location country name, else the table name for its code, else
    /// "United States".
    pub fn country_name(&self) -> String {
        let Some(loc) = &self.location else {
            return DEFAULT_COUNTRY_NAME.to_string();
        };
        if !loc.country.trim().is_empty() {
            return loc.country.clone();
        }
        tables::country_name(&loc.country_code)
            .unwrap_or(DEFAULT_COUNTRY_NAME)
            .to_string()
    }

    /// "Ship to: {country}", with " | {currency}" unless the currency is USD.
    pub fn ship_to_text(&self) -> String {
        let currency = self.currency();
        if currency == DEFAULT_CURRENCY {
            format!("Ship to: {}", self.country_name())
        } else {
            format!("Ship to: {} | {}", self.country_name(), currency)
        }
    }

    pub fn shipping_context(&self) -> ShippingContext {
        ShippingContext {
            country_code: self
                .location
                .as_ref()
                .map(|l| l.country_code.clone())
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
            country_name: self.country_name(),
            currency: self.currency(),
            ship_to_text: self.ship_to_text(),
            is_manual_override: self.is_manual_override,
            detection_method: self.detection_method,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(loc: LocationData) -> LocationContext {
        LocationContext::from_location(loc)
    }

    #[test]
    fn test_ship_to_usd_has_no_suffix() {
        let c = ctx(LocationData::default_us());
        assert_eq!(c.ship_to_text(), "Ship to: United States");
    }

    #[test]
    fn test_ship_to_egp_has_suffix() {
        let c = ctx(LocationData {
            currency: Some("EGP".into()),
            ..LocationData::new("Egypt", "EG")
        });
        assert_eq!(c.ship_to_text(), "Ship to: Egypt | EGP");
    }

    #[test]
    fn test_currency_from_country_table() {
        let c = ctx(LocationData::new("Egypt", "EG"));
        assert_eq!(c.currency(), "EGP");
        assert!(c.ship_to_text().ends_with(" | EGP"));
    }

    #[test]
    fn test_currency_unknown_country_defaults_to_usd() {
        let c = ctx(LocationData::new("Atlantis", "QQ"));
        assert_eq!(c.currency(), "USD");
        assert_eq!(c.ship_to_text(), "Ship to: Atlantis");
    }

    #[test]
    fn test_country_name_from_table() {
        let c = ctx(LocationData::new("", "SA"));
        assert_eq!(c.country_name(), "Saudi Arabia");

        let unknown = ctx(LocationData::new("", "QQ"));
        assert_eq!(unknown.country_name(), "United States");
    }

    #[test]
    fn test_no_location_uses_defaults() {
        let c = LocationContext::from_state(&LocationState::initial());
        assert_eq!(c.currency(), "USD");
        assert_eq!(c.country_name(), "United States");
        assert_eq!(c.shipping_context().country_code, "US");
    }

    #[test]
    fn test_shipping_context_json() {
        let state = LocationState {
            location: Some(LocationData::new("Egypt", "EG")),
            is_loading: false,
            error: None,
            is_manual_override: true,
            detection_method: Some(DetectionMethod::Manual),
        };
        let json = serde_json::to_value(LocationContext::from_state(&state).shipping_context()).unwrap();
        assert_eq!(json["shipToText"], "Ship to: Egypt | EGP");
        assert_eq!(json["detectionMethod"], "manual");
        assert_eq!(json["isManualOverride"], true);
    }
}
