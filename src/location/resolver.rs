//! Location resolver: orchestrates the detection fallback chain.
//!
//! Flow: browser geolocation → IP geolocation → static default.
//!
//! Each tier is a [`DetectionTier`] returning `Option<LocationData>`; the
//! resolver walks them in order and stops at the first hit. Tiers run one
//! after another, never concurrently. Misses are logged and absorbed here,
//! so `resolve()` always produces a usable location.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::providers::{
    FixedPosition, HttpIpGeolocator, HttpReverseGeocoder, IpGeolocator, NoPosition,
    PositionSource, ReverseGeocoder,
};
use super::types::{Coordinates, DetectionMethod, GeoError, LocationData, PositionOptions};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;

/// Error recorded on the state when every tier missed.
pub const DEFAULT_LOCATION_ERROR: &str = "Could not detect location, using default";

/// One ordered attempt in the fallback chain.
#[async_trait]
pub trait DetectionTier: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// `None` is a miss; the resolver moves on to the next tier.
    async fn detect(&self) -> Option<LocationData>;
}

/// Outcome of one resolution. `location` is always usable.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub location: LocationData,
    pub method: Option<DetectionMethod>,
    pub error: Option<String>,
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

// ─── Browser tier ───────────────────────────────────────────────

/// Device coordinates + reverse geocoding.
pub struct BrowserTier {
    position: Arc<dyn PositionSource>,
    geocoder: Arc<dyn ReverseGeocoder>,
    options: PositionOptions,
    clock: Arc<dyn Clock>,
    last_fix: Mutex<Option<(Coordinates, DateTime<Utc>)>>,
}

impl BrowserTier {
    pub fn new(
        position: Arc<dyn PositionSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        options: PositionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            position,
            geocoder,
            options,
            clock,
            last_fix: Mutex::new(None),
        }
    }

    /// A fix obtained within `maximum_age`, if any.
    fn cached_fix(&self) -> Option<Coordinates> {
        let guard = self.last_fix.lock().unwrap_or_else(|e| e.into_inner());
        let (coords, at) = (*guard)?;
        let age = (self.clock.now() - at).to_std().unwrap_or(Duration::ZERO);
        (age <= self.options.maximum_age).then_some(coords)
    }

    async fn coordinates(&self) -> Result<Coordinates, GeoError> {
        if let Some(coords) = self.cached_fix() {
            debug!("reusing recent position fix");
            return Ok(coords);
        }

        // A fix arriving after the deadline is dropped along with the future.
        let pos = tokio::time::timeout(
            self.options.timeout,
            self.position.current_position(self.options),
        )
        .await
        .map_err(|_| GeoError::Timeout(self.options.timeout))??;

        let mut guard = self.last_fix.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some((pos.coords, self.clock.now()));
        Ok(pos.coords)
    }
}

#[async_trait]
impl DetectionTier for BrowserTier {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Browser
    }

    async fn detect(&self) -> Option<LocationData> {
        let coords = match self.coordinates().await {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "browser geolocation missed");
                return None;
            }
        };
        match self.geocoder.reverse(coords).await {
            Ok(loc) => Some(loc),
            Err(e) => {
                debug!(error = %e, "reverse geocoding missed");
                None
            }
        }
    }
}

// ─── IP tier ────────────────────────────────────────────────────

/// IP geolocation bounded by an abort timeout.
pub struct IpTier {
    geolocator: Arc<dyn IpGeolocator>,
    timeout: Duration,
}

impl IpTier {
    pub fn new(geolocator: Arc<dyn IpGeolocator>, timeout: Duration) -> Self {
        Self { geolocator, timeout }
    }
}

#[async_trait]
impl DetectionTier for IpTier {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Ip
    }

    async fn detect(&self) -> Option<LocationData> {
        let result = tokio::time::timeout(self.timeout, self.geolocator.lookup())
            .await
            .map_err(|_| GeoError::Timeout(self.timeout))
            .and_then(|r| r);
        match result {
            Ok(loc) => Some(loc),
            Err(e) => {
                debug!(error = %e, "IP geolocation missed");
                None
            }
        }
    }
}

// ─── Resolver ───────────────────────────────────────────────────

/// The detection pipeline.
pub struct LocationResolver {
    tiers: Vec<Box<dyn DetectionTier>>,
}

impl LocationResolver {
    /// A resolver over an explicit, ordered tier list.
    pub fn new(tiers: Vec<Box<dyn DetectionTier>>) -> Self {
        Self { tiers }
    }

    /// The standard browser → IP chain, wired to the storefront endpoints.
    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        let geocoder = Arc::new(HttpReverseGeocoder::new(
            settings.reverse_geocode_url(),
            settings.upstream_timeout,
        ));
        let ip = Arc::new(HttpIpGeolocator::new(
            settings.ip_lookup_url(),
            settings.ip_lookup_timeout,
        ));
        Self::standard_chain(settings, geocoder, ip, clock)
    }

    /// The browser → IP chain over the given lookup backends, with the
    /// device position and timeouts taken from `settings`.
    pub fn standard_chain(
        settings: &Settings,
        geocoder: Arc<dyn ReverseGeocoder>,
        ip: Arc<dyn IpGeolocator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let position: Arc<dyn PositionSource> = match settings.device_position {
            Some((lat, lng)) => Arc::new(FixedPosition::new(lat, lng)),
            None => Arc::new(NoPosition),
        };
        let options = PositionOptions {
            enable_high_accuracy: false,
            timeout: settings.geolocation_timeout,
            maximum_age: settings.position_max_age,
        };

        Self::new(vec![
            Box::new(BrowserTier::new(position, geocoder, options, clock)),
            Box::new(IpTier::new(ip, settings.ip_lookup_timeout)),
        ])
    }

    /// The standard chain with the system clock.
    pub fn with_system_clock(settings: &Settings) -> Self {
        Self::from_settings(settings, Arc::new(SystemClock))
    }

    /// Run the chain once. Never fails: total exhaustion yields the default
    /// location with an error message attached.
    pub async fn resolve(&self) -> Resolution {
        for tier in &self.tiers {
            if let Some(location) = tier.detect().await {
                info!(method = %tier.method(), country = %location.country_code, "location detected");
                return Resolution {
                    location,
                    method: Some(tier.method()),
                    error: None,
                };
            }
        }

        warn!("all detection tiers missed, using default location");
        Resolution {
            location: LocationData::default_us(),
            method: None,
            error: Some(DEFAULT_LOCATION_ERROR.to_string()),
        }
    }
}
