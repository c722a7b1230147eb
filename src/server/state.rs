use std::sync::Arc;
use tokio::sync::Mutex;

use super::upstream::{IpApiClient, NominatimClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::currency::RateChain;
use crate::location::{FileKeyValueStore, LocationResolver, LocationSession, LocationStore};

pub struct AppState {
    /// One visitor session; operations on it are serialized.
    pub session: Mutex<LocationSession>,
    pub rates: RateChain,
    pub ip_lookup: IpApiClient,
    pub geocoder: NominatimClient,
}

impl AppState {
    pub fn new(
        session: LocationSession,
        rates: RateChain,
        ip_lookup: IpApiClient,
        geocoder: NominatimClient,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            rates,
            ip_lookup,
            geocoder,
        }
    }

    /// Wire everything from settings. The session detects through the
    /// upstream clients directly rather than looping back over HTTP.
    pub fn from_settings(settings: &Settings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ip_lookup = IpApiClient::from_settings(settings);
        let geocoder = NominatimClient::from_settings(settings);

        let resolver = LocationResolver::standard_chain(
            settings,
            Arc::new(geocoder.clone()),
            Arc::new(ip_lookup.clone()),
            clock.clone(),
        );
        let store = LocationStore::new(
            Box::new(FileKeyValueStore::open(settings.storage_path.clone())),
            clock,
            settings.staleness,
        );

        Self::new(
            LocationSession::new(resolver, store),
            RateChain::from_settings(settings),
            ip_lookup,
            geocoder,
        )
    }
}
