//! Per-visitor location session: bootstrap state machine, manual override
//! and refresh.
//!
//! Phases: `Uninitialized → LoadingCache → {CacheFresh | NeedsDetection} →
//! Resolved`. The bootstrap decision branches on the record returned by
//! [`LocationStore::load`] in the same call, never on previously published
//! state. A manual override is pinned regardless of age; only
//! [`LocationSession::refresh_location`] can supersede it.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use super::context::LocationContext;
use super::resolver::LocationResolver;
use super::store::{FileKeyValueStore, LocationStore};
use super::types::{DetectionMethod, GeoError, LocationData, LocationState};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Uninitialized,
    LoadingCache,
    CacheFresh,
    NeedsDetection,
    Resolved,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("location session has been disposed")]
    Disposed,
    #[error(transparent)]
    InvalidLocation(#[from] GeoError),
}

pub struct LocationSession {
    resolver: LocationResolver,
    store: LocationStore,
    phase: BootstrapPhase,
    state: watch::Sender<LocationState>,
    disposed: bool,
}

impl LocationSession {
    pub fn new(resolver: LocationResolver, store: LocationStore) -> Self {
        let (state, _) = watch::channel(LocationState::initial());
        Self {
            resolver,
            store,
            phase: BootstrapPhase::Uninitialized,
            state,
            disposed: false,
        }
    }

    /// A session detecting through the storefront API and persisting to
    /// the configured storage file.
    pub fn from_settings(settings: &Settings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = LocationStore::new(
            Box::new(FileKeyValueStore::open(settings.storage_path.clone())),
            clock.clone(),
            settings.staleness,
        );
        Self::new(LocationResolver::from_settings(settings, clock), store)
    }

    /// Current state snapshot.
    pub fn state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    /// Receive every state transition.
    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    /// Derived display fields over the current state.
    pub fn context(&self) -> LocationContext {
        LocationContext::from_state(&self.state.borrow())
    }

    /// Bootstrap the session. Runs once; later calls return the current state.
    pub async fn init(&mut self) -> Result<LocationState, SessionError> {
        self.ensure_live()?;
        if self.phase != BootstrapPhase::Uninitialized {
            return Ok(self.state());
        }

        self.phase = BootstrapPhase::LoadingCache;
        let cached = self.store.load();

        match cached {
            Some(record) if record.is_manual_override => {
                debug!(country = %record.location.country_code, "using pinned manual location");
                self.phase = BootstrapPhase::CacheFresh;
                self.publish_manual(record.location);
            }
            Some(record) if !self.store.is_stale_at(record.last_updated) => {
                debug!(country = %record.location.country_code, "using fresh cached location");
                self.phase = BootstrapPhase::CacheFresh;
                self.state.send_modify(|s| {
                    s.location = Some(record.location);
                    s.is_loading = false;
                    s.error = None;
                    s.is_manual_override = false;
                    s.detection_method = None;
                });
            }
            stale => {
                self.phase = BootstrapPhase::NeedsDetection;
                if let Some(record) = stale {
                    debug!("cached location is stale, re-detecting");
                    self.state.send_modify(|s| s.location = Some(record.location));
                }
                self.detect().await;
            }
        }

        self.phase = BootstrapPhase::Resolved;
        Ok(self.state())
    }

    /// Pin a user-chosen location. No network access.
    pub fn set_location_manually(
        &mut self,
        location: LocationData,
    ) -> Result<LocationState, SessionError> {
        self.ensure_live()?;
        let location = location.normalized()?;
        info!(country = %location.country_code, "location set manually");

        self.store.save(&location, true);
        self.publish_manual(location);
        self.phase = BootstrapPhase::Resolved;
        Ok(self.state())
    }

    /// Drop any manual override and run detection again.
    pub async fn refresh_location(&mut self) -> Result<LocationState, SessionError> {
        self.ensure_live()?;
        self.store.clear_override();
        self.state.send_modify(|s| s.is_manual_override = false);

        self.phase = BootstrapPhase::NeedsDetection;
        self.detect().await;
        self.phase = BootstrapPhase::Resolved;
        Ok(self.state())
    }

    /// End the session. Every later operation fails with
    /// [`SessionError::Disposed`].
    pub fn dispose(&mut self) {
        if !self.disposed {
            debug!("location session disposed");
            self.disposed = true;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.disposed {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    async fn detect(&mut self) {
        self.state.send_modify(|s| s.is_loading = true);

        let resolution = self.resolver.resolve().await;
        self.store.save(&resolution.location, false);

        self.state.send_modify(|s| {
            // A degraded result keeps the last automatic attribution.
            let previous = s.detection_method.filter(|m| *m != DetectionMethod::Manual);
            s.location = Some(resolution.location);
            s.is_loading = false;
            s.error = resolution.error;
            s.is_manual_override = false;
            s.detection_method = resolution.method.or(previous);
        });
    }

    fn publish_manual(&self, location: LocationData) {
        self.state.send_replace(LocationState {
            location: Some(location),
            is_loading: false,
            error: None,
            is_manual_override: true,
            detection_method: Some(DetectionMethod::Manual),
        });
    }
}
