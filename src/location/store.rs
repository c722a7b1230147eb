//! Persistence of the last resolved location.
//!
//! Three keys, written independently: `userLocation` (JSON),
//! `locationManualOverride` (`"true"`/`"false"`) and `locationLastUpdated`
//! (RFC 3339). Staleness is measured from `locationLastUpdated` only.
//!
//! Storage failures never escape this module: reads degrade to a cache miss
//! and writes are logged.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::LocationData;
use crate::clock::Clock;

pub const KEY_LOCATION: &str = "userLocation";
pub const KEY_MANUAL_OVERRIDE: &str = "locationManualOverride";
pub const KEY_LAST_UPDATED: &str = "locationLastUpdated";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("storage write rejected for '{0}'")]
    Rejected(String),
    #[error("storage unavailable")]
    Unavailable,
}

/// String key-value storage, the shape of a browser's local storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

// ─── File backend ───────────────────────────────────────────────

/// A JSON object on disk, rewritten on every change.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileKeyValueStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Option<BTreeMap<String, String>> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt location storage file");
                None
            }
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        self.persist().inspect_err(|_| {
            // keep memory consistent with disk
            match previous {
                Some(v) => self.entries.insert(key.to_string(), v),
                None => self.entries.remove(key),
            };
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let Some(previous) = self.entries.remove(key) else {
            return Ok(());
        };
        self.persist().inspect_err(|_| {
            self.entries.insert(key.to_string(), previous);
        })
    }
}

// ─── Memory backend ─────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    failing_writes: HashSet<String>,
    failing_reads: bool,
    reads: HashMap<String, usize>,
}

/// In-memory storage. Clones share the same data, so a test can keep a
/// handle while a session owns another.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future write to `key` fail, like a full storage quota.
    pub fn fail_writes_for(&self, key: &str) {
        self.lock().failing_writes.insert(key.to_string());
    }

    /// Make every future read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().failing_reads = fail;
    }

    /// Direct read, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    /// How many times `key` has been read through [`KeyValueStore::get`].
    pub fn read_count(&self, key: &str) -> usize {
        self.lock().reads.get(key).copied().unwrap_or(0)
    }

    /// Direct write, bypassing failure injection.
    pub fn insert(&self, key: &str, value: &str) {
        self.lock().entries.insert(key.to_string(), value.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.lock();
        *inner.reads.entry(key.to_string()).or_default() += 1;
        if inner.failing_reads {
            return Err(StoreError::Unavailable);
        }
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.failing_writes.contains(key) {
            return Err(StoreError::Rejected(key.to_string()));
        }
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.failing_writes.contains(key) {
            return Err(StoreError::Rejected(key.to_string()));
        }
        inner.entries.remove(key);
        Ok(())
    }
}

// ─── Location store ─────────────────────────────────────────────

/// A location record as last written.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedLocation {
    pub location: LocationData,
    pub is_manual_override: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct LocationStore {
    backend: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
}

impl LocationStore {
    pub fn new(backend: Box<dyn KeyValueStore>, clock: Arc<dyn Clock>, staleness: Duration) -> Self {
        Self {
            backend,
            clock,
            staleness,
        }
    }

    /// Read the persisted record. `None` if absent, unreadable or malformed.
    pub fn load(&self) -> Option<PersistedLocation> {
        let raw = match self.backend.get(KEY_LOCATION) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read persisted location");
                return None;
            }
        };

        let location = match serde_json::from_str::<LocationData>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|loc| loc.normalized().map_err(|e| e.to_string()))
        {
            Ok(loc) => loc,
            Err(e) => {
                warn!(error = %e, "ignoring malformed persisted location");
                return None;
            }
        };

        let is_manual_override = match self.backend.get(KEY_MANUAL_OVERRIDE) {
            Ok(flag) => flag.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "failed to read manual override flag");
                false
            }
        };

        Some(PersistedLocation {
            location,
            is_manual_override,
            last_updated: self.last_updated(),
        })
    }

    /// Write the three keys. Each write is attempted even if an earlier one
    /// failed; failures are logged, never returned.
    pub fn save(&mut self, location: &LocationData, is_manual: bool) {
        let now = self.clock.now().to_rfc3339();
        let json = match serde_json::to_string(location) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "failed to encode location");
                None
            }
        };
        let mut location_written = false;
        if let Some(json) = json.as_deref() {
            match self.backend.set(KEY_LOCATION, json) {
                Ok(()) => location_written = true,
                Err(e) => warn!(key = KEY_LOCATION, error = %e, "failed to persist location key"),
            }
        }

        // Pinning the flag over a location that was not written would pin
        // the previous record instead.
        let flag = match (is_manual, location_written) {
            (true, true) => "true",
            (true, false) => {
                warn!("location not persisted, saving manual override flag as false");
                "false"
            }
            (false, _) => "false",
        };

        for (key, value) in [(KEY_MANUAL_OVERRIDE, flag), (KEY_LAST_UPDATED, now.as_str())] {
            if let Err(e) = self.backend.set(key, value) {
                warn!(key, error = %e, "failed to persist location key");
            }
        }
        debug!(country = %location.country_code, is_manual, "location persisted");
    }

    /// True when there is no usable timestamp or it is older than the
    /// staleness window.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(self.last_updated())
    }

    /// Staleness of an already loaded timestamp. No storage access.
    pub fn is_stale_at(&self, last_updated: Option<DateTime<Utc>>) -> bool {
        match last_updated {
            Some(ts) => self.clock.now() - ts > self.staleness,
            None => true,
        }
    }

    /// Forget the manual override flag, keeping the location itself.
    pub fn clear_override(&mut self) {
        if let Err(e) = self.backend.remove(KEY_MANUAL_OVERRIDE) {
            warn!(error = %e, "failed to clear manual override flag");
        }
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        let raw = match self.backend.get(KEY_LAST_UPDATED) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read location timestamp");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = %raw, error = %e, "unparseable location timestamp");
                None
            }
        }
    }
}
