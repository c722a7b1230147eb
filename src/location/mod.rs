//! Location subsystem for the storefront.
//!
//! Detects the visitor's country (device position, then IP, then a US
//! default), persists it with a staleness window, honors manual overrides
//! and derives the shipping/currency display context.

pub mod context;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod store;
pub mod tables;
pub mod types;

pub use context::{LocationContext, ShippingContext};
pub use resolver::{LocationResolver, Resolution, DEFAULT_LOCATION_ERROR};
pub use session::{BootstrapPhase, LocationSession, SessionError};
pub use store::{FileKeyValueStore, KeyValueStore, LocationStore, MemoryKeyValueStore, StoreError};
pub use types::{DetectionMethod, GeoError, LocationData, LocationState};
