//! Visitor location and currency context for a storefront.
//!
//! - [`location`]: detection chain, persisted location with manual
//!   override, and the derived shipping context.
//! - [`currency`]: rate chain, client converter, price formatting.
//! - [`server`]: the axum HTTP surface over both.

pub mod clock;
pub mod config;
pub mod currency;
pub mod http;
pub mod location;
pub mod server;
