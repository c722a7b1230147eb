//! Currency conversion: the server-side rate chain, the client converter,
//! price formatting and the currency list.

pub mod catalog;
pub mod chain;
pub mod converter;
pub mod format;
pub mod price;
pub mod providers;
pub mod types;

pub use catalog::{fallback_currencies, CurrencyCatalog};
pub use chain::RateChain;
pub use converter::{ConversionEndpoint, CurrencyConverter, HttpConversionEndpoint};
pub use format::format_price;
pub use price::{PriceConverter, PriceState};
pub use providers::{ExchangeRateApiProvider, MoneyMorphProvider, RateProvider, StaticRateProvider};
pub use types::{ConversionResponse, ConversionResult, CurrencyError, RateError, RateSource};
