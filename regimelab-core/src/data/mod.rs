//! Price retrieval: provider trait, error taxonomy and the Yahoo adapter.

pub mod provider;
pub mod yahoo;

pub use provider::{DataError, DataSource, Interval, PriceProvider};
pub use yahoo::YahooProvider;
