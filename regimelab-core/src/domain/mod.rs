//! Domain types for RegimeLab

pub mod price;
pub mod signal;

pub use price::{PricePoint, PriceSeries, SeriesError};
pub use signal::{Action, PositionState, RegimeLabel, SignalRecord};
