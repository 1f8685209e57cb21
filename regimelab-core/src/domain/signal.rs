//! Signal-side domain types: canonical regimes, positions, actions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical regime rank: 0 = lowest volatility, K-1 = highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegimeLabel(pub usize);

impl RegimeLabel {
    pub const LOW_VOLATILITY: RegimeLabel = RegimeLabel(0);

    pub fn rank(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position held in an asset: flat (0) or fully long (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    #[default]
    Flat,
    Long,
}

impl PositionState {
    /// Numeric exposure used by the simulator.
    pub fn value(self) -> f64 {
        match self {
            PositionState::Flat => 0.0,
            PositionState::Long => 1.0,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            PositionState::Flat => 0,
            PositionState::Long => 1,
        }
    }
}

/// Human-readable action tag emitted by the signal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-timestamp output of the signal engine for one asset.
///
/// `target` is the decision computed from the regime at `timestamp`;
/// `position` is what is actually held during the period (the previous
/// period's target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub regime: RegimeLabel,
    pub target: PositionState,
    pub position: PositionState,
    pub action: Action,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_values() {
        assert_eq!(PositionState::Flat.value(), 0.0);
        assert_eq!(PositionState::Long.value(), 1.0);
        assert_eq!(PositionState::default(), PositionState::Flat);
    }

    #[test]
    fn action_serializes_lowercase() {
        let json = serde_json::to_string(&Action::Buy).unwrap();
        assert_eq!(json, "\"buy\"");
        assert_eq!(Action::Sell.to_string(), "sell");
    }

    #[test]
    fn regime_label_is_transparent() {
        let json = serde_json::to_string(&RegimeLabel(2)).unwrap();
        assert_eq!(json, "2");
    }
}
