//! SignalEngine: turns canonical regime labels into positions and actions.
//!
//! The state machine is a pure function of `(previous target, previous label,
//! current label)`; [`SignalEngine::generate`] folds it over a label sequence
//! and then applies the one-period execution delay.
//!
//! Rules, evaluated from the second timestamp on:
//! - entering regime 0 from any other regime: go long (`buy`)
//! - in the highest regime: go flat (`sell`), even if already flat
//! - otherwise: keep the previous target (`hold`)

use thiserror::Error;

use crate::config::EngineConfig;
use crate::domain::{Action, PositionState, RegimeLabel, SignalRecord};
use crate::features::FeatureFrame;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    #[error("label count {labels} does not match feature record count {records}")]
    LengthMismatch { records: usize, labels: usize },
}

/// One transition of the signal state machine.
pub fn step(
    prev_target: PositionState,
    prev_label: RegimeLabel,
    label: RegimeLabel,
    high: RegimeLabel,
) -> (PositionState, Action) {
    if label == RegimeLabel::LOW_VOLATILITY && prev_label != RegimeLabel::LOW_VOLATILITY {
        (PositionState::Long, Action::Buy)
    } else if label == high {
        (PositionState::Flat, Action::Sell)
    } else {
        (prev_target, Action::Hold)
    }
}

/// Signal generation for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEngine {
    high: RegimeLabel,
}

impl SignalEngine {
    /// `high` is the canonical label of the most volatile regime (K-1).
    pub fn new(high: RegimeLabel) -> Self {
        Self { high }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(RegimeLabel(config.high_regime()))
    }

    pub fn high(&self) -> RegimeLabel {
        self.high
    }

    /// Targets and actions per label, before the execution delay.
    ///
    /// The first timestamp has no predecessor: Flat, hold.
    pub fn targets(&self, labels: &[RegimeLabel]) -> Vec<(PositionState, Action)> {
        let mut out = Vec::with_capacity(labels.len());
        let mut prev: Option<(PositionState, RegimeLabel)> = None;
        for &label in labels {
            let (target, action) = match prev {
                None => (PositionState::Flat, Action::Hold),
                Some((prev_target, prev_label)) => step(prev_target, prev_label, label, self.high),
            };
            out.push((target, action));
            prev = Some((target, label));
        }
        out
    }

    /// Full signal records for a feature frame and its canonical labels.
    pub fn generate(
        &self,
        frame: &FeatureFrame,
        labels: &[RegimeLabel],
    ) -> Result<Vec<SignalRecord>, SignalError> {
        if frame.len() != labels.len() {
            return Err(SignalError::LengthMismatch {
                records: frame.len(),
                labels: labels.len(),
            });
        }

        let decisions = self.targets(labels);
        let mut held = PositionState::Flat;
        let records = frame
            .records
            .iter()
            .zip(labels)
            .zip(decisions)
            .map(|((record, &regime), (target, action))| {
                let position = held;
                held = target;
                SignalRecord {
                    timestamp: record.timestamp,
                    price: record.price,
                    regime,
                    target,
                    position,
                    action,
                }
            })
            .collect();
        Ok(records)
    }
}

/// Asset ticker without its quote currency: `BTC-USD` -> `BTC`.
pub fn short_symbol(symbol: &str) -> &str {
    symbol.split('-').next().unwrap_or(symbol)
}

/// Presentation label for the actions of all assets at one timestamp.
///
/// `hold` when nobody acts, `buy BTC` for a single actor, `buy both` when
/// every asset (two or more) takes the same action, otherwise the individual
/// actions joined by ` & ` in the given asset order.
pub fn combine_actions(actions: &[(&str, Action)]) -> String {
    let acting: Vec<(&str, Action)> = actions
        .iter()
        .filter(|(_, a)| *a != Action::Hold)
        .map(|&(s, a)| (short_symbol(s), a))
        .collect();

    match acting.as_slice() {
        [] => Action::Hold.to_string(),
        [(symbol, action)] => format!("{action} {symbol}"),
        [(_, first), rest @ ..]
            if acting.len() == actions.len() && rest.iter().all(|(_, a)| a == first) =>
        {
            format!("{first} both")
        }
        _ => acting
            .iter()
            .map(|(symbol, action)| format!("{action} {symbol}"))
            .collect::<Vec<_>>()
            .join(" & "),
    }
}
