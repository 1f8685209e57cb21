//! RegimeLabeler: maps raw HMM state indices to canonical regime ranks.
//!
//! HMM state indices are arbitrary: two fits of the same data may swap them.
//! Downstream stages only ever see canonical labels, ranked by the mean of the
//! volatility feature (0 = calmest, K-1 = most volatile).

use serde::{Deserialize, Serialize};

use crate::domain::RegimeLabel;
use crate::features::VOLATILITY_COLUMN;
use crate::hmm::{HmmParams, StateSequence};

/// Bijection raw state index -> canonical rank. Always a permutation of `0..K`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    /// `ranks[raw] = canonical`.
    ranks: Vec<usize>,
}

impl LabelMap {
    /// Rank states by ascending volatility mean; ties go to the lower raw index.
    pub fn from_volatility_means(means: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..means.len()).collect();
        order.sort_by(|&a, &b| means[a].total_cmp(&means[b]).then(a.cmp(&b)));

        let mut ranks = vec![0; means.len()];
        for (rank, raw) in order.into_iter().enumerate() {
            ranks[raw] = rank;
        }
        Self { ranks }
    }

    /// Build from fitted parameters using the volatility column of each emission mean.
    pub fn from_params(params: &HmmParams) -> Self {
        Self::from_volatility_means(&params.feature_means(VOLATILITY_COLUMN))
    }

    pub fn n_states(&self) -> usize {
        self.ranks.len()
    }

    /// Canonical label for one raw state.
    pub fn label(&self, raw: usize) -> RegimeLabel {
        RegimeLabel(self.ranks[raw])
    }

    pub fn apply(&self, states: &StateSequence) -> Vec<RegimeLabel> {
        states.as_slice().iter().map(|&s| self.label(s)).collect()
    }

    /// `ranks[raw]`, in raw-state order.
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }
}
